//! Check command: decode files and report diagnostics

use rayon::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::CodecConfig;
use crate::decoder::read_file;
use crate::delegate::{Diagnostic, Severity};

use super::{expand_inputs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

/// Outcome of checking one file.
#[derive(Debug)]
pub(crate) struct CheckResult {
    pub path: PathBuf,
    /// Set when the file could not be decoded at all.
    pub fatal: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckResult {
    pub fn passed(&self, strict: bool) -> bool {
        if self.fatal.is_some() {
            return false;
        }
        if strict {
            self.diagnostics.is_empty()
        } else {
            !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
        }
    }
}

pub(crate) fn check_files(files: &[PathBuf], config: &CodecConfig) -> Vec<CheckResult> {
    files
        .par_iter()
        .map(|path| match read_file(path, &config.decode) {
            Ok(decoded) => CheckResult {
                path: path.clone(),
                fatal: None,
                diagnostics: decoded.diagnostics,
            },
            Err(e) => CheckResult {
                path: path.clone(),
                fatal: Some(e.to_string()),
                diagnostics: Vec::new(),
            },
        })
        .collect()
}

/// Execute the check command
pub fn run_check(paths: &[PathBuf], strict: bool, config: &CodecConfig) -> ExitCode {
    let files = expand_inputs(paths);
    if files.is_empty() {
        eprintln!("Error: No sprite files found");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let results = check_files(&files, config);
    let mut failures = 0;

    for result in &results {
        let passed = result.passed(strict);
        if !passed {
            failures += 1;
        }
        let status = if passed { "ok" } else { "FAILED" };
        println!("{}: {}", result.path.display(), status);
        if let Some(fatal) = &result.fatal {
            println!("  error: {}", fatal);
        }
        for diagnostic in &result.diagnostics {
            println!("  {}", diagnostic);
        }
    }

    println!();
    println!("{} file(s) checked, {} failed", results.len(), failures);

    if failures > 0 {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_passed_rules() {
        let warning_only = CheckResult {
            path: PathBuf::from("a.ase"),
            fatal: None,
            diagnostics: vec![Diagnostic::incompatibility("Unsupported chunk type 0x1234")],
        };
        assert!(warning_only.passed(false));
        assert!(!warning_only.passed(true));

        let broken = CheckResult {
            path: PathBuf::from("b.ase"),
            fatal: Some("Invalid file magic number 0x0000".into()),
            diagnostics: Vec::new(),
        };
        assert!(!broken.passed(false));
    }

    #[test]
    fn test_check_files_reports_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.aseprite");
        fs::write(&path, vec![0u8; 200]).unwrap();

        let results = check_files(&[path], &CodecConfig::default());
        assert_eq!(results.len(), 1);
        assert!(results[0].fatal.as_deref().unwrap().contains("magic"));
    }
}

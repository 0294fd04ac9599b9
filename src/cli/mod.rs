//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod check;
mod convert;
mod export;
mod info;

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use glob::glob;

use crate::config::{load_config, CodecConfig};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Check if a path has a sprite file extension (.aseprite or .ase).
pub fn is_sprite_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("aseprite") | Some("ase")
    )
}

/// Find all sprite files in a directory (recursively).
pub fn find_sprite_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match glob(&format!("{}/**/*", dir.display())) {
        Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file() && is_sprite_file(p)).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

/// Expand directories into the sprite files they contain; plain files are
/// kept as given.
pub fn expand_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(find_sprite_files(path));
        } else {
            files.push(path.clone());
        }
    }
    files
}

/// Inspect, check and convert .aseprite sprite files
#[derive(Parser)]
#[command(name = "ase")]
#[command(about = "Inspect, check and convert .aseprite sprite files")]
#[command(version)]
pub struct Cli {
    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (default: nearest asefmt.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the structure of sprite files
    Info {
        /// Sprite files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode sprite files and report every problem found
    Check {
        /// Files or directories (searched recursively for .aseprite/.ase)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },

    /// Re-encode a sprite, optionally keeping only a range of frames
    Convert {
        /// Input sprite
        input: PathBuf,

        /// Output sprite
        output: PathBuf,

        /// First frame to keep (0-based)
        #[arg(long)]
        from: Option<u32>,

        /// Last frame to keep (0-based, inclusive)
        #[arg(long)]
        to: Option<u32>,

        /// Store image cels uncompressed
        #[arg(long)]
        raw: bool,
    },

    /// Save one cel as a PNG image
    ExportCel {
        /// Input sprite
        input: PathBuf,

        /// Layer name
        #[arg(short, long)]
        layer: String,

        /// Frame number (0-based)
        #[arg(short, long, default_value = "0")]
        frame: u32,

        /// Output file (default: {input}_{layer}_{frame}.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scale output by integer factor (1-16)
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=16))]
        scale: u8,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

/// Load the configuration, printing the error when it can't be used.
pub(crate) fn config_or_exit(path: Option<&Path>) -> Result<CodecConfig, ExitCode> {
    load_config(path).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_or_exit(cli.config.as_deref()) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match cli.command {
        Commands::Info { files, json } => info::run_info(&files, json, &config),
        Commands::Check { paths, strict } => check::run_check(&paths, strict, &config),
        Commands::Convert { input, output, from, to, raw } => {
            convert::run_convert(&input, &output, from, to, raw, &config)
        }
        Commands::ExportCel { input, layer, frame, output, scale } => {
            export::run_export_cel(&input, &layer, frame, output.as_deref(), scale, &config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_is_sprite_file() {
        assert!(is_sprite_file(Path::new("a/hero.aseprite")));
        assert!(is_sprite_file(Path::new("HERO.ASE")));
        assert!(!is_sprite_file(Path::new("hero.png")));
        assert!(!is_sprite_file(Path::new("aseprite")));
    }

    #[test]
    fn test_expand_inputs_walks_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("a.aseprite")).unwrap();
        File::create(dir.path().join("sub").join("b.ase")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let explicit = dir.path().join("notes.txt");
        let files = expand_inputs(&[dir.path().to_path_buf(), explicit.clone()]);
        assert_eq!(files.len(), 3);
        assert!(files.contains(&explicit));
        assert!(files.iter().any(|p| p.ends_with("sub/b.ase")));
    }

    #[test]
    fn test_cli_parses_convert() {
        let cli = Cli::try_parse_from(["ase", "-v", "convert", "in.aseprite", "out.aseprite", "--from", "2", "--raw"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Convert { from, to, raw, .. } => {
                assert_eq!(from, Some(2));
                assert_eq!(to, None);
                assert!(raw);
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_scale() {
        let result = Cli::try_parse_from(["ase", "export-cel", "in.ase", "--layer", "bg", "--scale", "40"]);
        assert!(result.is_err());
    }
}

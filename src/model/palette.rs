//! Per-frame color palettes

use crate::pixel::{rgba, rgba_a};

/// Colors effective from `frame` until the next palette change.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    frame: u32,
    colors: Vec<u32>,
    names: Vec<String>,
}

impl Palette {
    /// `size` opaque black entries.
    pub fn new(frame: u32, size: usize) -> Self {
        Self {
            frame,
            colors: vec![rgba(0, 0, 0, 255); size],
            names: vec![String::new(); size],
        }
    }

    pub fn from_colors(frame: u32, colors: Vec<u32>) -> Self {
        let names = vec![String::new(); colors.len()];
        Self { frame, colors, names }
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: u32) {
        self.frame = frame;
    }

    pub fn size(&self) -> usize {
        self.colors.len()
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    pub fn resize(&mut self, size: usize) {
        self.colors.resize(size, rgba(0, 0, 0, 255));
        self.names.resize(size, String::new());
    }

    pub fn entry(&self, index: usize) -> u32 {
        self.colors.get(index).copied().unwrap_or(0)
    }

    /// Setting past the end grows the palette.
    pub fn set_entry(&mut self, index: usize, color: u32) {
        if index >= self.colors.len() {
            self.resize(index + 1);
        }
        self.colors[index] = color;
    }

    pub fn entry_name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn set_entry_name(&mut self, index: usize, name: impl Into<String>) {
        if index >= self.names.len() {
            self.resize(index + 1);
        }
        self.names[index] = name.into();
    }

    pub fn has_alpha(&self) -> bool {
        self.colors.iter().any(|c| rgba_a(*c) < 255)
    }

    pub fn has_names(&self) -> bool {
        self.names.iter().any(|n| !n.is_empty())
    }

    /// First and last differing entry index, or `None` when both palettes
    /// hold the same entries. Entries present in only one palette differ.
    pub fn diff_range(&self, other: &Palette) -> Option<(usize, usize)> {
        let max = self.size().max(other.size());
        let differs = |i: usize| {
            i >= self.size()
                || i >= other.size()
                || self.colors[i] != other.colors[i]
                || self.names[i] != other.names[i]
        };
        let first = (0..max).find(|i| differs(*i))?;
        let last = (0..max).rev().find(|i| differs(*i)).unwrap_or(first);
        Some((first, last))
    }

    pub fn same_entries(&self, other: &Palette) -> bool {
        self.diff_range(other).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_palette_is_opaque_black() {
        let pal = Palette::new(0, 4);
        assert_eq!(pal.size(), 4);
        assert_eq!(pal.entry(3), rgba(0, 0, 0, 255));
        assert!(!pal.has_alpha());
    }

    #[test]
    fn test_diff_range() {
        let a = Palette::from_colors(0, vec![1, 2, 3, 4]);
        let mut b = a.clone();
        assert_eq!(a.diff_range(&b), None);

        b.set_entry(1, 9);
        b.set_entry(2, 9);
        assert_eq!(a.diff_range(&b), Some((1, 2)));

        let c = Palette::from_colors(0, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(a.diff_range(&c), Some((4, 5)));
    }

    #[test]
    fn test_names_participate_in_diff() {
        let a = Palette::from_colors(0, vec![1, 2]);
        let mut b = a.clone();
        b.set_entry_name(1, "skin");
        assert_eq!(a.diff_range(&b), Some((1, 1)));
        assert!(b.has_names());
    }

    #[test]
    fn test_set_entry_grows() {
        let mut pal = Palette::new(0, 1);
        pal.set_entry(3, rgba(1, 2, 3, 4));
        assert_eq!(pal.size(), 4);
        assert!(pal.has_alpha());
    }
}

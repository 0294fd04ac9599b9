use std::collections::BTreeMap;

use super::user_data::UserData;
use super::{Point, Rect};

/// Slice geometry from its key frame until the next key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SliceKey {
    pub bounds: Rect,
    /// 9-slice center, relative to `bounds`.
    pub center: Option<Rect>,
    pub pivot: Option<Point>,
}

impl SliceKey {
    pub fn new(bounds: Rect) -> Self {
        Self { bounds, center: None, pivot: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slice {
    pub name: String,
    pub user_data: UserData,
    keys: BTreeMap<u32, SliceKey>,
}

impl Slice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn insert(&mut self, frame: u32, key: SliceKey) {
        self.keys.insert(frame, key);
    }

    pub fn keys(&self) -> impl Iterator<Item = (u32, &SliceKey)> {
        self.keys.iter().map(|(f, k)| (*f, k))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key in effect at `frame`.
    pub fn key_at(&self, frame: u32) -> Option<(u32, &SliceKey)> {
        self.keys.range(..=frame).next_back().map(|(f, k)| (*f, k))
    }

    /// Keys visible in `from..=to`, with frames rebased so `from` is 0.
    ///
    /// The key in effect at `from` is reported at frame 0.
    pub fn keys_in_range(&self, from: u32, to: u32) -> Vec<(u32, SliceKey)> {
        let mut out = Vec::new();
        if let Some((_, key)) = self.key_at(from) {
            out.push((0, *key));
        }
        if to > from {
            for (frame, key) in self.keys.range(from + 1..=to) {
                out.push((frame - from, *key));
            }
        }
        out
    }
}

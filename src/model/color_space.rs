use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpaceKind {
    None,
    Srgb,
    Icc,
}

/// Embedded color profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSpace {
    pub kind: ColorSpaceKind,
    pub gamma: Option<f64>,
    /// ICC payload, only for [`ColorSpaceKind::Icc`].
    pub icc: Vec<u8>,
}

impl ColorSpace {
    pub fn none() -> Self {
        Self { kind: ColorSpaceKind::None, gamma: None, icc: Vec::new() }
    }

    pub fn srgb() -> Self {
        Self { kind: ColorSpaceKind::Srgb, gamma: None, icc: Vec::new() }
    }

    pub fn srgb_with_gamma(gamma: f64) -> Self {
        Self { kind: ColorSpaceKind::Srgb, gamma: Some(gamma), icc: Vec::new() }
    }

    pub fn icc(data: Vec<u8>) -> Self {
        Self { kind: ColorSpaceKind::Icc, gamma: None, icc: data }
    }
}

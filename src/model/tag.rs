use serde::Serialize;

use super::user_data::UserData;

pub const TAG_MAX_REPEAT: u32 = 65535;

/// Playback direction of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AniDir {
    #[default]
    Forward,
    Reverse,
    PingPong,
    PingPongReverse,
}

impl AniDir {
    /// Unknown values fall back to forward.
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => AniDir::Reverse,
            2 => AniDir::PingPong,
            3 => AniDir::PingPongReverse,
            _ => AniDir::Forward,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AniDir::Forward => 0,
            AniDir::Reverse => 1,
            AniDir::PingPong => 2,
            AniDir::PingPongReverse => 3,
        }
    }
}

/// Named, inclusive frame range. The tag color lives in `user_data.color`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub from: u32,
    pub to: u32,
    pub ani_dir: AniDir,
    /// 0 means loop forever.
    pub repeat: u32,
    pub user_data: UserData,
}

impl Tag {
    pub fn new(name: impl Into<String>, from: u32, to: u32) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            ani_dir: AniDir::Forward,
            repeat: 0,
            user_data: UserData::default(),
        }
    }

    pub fn frames(&self) -> u32 {
        self.to.saturating_sub(self.from) + 1
    }
}

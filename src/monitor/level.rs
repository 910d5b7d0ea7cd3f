//! Load classification reported by the monitor.

use serde::Serialize;

/// How hard the socket and its host are working.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum LoadLevel {
    /// Queue drains promptly, host is healthy.
    #[default]
    Nominal = 0,
    /// Queue is building up or CPU is busy.
    Elevated = 1,
    /// Messages are piling up faster than they drain, or the host is starved.
    Critical = 2,
}

impl LoadLevel {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Elevated,
            2 => Self::Critical,
            _ => Self::Nominal,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nominal => "Nominal",
            Self::Elevated => "Elevated",
            Self::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

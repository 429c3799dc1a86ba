use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of runtime snapshot the agent can capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    /// no previous type, only used to seed the rotation
    Unknown,
    Cpu,
    Heap,
    Block,
    Mutex,
    Goroutine,
    Threadcreate,
    Trace,
}

impl Default for ProfileType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl ProfileType {
    /// Ring order walked by the rotation, starting from the anchor type.
    pub const RING: [ProfileType; 7] = [
        ProfileType::Cpu,
        ProfileType::Heap,
        ProfileType::Block,
        ProfileType::Mutex,
        ProfileType::Goroutine,
        ProfileType::Threadcreate,
        ProfileType::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::Unknown => "unknown",
            ProfileType::Cpu => "cpu",
            ProfileType::Heap => "heap",
            ProfileType::Block => "block",
            ProfileType::Mutex => "mutex",
            ProfileType::Goroutine => "goroutine",
            ProfileType::Threadcreate => "threadcreate",
            ProfileType::Trace => "trace",
        }
    }

    /// Captures that run for a configured duration instead of being taken instantly.
    pub fn is_bounded(&self) -> bool {
        matches!(self, ProfileType::Cpu | ProfileType::Trace)
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown profile type: {0}")]
pub struct ParseProfileTypeError(String);

impl FromStr for ProfileType {
    type Err = ParseProfileTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileType::RING
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseProfileTypeError(s.to_owned()))
    }
}

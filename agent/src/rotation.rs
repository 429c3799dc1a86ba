use serde::{Deserialize, Serialize};

use crate::{error::AgentError, ProfileType};

/// Which profile types take part in the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnabledProfiles {
    pub cpu: bool,
    pub heap: bool,
    pub block: bool,
    pub mutex: bool,
    pub goroutine: bool,
    pub threadcreate: bool,
    pub trace: bool,
}

impl Default for EnabledProfiles {
    fn default() -> Self {
        Self {
            cpu: true,
            heap: false,
            block: false,
            mutex: false,
            goroutine: false,
            threadcreate: false,
            trace: false,
        }
    }
}

impl EnabledProfiles {
    pub fn none() -> Self {
        Self {
            cpu: false,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self, ptype: ProfileType) -> bool {
        match ptype {
            ProfileType::Cpu => self.cpu,
            ProfileType::Heap => self.heap,
            ProfileType::Block => self.block,
            ProfileType::Mutex => self.mutex,
            ProfileType::Goroutine => self.goroutine,
            ProfileType::Threadcreate => self.threadcreate,
            ProfileType::Trace => self.trace,
            ProfileType::Unknown => false,
        }
    }

    pub fn set(&mut self, ptype: ProfileType, enabled: bool) {
        match ptype {
            ProfileType::Cpu => self.cpu = enabled,
            ProfileType::Heap => self.heap = enabled,
            ProfileType::Block => self.block = enabled,
            ProfileType::Mutex => self.mutex = enabled,
            ProfileType::Goroutine => self.goroutine = enabled,
            ProfileType::Threadcreate => self.threadcreate = enabled,
            ProfileType::Trace => self.trace = enabled,
            ProfileType::Unknown => {}
        }
    }

    pub fn any(&self) -> bool {
        ProfileType::RING.iter().any(|t| self.is_enabled(*t))
    }
}

/// Decides which profile to capture next.
///
/// The cycle is anchored on [`ProfileType::Cpu`]: the very first call always
/// yields it, even when CPU profiling is disabled, and every later return to
/// it marks the end of a full rotation.
#[derive(Debug, Clone, Copy)]
pub struct Rotation {
    enabled: EnabledProfiles,
}

impl Rotation {
    pub fn new(enabled: EnabledProfiles) -> Result<Self, AgentError> {
        if !enabled.any() {
            return Err(AgentError::NoProfilesEnabled);
        }
        Ok(Self { enabled })
    }

    pub fn enabled(&self) -> &EnabledProfiles {
        &self.enabled
    }

    pub fn next(&self, previous: ProfileType) -> ProfileType {
        let ring = ProfileType::RING;
        let Some(pos) = ring.iter().position(|t| *t == previous) else {
            return ProfileType::Cpu;
        };

        ring.iter()
            .cycle()
            .skip(pos + 1)
            .take(ring.len())
            .copied()
            .find(|t| self.enabled.is_enabled(*t))
            // unreachable: `new` rejects an empty set
            .unwrap_or(previous)
    }

    pub fn completes_rotation(next: ProfileType) -> bool {
        next == ProfileType::Cpu
    }
}

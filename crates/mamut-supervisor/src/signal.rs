//! Unix signals used to stop supervised processes.

use nix::sys::signal;
use nix::unistd::Pid;
use std::fmt;

use crate::error::{Result, SupervisorError};

/// Signals the supervisor sends to child processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT (2) - Interrupt, the polite stop request nodes handle.
    Int,
    /// SIGKILL (9) - Forceful termination (cannot be caught).
    Kill,
}

impl Signal {
    /// Returns the signal number.
    pub fn number(&self) -> i32 {
        self.to_nix() as i32
    }

    /// Returns the signal name (without SIG prefix).
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Int => "INT",
            Signal::Kill => "KILL",
        }
    }

    fn to_nix(self) -> signal::Signal {
        match self {
            Signal::Int => signal::Signal::SIGINT,
            Signal::Kill => signal::Signal::SIGKILL,
        }
    }

    /// Delivers this signal to `pid`.
    pub fn send(self, pid: u32) -> Result<()> {
        let pid = pid as i32;
        signal::kill(Pid::from_raw(pid), self.to_nix()).map_err(|source| {
            SupervisorError::Signal {
                signal: self,
                pid,
                source,
            }
        })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

// src/error.rs
//
// Error types shared by the codec, the serial link and the supervisor.

use std::fmt;

/// What went wrong on an open link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkErrorKind {
    Read,
    Write,
    /// The port reported end-of-stream (device unplugged or closed).
    Disconnected,
}

impl fmt::Display for LinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkErrorKind::Read => write!(f, "read"),
            LinkErrorKind::Write => write!(f, "write"),
            LinkErrorKind::Disconnected => write!(f, "disconnect"),
        }
    }
}

/// I/O failure in the middle of a session. Reported once, then the link is torn down.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Serial {kind} error: {message}")]
pub struct LinkError {
    pub kind: LinkErrorKind,
    pub message: String,
}

impl LinkError {
    pub fn read(e: &std::io::Error) -> Self {
        Self {
            kind: LinkErrorKind::Read,
            message: e.to_string(),
        }
    }

    pub fn write(e: &std::io::Error) -> Self {
        Self {
            kind: LinkErrorKind::Write,
            message: e.to_string(),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            kind: LinkErrorKind::Disconnected,
            message: "port returned end of stream".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StimError {
    #[error("Failed to open {port}: {reason}")]
    LinkOpen { port: String, reason: String },

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Invalid pulse train: {0}")]
    InvalidProgram(String),

    #[error("Already connected; disconnect first")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Slot {0} out of range (0..{max})", max = crate::program::NUM_PULSETRAINS)]
    SlotOutOfRange(usize),

    #[error("Failed to enumerate ports: {0}")]
    PortScan(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Program file error: {0}")]
    ProgramFile(String),

    #[error("Log file error: {0}")]
    LogFile(String),
}

pub type Result<T> = std::result::Result<T, StimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = StimError::LinkOpen {
            port: "/dev/ttyACM0".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(e.to_string(), "Failed to open /dev/ttyACM0: No such file or directory");
        assert_eq!(StimError::SlotOutOfRange(100).to_string(), "Slot 100 out of range (0..100)");

        let link: StimError = LinkError::disconnected().into();
        assert_eq!(link.to_string(), "Serial disconnect error: port returned end of stream");
    }
}

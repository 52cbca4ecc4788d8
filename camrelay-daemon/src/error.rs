//! Relay error taxonomy

use thiserror::Error;

/// Transport-failure fragments (matched case-insensitively) that make a task
/// error worth retrying.
const CONNECTIVITY_PATTERNS: &[&str] = &[
    "connection",
    "broken pipe",
    "network is unreachable",
    "no route to host",
    "timed out",
    "input/output error",
    "end of file",
];

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No egress stream key configured (set RELAY_STREAM_KEY or [egress].stream_key)")]
    MissingCredential,

    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    #[error("Transcode task failed: {0}")]
    Task(String),

    #[error("Memory usage {process_mb}MB exceeds {limit_mb}MB")]
    ResourceExhaustion { process_mb: u64, limit_mb: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),
}

/// Retry eligibility class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Connectivity,
    Task,
    Credential,
    Resource,
}

impl RelayError {
    /// Turn a task's error message into a classified error.
    pub fn from_task_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if CONNECTIVITY_PATTERNS.iter().any(|p| lower.contains(p)) {
            RelayError::Connectivity(message)
        } else {
            RelayError::Task(message)
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            RelayError::MissingCredential => ErrorClass::Credential,
            RelayError::Connectivity(_) => ErrorClass::Connectivity,
            RelayError::ResourceExhaustion { .. } => ErrorClass::Resource,
            RelayError::Task(_) | RelayError::Io(_) | RelayError::Ipc(_) => ErrorClass::Task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_messages() {
        for msg in [
            "Connection reset by peer",
            "rtmps://live-api-s.facebook.com:443/rtmp/: Broken pipe",
            "Network is unreachable",
            "No route to host",
            "Operation timed out",
            "av_interleaved_write_frame(): Input/output error",
            "End of file",
            "CONNECTION REFUSED",
        ] {
            assert_eq!(
                RelayError::from_task_message(msg).class(),
                ErrorClass::Connectivity,
                "{msg}"
            );
        }
    }

    #[test]
    fn test_other_messages_are_terminal() {
        for msg in [
            "Unknown encoder 'libx264'",
            "Invalid argument",
            "ffmpeg exited with exit status: 1",
        ] {
            let err = RelayError::from_task_message(msg);
            assert_eq!(err.class(), ErrorClass::Task, "{msg}");
            assert!(err.to_string().contains(msg));
        }
    }

    #[test]
    fn test_classes() {
        assert_eq!(RelayError::MissingCredential.class(), ErrorClass::Credential);
        assert_eq!(
            RelayError::ResourceExhaustion {
                process_mb: 512,
                limit_mb: 400
            }
            .class(),
            ErrorClass::Resource
        );
    }
}

//! Recorder error taxonomy.

use crate::types::RecordingId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// Channel name rejected before anything was launched.
    #[error("invalid channel: {0:?}")]
    InvalidChannel(String),

    /// The capture process could not be started.
    #[error("launch failed: {0}")]
    LaunchFailed(#[source] std::io::Error),

    /// `stop` referenced an id that is not active.
    #[error("recording not found: {0}")]
    NotFound(RecordingId),

    /// The interrupt could not be delivered to the process group.
    #[error("cannot abort recording {id}: {source}")]
    SignalFailed {
        id: RecordingId,
        #[source]
        source: std::io::Error,
    },
}

impl RecorderError {
    /// True for errors caused by the caller's input rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidChannel(_) | Self::NotFound(_))
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_caller_friendly() {
        let id = RecordingId::from("abc");
        assert_eq!(
            RecorderError::NotFound(id.clone()).to_string(),
            "recording not found: abc"
        );

        let err = RecorderError::SignalFailed {
            id,
            source: std::io::Error::from_raw_os_error(3),
        };
        assert!(err.to_string().starts_with("cannot abort recording abc"));
        assert!(!err.is_client_error());

        let launch = RecorderError::LaunchFailed(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        ));
        assert_eq!(launch.to_string(), "launch failed: No such file or directory");
    }

    #[test]
    fn invalid_channel_is_client_error() {
        assert!(RecorderError::InvalidChannel(String::new()).is_client_error());
        assert!(RecorderError::NotFound(RecordingId::new()).is_client_error());
    }
}

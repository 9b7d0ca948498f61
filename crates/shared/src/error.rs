use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NO_FILE_SELECTED_MESSAGE: &str = "Please upload an image first.";
pub const SUBMISSION_IN_PROGRESS_MESSAGE: &str = "A prediction is already in progress.";
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "An unexpected error occurred";
pub const TRANSPORT_FAILURE_MESSAGE: &str = "An error occurred during prediction.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileTooLarge,
    NoFileSelected,
    SubmissionInProgress,
    PredictionMalformed,
    TransportFailure,
}

/// Every way a selection or submission can fail. None of them are fatal; the
/// controller stays interactive after each.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictionError {
    #[error("file of {size_bytes} bytes exceeds the {limit_bytes} byte upload limit")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },
    #[error("no file selected")]
    NoFileSelected,
    #[error("a submission is already in flight")]
    SubmissionInProgress,
    #[error("prediction response malformed: {}", server_message.as_deref().unwrap_or("missing prediction fields"))]
    PredictionMalformed { server_message: Option<String> },
    #[error("prediction transport failure: {detail}")]
    TransportFailure { detail: String },
}

impl PredictionError {
    pub fn malformed(server_message: Option<String>) -> Self {
        Self::PredictionMalformed {
            server_message: server_message.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::TransportFailure {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Self::NoFileSelected => ErrorKind::NoFileSelected,
            Self::SubmissionInProgress => ErrorKind::SubmissionInProgress,
            Self::PredictionMalformed { .. } => ErrorKind::PredictionMalformed,
            Self::TransportFailure { .. } => ErrorKind::TransportFailure,
        }
    }

    /// The flat message shown to the user. Transport details are never
    /// included; they only go to the log.
    pub fn user_message(&self) -> String {
        match self {
            Self::FileTooLarge { limit_bytes, .. } => format!(
                "File size exceeds {}. Please choose a smaller image.",
                format_size_limit(*limit_bytes)
            ),
            Self::NoFileSelected => NO_FILE_SELECTED_MESSAGE.to_string(),
            Self::SubmissionInProgress => SUBMISSION_IN_PROGRESS_MESSAGE.to_string(),
            Self::PredictionMalformed { server_message } => server_message
                .clone()
                .unwrap_or_else(|| UNEXPECTED_RESPONSE_MESSAGE.to_string()),
            Self::TransportFailure { .. } => TRANSPORT_FAILURE_MESSAGE.to_string(),
        }
    }
}

fn format_size_limit(limit_bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    if limit_bytes >= MIB && limit_bytes % MIB == 0 {
        format!("{}MB", limit_bytes / MIB)
    } else if limit_bytes >= KIB && limit_bytes % KIB == 0 {
        format!("{}KB", limit_bytes / KIB)
    } else {
        format!("{limit_bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_message_names_the_limit() {
        let err = PredictionError::FileTooLarge {
            size_bytes: 6 * 1024 * 1024,
            limit_bytes: 5 * 1024 * 1024,
        };
        assert_eq!(
            err.user_message(),
            "File size exceeds 5MB. Please choose a smaller image."
        );
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
    }

    #[test]
    fn transport_detail_stays_out_of_user_message() {
        let err = PredictionError::transport("connection reset by peer");
        assert_eq!(err.user_message(), TRANSPORT_FAILURE_MESSAGE);
        assert!(err.to_string().contains("connection reset by peer"));
    }

    #[test]
    fn blank_server_message_falls_back_to_generic_text() {
        let err = PredictionError::malformed(Some("   ".to_string()));
        assert_eq!(err.user_message(), UNEXPECTED_RESPONSE_MESSAGE);

        let err = PredictionError::malformed(Some("model not loaded".to_string()));
        assert_eq!(err.user_message(), "model not loaded");
    }
}

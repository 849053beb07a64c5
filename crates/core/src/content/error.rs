use thiserror::Error;

/// Errors raised when parsing content discriminants from text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("Unknown content kind: {0}")]
    UnknownKind(String),
    #[error("Unknown status: {0}")]
    UnknownStatus(String),
    #[error("Unknown certification type: {0}")]
    UnknownCertificationType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_error_display() {
        assert_eq!(
            ContentError::UnknownKind("video".to_string()).to_string(),
            "Unknown content kind: video"
        );
        assert_eq!(
            ContentError::UnknownStatus("ARCHIVED".to_string()).to_string(),
            "Unknown status: ARCHIVED"
        );
    }
}

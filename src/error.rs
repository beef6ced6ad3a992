//! Error type for the compression core. Every kind is terminal for the
//! current request and is surfaced through the `Failed` notification.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{summary}")]
    Probe { summary: String, details: String },

    #[error("{0}")]
    Build(String),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("{summary}")]
    EncodeFailed { summary: String, details: String },

    #[error("Another compression is already in flight")]
    Busy,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn probe(summary: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Probe {
            summary: summary.into(),
            details: details.into(),
        }
    }

    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build(msg.into())
    }

    pub fn encode_failed(summary: impl Into<String>, details: impl Into<String>) -> Self {
        Self::EncodeFailed {
            summary: summary.into(),
            details: details.into(),
        }
    }

    /// Splits the error into the (summary, details) pair carried by the
    /// failure notification. Details are empty for kinds without any.
    pub fn into_failure_parts(self) -> (String, String) {
        match self {
            Self::Probe { summary, details } | Self::EncodeFailed { summary, details } => {
                (summary, details)
            }
            other => (other.to_string(), String::new()),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_parts_keep_details() {
        let (summary, details) =
            AppError::encode_failed("bad encode", "raw log").into_failure_parts();
        assert_eq!(summary, "bad encode");
        assert_eq!(details, "raw log");
    }

    #[test]
    fn failure_parts_without_details_are_empty() {
        let (summary, details) = AppError::validation("no codec").into_failure_parts();
        assert_eq!(summary, "no codec");
        assert_eq!(details, "");
    }

    #[test]
    fn busy_displays_message() {
        assert!(AppError::Busy.to_string().contains("already in flight"));
    }
}

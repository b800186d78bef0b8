pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Request(#[from] surge_http::PrepareError),

    #[error("executor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Rejected configuration. Always raised before any executor exists.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    EmptyStages,

    #[error("stage {index}: `duration` must not be negative (got `{raw}`)")]
    NegativeStageDuration { index: usize, raw: String },

    #[error("stage {index}: `target` must not be negative (got `{target}`)")]
    NegativeStageTarget { index: usize, target: i64 },

    #[error("`startVUs` must not be negative (got `{0}`)")]
    NegativeStartVus(i64),

    #[error("`{field}` must not be negative (got `{raw}`)")]
    NegativeDuration { field: &'static str, raw: String },

    #[error("`{field}` must be a positive duration")]
    ZeroDuration { field: &'static str },

    #[error("`targetURL` is required")]
    MissingTargetUrl,

    #[error("invalid `targetURL` `{url}`: {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    #[error("unresolved placeholder `{{{{ {0} }}}}` in `targetURL`")]
    UnresolvedPlaceholder(String),

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("unknown metric `{0}` in thresholds")]
    UnknownMetric(String),

    #[error("invalid threshold `{expression}` for `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("invalid check `{name}`: {reason}")]
    InvalidCheck { name: String, reason: String },

    #[error("invalid `expectedStatuses` `{raw}`: {reason}")]
    InvalidExpectedStatuses { raw: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_errors_come_from_request_preparation_or_executor_tasks() {
        let err = Error::from(surge_http::PrepareError::UnsupportedScheme("ftp".to_string()));
        assert!(matches!(err, Error::Request(_)));
        assert!(err.to_string().starts_with("invalid request: "));
        assert!(err.to_string().contains("ftp"));
    }
}

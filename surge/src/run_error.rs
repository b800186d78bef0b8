use std::fmt;

use crate::exit_codes::ExitCode;

/// A failed command together with the exit code it maps to.
#[derive(Debug)]
pub struct RunError {
    code: ExitCode,
    source: anyhow::Error,
}

impl RunError {
    /// Bad flags or config; raised before any request is sent.
    pub fn invalid_input(source: anyhow::Error) -> Self {
        Self {
            code: ExitCode::InvalidInput,
            source,
        }
    }

    pub fn runtime(source: anyhow::Error) -> Self {
        Self {
            code: ExitCode::RuntimeError,
            source,
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.code
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Alternate form prints the whole context chain on one line.
        write!(f, "{:#}", self.source)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

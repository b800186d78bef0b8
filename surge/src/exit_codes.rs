use clap::error::ErrorKind;
use surge_core::RunReport;

/// Process exit codes, k6-compatible where k6 defines one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    ThresholdsFailed = 11,
    /// Bad flags or config. Nothing was sent.
    InvalidInput = 30,
    /// IO, executor or export failure after the run started.
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        if report.passed() {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }

    /// `--help` and `--version` are not failures.
    #[must_use]
    pub fn for_parse_error(err: &clap::Error) -> Self {
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Self::Success,
            _ => Self::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    use crate::cli::Cli;

    #[test]
    fn parse_errors_map_to_invalid_input_except_help() {
        let help = Cli::try_parse_from(["surge", "--help"]).err();
        assert_eq!(help.as_ref().map(ExitCode::for_parse_error), Some(ExitCode::Success));

        let bad = Cli::try_parse_from(["surge", "run", "--tick", "soon"]).err();
        assert_eq!(bad.as_ref().map(ExitCode::for_parse_error), Some(ExitCode::InvalidInput));
    }
}

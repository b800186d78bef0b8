use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, config: &surge_core::RunConfig);
    fn progress(&self) -> Option<surge_core::ProgressFn>;
    fn print_summary(&self, report: &surge_core::RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new(!quiet)),
        OutputFormat::Json => Box::new(json::JsonOutput { progress: !quiet }),
    }
}

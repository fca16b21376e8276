use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;
use tracker_config::ConfigError;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Error reading job file {path}")]
    #[diagnostic(code(chart_tracker::read_jobs))]
    ReadJobs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job file {path}: {source}")]
    #[diagnostic(
        code(chart_tracker::parse_jobs),
        help("Expected a JSON array of jobs with repository, kind and chart_version fields")
    )]
    ParseJobs {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown repository in job file: {0}")]
    #[diagnostic(
        code(chart_tracker::unknown_repository),
        help("Add the repository under [[repositories]] in the configuration")
    )]
    UnknownRepository(String),

    #[error("{0} job error(s) collected")]
    #[diagnostic(code(chart_tracker::job_errors))]
    JobErrors(usize),

    #[error("Interrupted")]
    #[diagnostic(code(chart_tracker::interrupted))]
    Interrupted,
}

pub type CliResult<T> = std::result::Result<T, CliError>;

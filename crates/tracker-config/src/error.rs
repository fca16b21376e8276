use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(tracker_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(tracker_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Repository name cannot be empty")]
    #[diagnostic(
        code(tracker_config::empty_repo_name),
        help("Give every [[repositories]] entry a name")
    )]
    EmptyRepositoryName,

    #[error("Duplicate repository name: {0}")]
    #[diagnostic(
        code(tracker_config::duplicate_repo),
        help("Each repository must have a unique name")
    )]
    DuplicateRepositoryName(String),

    #[error("Invalid URL for repository {name}: {url}")]
    #[diagnostic(
        code(tracker_config::invalid_repository_url),
        help("Use an absolute http, https or oci URL")
    )]
    InvalidRepositoryUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid duration for {key}: {value}")]
    #[diagnostic(
        code(tracker_config::invalid_duration),
        help("Durations look like 30s, 5m or 1d1h1m1s")
    )]
    InvalidDuration { key: &'static str, value: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(tracker_config::io))]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

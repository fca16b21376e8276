use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    repository::Repository,
    utils::{expand_home, parse_duration, xdg_cache_home, xdg_config_home},
};

pub const DEFAULT_GITHUB_RATE_LIMIT: u32 = 5000;
pub const DEFAULT_GITHUB_BURST: u32 = 10;
pub const DEFAULT_HTTP_TIMEOUT: &str = "30s";
pub const DEFAULT_USER_AGENT: &str = "chart-tracker";

const CONFIG_ENV: &str = "CHART_TRACKER_CONFIG";
const TOKEN_ENV: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];
const REDACTED: &str = "<redacted>";

/// Application's configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Token sent to code-hosting hosts.
    /// Default: $GITHUB_TOKEN or $GH_TOKEN
    pub github_token: Option<String>,

    /// Requests per hour allowed against code-hosting hosts.
    /// Default: 5000
    pub github_rate_limit: Option<u32>,

    /// Requests that may be sent back to back before the hourly rate applies.
    /// Default: 10
    pub github_burst: Option<u32>,

    /// Global timeout of a single HTTP request (e.g. "30s", "1m").
    /// Default: "30s"
    pub http_timeout: Option<String>,

    /// User agent sent with every request.
    /// Default: "chart-tracker"
    pub user_agent: Option<String>,

    /// Directory where chart logos are stored.
    /// Default: $XDG_CACHE_HOME/chart-tracker/images
    pub images_path: Option<String>,

    /// Tracked chart repositories.
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Location of the configuration file when none is given explicitly.
pub fn default_config_path() -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => xdg_config_home().join("chart-tracker").join("config.toml"),
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            github_token: None,
            github_rate_limit: Some(DEFAULT_GITHUB_RATE_LIMIT),
            github_burst: Some(DEFAULT_GITHUB_BURST),
            http_timeout: Some(DEFAULT_HTTP_TIMEOUT.to_string()),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            images_path: None,
            repositories: Vec::new(),
        }
    }

    /// Loads the configuration from `path`, or from the default location.
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        let mut config = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    /// Parses and resolves a configuration document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.resolve()?;
        Ok(config)
    }

    /// Fills in defaults and the token from the environment, then
    /// validates the result.
    pub fn resolve(&mut self) -> Result<()> {
        if self.github_token.as_deref().map_or(true, str::is_empty) {
            self.github_token = TOKEN_ENV
                .iter()
                .find_map(|key| env::var(key).ok().filter(|v| !v.is_empty()));
        }

        self.github_rate_limit.get_or_insert(DEFAULT_GITHUB_RATE_LIMIT);
        self.github_burst.get_or_insert(DEFAULT_GITHUB_BURST);
        self.http_timeout
            .get_or_insert_with(|| DEFAULT_HTTP_TIMEOUT.to_string());
        self.user_agent
            .get_or_insert_with(|| DEFAULT_USER_AGENT.to_string());

        self.http_timeout()?;

        let mut seen_repos = HashSet::new();
        for repo in &mut self.repositories {
            if repo.name.trim().is_empty() {
                return Err(ConfigError::EmptyRepositoryName);
            }
            if !seen_repos.insert(repo.name.clone()) {
                return Err(ConfigError::DuplicateRepositoryName(repo.name.clone()));
            }
            repo.parsed_url()?;

            if repo.repository_id.is_empty() {
                repo.repository_id = repo.name.clone();
            }
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Result<Duration> {
        let value = self.http_timeout.as_deref().unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let millis = parse_duration(value).ok_or_else(|| {
            ConfigError::InvalidDuration {
                key: "http_timeout",
                value: value.to_string(),
            }
        })?;
        let millis = u64::try_from(millis)
            .ok()
            .filter(|&m| m > 0)
            .ok_or_else(|| {
                ConfigError::InvalidDuration {
                    key: "http_timeout",
                    value: value.to_string(),
                }
            })?;
        Ok(Duration::from_millis(millis))
    }

    pub fn github_rate_limit(&self) -> u32 {
        self.github_rate_limit.unwrap_or(DEFAULT_GITHUB_RATE_LIMIT)
    }

    pub fn github_burst(&self) -> u32 {
        self.github_burst.unwrap_or(DEFAULT_GITHUB_BURST)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn images_path(&self) -> PathBuf {
        match &self.images_path {
            Some(path) => expand_home(path),
            None => xdg_cache_home().join("chart-tracker").join("images"),
        }
    }

    pub fn get_repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repo| repo.name == name)
    }

    /// Copy of the configuration with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.github_token.is_some() {
            config.github_token = Some(REDACTED.to_string());
        }
        for repo in &mut config.repositories {
            if repo.auth_pass.is_some() {
                repo.auth_pass = Some(REDACTED.to_string());
            }
        }
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::{with_env, with_env_opt};

    const SAMPLE: &str = r#"
github_rate_limit = 100
http_timeout = "1m"

[[repositories]]
repository_id = "00000000-0000-0000-0000-000000000001"
name = "stable"
url = "https://charts.example.com/stable"

[[repositories]]
name = "private"
url = "oci://registry.example.com/charts"
auth_user = "user"
auth_pass = "pass"
"#;

    fn without_token_env(f: impl FnOnce()) {
        with_env_opt(vec![("GITHUB_TOKEN", None), ("GH_TOKEN", None)], f);
    }

    fn repo(name: &str, url: &str) -> Repository {
        Repository {
            repository_id: String::new(),
            name: name.to_string(),
            url: url.to_string(),
            auth_user: None,
            auth_pass: None,
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        without_token_env(|| {
            let mut config = Config::default_config();
            config.resolve().unwrap();

            assert_eq!(config.github_token, None);
            assert_eq!(config.github_rate_limit(), 5000);
            assert_eq!(config.github_burst(), 10);
            assert_eq!(config.http_timeout().unwrap(), Duration::from_secs(30));
            assert_eq!(config.user_agent(), "chart-tracker");
            assert!(config.repositories.is_empty());
        });
    }

    #[test]
    #[serial]
    fn test_from_toml() {
        without_token_env(|| {
            let config = Config::from_toml(SAMPLE).unwrap();

            assert_eq!(config.github_rate_limit(), 100);
            assert_eq!(config.github_burst(), 10);
            assert_eq!(config.http_timeout().unwrap(), Duration::from_secs(60));
            assert_eq!(config.repositories.len(), 2);

            let stable = config.get_repository("stable").unwrap();
            assert_eq!(stable.repository_id, "00000000-0000-0000-0000-000000000001");

            let private = config.get_repository("private").unwrap();
            assert_eq!(private.repository_id, "private");
            assert!(private.has_auth());
            assert!(config.get_repository("missing").is_none());
        });
    }

    #[test]
    #[serial]
    fn test_token_from_env() {
        with_env_opt(
            vec![("GITHUB_TOKEN", None), ("GH_TOKEN", Some("from-gh"))],
            || {
                let config = Config::from_toml("").unwrap();
                assert_eq!(config.github_token.as_deref(), Some("from-gh"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_configured_token_wins_over_env() {
        with_env(vec![("GITHUB_TOKEN", "from-env")], || {
            let config = Config::from_toml(r#"github_token = "from-file""#).unwrap();
            assert_eq!(config.github_token.as_deref(), Some("from-file"));
        });
    }

    #[test]
    fn test_resolve_duplicate_repo() {
        let mut config = Config::default_config();
        config
            .repositories
            .push(repo("dup", "https://a.example.com"));
        config
            .repositories
            .push(repo("dup", "https://b.example.com"));

        assert!(matches!(
            config.resolve(),
            Err(ConfigError::DuplicateRepositoryName(name)) if name == "dup"
        ));
    }

    #[test]
    fn test_resolve_empty_repo_name() {
        let mut config = Config::default_config();
        config.repositories.push(repo(" ", "https://a.example.com"));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::EmptyRepositoryName)
        ));
    }

    #[test]
    fn test_resolve_invalid_url() {
        let mut config = Config::default_config();
        config.repositories.push(repo("bad", "not a url"));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidRepositoryUrl { .. })
        ));
    }

    #[test]
    fn test_resolve_zero_timeout() {
        let mut config = Config::default_config();
        config.http_timeout = Some("0s".to_string());
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidDuration {
                key: "http_timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_resolve_invalid_timeout() {
        let mut config = Config::default_config();
        config.http_timeout = Some("30".to_string());
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidDuration {
                key: "http_timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("repositories = 3"),
            Err(ConfigError::TomlDeError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).unwrap();

        without_token_env(|| {
            let config = Config::load(Some(&path)).unwrap();
            assert_eq!(config.repositories.len(), 2);
        });
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        without_token_env(|| {
            let config = Config::load(Some(&path)).unwrap();
            assert_eq!(config, {
                let mut expected = Config::default_config();
                expected.resolve().unwrap();
                expected
            });
        });
    }

    #[test]
    #[serial]
    fn test_default_config_path_env_override() {
        with_env(vec![("CHART_TRACKER_CONFIG", "/etc/chart-tracker.toml")], || {
            assert_eq!(
                default_config_path(),
                PathBuf::from("/etc/chart-tracker.toml")
            );
        });

        with_env_opt(
            vec![
                ("CHART_TRACKER_CONFIG", None),
                ("XDG_CONFIG_HOME", Some("/tmp/xdg")),
            ],
            || {
                assert_eq!(
                    default_config_path(),
                    PathBuf::from("/tmp/xdg/chart-tracker/config.toml")
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_images_path() {
        let mut config = Config::default_config();
        with_env(vec![("XDG_CACHE_HOME", "/tmp/cache")], || {
            assert_eq!(
                config.images_path(),
                PathBuf::from("/tmp/cache/chart-tracker/images")
            );
        });

        config.images_path = Some("/srv/images".to_string());
        assert_eq!(config.images_path(), PathBuf::from("/srv/images"));
    }

    #[test]
    #[serial]
    fn test_redacted() {
        without_token_env(|| {
            let mut config = Config::from_toml(SAMPLE).unwrap();
            config.github_token = Some("secret".to_string());

            let shown = config.redacted();
            assert_eq!(shown.github_token.as_deref(), Some("<redacted>"));
            assert_eq!(
                shown.get_repository("private").unwrap().auth_pass.as_deref(),
                Some("<redacted>")
            );

            let rendered = shown.to_toml().unwrap();
            assert!(!rendered.contains("secret"));
            assert!(!rendered.contains("\"pass\""));
        });
    }
}

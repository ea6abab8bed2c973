//! Supervisor configuration
//!
//! Command-line flags (with `QBOX_*` environment fallbacks, `.env` included)
//! are parsed into [`Args`] and converted once into an immutable
//! [`SupervisorConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use shared::LogFileConfig;
use url::Url;

use crate::error::{SupervisorError, SupervisorResult};

pub const APP_NAME: &str = "QBox";
pub const DEFAULT_BACKEND_PORT: u16 = 8080;
pub const DEFAULT_LIVENESS_PATH: &str = "/health";
pub const READINESS_PATH: &str = "/api/queries/";
pub const READINESS_INTERVAL: Duration = Duration::from_millis(500);
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
pub const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const INITIAL_UPDATE_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_UPDATE_INTERVAL_HOURS: f64 = 6.0;
pub const MAX_UPDATE_INTERVAL_HOURS: f64 = 24.0 * 365.0;
pub const DEFAULT_ISSUE_URL: &str = "https://github.com/qbox-app/qbox/issues/new";

/// Lifecycle supervisor for the QBox desktop application
#[derive(Parser, Debug, Clone)]
#[command(name = "qbox-supervisor")]
#[command(about = "Starts the QBox backend, gates the UI on readiness and manages self-updates")]
pub struct Args {
    /// Backend executable (defaults to the bundled `qbox-backend` next to this binary)
    #[arg(long, env = "QBOX_BACKEND_PATH")]
    pub backend_path: Option<PathBuf>,

    /// Extra arguments passed to the backend
    #[arg(long = "backend-arg", env = "QBOX_BACKEND_ARGS", value_delimiter = ' ')]
    pub backend_args: Vec<String>,

    /// Port the backend listens on (exported to it as PORT)
    #[arg(long, env = "QBOX_BACKEND_PORT", default_value_t = DEFAULT_BACKEND_PORT)]
    pub port: u16,

    /// Host used for health checks
    #[arg(long, env = "QBOX_BACKEND_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Liveness endpoint path
    #[arg(long, default_value = DEFAULT_LIVENESS_PATH)]
    pub health_path: String,

    /// Liveness timeout in milliseconds
    #[arg(long, env = "QBOX_HEALTH_TIMEOUT_MS", default_value_t = 30_000)]
    pub health_timeout_ms: u64,

    /// Liveness poll interval in milliseconds
    #[arg(long, env = "QBOX_HEALTH_POLL_MS", default_value_t = 1_000)]
    pub health_poll_ms: u64,

    /// Development mode: the backend is started externally and updates are off
    #[arg(long, env = "QBOX_DEV")]
    pub dev: bool,

    /// Disable update checks entirely
    #[arg(long, env = "QBOX_DISABLE_UPDATES")]
    pub disable_updates: bool,

    /// Hours between periodic update checks (0 or less disables them)
    #[arg(long, env = "QBOX_UPDATE_INTERVAL_HOURS", default_value_t = DEFAULT_UPDATE_INTERVAL_HOURS, allow_negative_numbers = true)]
    pub update_interval_hours: f64,

    /// Release repository as `owner/name` (takes precedence over --update-url)
    #[arg(long, env = "QBOX_UPDATE_REPOSITORY")]
    pub update_repository: Option<String>,

    /// Generic update feed base URL serving `latest.json`
    #[arg(long, env = "QBOX_UPDATE_URL")]
    pub update_url: Option<String>,

    /// Issue tracker page opened by "Report Issue"
    #[arg(long, env = "QBOX_ISSUE_URL")]
    pub issue_url: Option<String>,

    /// Application data directory (logs, lock file, downloads)
    #[arg(long, env = "QBOX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// How to launch the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Empty when nothing is configured; `start` rejects it
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub port: u16,
    /// Added on top of the inherited environment and `PORT`
    pub extra_env: Vec<(String, String)>,
}

impl BackendConfig {
    pub fn new(executable: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            port,
            extra_env: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// The PyInstaller-built backend bundled next to the supervisor binary
    pub fn bundled_executable() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        let name = if cfg!(windows) { "qbox-backend.exe" } else { "qbox-backend" };
        Some(exe.parent()?.join("resources").join(name))
    }
}

/// Two-phase health check settings
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckConfig {
    pub host: String,
    pub port: u16,
    pub liveness_path: String,
    pub liveness_timeout: Duration,
    pub poll_interval: Duration,
    pub readiness_path: String,
    pub readiness_interval: Duration,
    pub readiness_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BACKEND_PORT,
            liveness_path: DEFAULT_LIVENESS_PATH.to_string(),
            liveness_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            readiness_path: READINESS_PATH.to_string(),
            readiness_interval: READINESS_INTERVAL,
            readiness_timeout: READINESS_TIMEOUT,
            request_timeout: HEALTH_REQUEST_TIMEOUT,
        }
    }
}

impl HealthCheckConfig {
    pub fn for_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn liveness_url(&self) -> String {
        self.url_for(&self.liveness_path)
    }

    pub fn readiness_url(&self) -> String {
        self.url_for(&self.readiness_path)
    }

    fn url_for(&self, path: &str) -> String {
        let host = self.host.trim_end_matches('/');
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        format!("{base}:{}{path}", self.port)
    }
}

/// Where update metadata comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateFeed {
    /// GitHub-style release repository
    Repository { owner: String, name: String },
    /// Any server hosting `latest.json`
    Generic { url: Url },
}

impl UpdateFeed {
    /// Pick the feed: a repository identifier wins over a generic URL.
    pub fn select(repository: Option<&str>, url: Option<&str>) -> SupervisorResult<Option<Self>> {
        if let Some(repository) = repository.map(str::trim).filter(|r| !r.is_empty()) {
            let (owner, name) = repository
                .split_once('/')
                .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
                .ok_or_else(|| SupervisorError::config(format!("update repository must be owner/name, got '{repository}'")))?;
            return Ok(Some(UpdateFeed::Repository {
                owner: owner.to_string(),
                name: name.to_string(),
            }));
        }

        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            let url = Url::parse(url).map_err(|e| SupervisorError::config(format!("invalid update URL '{url}': {e}")))?;
            return Ok(Some(UpdateFeed::Generic { url }));
        }

        Ok(None)
    }
}

/// Self-update behaviour
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub enabled: bool,
    pub dev_mode: bool,
    pub current_version: semver::Version,
    pub initial_delay: Duration,
    /// `None` disables periodic checks
    pub check_interval: Option<Duration>,
    pub feed: Option<UpdateFeed>,
    pub download_dir: PathBuf,
}

impl UpdateConfig {
    pub fn new(current_version: semver::Version, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            dev_mode: false,
            current_version,
            initial_delay: INITIAL_UPDATE_DELAY,
            check_interval: Some(Duration::from_secs((DEFAULT_UPDATE_INTERVAL_HOURS * 3600.0) as u64)),
            feed: None,
            download_dir: download_dir.into(),
        }
    }

    /// Hours to a timer period. Zero, negative and NaN disable periodic
    /// checks; a period that rounds to zero or exceeds a year is rejected.
    pub fn interval_from_hours(hours: f64) -> SupervisorResult<Option<Duration>> {
        if hours.is_nan() || hours <= 0.0 {
            return Ok(None);
        }
        if hours > MAX_UPDATE_INTERVAL_HOURS {
            return Err(SupervisorError::config(format!(
                "update interval of {hours} hours exceeds {MAX_UPDATE_INTERVAL_HOURS} hours"
            )));
        }

        match Duration::try_from_secs_f64(hours * 3600.0) {
            Ok(period) if !period.is_zero() => Ok(Some(period)),
            _ => Err(SupervisorError::config(format!("update interval of {hours} hours is too short"))),
        }
    }
}

/// Complete, immutable supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub dev_mode: bool,
    pub data_dir: PathBuf,
    pub backend: BackendConfig,
    pub health: HealthCheckConfig,
    pub updates: UpdateConfig,
    pub log: LogFileConfig,
    pub lock_path: PathBuf,
    pub issue_url: Url,
    pub log_level: String,
}

impl SupervisorConfig {
    pub fn from_args(args: Args) -> SupervisorResult<Self> {
        let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);

        let executable = args
            .backend_path
            .clone()
            .or_else(BackendConfig::bundled_executable)
            .unwrap_or_default();
        let backend = BackendConfig::new(executable, args.port).with_args(args.backend_args.clone());

        if args.health_poll_ms == 0 {
            return Err(SupervisorError::config("health poll interval must be greater than zero"));
        }
        let health = HealthCheckConfig {
            host: args.host.clone(),
            port: args.port,
            liveness_path: normalize_path(&args.health_path),
            liveness_timeout: Duration::from_millis(args.health_timeout_ms),
            poll_interval: Duration::from_millis(args.health_poll_ms),
            ..HealthCheckConfig::default()
        };

        let current_version = semver::Version::parse(env!("CARGO_PKG_VERSION"))
            .map_err(|e| SupervisorError::config(format!("package version: {e}")))?;
        let feed = UpdateFeed::select(args.update_repository.as_deref(), args.update_url.as_deref())?;
        let updates = UpdateConfig {
            enabled: !args.disable_updates,
            dev_mode: args.dev,
            check_interval: UpdateConfig::interval_from_hours(args.update_interval_hours)?,
            feed: feed.clone(),
            ..UpdateConfig::new(current_version, data_dir.join("updates"))
        };

        let issue_url = match (&args.issue_url, &feed) {
            (Some(url), _) => Url::parse(url).map_err(|e| SupervisorError::config(format!("invalid issue URL '{url}': {e}")))?,
            (None, Some(UpdateFeed::Repository { owner, name })) => {
                Url::parse(&format!("https://github.com/{owner}/{name}/issues/new"))
                    .map_err(|e| SupervisorError::config(format!("issue URL: {e}")))?
            }
            (None, _) => Url::parse(DEFAULT_ISSUE_URL).map_err(|e| SupervisorError::config(format!("issue URL: {e}")))?,
        };

        Ok(Self {
            dev_mode: args.dev,
            log: LogFileConfig::new(data_dir.join("logs"), "qbox.log"),
            lock_path: data_dir.join("qbox.lock"),
            data_dir,
            backend,
            health,
            updates,
            issue_url,
            log_level: args.log_level,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log.dir
    }
}

/// Per-user application data directory, e.g. `~/.local/share/QBox`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["qbox-supervisor", "--data-dir", "/tmp/qbox-test"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_health_urls() {
        let config = HealthCheckConfig::for_port(18080);
        assert_eq!(config.liveness_url(), "http://127.0.0.1:18080/health");
        assert_eq!(config.readiness_url(), "http://127.0.0.1:18080/api/queries/");
        assert_eq!(config.readiness_timeout, Duration::from_secs(10));
        assert_eq!(config.readiness_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_feed_precedence() {
        let feed = UpdateFeed::select(Some("qbox-app/qbox"), Some("https://updates.example.com/qbox")).unwrap();
        assert_eq!(
            feed,
            Some(UpdateFeed::Repository {
                owner: "qbox-app".to_string(),
                name: "qbox".to_string()
            })
        );

        let feed = UpdateFeed::select(None, Some("https://updates.example.com/qbox")).unwrap();
        assert!(matches!(feed, Some(UpdateFeed::Generic { .. })));

        assert_eq!(UpdateFeed::select(None, None).unwrap(), None);
        assert_eq!(UpdateFeed::select(Some("  "), Some("")).unwrap(), None);
    }

    #[test]
    fn test_feed_rejects_malformed_repository() {
        assert!(UpdateFeed::select(Some("qbox"), None).is_err());
        assert!(UpdateFeed::select(Some("a/b/c"), None).is_err());
        assert!(UpdateFeed::select(None, Some("not a url")).is_err());
    }

    #[test]
    fn test_interval_from_hours() {
        assert_eq!(UpdateConfig::interval_from_hours(6.0).unwrap(), Some(Duration::from_secs(6 * 3600)));
        assert_eq!(UpdateConfig::interval_from_hours(0.5).unwrap(), Some(Duration::from_secs(1800)));
        assert_eq!(UpdateConfig::interval_from_hours(0.0).unwrap(), None);
        assert_eq!(UpdateConfig::interval_from_hours(-1.0).unwrap(), None);
        assert_eq!(UpdateConfig::interval_from_hours(f64::NAN).unwrap(), None);
        assert_eq!(UpdateConfig::interval_from_hours(f64::NEG_INFINITY).unwrap(), None);
    }

    #[test]
    fn test_unrepresentable_interval_rejected() {
        for hours in [1e300, f64::INFINITY, MAX_UPDATE_INTERVAL_HOURS + 1.0, 1e-15] {
            let result = UpdateConfig::interval_from_hours(hours);
            assert!(
                matches!(result, Err(SupervisorError::ConfigurationError { .. })),
                "{hours} hours gave {result:?}"
            );
        }
    }

    #[test]
    fn test_huge_interval_flag_is_a_config_error() {
        let result = SupervisorConfig::from_args(parse(&["--update-interval-hours", "1e300"]));
        assert!(matches!(result, Err(SupervisorError::ConfigurationError { .. })));
    }

    #[test]
    fn test_config_from_args() {
        let config = SupervisorConfig::from_args(parse(&[
            "--backend-path",
            "/opt/qbox/qbox-backend",
            "--port",
            "9100",
            "--update-interval-hours",
            "0",
            "--update-repository",
            "qbox-app/qbox",
        ]))
        .unwrap();

        assert_eq!(config.backend.executable, PathBuf::from("/opt/qbox/qbox-backend"));
        assert_eq!(config.backend.port, 9100);
        assert_eq!(config.health.port, 9100);
        assert_eq!(config.health.liveness_timeout, Duration::from_secs(30));
        assert_eq!(config.updates.check_interval, None);
        assert_eq!(config.issue_url.as_str(), "https://github.com/qbox-app/qbox/issues/new");
        assert_eq!(config.log.active_path(), PathBuf::from("/tmp/qbox-test/logs/qbox.log"));
        assert_eq!(config.lock_path, PathBuf::from("/tmp/qbox-test/qbox.lock"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = SupervisorConfig::from_args(parse(&["--health-poll-ms", "0"]));
        assert!(matches!(result, Err(SupervisorError::ConfigurationError { .. })));
    }
}

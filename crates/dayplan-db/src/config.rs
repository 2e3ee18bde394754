use std::env;
use std::path::PathBuf;

/// Database configuration.
///
/// Reads from the `DAYPLAN_DATABASE_URL` environment variable, falling back
/// to a SQLite file under the platform data directory when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full SQLite connection URL (e.g. `sqlite:///home/me/.local/share/dayplan/plans.db`).
    pub database_url: String,
}

impl DbConfig {
    /// Environment variable consulted by [`DbConfig::from_env`].
    pub const ENV_VAR: &str = "DAYPLAN_DATABASE_URL";

    /// Build a config from the environment.
    ///
    /// Priority: `DAYPLAN_DATABASE_URL` env var, then [`DbConfig::default_url`].
    pub fn from_env() -> Self {
        let database_url = env::var(Self::ENV_VAR).unwrap_or_else(|_| Self::default_url());
        Self { database_url }
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// The URL used when nothing else is configured:
    /// `<data_dir>/dayplan/plans.db`, or `./plans.db` when the platform has
    /// no data directory.
    pub fn default_url() -> String {
        let path = dirs::data_dir()
            .map(|d| d.join("dayplan").join("plans.db"))
            .unwrap_or_else(|| PathBuf::from("plans.db"));
        format!("sqlite://{}", path.display())
    }

    /// Filesystem path of the database file.
    ///
    /// Returns `None` for in-memory databases or URLs without a path.
    pub fn database_path(&self) -> Option<PathBuf> {
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        // Drop any `?mode=rwc`-style query string.
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

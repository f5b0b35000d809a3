//! Configuration loading for the Ouvidoria dashboard.
//!
//! Top-level fields are required. Page entries default their presentation
//! options.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "OUVIDORIA_DASHBOARD_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// Lifetime of cached aggregates unless a page overrides it.
    pub default_ttl_ms: u64,
    /// Quiet period before a page reloads after a filter change.
    pub debounce_ms: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Containers the console renderer draws. All page containers when absent.
    #[serde(default)]
    pub visible_containers: Option<Vec<String>>,
    #[serde(default)]
    pub pages: Vec<PageConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// Bar chart over a count-by aggregation.
    #[default]
    Chart,
    /// Scalar summary counters.
    Stats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageConfig {
    pub id: String,
    pub container: String,
    pub endpoint: String,
    /// Grouping dimension for chart pages. Sent as `field` and excluded from
    /// the filters applied to this chart.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub kind: PageKind,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub use_data_store: bool,
    #[serde(default)]
    pub horizontal: bool,
    #[serde(default)]
    pub color_index: usize,
    #[serde(default)]
    pub legend_container: Option<String>,
    /// Endpoint path prefixes dropped from the cache before each
    /// filter-triggered reload.
    #[serde(default)]
    pub invalidate_on_filter: Vec<String>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or OUVIDORIA_DASHBOARD_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

impl DashboardConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: DashboardConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.default_ttl_ms == 0 {
            return Err(invalid("default_ttl_ms", "must be > 0"));
        }
        if self.debounce_ms == 0 {
            return Err(invalid("debounce_ms", "must be > 0"));
        }

        let mut seen = HashSet::new();
        for page in &self.pages {
            if page.id.trim().is_empty() {
                return Err(invalid("pages.id", "must not be empty"));
            }
            if !seen.insert(page.id.as_str()) {
                return Err(invalid("pages.id", format!("duplicate page id '{}'", page.id)));
            }
            if page.container.trim().is_empty() {
                return Err(invalid(
                    "pages.container",
                    format!("page '{}' has an empty container", page.id),
                ));
            }
            if !page.endpoint.starts_with('/') {
                return Err(invalid(
                    "pages.endpoint",
                    format!("page '{}' endpoint must start with '/'", page.id),
                ));
            }
            if page.kind == PageKind::Stats && page.field.is_some() {
                return Err(invalid(
                    "pages.field",
                    format!("stats page '{}' is not grouped by a field", page.id),
                ));
            }
            if page.ttl_ms == Some(0) {
                return Err(invalid(
                    "pages.ttl_ms",
                    format!("page '{}' ttl must be > 0", page.id),
                ));
            }
            if page.debounce_ms == Some(0) {
                return Err(invalid(
                    "pages.debounce_ms",
                    format!("page '{}' debounce must be > 0", page.id),
                ));
            }
            if let Some(prefix) = page
                .invalidate_on_filter
                .iter()
                .find(|prefix| !prefix.starts_with('/'))
            {
                return Err(invalid(
                    "pages.invalidate_on_filter",
                    format!("page '{}' prefix '{}' must start with '/'", page.id, prefix),
                ));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Time-to-live for `page`'s cached data.
    pub fn page_ttl(&self, page: &PageConfig) -> Duration {
        page.ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.default_ttl())
    }

    /// Debounce window for `page`'s filter listener.
    pub fn page_debounce(&self, page: &PageConfig) -> Duration {
        page.debounce_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.debounce())
    }

    /// Containers the console renderer should draw.
    pub fn visible_container_ids(&self) -> Vec<String> {
        match &self.visible_containers {
            Some(containers) => containers.clone(),
            None => self.pages.iter().map(|p| p.container.clone()).collect(),
        }
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
api_base_url = "http://localhost:3000"
request_timeout_ms = 5000
default_ttl_ms = 600000
debounce_ms = 500

[[pages]]
id = "canal"
container = "chartCanal"
endpoint = "/api/aggregate/count-by"
field = "Canal"
horizontal = true

[[pages]]
id = "zeladoria-stats"
container = "zeladoriaStats"
endpoint = "/api/zeladoria/stats"
kind = "stats"
ttl_ms = 60000
use_data_store = false
"#;

    #[test]
    fn test_parse_sample() {
        let config = DashboardConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.pages.len(), 2);

        let canal = &config.pages[0];
        assert_eq!(canal.kind, PageKind::Chart);
        assert!(canal.use_data_store);
        assert!(canal.horizontal);
        assert_eq!(config.page_ttl(canal), Duration::from_secs(600));
        assert_eq!(config.page_debounce(canal), Duration::from_millis(500));

        let stats = &config.pages[1];
        assert_eq!(stats.kind, PageKind::Stats);
        assert!(!stats.use_data_store);
        assert_eq!(config.page_ttl(stats), Duration::from_secs(60));

        assert_eq!(
            config.visible_container_ids(),
            vec!["chartCanal".to_string(), "zeladoriaStats".to_string()]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let contents = format!("{}\nrefresh_interval_ms = 10\n", SAMPLE.trim_end());
        // The extra key lands in the last [[pages]] table.
        assert!(matches!(
            DashboardConfig::from_toml_str(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = DashboardConfig::from_path(file.path()).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:3000");
    }

    #[test]
    fn test_duplicate_page_ids_rejected() {
        let mut config = DashboardConfig::from_toml_str(SAMPLE).unwrap();
        let duplicate = config.pages[0].clone();
        config.pages.push(duplicate);

        match config.validate() {
            Err(ConfigError::InvalidValue { field, reason }) => {
                assert_eq!(field, "pages.id");
                assert!(reason.contains("canal"));
            }
            other => panic!("expected duplicate id error, got {:?}", other),
        }
    }

    #[test]
    fn test_stats_page_with_field_rejected() {
        let mut config = DashboardConfig::from_toml_str(SAMPLE).unwrap();
        config.pages[1].field = Some("Tipo".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "pages.field", .. })
        ));
    }
}

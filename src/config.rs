use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;

fn default_regional_center() -> String {
    "SGPRC".to_string()
}

/// Known regional-center portals. Each center runs the same application on
/// its own port.
fn default_portals() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "SGPRC".to_string(),
            "https://ebilling.dds.ca.gov:8379".to_string(),
        ),
        (
            "ELARC".to_string(),
            "https://ebilling.dds.ca.gov:8373".to_string(),
        ),
    ])
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36".to_string()
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(2)
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,

    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry policy for transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts of a full sequence, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each failure.
    #[serde(
        default = "default_initial_backoff",
        deserialize_with = "deserialize_duration"
    )]
    pub initial_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: default_initial_backoff(),
        }
    }
}

/// Portal paths, relative to the base URL.
///
/// Rendering and persisting the calendar are different endpoints. The
/// persist path is configured here rather than taken from the rendered form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub select_provider: String,
    pub invoice_search: String,
    /// Used when the invoice row carries no edit link.
    pub invoice_view: String,
    pub invoice_lines: String,
    pub calendar_render: String,
    pub calendar_persist: String,
    /// Responses landing here mean the session is gone.
    pub login: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            select_provider: "/portal/selectprovider".to_string(),
            invoice_search: "/invoices/invoicesearch".to_string(),
            invoice_view: "/invoices/invoiceview".to_string(),
            invoice_lines: "/invoices/invoicelines".to_string(),
            calendar_render: "/invoices/unitcalendar".to_string(),
            calendar_persist: "/invoices/unitcalendar/update".to_string(),
            login: "/login".to_string(),
        }
    }
}

/// Names and patterns describing the unit calendar page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Regex a day input's name must match. The first capture group, if
    /// any, is the calendar row.
    pub day_field_pattern: String,

    /// Regex for per-row running-sum fields. The first capture group is the
    /// calendar row being summed.
    pub week_total_pattern: String,

    pub total_units_field: String,
    pub gross_amount_field: String,
    pub net_amount_field: String,

    /// Hidden field naming the line a calendar belongs to.
    pub line_id_field: String,

    /// Script variables holding the billing constants.
    pub unit_rate_var: String,
    pub total_units_var: String,
    pub gross_amount_var: String,
    pub net_amount_var: String,
    pub month_var: String,
    pub year_var: String,

    /// Hidden field names seen so far. When non-empty, any other hidden
    /// field is logged as newly observed.
    pub known_fields: Vec<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            day_field_pattern: r"^dayUnits_r(\d+)c(\d+)$".to_string(),
            week_total_pattern: r"^weekUnits_r(\d+)$".to_string(),
            total_units_field: "totalUnits".to_string(),
            gross_amount_field: "grossAmount".to_string(),
            net_amount_field: "netAmount".to_string(),
            line_id_field: "lineId".to_string(),
            unit_rate_var: "unitRate".to_string(),
            total_units_var: "totalUnits".to_string(),
            gross_amount_var: "grossAmount".to_string(),
            net_amount_var: "netAmount".to_string(),
            month_var: "calendarMonth".to_string(),
            year_var: "calendarYear".to_string(),
            known_fields: Vec::new(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Regional center whose portal is used when `base_url` is unset.
    #[serde(default = "default_regional_center")]
    pub regional_center: String,

    /// Regional center -> portal base URL.
    #[serde(default = "default_portals")]
    pub portals: BTreeMap<String, String>,

    /// Explicit portal base URL; overrides `regional_center`.
    pub base_url: Option<String>,

    /// Where captured sessions are cached. Relative paths resolve from the
    /// config file's directory.
    pub session_dir: Option<PathBuf>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            regional_center: default_regional_center(),
            portals: default_portals(),
            base_url: None,
            session_dir: None,
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            endpoints: EndpointConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// The portal base URL: `base_url` if set, otherwise the regional
    /// center's entry in `portals`.
    pub fn portal_url(&self) -> Result<Url> {
        let raw = match &self.base_url {
            Some(url) => url.as_str(),
            None => self
                .portals
                .get(&self.regional_center)
                .map(String::as_str)
                .with_context(|| {
                    format!("No portal configured for regional center {}", self.regional_center)
                })?,
        };
        Url::parse(raw).with_context(|| format!("Invalid portal URL: {raw}"))
    }

    /// Resolve the session cache directory.
    ///
    /// Relative paths are resolved from `config_dir`. Unset falls back to
    /// `~/.cache/ebilling/sessions`.
    pub fn resolve_session_dir(&self, config_dir: &Path) -> Result<PathBuf> {
        match &self.session_dir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            Some(dir) => Ok(config_dir.join(dir)),
            None => Ok(dirs::cache_dir()
                .context("Could not find cache directory")?
                .join("ebilling")
                .join("sessions")),
        }
    }
}

/// Loaded configuration with resolved paths and URLs.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: Url,
    pub session_dir: PathBuf,
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub endpoints: EndpointConfig,
    pub calendar: CalendarConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./ebilling.toml` if it exists in current directory
/// 2. `~/.config/ebilling/ebilling.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("ebilling.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ebilling").join("ebilling.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Resolve an in-memory config, treating `config_dir` as its location.
    pub fn resolve(config: Config, config_dir: &Path) -> Result<Self> {
        let base_url = config.portal_url()?;
        let session_dir = config.resolve_session_dir(config_dir)?;
        Ok(Self {
            base_url,
            session_dir,
            http: config.http,
            retry: config.retry,
            endpoints: config.endpoints,
            calendar: config.calendar,
        })
    }

    /// Load config, using defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        let config = Config::load_or_default(&config_path)?;
        Self::resolve(config, config_dir)
    }

    /// Defaults pointed at an arbitrary portal, for tests and tooling.
    pub fn for_base_url(base_url: &str, session_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = Config {
            base_url: Some(base_url.to_string()),
            session_dir: Some(session_dir.into()),
            ..Config::default()
        };
        Self::resolve(config, Path::new("/"))
    }
}

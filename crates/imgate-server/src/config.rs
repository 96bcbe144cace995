use imgate_auth::{AuthorizationBackendConfig, DiscoveryConfig};
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Outbound HTTP client settings shared by every upstream call
    #[serde(default)]
    pub http: HttpClientConfig,
    /// SMART discovery cache behaviour
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Authorization backend (required)
    #[serde(default)]
    pub authorization: Option<AuthorizationBackendConfig>,
    /// DICOMweb archive the gateway fronts
    #[serde(default)]
    pub imaging: ImagingConfig,
    #[serde(default)]
    pub development: DevelopmentConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.http.request_timeout.is_zero() || self.http.connect_timeout.is_zero() {
            return Err("http timeouts must be > 0".into());
        }

        let authorization = self
            .authorization
            .as_ref()
            .ok_or_else(|| "authorization section is required".to_string())?;
        authorization
            .validate()
            .map_err(|e| format!("authorization config error: {e}"))?;
        if authorization.is_mock() && !self.development.allow_mock_authorization {
            return Err(
                "authorization.type = \"mock\" requires development.allow_mock_authorization = true"
                    .into(),
            );
        }

        if self.imaging.endpoint.trim().is_empty() {
            return Err("imaging.endpoint is required".into());
        }
        url::Url::parse(&self.imaging.endpoint)
            .map_err(|e| format!("imaging.endpoint is not a valid URL: {e}"))?;
        if let Some(wado_base) = &self.imaging.wado_base {
            url::Url::parse(wado_base)
                .map_err(|e| format!("imaging.wado_base is not a valid URL: {e}"))?;
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Returns the base URL for the server.
    /// If `base_url` is configured, returns that; otherwise computes from host:port.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }

    /// Public base of the WADO-RS proxy; capability tokens are appended to it.
    pub fn wado_base(&self) -> String {
        self.imaging
            .wado_base
            .clone()
            .unwrap_or_else(|| format!("{}/wado", self.base_url().trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL, used in WADO endpoint addresses.
    /// If not set, defaults to http://{host}:{port}
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Total time allowed for one outbound request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// How studies are looked up for an authorized patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LookupMode {
    /// Query `PatientID=<MRN>` using the patient's medical record number
    #[default]
    StudiesByMrn,
    /// Return every study on the archive (demo archives only)
    AllStudiesOnServer,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImagingConfig {
    #[serde(default)]
    pub lookup: LookupMode,
    /// DICOMweb base URL of the archive (QIDO and WADO hang off `/studies`)
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub authentication: Option<ArchiveAuthentication>,
    /// Public base for proxy URLs. Defaults to `{server.base_url}/wado`.
    #[serde(default)]
    pub wado_base: Option<String>,
}

/// Service credentials the gateway uses against the archive.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArchiveAuthentication {
    HttpBasic {
        username: String,
        #[serde(skip_serializing)]
        password: String,
    },
}

impl fmt::Debug for ArchiveAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpBasic { username, .. } => f
                .debug_struct("HttpBasic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevelopmentConfig {
    /// Permit the mock authorization engine. Never enable in production.
    #[serde(default)]
    pub allow_mock_authorization: bool,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_PATH: &str = "imgate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "Config file not found; using environment only");
        }
        // Environment variable overrides, e.g., IMGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("IMGATE")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

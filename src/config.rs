use std::fmt;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "AZURE_CLIENT_SECRET";
pub const BASE_URL_VAR: &str = "VM_API_BASE_URL";
pub const BIND_ADDR_VAR: &str = "API_BIND_ADDR";

// Placeholders used by the lenient constructors. None of them can ever
// authenticate against a real tenant.
pub const TENANT_ID_PLACEHOLDER: &str = "{TenantID}";
pub const CLIENT_ID_PLACEHOLDER: &str = "{ClientID}";
pub const CLIENT_SECRET_PLACEHOLDER: &str = "{ClientSecret}";

pub const DEFAULT_BASE_URL: &str = "https://your-vm.example.com";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8888";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while building configuration from the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Reads a variable from the process environment, treating blank values as unset.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

/// Service principal credentials for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Builds credentials from `lookup`, failing on the first missing variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            tenant_id: required(&lookup, TENANT_ID_VAR)?,
            client_id: required(&lookup, CLIENT_ID_VAR)?,
            client_secret: required(&lookup, CLIENT_SECRET_VAR)?,
        })
    }

    /// Builds credentials from `lookup`, substituting placeholders for anything missing.
    ///
    /// The result is always constructible, but a token request made with a
    /// placeholder fails with [`crate::Error::Authentication`].
    pub fn from_lookup_or_placeholders<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            tenant_id: lookup(TENANT_ID_VAR).unwrap_or_else(|| TENANT_ID_PLACEHOLDER.into()),
            client_id: lookup(CLIENT_ID_VAR).unwrap_or_else(|| CLIENT_ID_PLACEHOLDER.into()),
            client_secret: lookup(CLIENT_SECRET_VAR)
                .unwrap_or_else(|| CLIENT_SECRET_PLACEHOLDER.into()),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_env_or_placeholders() -> Self {
        Self::from_lookup_or_placeholders(env_lookup)
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// The scope requesting every application permission pre-consented on
    /// `client_id`. Client-credentials cannot ask for anything narrower.
    pub fn default_scope(&self) -> String {
        format!("{}/.default", self.client_id)
    }

    pub fn authority(&self) -> String {
        format!("https://login.microsoftonline.com/{}", self.tenant_id)
    }
}

/// Everything the API caller needs: who to authenticate as and where to send requests.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(credentials: Credentials, base_url: impl Into<String>) -> Self {
        Self {
            credentials,
            base_url: base_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials::from_lookup(&lookup)?;
        let base_url = lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.into());
        validate_base_url(&base_url)?;
        Ok(Self::new(credentials, base_url))
    }

    pub fn from_lookup_or_placeholders<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials::from_lookup_or_placeholders(&lookup);
        let base_url = lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Self::new(credentials, base_url)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_env_or_placeholders() -> Self {
        Self::from_lookup_or_placeholders(env_lookup)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: BASE_URL_VAR,
        reason,
    };
    let url = Url::parse(base_url).map_err(|e| invalid(format!("{base_url:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("expected an http(s) URL, got {base_url:?}")));
    }
    if url.host_str().is_none() {
        return Err(invalid(format!("{base_url:?} has no host")));
    }
    Ok(())
}

/// Settings for the demo API server.
///
/// Token validation is only switched on when both the tenant and the client
/// id are known; without them the server answers every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            tenant_id: lookup(TENANT_ID_VAR),
            client_id: lookup(CLIENT_ID_VAR),
            bind_addr: lookup(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn auth_enabled(&self) -> bool {
        self.tenant_id.is_some() && self.client_id.is_some()
    }
}

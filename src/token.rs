use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::ClientSecretCredential;
use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::{Mutex, OnceCell};

use crate::config::Credentials;
use crate::error::{Error, Result};

/// Tokens this close to expiry are treated as already expired.
pub const EXPIRY_SKEW_SECS: i64 = 300;

/// Anything able to hand out a bearer token for the downstream API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get_access_token(&self) -> Result<String>;
}

/// A token issued by the identity provider.
#[derive(Clone)]
pub struct CachedToken {
    secret: String,
    expires_on: i64,
    scope: String,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("expires_on", &self.expires_on)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl CachedToken {
    pub fn new(secret: impl Into<String>, expires_on: i64, scope: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_on,
            scope: scope.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Unix timestamp (seconds) at which the identity provider stops honouring the token.
    pub fn expires_on(&self) -> i64 {
        self.expires_on
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_on - EXPIRY_SKEW_SECS > now
    }
}

/// What the provider currently holds for its scope.
#[derive(Debug, Clone, Default)]
pub enum TokenState {
    #[default]
    Absent,
    Valid(CachedToken),
}

impl TokenState {
    /// Returns the cached token if it is still usable at `now`.
    pub fn lookup(&self, now: i64) -> Option<&CachedToken> {
        match self {
            TokenState::Valid(token) if token.is_valid_at(now) => Some(token),
            _ => None,
        }
    }
}

/// Client-credentials token provider for an Entra ID tenant.
///
/// Tokens are requested for `{client_id}/.default` and cached on the instance,
/// so two calls on the same provider share a token until it nears expiry.
/// A fresh instance always starts [`TokenState::Absent`].
pub struct EntraIdTokenProvider {
    credentials: Option<Credentials>,
    scope: String,
    credential: OnceCell<Arc<dyn TokenCredential>>,
    state: Mutex<TokenState>,
}

impl fmt::Debug for EntraIdTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntraIdTokenProvider")
            .field("credentials", &self.credentials)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl EntraIdTokenProvider {
    /// The `ClientSecretCredential` is built on the first token request, so a
    /// provider made from unusable credentials only fails once it is asked
    /// for a token.
    pub fn new(credentials: Credentials) -> Self {
        let scope = credentials.default_scope();
        Self {
            credentials: Some(credentials),
            scope,
            credential: OnceCell::new(),
            state: Mutex::new(TokenState::Absent),
        }
    }

    /// Uses an already-built credential for `scope`.
    pub fn with_credential(scope: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credentials: None,
            scope: scope.into(),
            credential: OnceCell::new_with(Some(credential)),
            state: Mutex::new(TokenState::Absent),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn state(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    async fn credential(&self) -> Result<&Arc<dyn TokenCredential>> {
        self.credential
            .get_or_try_init(|| async {
                let credentials = self
                    .credentials
                    .as_ref()
                    .ok_or_else(|| Error::Authentication("no credential configured".into()))?;
                debug!("Creating credential for authority {}", credentials.authority());

                let credential: Arc<dyn TokenCredential> = ClientSecretCredential::new(
                    &credentials.tenant_id,
                    credentials.client_id.clone(),
                    Secret::new(credentials.client_secret().to_owned()),
                    None,
                )
                .map_err(|e| Error::Authentication(e.to_string()))?;
                Ok(credential)
            })
            .await
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let credential = self.credential().await?;
        let token = credential
            .get_token(&[self.scope.as_str()], None)
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;

        Ok(CachedToken::new(
            token.token.secret(),
            token.expires_on.unix_timestamp(),
            self.scope.clone(),
        ))
    }
}

#[async_trait]
impl TokenSource for EntraIdTokenProvider {
    async fn get_access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.lookup(Utc::now().timestamp()) {
            debug!("Using cached token for {}", self.scope);
            return Ok(token.secret().to_owned());
        }

        info!("No cached token for {}, requesting a new one", self.scope);
        let token = match self.fetch().await {
            Ok(token) => token,
            Err(err) => {
                error!("Token request failed: {}", err);
                return Err(err);
            }
        };

        info!("Acquired access token (expires_on={})", token.expires_on());
        let secret = token.secret().to_owned();
        *state = TokenState::Valid(token);
        Ok(secret)
    }
}

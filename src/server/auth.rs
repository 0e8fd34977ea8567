use std::collections::HashMap;
use std::time::{Duration, Instant};

use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::ServerConfig;

/// How long a fetched key set is trusted before it is downloaded again.
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Represents the claims the API checks on an Entra ID access token.
///
/// # Fields
///
/// * `aud` - The audience. Must be (or contain) the API's client id.
/// * `iss` - The issuer. Must be the tenant's v1 or v2 endpoint.
/// * `sub` - The subject (service principal or managed identity).
/// * `exp` - Expiration time, enforced by `jsonwebtoken`.
/// * `roles` - Application roles granted to the caller, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub aud: Audience,
    pub iss: String,
    pub sub: Option<String>,
    pub exp: usize,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header missing or invalid")]
    MissingToken,

    #[error("Token validation failed: Invalid token format")]
    InvalidFormat,

    #[error("Token validation failed: Unknown key ID")]
    UnknownKey,

    #[error("Token validation failed: Invalid issuer")]
    InvalidIssuer,

    #[error("Token validation failed: Invalid audience")]
    InvalidAudience,

    #[error("Token validation failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Token validation failed: Failed to fetch JWKS ({0})")]
    Jwks(String),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized()
            .insert_header((header::WWW_AUTHENTICATE, r#"Bearer realm="Entra ID""#))
            .json(json!({
                "success": false,
                "error": "Unauthorized",
                "message": self.to_string(),
            }))
    }
}

/// Who made the request.
#[derive(Debug)]
pub enum Principal {
    AuthDisabled,
    Token(Claims),
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl KeySet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

#[derive(Debug, Clone)]
struct Tenant {
    tenant_id: String,
    client_id: String,
    jwks_url: String,
}

/// Validates Entra ID bearer tokens presented to the API.
pub struct EntraIdAuth {
    tenant: Option<Tenant>,
    http: Client,
    jwks: RwLock<Option<KeySet>>,
    jwks_ttl: Duration,
}

impl EntraIdAuth {
    pub fn new(config: &ServerConfig) -> Self {
        let tenant = match (&config.tenant_id, &config.client_id) {
            (Some(tenant_id), Some(client_id)) => Some(Tenant {
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                jwks_url: format!(
                    "https://login.microsoftonline.com/{}/discovery/v2.0/keys",
                    tenant_id
                ),
            }),
            _ => None,
        };

        Self {
            tenant,
            http: Client::new(),
            jwks: RwLock::new(None),
            jwks_ttl: JWKS_CACHE_TTL,
        }
    }

    /// Fetches signing keys from `jwks_url` instead of the tenant's discovery endpoint.
    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        if let Some(tenant) = self.tenant.as_mut() {
            tenant.jwks_url = jwks_url.into();
        }
        self
    }

    pub fn with_jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.tenant.is_some()
    }

    /// Checks the request's bearer token, or lets it through when auth is disabled.
    pub async fn authenticate(&self, req: &HttpRequest) -> Result<Principal, AuthError> {
        let Some(tenant) = &self.tenant else {
            return Ok(Principal::AuthDisabled);
        };

        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or(AuthError::MissingToken)?;

        match self.validate_token(tenant, token).await {
            Ok(claims) => {
                debug!("Authenticated subject {:?}", claims.sub);
                Ok(Principal::Token(claims))
            }
            Err(err) => {
                warn!("Rejecting request: {}", err);
                Err(err)
            }
        }
    }

    async fn validate_token(&self, tenant: &Tenant, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidFormat)?;
        let kid = header.kid.ok_or(AuthError::UnknownKey)?;
        let key = self.decoding_key(tenant, &kid).await?;

        // Audience and issuer are checked by `check_claims`, which accepts both
        // token versions Entra ID issues.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        let data = decode::<Claims>(token, &key, &validation)?;

        check_claims(&data.claims, &tenant.tenant_id, &tenant.client_id)?;
        Ok(data.claims)
    }

    async fn decoding_key(&self, tenant: &Tenant, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.jwks.read().await;
            if let Some(set) = cache.as_ref().filter(|set| set.is_fresh(self.jwks_ttl)) {
                return set.keys.get(kid).cloned().ok_or(AuthError::UnknownKey);
            }
        }

        let mut cache = self.jwks.write().await;
        if !cache.as_ref().is_some_and(|set| set.is_fresh(self.jwks_ttl)) {
            debug!("Fetching JWKS from {}", tenant.jwks_url);
            *cache = Some(KeySet {
                keys: self.fetch_jwks(&tenant.jwks_url).await?,
                fetched_at: Instant::now(),
            });
        }

        cache
            .as_ref()
            .and_then(|set| set.keys.get(kid).cloned())
            .ok_or(AuthError::UnknownKey)
    }

    async fn fetch_jwks(&self, jwks_url: &str) -> Result<HashMap<String, DecodingKey>, AuthError> {
        let jwks: JwkSet = self
            .http
            .get(jwks_url)
            .timeout(JWKS_FETCH_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AuthError::Jwks(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::Jwks(e.to_string()))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            match (jwk.kid, jwk.n, jwk.e) {
                (Some(kid), Some(n), Some(e)) if jwk.kty == "RSA" => {
                    match DecodingKey::from_rsa_components(&n, &e) {
                        Ok(key) => {
                            keys.insert(kid, key);
                        }
                        Err(err) => error!("Skipping JWK {}: {}", kid, err),
                    }
                }
                _ => debug!("Skipping non-RSA JWK"),
            }
        }

        if keys.is_empty() {
            return Err(AuthError::Jwks("no usable signing keys".into()));
        }
        debug!("Loaded {} signing keys", keys.len());
        Ok(keys)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(char::is_whitespace)?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Issuers Entra ID uses for v2.0 and v1.0 access tokens respectively.
pub fn expected_issuers(tenant_id: &str) -> [String; 2] {
    [
        format!("https://login.microsoftonline.com/{tenant_id}/v2.0"),
        format!("https://sts.windows.net/{tenant_id}/"),
    ]
}

pub fn check_claims(claims: &Claims, tenant_id: &str, client_id: &str) -> Result<(), AuthError> {
    if !expected_issuers(tenant_id).contains(&claims.iss) {
        return Err(AuthError::InvalidIssuer);
    }
    if !claims.aud.contains(client_id) {
        return Err(AuthError::InvalidAudience);
    }
    Ok(())
}

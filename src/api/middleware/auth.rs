//! Authentication middleware.
//!
//! Verifies `Authorization: Bearer <JWT>` against the identity provider's
//! JWKS. Signing keys are fetched once at startup and cached by `kid`; an
//! unknown `kid` triggers a single refetch so key rotation does not require
//! a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, Result};

/// Extension that holds the authenticated user extracted from the token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Stable subject UUID (`sub`)
    pub id: Uuid,
    /// `preferred_username`
    pub username: String,
    /// `email`
    pub email: String,
    /// Authorized party (`azp`) - the client the token was issued to
    pub authorized_party: String,
    /// Realm roles
    pub roles: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

/// Claims the gateway cares about. Standard validation (exp, signature,
/// issuer) happens in `jsonwebtoken`.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    preferred_username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    azp: String,
    #[serde(default)]
    realm_access: RealmAccess,
}

impl TryFrom<Claims> for AuthUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self> {
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Token subject is not a valid UUID".into()))?;
        Ok(Self {
            id,
            username: claims.preferred_username,
            email: claims.email,
            authorized_party: claims.azp,
            roles: claims.realm_access.roles,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: String,
    #[serde(default)]
    kty: String,
    #[serde(rename = "use", default)]
    usage: Option<String>,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

/// Token verifier bound to one issuer realm.
pub struct Authenticator {
    issuer: String,
    jwks_url: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl Authenticator {
    /// Connect to the issuer and prime the signing-key cache.
    pub async fn connect(config: &AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let authenticator = Self {
            issuer: config.issuer(),
            jwks_url: config.jwks_url(),
            http,
            keys: RwLock::new(HashMap::new()),
        };
        authenticator.refresh_keys().await?;
        Ok(authenticator)
    }

    /// Fetch the realm JWKS and replace the cached key set.
    async fn refresh_keys(&self) -> Result<()> {
        let jwks: Jwks = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AppError::Config(format!("Failed to fetch JWKS: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Config(format!("Failed to parse JWKS: {}", e)))?;

        let mut fresh = HashMap::new();
        for key in jwks.keys {
            if key.kty != "RSA" || key.usage.as_deref() == Some("enc") {
                continue;
            }
            match DecodingKey::from_rsa_components(&key.n, &key.e) {
                Ok(decoding_key) => {
                    fresh.insert(key.kid.clone(), decoding_key);
                }
                Err(e) => {
                    tracing::warn!(kid = %key.kid, error = %e, "Skipping unusable JWKS key");
                }
            }
        }

        if fresh.is_empty() {
            return Err(AppError::Config("JWKS contained no usable keys".into()));
        }

        tracing::debug!(count = fresh.len(), "Loaded JWKS signing keys");
        *self.keys.write().await = fresh;
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Verify signature, expiry and issuer, then map claims to an AuthUser.
    pub async fn verify(&self, token: &str) -> Result<AuthUser> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::Unauthorized("Token has no key id".into()))?;

        let key = match self.key_for(&kid).await {
            Some(key) => key,
            None => {
                // Unknown kid: the realm may have rotated keys since startup.
                self.refresh_keys().await?;
                self.key_for(&kid)
                    .await
                    .ok_or_else(|| AppError::Unauthorized("Token signed by unknown key".into()))?
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &key, &validation)?;
        AuthUser::try_from(data.claims)
    }
}

/// Pull the bearer token out of the Authorization header.
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Authentication middleware - requires a valid bearer token.
pub async fn auth_middleware(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&request) {
        Some(token) => token.to_owned(),
        None => {
            return AppError::Unauthorized("Missing or malformed Authorization header".into())
                .into_response()
        }
    };

    match auth.verify(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Token verification failed");
            AppError::Unauthorized("Invalid or expired token".into()).into_response()
        }
    }
}

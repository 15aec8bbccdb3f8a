use std::collections::{hash_map::Entry, HashMap};
use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::claims::{Claims, TokenKind},
    auth::dto::TokenPair,
    config::JwtConfig,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Invalid or expired token")]
    Malformed,
    #[error("Refresh token required")]
    WrongKind,
    #[error("Token has been revoked")]
    Revoked,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub remember_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            access_ttl_minutes,
            refresh_ttl_minutes,
            remember_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
            remember_ttl: Duration::from_secs((remember_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access, self.access_ttl)
    }
    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh, self.refresh_ttl)
    }

    /// Issues the access/refresh pair returned by login, verification and
    /// refresh. `remember` stretches the refresh lifetime.
    pub fn sign_pair(&self, user_id: Uuid, remember: bool) -> anyhow::Result<TokenPair> {
        let refresh_ttl = if remember {
            self.remember_ttl
        } else {
            self.refresh_ttl
        };
        let access_token = self.sign_with_kind(user_id, TokenKind::Access, self.access_ttl)?;
        let refresh_token = self.sign_with_kind(user_id, TokenKind::Refresh, refresh_ttl)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.as_secs() as i64,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        })?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }

    /// Consumes a refresh token: verifies it, rejects anything below the
    /// user's revocation floor, then burns the jti. A jti seen twice means
    /// the token leaked, so the whole session family is revoked.
    pub async fn rotate_refresh(
        &self,
        revoked: &RevocationList,
        token: &str,
    ) -> Result<Claims, TokenError> {
        let claims = self.verify_refresh(token)?;
        if revoked.is_floored(claims.sub, claims.iat as i64).await {
            return Err(TokenError::Revoked);
        }
        if !revoked.revoke_once(claims.jti, claims.exp as i64).await {
            warn!(user_id = %claims.sub, jti = %claims.jti, "refresh token replayed, revoking all sessions");
            revoked.revoke_all_for(claims.sub).await;
            return Err(TokenError::Revoked);
        }
        debug!(user_id = %claims.sub, jti = %claims.jti, "refresh token rotated");
        Ok(claims)
    }
}

#[derive(Default)]
struct RevocationInner {
    // jti -> exp; entries drop out once the token would have expired anyway
    revoked: HashMap<Uuid, i64>,
    // user -> instant; refresh tokens issued at or before it are dead
    floors: HashMap<Uuid, i64>,
}

impl RevocationInner {
    // Sheds entries nothing still verifiable can hit: burned jtis past
    // their exp, floors older than the longest refresh lifetime.
    fn purge(&mut self, now: i64, floor_ttl: i64) {
        self.revoked.retain(|_, exp| *exp > now);
        self.floors.retain(|_, floor| *floor + floor_ttl > now);
    }
}

/// In-process revocation state for refresh tokens. Tokens are stateless,
/// so this list is what makes logout and rotation actually stick. Every
/// write sheds entries that have outlived everything they could block.
pub struct RevocationList {
    floor_ttl: i64,
    inner: RwLock<RevocationInner>,
}

impl RevocationList {
    /// `horizon` is the longest refresh lifetime being issued. Floors
    /// older than that plus the decoder leeway cannot block a token that
    /// still verifies, so they get dropped on the next write.
    pub fn new(horizon: Duration) -> Self {
        Self {
            floor_ttl: horizon.as_secs() as i64 + Validation::default().leeway as i64,
            inner: RwLock::new(RevocationInner::default()),
        }
    }

    /// Burns a jti. Returns false when it was already burned, which is how
    /// replay of a rotated token gets detected.
    pub async fn revoke_once(&self, jti: Uuid, exp: i64) -> bool {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut inner = self.inner.write().await;
        inner.purge(now, self.floor_ttl);
        match inner.revoked.entry(jti) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(exp);
                true
            }
        }
    }

    /// Floors the user: every refresh token issued up to now is invalid.
    pub async fn revoke_all_for(&self, user_id: Uuid) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut inner = self.inner.write().await;
        inner.purge(now, self.floor_ttl);
        inner.floors.insert(user_id, now);
        debug!(user_id = %user_id, "all refresh tokens revoked");
    }

    pub async fn is_floored(&self, user_id: Uuid, iat: i64) -> bool {
        let inner = self.inner.read().await;
        inner.floors.get(&user_id).is_some_and(|floor| iat <= *floor)
    }

    /// Test hook: plants a floor at an arbitrary instant, bypassing the
    /// purge a real write would run.
    #[cfg(test)]
    async fn seed_floor(&self, user_id: Uuid, floor: i64) {
        self.inner.write().await.floors.insert(user_id, floor);
    }

    #[cfg(test)]
    async fn floor_count(&self) -> usize {
        self.inner.read().await.floors.len()
    }
}

pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid Authorization header"))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                return Err(ApiError::Token(e));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err(ApiError::Unauthorized("Access token required"));
        }

        Ok(AuthUser(claims.sub))
    }
}

use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        let minutes = |m: i64| Duration::from_secs(u64::try_from(m).unwrap_or(0) * 60);
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: minutes(cfg.ttl_minutes),
            refresh_ttl: minutes(cfg.refresh_ttl_minutes),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn sign(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%user_id, ?kind, "jwt signed");
        Ok(token)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(user_id, TokenKind::Access)?,
            refresh_token: self.sign(user_id, TokenKind::Refresh)?,
        })
    }

    /// Validates signature, expiry, issuer, audience and token kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.kind != expected {
            anyhow::bail!("expected a {:?} token", expected);
        }
        Ok(claims)
    }
}

pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing bearer token".to_string(),
            ))?;

        match JwtKeys::from_ref(state).verify(token, TokenKind::Access) {
            Ok(claims) => Ok(AuthUser(claims.sub)),
            Err(e) => {
                warn!(error = %e, "rejected token");
                Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_config;
    use axum::http::Request;

    fn keys(issuer: &str, audience: &str) -> JwtKeys {
        let mut cfg = test_config().jwt;
        cfg.issuer = issuer.into();
        cfg.audience = audience.into();
        JwtKeys::from(&cfg)
    }

    #[test]
    fn issued_pair_verifies_by_kind() {
        let k = keys("mealcoach", "app");
        let user = Uuid::new_v4();
        let pair = k.issue_pair(user).unwrap();
        assert_eq!(k.verify(&pair.access_token, TokenKind::Access).unwrap().sub, user);
        assert_eq!(k.verify(&pair.refresh_token, TokenKind::Refresh).unwrap().sub, user);
        assert!(k.verify(&pair.access_token, TokenKind::Refresh).is_err());
        assert!(k.verify(&pair.refresh_token, TokenKind::Access).is_err());
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let pair = keys("good", "app").issue_pair(Uuid::new_v4()).unwrap();
        assert!(keys("bad", "app").verify(&pair.access_token, TokenKind::Access).is_err());
        assert!(keys("good", "other").verify(&pair.access_token, TokenKind::Access).is_err());
    }

    async fn extract(state: &AppState, header: Option<&str>) -> Result<Uuid, StatusCode> {
        let mut req = Request::builder().uri("/");
        if let Some(h) = header {
            req = req.header("authorization", h);
        }
        let (mut parts, _) = req.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state)
            .await
            .map(|AuthUser(id)| id)
            .map_err(|(s, _)| s)
    }

    #[tokio::test]
    async fn extractor_accepts_only_access_tokens() {
        let state = AppState::fake();
        let user = Uuid::new_v4();
        let pair = JwtKeys::from_ref(&state).issue_pair(user).unwrap();

        let ok = extract(&state, Some(&format!("Bearer {}", pair.access_token))).await;
        assert_eq!(ok, Ok(user));
        let refresh = extract(&state, Some(&format!("Bearer {}", pair.refresh_token))).await;
        assert_eq!(refresh, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract(&state, None).await, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract(&state, Some("Basic abc")).await, Err(StatusCode::UNAUTHORIZED));
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wise_types::session::{Session, SessionMode};

use crate::AppState;
use crate::error::ApiError;

/// Session tokens stay valid for thirty days.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<Uuid>,
    pub mode: SessionMode,
    #[serde(default)]
    pub email: Option<String>,
    /// The hosted backend's access token for this session.
    #[serde(default)]
    pub backend_token: Option<String>,
    #[serde(default)]
    pub device: Option<Uuid>,
    pub jti: Uuid,
    pub exp: usize,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Session {
            mode: claims.mode,
            user_id: claims.sub,
            email: claims.email,
            access_token: claims.backend_token,
            device_id: claims.device,
        }
    }
}

/// Identity of the token a request was made with.
#[derive(Debug, Clone, Copy)]
pub struct TokenId {
    pub jti: Uuid,
    pub exp: usize,
}

/// Tokens signed out before they expired.
#[derive(Default)]
pub struct RevokedTokens {
    tokens: Mutex<HashMap<Uuid, usize>>,
}

impl RevokedTokens {
    pub fn revoke(&self, token: TokenId) {
        let now = chrono::Utc::now().timestamp() as usize;
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        // Expired tokens fail validation anyway
        tokens.retain(|_, exp| *exp > now);
        tokens.insert(token.jti, token.exp);
    }

    pub fn is_revoked(&self, jti: &Uuid) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }
}

pub fn create_token(secret: &str, session: &Session) -> anyhow::Result<String> {
    let claims = Claims {
        sub: session.user_id,
        mode: session.mode,
        email: session.email.clone(),
        backend_token: session.access_token.clone(),
        device: session.device_id,
        jti: Uuid::new_v4(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_claims(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::unauthorized("invalid or expired session token"))?;
    Ok(token_data.claims)
}

pub fn decode_token(secret: &str, token: &str) -> Result<Session, ApiError> {
    decode_claims(secret, token).map(Session::from)
}

/// Attach the caller's [`Session`] and `Option<TokenId>`. No Authorization
/// header means an anonymous session without a device; a header that does
/// not verify, or names a signed-out token, is rejected.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (session, token_id) = match req.headers().get(header::AUTHORIZATION) {
        None => (Session::anonymous(), None),
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(|| ApiError::unauthorized("malformed Authorization header"))?;
            let claims = decode_claims(&state.jwt_secret, token)?;
            if state.revoked.is_revoked(&claims.jti) {
                return Err(ApiError::unauthorized("session has been signed out"));
            }
            let token_id = TokenId {
                jti: claims.jti,
                exp: claims.exp,
            };
            (Session::from(claims), Some(token_id))
        }
    };

    req.extensions_mut().insert(session);
    req.extensions_mut().insert(token_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_carries_the_session() {
        let session = Session::admin(Uuid::new_v4(), "admin@example.com", "backend-token")
            .on_device(Uuid::new_v4());
        let token = create_token("secret", &session).unwrap();

        assert_eq!(decode_token("secret", &token).unwrap(), session);
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn revoked_tokens_are_remembered_until_expiry() {
        let revoked = RevokedTokens::default();
        let live = TokenId {
            jti: Uuid::new_v4(),
            exp: (chrono::Utc::now().timestamp() + 60) as usize,
        };
        let stale = TokenId {
            jti: Uuid::new_v4(),
            exp: 1,
        };

        revoked.revoke(stale);
        revoked.revoke(live);

        assert!(revoked.is_revoked(&live.jti));
        assert!(!revoked.is_revoked(&stale.jti));
        assert!(!revoked.is_revoked(&Uuid::new_v4()));
    }
}

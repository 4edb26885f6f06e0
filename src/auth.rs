//! Token validation and role extraction.
//!
//! Session issuance (login, registration, refresh) belongs to the identity
//! service; this module only validates the bearer tokens it mints and
//! exposes the authenticated principal to handlers.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Buyer,
    Vendor,
    Farmer,
    Rider,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub role: Role,
    /// Expiration time (unix seconds)
    pub exp: i64,
    /// Issued at (unix seconds)
    pub iat: i64,
}

/// Authenticated principal extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Rejects callers whose role is outside the allowed set, before any
    /// resource is read.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ServiceError> {
        if self.role == Role::Admin || allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} may not perform this action",
                self.role
            )))
        }
    }
}

/// Validates a bearer token and returns its claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServiceError::AuthError(format!("invalid token: {}", e)))?;
    Ok(data.claims)
}

/// Issues a token for the given principal. Used by tests and local tooling;
/// production tokens come from the identity service with the same claims.
pub fn issue_token(
    user_id: Uuid,
    role: Role,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: now + ttl_secs,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::AuthError("missing Authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::AuthError("expected Bearer token".into()))?
            .trim();

        let claims = validate_token(token, &app_state.config.jwt_secret)?;
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::AuthError("token subject is not a valid id".into()))?;

        Ok(AuthUser {
            id,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_for_auth_round_trip_checks";

    #[test]
    fn token_round_trip_preserves_identity_and_role() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, Role::Rider, SECRET, 3600).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Rider);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(Uuid::new_v4(), Role::Buyer, "another_secret_entirely_here", 3600)
            .unwrap();
        assert!(validate_token(&token, SECRET).is_err());
    }

    #[test]
    fn admin_passes_any_role_gate() {
        let admin = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(admin.require_role(&[Role::Rider]).is_ok());
    }

    #[test]
    fn vendor_cannot_use_rider_surface() {
        let vendor = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Vendor,
        };
        assert!(vendor.require_role(&[Role::Rider]).is_err());
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing material plus the lifetime of issued tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AppError::Internal(format!("failed to sign token: {err}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected bearer token");
                AppError::Unauthorized("Token invalid".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::JwtKeys;
    use crate::error::AppError;
    use crate::models::user::Role;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let keys = JwtKeys::new(b"fleet-secret", 1);
        let user_id = Uuid::new_v4();

        let token = keys.issue(user_id, Role::Manager).unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Manager);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_unauthorized() {
        let issuer = JwtKeys::new(b"one-secret", 1);
        let verifier = JwtKeys::new(b"another-secret", 1);

        let token = issuer.issue(Uuid::new_v4(), Role::Dispatcher).unwrap();

        assert!(matches!(
            verifier.verify(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let keys = JwtKeys::new(b"fleet-secret", -2);
        let token = keys.issue(Uuid::new_v4(), Role::Dispatcher).unwrap();

        assert!(matches!(keys.verify(&token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn garbage_is_unauthorized() {
        let keys = JwtKeys::new(b"fleet-secret", 1);
        assert!(keys.verify("not.a.token").is_err());
    }
}

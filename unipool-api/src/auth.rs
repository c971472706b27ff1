use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unipool_core::{Caller, CoreError, CoreResult, IdentityResolver};
use unipool_shared::UserRole;

/// HS256 token payload. `sub` is the user id, `role` a `UserRole` name.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Verifies tokens minted by the campus identity service
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> CoreResult<Caller> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| CoreError::Unauthenticated(format!("invalid token: {}", e)))?;

        let user_id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| {
            CoreError::Unauthenticated("token subject is not a user id".to_string())
        })?;
        let role = token_data
            .claims
            .role
            .parse::<UserRole>()
            .map_err(|e| CoreError::Unauthenticated(e.to_string()))?;

        Ok(Caller::new(user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "campus-secret";

    fn token(sub: &str, role: &str, ttl: Duration, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_resolves_caller() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let user_id = Uuid::new_v4();

        let caller = resolver
            .resolve(&token(&user_id.to_string(), "DRIVER", Duration::hours(1), SECRET))
            .await
            .unwrap();

        assert_eq!(caller, Caller::new(user_id, UserRole::Driver));
    }

    #[tokio::test]
    async fn test_bad_tokens_are_unauthenticated() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let user_id = Uuid::new_v4().to_string();

        let cases = [
            token(&user_id, "PASSENGER", Duration::hours(1), "other-secret"),
            token(&user_id, "PASSENGER", Duration::hours(-2), SECRET),
            token("not-a-uuid", "PASSENGER", Duration::hours(1), SECRET),
            token(&user_id, "ADMIN", Duration::hours(1), SECRET),
            "garbage".to_string(),
        ];

        for bad in cases {
            let err = resolver.resolve(&bad).await.unwrap_err();
            assert!(matches!(err, CoreError::Unauthenticated(_)), "{}", bad);
        }
    }
}

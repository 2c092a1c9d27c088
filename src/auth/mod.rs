use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod jwt;
pub mod middleware;
pub mod roles;

pub use roles::{Actor, Role};

/// User claims for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Claims {
    pub sub: i64,         // Subject (user ID)
    pub username: String, // Display name
    pub role: Role,       // user | admin
    pub exp: i64,         // Expiration time
    pub iat: i64,         // Issued at
    pub iss: String,      // Issuer
}

impl Claims {
    pub fn new(user_id: i64, username: impl Into<String>, role: Role, issuer: &str, ttl_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + chrono::Duration::seconds(ttl_secs);

        Self {
            sub: user_id,
            username: username.into(),
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: issuer.to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.sub,
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_expiry_and_actor() {
        let claims = Claims::new(7, "kim", Role::Admin, "resale-exchange", 60);
        assert!(!claims.is_expired());
        assert_eq!(claims.actor(), Actor::admin(7));

        let expired = Claims::new(7, "kim", Role::User, "resale-exchange", -120);
        assert!(expired.is_expired());
    }
}

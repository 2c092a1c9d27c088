use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::{Claims, Role};
use crate::error::{ApiError, ErrorCode, Result};

/// HS256 token issuing and verification
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    expiration_secs: i64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: &str, expiration_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.leeway = 5;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            expiration_secs,
        }
    }

    pub fn issue_token(&self, user_id: i64, username: &str, role: Role) -> Result<String> {
        let claims = Claims::new(user_id, username, role, &self.issuer, self.expiration_secs);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    ApiError::with_code(ErrorCode::TokenExpired, ErrorCode::TokenExpired.message())
                }
                _ => ApiError::with_code(ErrorCode::TokenInvalid, ErrorCode::TokenInvalid.message()),
            })
    }
}

//! Token issuing/validation and password hashing

use crate::{config::AuthConfig, error::AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Roles understood by the route guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    RestaurantAdmin,
    Staff,
    Customer,
    /// Trusted integration authenticated with the static API token
    Service,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::RestaurantAdmin)
    }

    /// Back-office roles allowed to read and write CRM data
    pub fn is_back_office(&self) -> bool {
        matches!(
            self,
            Role::Admin | Role::RestaurantAdmin | Role::Staff | Role::Service
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::RestaurantAdmin => "RESTAURANT_ADMIN",
            Role::Staff => "STAFF",
            Role::Customer => "CUSTOMER",
            Role::Service => "SERVICE",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "RESTAURANT_ADMIN" => Ok(Role::RestaurantAdmin),
            "STAFF" => Ok(Role::Staff),
            "CUSTOMER" => Ok(Role::Customer),
            "SERVICE" => Ok(Role::Service),
            other => Err(AppError::validation(format!("unknown role {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id, or customer id for CUSTOMER tokens
    pub email: String,
    pub role: Role,
    pub restaurant_id: Uuid,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
    api_bearer_token: Option<String>,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_token_ttl: Duration::seconds(config.access_token_ttl_seconds as i64),
            api_bearer_token: config.api_bearer_token.clone(),
        }
    }

    pub fn issue_token(
        &self,
        subject: Uuid,
        email: &str,
        role: Role,
        restaurant_id: Uuid,
    ) -> Result<IssuedToken> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            email: email.to_string(),
            role,
            restaurant_id,
            exp: (now + self.access_token_ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to generate access token: {}", e)))?;

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl.num_seconds(),
        })
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(JWT_ALGORITHM);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::authentication("Token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::authentication("Invalid token signature")
                }
                _ => AppError::authentication(format!("Token validation failed: {}", e)),
            },
        )?;

        Ok(token_data.claims)
    }

    /// Constant-time comparison against the configured static API token
    pub fn is_api_token(&self, token: &str) -> bool {
        match &self.api_bearer_token {
            Some(expected) if expected.len() == token.len() => expected
                .bytes()
                .zip(token.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0,
            _ => false,
        }
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| AppError::internal(format!("Failed to verify password: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(api_token: Option<&str>) -> AuthService {
        AuthService::new(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            access_token_ttl_seconds: 3600,
            api_bearer_token: api_token.map(str::to_string),
            service_restaurant_id: None,
        })
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let auth = service(None);
        let user_id = Uuid::new_v4();
        let restaurant_id = Uuid::new_v4();

        let token = auth
            .issue_token(user_id, "admin@aircrm.com", Role::RestaurantAdmin, restaurant_id)
            .unwrap();
        let claims = auth.validate_token(&token.access_token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::RestaurantAdmin);
        assert_eq!(claims.restaurant_id, restaurant_id);
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthService::new(&AuthConfig {
            jwt_secret: "another-secret".to_string(),
            access_token_ttl_seconds: 3600,
            api_bearer_token: None,
            service_restaurant_id: None,
        });
        let token = other
            .issue_token(Uuid::new_v4(), "x@y.z", Role::Admin, Uuid::new_v4())
            .unwrap();

        let err = service(None).validate_token(&token.access_token).unwrap_err();
        assert!(matches!(err, AppError::Authentication { .. }));
    }

    #[test]
    fn api_token_comparison() {
        let auth = service(Some("pos-terminal-token"));
        assert!(auth.is_api_token("pos-terminal-token"));
        assert!(!auth.is_api_token("pos-terminal-tokem"));
        assert!(!auth.is_api_token("short"));
        assert!(!service(None).is_api_token("pos-terminal-token"));
    }

    #[test]
    fn role_guards() {
        assert!(Role::Admin.is_admin());
        assert!(Role::RestaurantAdmin.is_admin());
        assert!(!Role::Staff.is_admin());
        assert!(Role::Service.is_back_office());
        assert!(!Role::Customer.is_back_office());
        assert_eq!("STAFF".parse::<Role>().unwrap(), Role::Staff);
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("admin123", 4).unwrap();
        assert!(verify_password("admin123", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::auth::{hash_password, verify_password, IssuedToken};
use shared::config::SeedConfig;
use shared::error::{ensure_valid, field_errors_of};
use shared::{AppError, AuthService, Result, Role};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::models::{Restaurant, User};
use crate::domains::context::Principal;
use crate::observability::metrics;
use crate::store::CrmStore;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerTokenRequest {
    pub customer_id: Uuid,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn CrmStore>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(store: Arc<dyn CrmStore>, auth: Arc<AuthService>) -> Self {
        Self { store, auth }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        ensure_valid(field_errors_of(&request))?;
        let email = request.email.trim().to_lowercase();

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) if verify_password(&request.password, &user.password_hash)? => user,
            _ => {
                metrics::record_auth_attempt("password", false);
                warn!(email = %email, "Failed login attempt");
                return Err(AppError::authentication("Invalid email or password"));
            }
        };

        let token = self
            .auth
            .issue_token(user.id, &user.email, user.role, user.restaurant_id)?;
        metrics::record_auth_attempt("password", true);
        info!(user_id = %user.id, role = %user.role.as_str(), "User logged in");
        Ok(LoginResponse { token, user })
    }

    /// Token for the mobile app, issued by staff or a trusted integration
    pub async fn customer_token(&self, principal: &Principal, customer_id: Uuid) -> Result<IssuedToken> {
        principal.require_back_office()?;
        let customer = self.store.get_customer(principal.restaurant_id, customer_id).await?;
        let email = customer.email.as_deref().unwrap_or_default();

        let token = self
            .auth
            .issue_token(customer.id, email, Role::Customer, customer.restaurant_id)?;
        info!(customer_id = %customer.id, issued_by = %principal.email, "Customer token issued");
        Ok(token)
    }

    pub async fn register(
        &self,
        restaurant_id: Uuid,
        email: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            restaurant_id,
            email: email.trim().to_lowercase(),
            name: name.to_string(),
            password_hash: hash_password(password)?,
            role,
            created_at: Utc::now(),
        };
        Ok(self.store.create_user(user).await?)
    }

    /// Creates the first restaurant and its administrator unless the email is taken
    pub async fn seed(&self, seed: &SeedConfig) -> Result<Option<User>> {
        let Some((email, password)) = seed.admin_credentials() else {
            return Ok(None);
        };
        if self.store.find_user_by_email(email).await?.is_some() {
            info!(email = %email, "Seed administrator already exists");
            return Ok(None);
        }

        let restaurant = self
            .store
            .create_restaurant(Restaurant {
                id: Uuid::new_v4(),
                name: seed.restaurant_name.clone(),
                address: None,
                phone: None,
                created_at: Utc::now(),
            })
            .await?;
        let user = self
            .register(restaurant.id, email, &seed.admin_name, password, Role::RestaurantAdmin)
            .await?;

        info!(restaurant_id = %restaurant.id, email = %user.email, "Seeded restaurant and administrator");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared::config::AuthConfig;

    fn service() -> UserService {
        let auth = AuthService::new(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            access_token_ttl_seconds: 600,
            api_bearer_token: None,
            service_restaurant_id: None,
        });
        UserService::new(Arc::new(MemoryStore::new()), Arc::new(auth))
    }

    fn seed() -> SeedConfig {
        SeedConfig {
            restaurant_name: "Lokanta".to_string(),
            admin_email: Some("admin@aircrm.com".to_string()),
            admin_password: Some("admin123".to_string()),
            admin_name: "Yönetici".to_string(),
        }
    }

    #[tokio::test]
    async fn seeded_admin_can_log_in_once_seeded() {
        let service = service();
        assert!(service.seed(&seed()).await.unwrap().is_some());
        assert!(service.seed(&seed()).await.unwrap().is_none());

        let response = service
            .login(LoginRequest {
                email: "Admin@AirCRM.com".to_string(),
                password: "admin123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.user.role, Role::RestaurantAdmin);
        assert_eq!(response.token.token_type, "Bearer");
    }

    #[tokio::test]
    async fn wrong_password_is_an_authentication_error() {
        let service = service();
        service.seed(&seed()).await.unwrap();

        let err = service
            .login(LoginRequest {
                email: "admin@aircrm.com".to_string(),
                password: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication { .. }));
    }
}

//! Request principal passed explicitly into every service call

use serde::Serialize;
use shared::{AppError, Claims, Result, Role};
use uuid::Uuid;

/// Who is calling and which restaurant they are scoped to
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub subject: Uuid,
    pub email: String,
    pub role: Role,
    pub restaurant_id: Uuid,
}

impl Principal {
    pub fn new(subject: Uuid, email: impl Into<String>, role: Role, restaurant_id: Uuid) -> Self {
        Self {
            subject,
            email: email.into(),
            role,
            restaurant_id,
        }
    }

    pub fn from_claims(claims: &Claims) -> Result<Self> {
        let subject = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| AppError::authentication("Invalid subject in token"))?;
        Ok(Self::new(subject, claims.email.clone(), claims.role, claims.restaurant_id))
    }

    /// Principal for the static API token; acts for the configured default restaurant
    pub fn service(restaurant_id: Uuid) -> Self {
        Self::new(Uuid::nil(), "service@aircrm.local", Role::Service, restaurant_id)
    }

    pub fn require_back_office(&self) -> Result<()> {
        if self.role.is_back_office() {
            Ok(())
        } else {
            Err(AppError::authorization("Back-office access required"))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::authorization("Administrator role required"))
        }
    }

    /// Entities of another restaurant are reported as missing
    pub fn ensure_scope(&self, restaurant_id: Uuid, resource: &str) -> Result<()> {
        if self.restaurant_id == restaurant_id {
            Ok(())
        } else {
            Err(AppError::not_found(resource))
        }
    }

    /// Customers may only look at their own data
    pub fn can_view_customer(&self, customer_id: Uuid) -> bool {
        self.role.is_back_office() || (self.role == Role::Customer && self.subject == customer_id)
    }
}

use chrono::Utc;
use serde::Deserialize;
use shared::error::{ensure_valid, field_errors_of, push_field_error};
use shared::{Page, PageRequest, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::{Product, ProductFilters};
use crate::domains::context::Principal;
use crate::domains::money::Money;
use crate::store::CrmStore;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be between 2 and 200 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    pub price: Money,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn CrmStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        principal: &Principal,
        filters: &ProductFilters,
        page: PageRequest,
    ) -> Result<Page<Product>> {
        principal.require_back_office()?;
        Ok(self
            .store
            .list_products(principal.restaurant_id, filters, page)
            .await?)
    }

    pub async fn create(&self, principal: &Principal, request: CreateProductRequest) -> Result<Product> {
        principal.require_back_office()?;
        let mut errors = field_errors_of(&request);
        if request.price.is_negative() {
            push_field_error(&mut errors, "price", "Price must not be negative");
        }
        if request.category.trim().is_empty() {
            push_field_error(&mut errors, "category", "Category is required");
        }
        ensure_valid(errors)?;

        let product = self
            .store
            .create_product(Product {
                id: Uuid::new_v4(),
                restaurant_id: principal.restaurant_id,
                name: request.name.trim().to_string(),
                description: request.description,
                category: request.category.trim().to_string(),
                price: request.price,
                is_active: request.is_active,
                created_at: Utc::now(),
            })
            .await?;

        info!(product_id = %product.id, category = %product.category, "Product created");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared::{AppError, Role};

    #[tokio::test]
    async fn creates_and_filters_by_category() {
        let service = ProductService::new(Arc::new(MemoryStore::new()));
        let principal = Principal::new(Uuid::new_v4(), "staff@aircrm.com", Role::Staff, Uuid::new_v4());

        for (name, category) in [("Türk Kahvesi", "İçecek"), ("Simit", "Fırın"), ("Çay", "İçecek")] {
            service
                .create(
                    &principal,
                    CreateProductRequest {
                        name: name.to_string(),
                        description: None,
                        category: category.to_string(),
                        price: Money::from_units(30),
                        is_active: true,
                    },
                )
                .await
                .unwrap();
        }

        let filters = ProductFilters {
            category: Some("İçecek".to_string()),
            ..Default::default()
        };
        let page = service.list(&principal, &filters, PageRequest::default()).await.unwrap();
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let service = ProductService::new(Arc::new(MemoryStore::new()));
        let principal = Principal::new(Uuid::new_v4(), "staff@aircrm.com", Role::Staff, Uuid::new_v4());
        let err = service
            .create(
                &principal,
                CreateProductRequest {
                    name: "Kumpir".to_string(),
                    description: None,
                    category: "Yemek".to_string(),
                    price: Money::from_minor(-100),
                    is_active: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("price")));
    }
}

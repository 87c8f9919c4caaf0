pub mod models;
pub mod service;

pub use models::{Customer, CustomerFilters, CustomerStats, LoyaltyLevel, Tier};
pub use service::CustomerService;

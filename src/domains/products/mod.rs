pub mod models;
pub mod service;

pub use models::{Product, ProductFilters, ProductSales};
pub use service::ProductService;

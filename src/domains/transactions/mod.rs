pub mod models;
pub mod service;

pub use models::{Transaction, TransactionFilters, TransactionStatus, TransactionSummary, TransactionView};
pub use service::TransactionService;

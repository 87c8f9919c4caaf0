pub mod campaigns;
pub mod context;
pub mod customers;
pub mod dashboard;
pub mod loyalty;
pub mod mobile;
pub mod money;
pub mod notifications;
pub mod points;
pub mod products;
pub mod segments;
pub mod transactions;
pub mod users;

pub use context::Principal;
pub use money::Money;

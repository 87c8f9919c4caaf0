pub mod models;
pub mod service;

pub use models::{DashboardMetrics, DashboardStats, DashboardWindow};
pub use service::{growth_percent, DashboardService};

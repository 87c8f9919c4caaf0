pub mod models;
pub mod service;

pub use models::{PointAudit, PointEntry, PointHistory, PointHistoryFilters, PointSource, PointStats, PointType};
pub use service::PointsService;

pub mod criteria;
pub mod models;
pub mod service;

pub use criteria::{Criterion, Period, PurchaseStats, Range, SegmentCriteria};
pub use models::{Segment, SegmentDetail, SegmentKind};
pub use service::SegmentService;

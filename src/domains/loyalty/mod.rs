//! Loyalty rules: points accrual, tier resolution and stamp cards.
//!
//! Everything in here is pure and synchronous; services feed it data loaded
//! from the store.

pub mod accrual;
pub mod stamps;
pub mod tiers;

pub use accrual::{campaign_bonus_points, net_delta, points_for_amount};
pub use stamps::{stamp_progress, StampProgress};
pub use tiers::{next_tier_progress, resolve_tier, TierProgress};

//! Customer-facing loyalty card

pub mod service;

pub use service::{LoyaltyCard, MobileService};

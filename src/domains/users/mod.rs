//! Back-office users, restaurants and sign-in

pub mod models;
pub mod service;

pub use models::{Restaurant, User};
pub use service::UserService;

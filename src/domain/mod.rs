//! Business rules that do not touch the database.

pub mod analytics;
pub mod cart;
pub mod delivery;
pub mod order_status;
pub mod otp;
pub mod slug;
pub mod validation;

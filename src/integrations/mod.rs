//! Outbound collaborators: transactional email and the card payment gateway.

pub mod mailer;
pub mod payment;

//! Common module - Errors, domain types and the exchange trait

pub mod errors;
pub mod traits;
pub mod types;

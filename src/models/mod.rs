pub mod config;
pub mod error;
pub mod hints;
pub mod session;
pub mod suggestion;

// Domain module - Shared types and errors
pub mod config;
pub mod device;
pub mod error;

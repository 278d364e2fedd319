pub mod auth;
pub mod authorization;
pub mod error;
pub mod query;
pub mod rate_limiter;
pub mod resources;

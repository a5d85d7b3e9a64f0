//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod publish;
mod routes;

pub use routes::api_routes;

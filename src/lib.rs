// Infrastructure layer (shared components)
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Domain layer (connection registry, rooms, fan-out)
pub mod broadcast;
pub mod connection;
pub mod notification;
pub mod room;

// Application layer
pub mod api;
pub mod collab;
pub mod server;

// Supporting modules
pub mod tasks;

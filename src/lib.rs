// Domain layer (session registry and event relay)
pub mod connections;
pub mod registry;
pub mod relay;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod tasks;

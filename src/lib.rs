// Infrastructure
pub mod config;
pub mod error;
pub mod events;

// Core hub
pub mod hub;
pub mod protocol;
pub mod transport;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

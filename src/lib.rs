// Position samples and input validation
pub mod sample;

// Distance, bearing and speed between samples
pub mod movement;

// Live entries, bounded history and the geo index
pub mod store;

// Currently active agents
pub mod presence;

// Fan-out of accepted samples to observers
pub mod broadcast;

// Bearer token authentication
pub mod auth;

// File and environment configuration
pub mod config;

// HTTP and WebSocket APIs
pub mod api;

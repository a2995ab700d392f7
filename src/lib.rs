// Message classification for inbound pub/sub traffic
pub mod message;

// Durable sensor directory (SQLite)
pub mod directory;

// Reconciliation engine and status change broadcast
pub mod engine;

// Operator-initiated sensor reset
pub mod reset;

// MQTT transport
pub mod mqtt;

// HTTP and WebSocket APIs
pub mod api;

// Configuration
pub mod config;

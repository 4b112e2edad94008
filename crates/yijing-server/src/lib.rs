//! yijing-server
//!
//! Real-time connection hub for the divination service: a generic
//! Envelope transport and a bot-protocol adapter over WebSocket.

pub mod bot;
pub mod client;
pub mod config;
pub mod connection;
pub mod divination;
pub mod hub_task;
pub mod server;
pub mod types;

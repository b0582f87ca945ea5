//! Radio-style music playback: catalog search, related-track autoplay and an
//! embedded player driven over HTTP and WebSocket.

pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod middleware;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod state;
pub mod utils;
pub mod widget;

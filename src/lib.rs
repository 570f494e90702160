//! huddled - live-meeting coordination engine.
//!
//! Tracks who is in each multi-party huddle, their roles and media state,
//! and keeps that picture consistent through flaky connectivity, host
//! departure, and concurrent role changes. Presence is an in-memory
//! registry: sessions are short-lived and bounded, and the only thing that
//! outlives them is the analytics record flushed at teardown.
//!
//! The wire vocabulary lives in the `huddle-proto` crate; this crate is the
//! engine: registry, timers, fan-out, sweeper, and the WebSocket gateway.

pub mod analytics;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod network;
pub mod state;
pub mod telemetry;

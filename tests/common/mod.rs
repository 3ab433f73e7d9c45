//! Common test utilities and helper modules
//!
//! Shared by the integration tests: an in-memory connector, a local WebSocket
//! server and a few helpers for waiting on link events.

#![allow(dead_code)]

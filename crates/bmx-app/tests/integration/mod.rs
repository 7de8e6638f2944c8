//! Integration tests for bmx-app.
//!
//! These tests run the real session against an in-process server:
//! - Connection, subscription and diff delivery
//! - Resubscription after a dropped connection
//! - Reconnect exhaustion

pub mod common;

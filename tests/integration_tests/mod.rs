//! Integration tests module
//!
//! End-to-end tests for the edgescan scanner, including:
//! - Probe and speed-test pipeline over a simulated network
//! - HTTP transport against a local mock edge
//! - Error handling scenarios

pub mod pipeline_test;

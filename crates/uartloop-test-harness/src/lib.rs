//! uartloop-test-harness: Test utilities for uartloop.
//!
//! This crate provides [`MockConnector`], an in-memory loopback wire with
//! fault injection, for testing the writer, the reader and whole sessions
//! without serial hardware.

pub mod mock_serial;

pub use mock_serial::{MockConnector, MockTransport, WireEvent};

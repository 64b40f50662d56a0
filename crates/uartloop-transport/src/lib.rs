//! Transport implementations for uartloop.
//!
//! This crate provides the concrete [`Connector`](uartloop_core::Connector)
//! used on real hardware:
//!
//! - [`SerialConnector`]: opens UART character devices through `tokio-serial`
//! - [`SerialTransport`]: one open handle, read or write side
//!
//! # Example
//!
//! ```no_run
//! use uartloop_core::transport::{Access, Connector, Direction};
//! use uartloop_transport::SerialConnector;
//! use std::time::Duration;
//!
//! # async fn example() -> uartloop_core::Result<()> {
//! let connector = SerialConnector::default();
//! let mut input = connector.open("/dev/ttyAMA3", Access::Read).await?;
//! input.discard(Direction::Input).await?;
//!
//! let mut byte = [0u8; 1];
//! let n = input.receive(&mut byte, Some(Duration::from_secs(1))).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConnector, SerialTransport};

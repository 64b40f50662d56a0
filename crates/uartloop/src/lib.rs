//! # uartloop -- UART Loopback Verification
//!
//! `uartloop` checks a UART loopback: a pattern of ASCII digits is written
//! to one serial device and read back, byte by byte, on another (or on the
//! same device with TX wired to RX). Every byte is compared with the
//! pattern, so a miswired, noisy or dead link fails the test.
//!
//! ## Quick Start
//!
//! ```no_run
//! use uartloop::LoopbackBuilder;
//!
//! #[tokio::main]
//! async fn main() -> uartloop::Result<()> {
//!     let report = LoopbackBuilder::new()
//!         .output_device("/dev/ttyAMA1")
//!         .input_device("/dev/ttyAMA3")
//!         .transfer_size(16)
//!         .build()?
//!         .run()
//!         .await?;
//!
//!     if !report.passed() {
//!         eprintln!("loopback failed: {:?}", report.verification.first_fault);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | `uartloop-core`         | Device traits, pattern, config, errors           |
//! | `uartloop-transport`    | Serial devices via `tokio-serial`                |
//! | `uartloop-test-harness` | In-memory loopback wire with fault injection     |
//! | **`uartloop`**          | This crate -- writer, reader, session            |
//!
//! ## Transfer modes
//!
//! - **Fixed**: one transfer of `transfer_size` bytes.
//! - **Auto-increment**: transfers of `1, 2, ..., transfer_size` bytes, read
//!   back as one stream of `n(n+1)/2` bytes.
//!
//! Bulk writes restart the pattern at `'0'` for every transfer while
//! byte-by-byte writes continue it, and the reader always expects the
//! continuous cycle. A bulk auto-increment sweep therefore fails from its
//! second transfer on; use byte-by-byte writes for sweeps.
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                            | Default |
//! |----------|----------------------------------------------------|---------|
//! | `serial` | [`LoopbackBuilder::build`] over real serial ports  | yes     |

pub mod builder;
pub mod reader;
pub mod session;
pub mod writer;

pub use builder::LoopbackBuilder;
pub use reader::{Reader, ReaderHandle, Verification};
pub use session::{LoopbackSession, SessionReport};
pub use writer::{WriteOutcome, Writer};

pub use uartloop_core::config::{
    DEFAULT_BAUD_RATE, DEFAULT_INPUT_DEVICE, DEFAULT_OUTPUT_DEVICE, LoopbackConfig, SessionMode,
    WriteStrategy,
};
pub use uartloop_core::error::{Error, Fault, Result};
pub use uartloop_core::pattern::{self, CompareMode};
pub use uartloop_core::transport::{Access, Connector, Direction, Transport};

#[cfg(feature = "serial")]
pub use uartloop_transport as transport;

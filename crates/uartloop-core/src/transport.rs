//! Device traits for loopback traffic.
//!
//! The [`Transport`] trait abstracts over one open handle on a character
//! device. The [`Connector`] trait opens such handles by path. The writer
//! and the reader only ever see these two traits, so the same session logic
//! runs against a real serial port (`uartloop-transport`) or the in-memory
//! wire from `uartloop-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Which side of the wire a device handle is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read-only handle, used by the reader.
    Read,
    /// Write-only handle, used by the writer.
    Write,
}

/// Which pending buffer [`Transport::discard`] should drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes received but not yet read.
    Input,
    /// Bytes written but not yet transmitted.
    Output,
}

/// Asynchronous byte-level handle on an open device.
#[async_trait]
pub trait Transport: Send {
    /// Write bytes to the device.
    ///
    /// Returns the number of bytes the device accepted, which may be less
    /// than `data.len()` on a short write.
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Read bytes from the device into `buf`.
    ///
    /// Waits up to `timeout` for data, or indefinitely when `timeout` is
    /// `None`. Returns [`Error::Timeout`](crate::error::Error::Timeout) if
    /// the deadline passes and [`Error::ConnectionLost`](crate::error::Error::ConnectionLost)
    /// on end-of-stream.
    async fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize>;

    /// Drop stale data pending in the given direction.
    async fn discard(&mut self, direction: Direction) -> Result<()>;

    /// Close the handle. Later calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;
}

/// Opens [`Transport`] handles on device paths.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open `device` for the given access.
    async fn open(&self, device: &str, access: Access) -> Result<Box<dyn Transport>>;
}

//! Session configuration.
//!
//! A [`LoopbackConfig`] is built once (normally through `LoopbackBuilder`
//! in the `uartloop` crate) and shared read-only by the writer, the reader
//! and the session that drives them.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::pattern::{self, CompareMode};

/// Default device the pattern is written to.
pub const DEFAULT_OUTPUT_DEVICE: &str = "/dev/ttyAMA1";

/// Default device the pattern is read back from.
pub const DEFAULT_INPUT_DEVICE: &str = "/dev/ttyAMA3";

/// Default line rate applied when opening serial devices.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Pause between sweep steps unless `no_delay` is set.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(100);

/// Pause after every byte in [`WriteStrategy::ByteByByte`].
pub const DEFAULT_BYTE_PAUSE: Duration = Duration::from_millis(1);

/// Whether a session moves one transfer or sweeps sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// A single transfer of `transfer_size` bytes.
    #[default]
    Fixed,
    /// Transfers of `1, 2, ..., transfer_size` bytes, read back as one
    /// continuous stream.
    AutoIncrement,
}

/// How the writer puts a transfer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// One write of the whole buffer. The pattern index restarts at 0 for
    /// every transfer.
    #[default]
    Bulk,
    /// One write per byte with a short pause after each. The pattern index
    /// carries on across the transfers of a sweep.
    ByteByByte,
}

/// Immutable settings for one loopback session.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Device the writer opens.
    pub output_device: String,
    /// Device the reader opens.
    pub input_device: String,
    /// Size of the single transfer, or the largest size of a sweep.
    pub transfer_size: u32,
    /// Fixed or auto-increment.
    pub mode: SessionMode,
    /// Bulk or byte-by-byte writes.
    pub strategy: WriteStrategy,
    /// Keep reading and sweeping after a mismatch.
    pub ignore_errors: bool,
    /// Pause between sweep steps; `None` disables it.
    pub step_delay: Option<Duration>,
    /// Pause after each byte in byte-by-byte mode.
    pub byte_pause: Duration,
    /// Per-byte read timeout; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Deadline for the reader to open and flush its device; `None` waits
    /// forever.
    pub ready_timeout: Option<Duration>,
    /// How received bytes are compared with the pattern.
    pub compare: CompareMode,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            output_device: DEFAULT_OUTPUT_DEVICE.to_string(),
            input_device: DEFAULT_INPUT_DEVICE.to_string(),
            transfer_size: 1,
            mode: SessionMode::Fixed,
            strategy: WriteStrategy::Bulk,
            ignore_errors: false,
            step_delay: Some(DEFAULT_STEP_DELAY),
            byte_pause: DEFAULT_BYTE_PAUSE,
            read_timeout: None,
            ready_timeout: None,
            compare: CompareMode::Exact,
        }
    }
}

impl LoopbackConfig {
    /// Check the invariants the session relies on.
    pub fn validate(&self) -> Result<()> {
        if self.transfer_size == 0 {
            return Err(Error::InvalidParameter(
                "transfer size must be at least 1 byte".into(),
            ));
        }
        if self.output_device.is_empty() {
            return Err(Error::InvalidParameter("output device path is empty".into()));
        }
        if self.input_device.is_empty() {
            return Err(Error::InvalidParameter("input device path is empty".into()));
        }
        Ok(())
    }

    /// Number of bytes the reader must see before the session is complete.
    pub fn expected_read_length(&self) -> u64 {
        let size = u64::from(self.transfer_size);
        match self.mode {
            SessionMode::Fixed => size,
            SessionMode::AutoIncrement => pattern::triangular(size),
        }
    }

    /// Transfer sizes the writer is driven through, in order.
    pub fn transfer_sizes(&self) -> std::ops::RangeInclusive<u32> {
        match self.mode {
            SessionMode::Fixed => self.transfer_size..=self.transfer_size,
            SessionMode::AutoIncrement => 1..=self.transfer_size,
        }
    }
}

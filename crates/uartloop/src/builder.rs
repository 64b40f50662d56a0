//! LoopbackBuilder -- fluent builder for constructing [`LoopbackSession`]s.
//!
//! Separates configuration from construction so that callers can set up
//! device paths, transfer mode and optional timeouts before any device is
//! touched. The resulting [`LoopbackConfig`] is validated once and is
//! immutable afterwards.
//!
//! # Example
//!
//! ```no_run
//! use uartloop::LoopbackBuilder;
//!
//! # async fn example() -> uartloop::Result<()> {
//! let session = LoopbackBuilder::new()
//!     .output_device("/dev/ttyAMA1")
//!     .input_device("/dev/ttyAMA3")
//!     .transfer_size(64)
//!     .auto_increment(true)
//!     .transfer_by_byte(true)
//!     .build()?;
//!
//! let report = session.run().await?;
//! println!("passed: {}", report.passed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uartloop_core::config::{LoopbackConfig, SessionMode, WriteStrategy};
use uartloop_core::error::Result;
use uartloop_core::pattern::CompareMode;
use uartloop_core::transport::Connector;

use crate::session::LoopbackSession;

/// Fluent builder for [`LoopbackSession`].
///
/// Every setting has the legacy tool's default, so the simplest usage is:
///
/// ```ignore
/// let session = LoopbackBuilder::new().build()?;
/// ```
pub struct LoopbackBuilder {
    config: LoopbackConfig,
    #[cfg(feature = "serial")]
    baud_rate: u32,
    cancel: Option<CancellationToken>,
}

impl LoopbackBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        LoopbackBuilder {
            config: LoopbackConfig::default(),
            #[cfg(feature = "serial")]
            baud_rate: uartloop_core::config::DEFAULT_BAUD_RATE,
            cancel: None,
        }
    }

    /// Set the device the pattern is written to.
    pub fn output_device(mut self, path: &str) -> Self {
        self.config.output_device = path.to_string();
        self
    }

    /// Set the device the pattern is read back from.
    pub fn input_device(mut self, path: &str) -> Self {
        self.config.input_device = path.to_string();
        self
    }

    /// Set the transfer size, or the largest size of a sweep (default: 1).
    pub fn transfer_size(mut self, bytes: u32) -> Self {
        self.config.transfer_size = bytes;
        self
    }

    /// Sweep sizes `1..=transfer_size` instead of one fixed transfer.
    pub fn auto_increment(mut self, enabled: bool) -> Self {
        self.config.mode = if enabled {
            SessionMode::AutoIncrement
        } else {
            SessionMode::Fixed
        };
        self
    }

    /// Write one byte at a time instead of one buffer per transfer.
    pub fn transfer_by_byte(mut self, enabled: bool) -> Self {
        self.config.strategy = if enabled {
            WriteStrategy::ByteByByte
        } else {
            WriteStrategy::Bulk
        };
        self
    }

    /// Keep reading and sweeping after a mismatch.
    pub fn ignore_errors(mut self, enabled: bool) -> Self {
        self.config.ignore_errors = enabled;
        self
    }

    /// Remove the pause between sweep steps.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.config.step_delay = if enabled {
            None
        } else {
            Some(uartloop_core::config::DEFAULT_STEP_DELAY)
        };
        self
    }

    /// Set the pause between sweep steps (default: 100ms).
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.config.step_delay = Some(delay);
        self
    }

    /// Set the pause after each byte in byte-by-byte mode (default: 1ms).
    pub fn byte_pause(mut self, pause: Duration) -> Self {
        self.config.byte_pause = pause;
        self
    }

    /// Give up on a byte that has not arrived within `timeout`.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Give up if the reader is not ready within `timeout`.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = Some(timeout);
        self
    }

    /// Set how received bytes are compared with the pattern.
    pub fn compare(mut self, mode: CompareMode) -> Self {
        self.config.compare = mode;
        self
    }

    /// Override the line rate used by [`build`](Self::build) (default: 115200).
    #[cfg(feature = "serial")]
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Use an externally owned cancellation token, e.g. one tied to Ctrl-C.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build a session that opens real serial devices.
    #[cfg(feature = "serial")]
    pub fn build(self) -> Result<LoopbackSession> {
        let connector = uartloop_transport::SerialConnector::with_baud_rate(self.baud_rate);
        self.build_with_connector(connector)
    }

    /// Build a session with a caller-provided connector.
    ///
    /// This is the entry point for testing (pass a `MockConnector` from
    /// `uartloop-test-harness`) and for callers that open devices their
    /// own way.
    pub fn build_with_connector<C: Connector + 'static>(
        self,
        connector: C,
    ) -> Result<LoopbackSession> {
        self.config.validate()?;
        Ok(LoopbackSession::new(
            self.config,
            Arc::new(connector),
            self.cancel.unwrap_or_default(),
        ))
    }
}

impl Default for LoopbackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uartloop_core::error::Error;
    use uartloop_test_harness::MockConnector;

    #[test]
    fn defaults_match_legacy_tool() {
        let session = LoopbackBuilder::new()
            .build_with_connector(MockConnector::new())
            .unwrap();
        let config = session.config();
        assert_eq!(config.output_device, "/dev/ttyAMA1");
        assert_eq!(config.input_device, "/dev/ttyAMA3");
        assert_eq!(config.transfer_size, 1);
        assert_eq!(config.mode, SessionMode::Fixed);
        assert_eq!(config.strategy, WriteStrategy::Bulk);
        assert_eq!(config.step_delay, Some(Duration::from_millis(100)));
    }

    #[test]
    fn flags_map_onto_config() {
        let session = LoopbackBuilder::new()
            .output_device("/dev/ttyS1")
            .input_device("/dev/ttyS2")
            .transfer_size(32)
            .auto_increment(true)
            .transfer_by_byte(true)
            .ignore_errors(true)
            .no_delay(true)
            .read_timeout(Duration::from_secs(2))
            .compare(CompareMode::Legacy)
            .build_with_connector(MockConnector::new())
            .unwrap();
        let config = session.config();
        assert_eq!(config.output_device, "/dev/ttyS1");
        assert_eq!(config.input_device, "/dev/ttyS2");
        assert_eq!(config.transfer_size, 32);
        assert_eq!(config.mode, SessionMode::AutoIncrement);
        assert_eq!(config.strategy, WriteStrategy::ByteByByte);
        assert!(config.ignore_errors);
        assert_eq!(config.step_delay, None);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.compare, CompareMode::Legacy);
        assert_eq!(config.expected_read_length(), 528);
    }

    #[test]
    fn zero_size_is_rejected() {
        let result = LoopbackBuilder::new()
            .transfer_size(0)
            .build_with_connector(MockConnector::new());
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn external_token_cancels_session() {
        let token = CancellationToken::new();
        let session = LoopbackBuilder::new()
            .cancellation_token(token.clone())
            .build_with_connector(MockConnector::new())
            .unwrap();
        token.cancel();
        assert!(session.cancellation_token().is_cancelled());
    }
}

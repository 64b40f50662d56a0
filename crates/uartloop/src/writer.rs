//! Pattern writer.
//!
//! The writer opens the output device once per transfer, drops whatever is
//! still queued for transmission, puts `length` pattern bytes on the wire
//! and closes the device again.
//!
//! The two strategies number their bytes differently. A bulk transfer
//! always starts at pattern index 0. Byte-by-byte transfers continue from
//! where the previous transfer stopped, so a sweep of byte-by-byte
//! transfers forms one unbroken digit cycle. The reader always expects the
//! unbroken cycle, which means a bulk sweep with more than one transfer
//! fails verification by construction.

use std::sync::Arc;

use tracing::{debug, trace, warn};
use uartloop_core::config::{LoopbackConfig, WriteStrategy};
use uartloop_core::error::{Error, Result, printable};
use uartloop_core::pattern;
use uartloop_core::transport::{Access, Connector, Direction, Transport};

/// What happened during one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes the transfer was asked to move.
    pub requested: usize,
    /// Bytes the device accepted.
    pub written: usize,
    /// Failed or short writes seen during the transfer.
    pub failures: u32,
}

/// Writes pattern transfers to the output device.
pub struct Writer {
    connector: Arc<dyn Connector>,
    config: Arc<LoopbackConfig>,
    /// Next pattern index for byte-by-byte transfers.
    next_index: u64,
}

impl Writer {
    /// Create a writer for `config.output_device`.
    pub fn new(connector: Arc<dyn Connector>, config: Arc<LoopbackConfig>) -> Self {
        Self {
            connector,
            config,
            next_index: 0,
        }
    }

    /// Pattern index the next byte-by-byte transfer starts at.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Write one transfer using the configured strategy.
    ///
    /// Only a failure to open the output device is returned as an error;
    /// failed or short writes are logged and counted in the outcome.
    pub async fn write_transfer(&mut self, length: usize) -> Result<WriteOutcome> {
        match self.config.strategy {
            WriteStrategy::Bulk => self.write_bulk(length).await,
            WriteStrategy::ByteByByte => self.write_byte_by_byte(length).await,
        }
    }

    /// Write `length` pattern bytes, starting at index 0, in one write.
    pub async fn write_bulk(&mut self, length: usize) -> Result<WriteOutcome> {
        let buffer = pattern::fill(0, length);
        let mut port = self.open().await?;
        let mut outcome = WriteOutcome {
            requested: length,
            ..Default::default()
        };

        trace!(data = %String::from_utf8_lossy(&buffer), "Write");

        match port.send(&buffer).await {
            Ok(n) => {
                outcome.written = n;
                if n != length {
                    outcome.failures += 1;
                    let e = Error::ShortWrite {
                        expected: length,
                        written: n,
                    };
                    warn!(device = %self.config.output_device, error = %e, "Error when writing");
                }
            }
            Err(e) => {
                outcome.failures += 1;
                warn!(device = %self.config.output_device, error = %e, "Error when writing");
            }
        }

        self.close(port).await;
        Ok(outcome)
    }

    /// Write `length` pattern bytes one at a time, continuing the pattern
    /// index from the previous byte-by-byte transfer.
    pub async fn write_byte_by_byte(&mut self, length: usize) -> Result<WriteOutcome> {
        let mut port = self.open().await?;
        let mut outcome = WriteOutcome {
            requested: length,
            ..Default::default()
        };

        for _ in 0..length {
            let index = self.next_index;
            self.next_index += 1;
            let byte = pattern::digit(index);

            trace!(index, byte = %printable(byte), "Write");

            match port.send(&[byte]).await {
                Ok(1) => outcome.written += 1,
                Ok(_) => {
                    outcome.failures += 1;
                    warn!(
                        device = %self.config.output_device,
                        index,
                        "Byte not accepted by device"
                    );
                }
                Err(e) => {
                    outcome.failures += 1;
                    warn!(
                        device = %self.config.output_device,
                        index,
                        error = %e,
                        "Error when writing"
                    );
                }
            }

            // Give the reader a chance to keep up.
            if !self.config.byte_pause.is_zero() {
                tokio::time::sleep(self.config.byte_pause).await;
            }
        }

        self.close(port).await;
        Ok(outcome)
    }

    async fn open(&self) -> Result<Box<dyn Transport>> {
        let device = &self.config.output_device;
        debug!(device = %device, "Writing to device");
        let mut port = self.connector.open(device, Access::Write).await?;
        if let Err(e) = port.discard(Direction::Output).await {
            warn!(device = %device, error = %e, "Failed to flush output");
        }
        Ok(port)
    }

    async fn close(&self, mut port: Box<dyn Transport>) {
        if let Err(e) = port.close().await {
            warn!(device = %self.config.output_device, error = %e, "Failed to close output device");
        }
        debug!(device = %self.config.output_device, "Writing end");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uartloop_test_harness::{MockConnector, WireEvent};

    fn writer(wire: &MockConnector, strategy: WriteStrategy) -> Writer {
        let config = LoopbackConfig {
            strategy,
            byte_pause: Duration::ZERO,
            ..Default::default()
        };
        Writer::new(Arc::new(wire.clone()), Arc::new(config))
    }

    #[tokio::test]
    async fn bulk_restarts_pattern_every_transfer() {
        let wire = MockConnector::new();
        let mut writer = writer(&wire, WriteStrategy::Bulk);

        writer.write_transfer(3).await.unwrap();
        writer.write_transfer(3).await.unwrap();

        assert_eq!(wire.writes(), vec![b"012".to_vec(), b"012".to_vec()]);
        assert_eq!(writer.next_index(), 0);
    }

    #[tokio::test]
    async fn byte_by_byte_continues_pattern_across_transfers() {
        let wire = MockConnector::new();
        let mut writer = writer(&wire, WriteStrategy::ByteByByte);

        writer.write_transfer(3).await.unwrap();
        writer.write_transfer(3).await.unwrap();

        assert_eq!(wire.writes(), vec![b"012".to_vec(), b"345".to_vec()]);
        assert_eq!(writer.next_index(), 6);
    }

    #[tokio::test]
    async fn byte_by_byte_wraps_after_nine() {
        let wire = MockConnector::new();
        let mut writer = writer(&wire, WriteStrategy::ByteByByte);

        let outcome = writer.write_transfer(12).await.unwrap();

        assert_eq!(wire.writes(), vec![b"012345678901".to_vec()]);
        assert_eq!(
            outcome,
            WriteOutcome {
                requested: 12,
                written: 12,
                failures: 0
            }
        );
        // One send per byte.
        let sends = wire
            .events()
            .iter()
            .filter(|e| matches!(e, WireEvent::Sent(1)))
            .count();
        assert_eq!(sends, 12);
    }

    #[tokio::test]
    async fn output_is_flushed_after_open_and_closed_after_transfer() {
        let wire = MockConnector::new();
        let mut writer = writer(&wire, WriteStrategy::Bulk);

        writer.write_transfer(4).await.unwrap();

        assert_eq!(
            wire.events(),
            vec![
                WireEvent::Opened(Access::Write),
                WireEvent::Discarded(Direction::Output),
                WireEvent::Sent(4),
                WireEvent::Closed(Access::Write),
            ]
        );
    }

    #[tokio::test]
    async fn short_write_is_counted_not_fatal() {
        let wire = MockConnector::new();
        wire.limit_writes(2);
        let mut writer = writer(&wire, WriteStrategy::Bulk);

        let outcome = writer.write_transfer(5).await.unwrap();

        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.failures, 1);
    }

    #[tokio::test]
    async fn failed_byte_writes_are_counted_and_index_still_advances() {
        let wire = MockConnector::new();
        wire.fail_sends();
        let mut writer = writer(&wire, WriteStrategy::ByteByByte);

        let outcome = writer.write_transfer(4).await.unwrap();

        assert_eq!(outcome.written, 0);
        assert_eq!(outcome.failures, 4);
        assert_eq!(writer.next_index(), 4);
    }

    #[tokio::test]
    async fn open_failure_is_an_error() {
        let wire = MockConnector::new();
        wire.fail_open(Access::Write);
        let mut writer = writer(&wire, WriteStrategy::Bulk);

        let result = writer.write_transfer(1).await;
        assert!(matches!(result, Err(Error::DeviceOpen { .. })));
    }
}

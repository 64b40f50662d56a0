//! Verifying reader.
//!
//! The reader runs as its own task for the whole session. It opens the
//! input device, drops stale input, signals readiness and then reads one
//! byte at a time, comparing each with the pattern digit for its position
//! in the session. Position `i` is simply the number of bytes read before
//! it, so the reader expects one unbroken `0123456789` cycle across every
//! transfer of a sweep.
//!
//! Results flow back over three channels only:
//!
//! - a `oneshot` readiness signal, sent after open and flush succeed
//!   (dropped unsent if the reader gives up first)
//! - a `watch` flag raised on the first fault, consulted by the session
//!   between sweep steps
//! - the [`Verification`] returned through the task's join handle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uartloop_core::config::LoopbackConfig;
use uartloop_core::error::{Error, Fault, Result, printable};
use uartloop_core::pattern;
use uartloop_core::transport::{Access, Connector, Direction};

/// The reader's verdict, available once its task has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Sticky: set on the first fault and never cleared.
    pub error: bool,
    /// Bytes read from the input device.
    pub bytes_read: u64,
    /// Bytes the session should have delivered.
    pub expected_bytes: u64,
    /// Bytes that did not match the pattern.
    pub mismatches: u64,
    /// The first thing that went wrong, if anything did.
    pub first_fault: Option<Fault>,
}

impl Verification {
    fn new(expected_bytes: u64) -> Self {
        Self {
            error: false,
            bytes_read: 0,
            expected_bytes,
            mismatches: 0,
            first_fault: None,
        }
    }

    fn record(&mut self, fault: Fault, faulted: &watch::Sender<bool>) {
        if self.first_fault.is_none() {
            self.first_fault = Some(fault);
        }
        self.error = true;
        faulted.send_replace(true);
    }

    /// Whether every expected byte arrived and matched.
    pub fn passed(&self) -> bool {
        !self.error
    }

    /// Whether the reader consumed the full expected length.
    ///
    /// A failed verification can still be complete when errors were
    /// ignored.
    pub fn complete(&self) -> bool {
        self.bytes_read == self.expected_bytes
    }
}

/// Reads back and verifies the pattern on the input device.
pub struct Reader {
    connector: Arc<dyn Connector>,
    config: Arc<LoopbackConfig>,
}

impl Reader {
    /// Create a reader for `config.input_device`.
    pub fn new(connector: Arc<dyn Connector>, config: Arc<LoopbackConfig>) -> Self {
        Self { connector, config }
    }

    /// Spawn the reader task.
    ///
    /// Cancelling `cancel` stops the reader at its next suspension point
    /// with a [`Fault::Cancelled`].
    pub fn spawn(self, cancel: CancellationToken) -> ReaderHandle {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (faulted_tx, faulted_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(ready_tx, faulted_tx, cancel));

        ReaderHandle {
            ready: Some(ready_rx),
            signalled: false,
            faulted: faulted_rx,
            task,
        }
    }

    /// The reader body. Runs until the expected length has been read, a
    /// fault stops it, or it is cancelled.
    pub async fn run(
        self,
        ready: oneshot::Sender<()>,
        faulted: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Verification {
        let config = &self.config;
        let expected = config.expected_read_length();
        let mut verification = Verification::new(expected);

        let opened = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                verification.record(Fault::Cancelled, &faulted);
                return verification;
            }

            opened = self.connector.open(&config.input_device, Access::Read) => opened,
        };
        let mut input = match opened {
            Ok(input) => input,
            Err(e) => {
                let reason = match e {
                    Error::DeviceOpen { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(device = %config.input_device, reason = %reason, "Error opening read device");
                verification.record(
                    Fault::DeviceUnavailable {
                        device: config.input_device.clone(),
                        reason,
                    },
                    &faulted,
                );
                return verification;
            }
        };

        debug!(device = %config.input_device, expected, "Reading from device");

        if let Err(e) = input.discard(Direction::Input).await {
            warn!(device = %config.input_device, error = %e, "Failed to flush input");
            verification.record(
                Fault::FlushFailed {
                    device: config.input_device.clone(),
                    reason: e.to_string(),
                },
                &faulted,
            );
            // Dropping `ready` unsent tells the session not to write.
            if let Err(e) = input.close().await {
                warn!(device = %config.input_device, error = %e, "Failed to close input device");
            }
            return verification;
        }

        // The session may already have given up waiting.
        let _ = ready.send(());

        let mut byte = [0u8; 1];
        while verification.bytes_read < expected {
            let received = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Reader cancelled");
                    verification.record(Fault::Cancelled, &faulted);
                    break;
                }

                received = input.receive(&mut byte, config.read_timeout) => received,
            };

            match received {
                Ok(1) => {}
                Ok(n) => {
                    warn!(n, "Unexpected read length");
                    verification.record(
                        Fault::ReadFailed(format!("read returned {n} bytes")),
                        &faulted,
                    );
                    break;
                }
                Err(Error::Timeout) => {
                    let after = config.read_timeout.unwrap_or(Duration::ZERO);
                    warn!(bytes_read = verification.bytes_read, ?after, "Read timed out");
                    verification.record(Fault::TimedOut(after), &faulted);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Read error");
                    verification.record(Fault::ReadFailed(e.to_string()), &faulted);
                    break;
                }
            }

            let position = verification.bytes_read;
            verification.bytes_read += 1;
            let actual = byte[0];

            trace!(position, byte = %printable(actual), "Read");

            if !config.compare.matches(position, actual) {
                let expected_byte = pattern::digit(position);
                debug!(
                    position,
                    expected = %printable(expected_byte),
                    actual = %printable(actual),
                    "Erroneous data received"
                );
                verification.mismatches += 1;
                verification.record(
                    Fault::Mismatch {
                        position,
                        expected: expected_byte,
                        actual,
                    },
                    &faulted,
                );
                if !config.ignore_errors {
                    break;
                }
            }
        }

        if let Err(e) = input.close().await {
            warn!(device = %config.input_device, error = %e, "Failed to close input device");
        }
        debug!(
            bytes_read = verification.bytes_read,
            error = verification.error,
            "Reading end"
        );

        verification
    }
}

/// Handle to a running reader task.
pub struct ReaderHandle {
    ready: Option<oneshot::Receiver<()>>,
    signalled: bool,
    faulted: watch::Receiver<bool>,
    task: JoinHandle<Verification>,
}

impl ReaderHandle {
    /// Wait until the reader has opened and flushed its device.
    ///
    /// Returns `Ok(true)` once the reader is ready and `Ok(false)` if it
    /// stopped before becoming ready (device unavailable or not flushed,
    /// cancelled). With
    /// a `timeout`, returns [`Error::ReadyTimeout`] if neither happens in
    /// time.
    pub async fn wait_ready(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let Some(ready) = self.ready.take() else {
            return Ok(self.signalled);
        };
        let signal = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, ready)
                .await
                .map_err(|_| Error::ReadyTimeout(timeout))?,
            None => ready.await,
        };
        self.signalled = signal.is_ok();
        Ok(self.signalled)
    }

    /// Whether the reader has recorded a fault so far.
    pub fn has_faulted(&self) -> bool {
        *self.faulted.borrow()
    }

    /// Wait for the reader task to finish and take its verdict.
    pub async fn join(self) -> Result<Verification> {
        self.task
            .await
            .map_err(|e| Error::ReaderTask(e.to_string()))
    }
}

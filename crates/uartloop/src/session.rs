//! Loopback session orchestration.
//!
//! A [`LoopbackSession`] runs one complete test: it spawns the reader,
//! waits for it to be ready, drives the writer through the configured
//! transfers, joins the reader and folds everything into a
//! [`SessionReport`].
//!
//! ```text
//! Init -> ReaderStarting -> WaitForReady -> Transferring -> Draining -> Reported
//! ```
//!
//! The writer runs inline in the session's own task; the reader is the only
//! other task. Nothing is written before the reader has opened and flushed
//! its device.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uartloop_core::config::{LoopbackConfig, SessionMode, WriteStrategy};
use uartloop_core::error::Result;
use uartloop_core::transport::Connector;

use crate::reader::{Reader, Verification};
use crate::writer::Writer;

/// Where a session is in its lifecycle. Only surfaces in the debug log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Init,
    ReaderStarting,
    WaitForReady,
    Transferring,
    Draining,
    Reported,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::ReaderStarting => "reader-starting",
            SessionState::WaitForReady => "wait-for-ready",
            SessionState::Transferring => "transferring",
            SessionState::Draining => "draining",
            SessionState::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub mode: SessionMode,
    pub strategy: WriteStrategy,
    /// Transfers handed to the writer.
    pub transfers: u32,
    /// Sweep steps skipped because the reader had already failed.
    pub skipped: u32,
    /// Bytes the output device accepted.
    pub bytes_written: u64,
    /// Failed or short writes. These do not fail the session by themselves;
    /// missing bytes show up as a reader fault.
    pub write_failures: u32,
    /// The reader's verdict.
    pub verification: Verification,
}

impl SessionReport {
    fn new(config: &LoopbackConfig, verification: Verification) -> Self {
        Self {
            mode: config.mode,
            strategy: config.strategy,
            transfers: 0,
            skipped: 0,
            bytes_written: 0,
            write_failures: 0,
            verification,
        }
    }

    /// Whether the loopback carried every byte intact.
    pub fn passed(&self) -> bool {
        self.verification.passed()
    }
}

/// One configured loopback test, ready to [`run`](LoopbackSession::run).
///
/// Build one with [`LoopbackBuilder`](crate::LoopbackBuilder).
pub struct LoopbackSession {
    config: Arc<LoopbackConfig>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
}

impl LoopbackSession {
    pub(crate) fn new(
        config: LoopbackConfig,
        connector: Arc<dyn Connector>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            cancel,
        }
    }

    /// The settings this session runs with.
    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Token that aborts a running session when cancelled. The reader stops
    /// with [`Fault::Cancelled`](uartloop_core::Fault::Cancelled) and no
    /// further transfers are written.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to completion.
    ///
    /// Verification failures, including an input device that cannot be
    /// opened, are reported through [`SessionReport::passed`]. An `Err` is
    /// returned only when the session itself cannot proceed: the output
    /// device fails to open, the reader misses its readiness deadline, or
    /// the reader task dies.
    pub async fn run(&self) -> Result<SessionReport> {
        let config = &self.config;
        let mut state = SessionState::Init;
        let expected = config.expected_read_length();

        info!(
            output = %config.output_device,
            input = %config.input_device,
            transfer_size = config.transfer_size,
            mode = ?config.mode,
            strategy = ?config.strategy,
            expected,
            "Starting loopback session"
        );

        // Cancelling this child stops the reader without touching the
        // caller's token.
        let cancel = self.cancel.child_token();

        transition(&mut state, SessionState::ReaderStarting);
        let mut reader =
            Reader::new(Arc::clone(&self.connector), Arc::clone(config)).spawn(cancel.clone());

        transition(&mut state, SessionState::WaitForReady);
        match reader.wait_ready(config.ready_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Reader stopped before becoming ready");
                transition(&mut state, SessionState::Draining);
                let verification = reader.join().await?;
                transition(&mut state, SessionState::Reported);
                return Ok(SessionReport::new(config, verification));
            }
            Err(e) => {
                error!(error = %e, "Reader did not become ready");
                cancel.cancel();
                let _ = reader.join().await;
                return Err(e);
            }
        }

        transition(&mut state, SessionState::Transferring);
        let mut writer = Writer::new(Arc::clone(&self.connector), Arc::clone(config));
        let mut transfers = 0u32;
        let mut skipped = 0u32;
        let mut bytes_written = 0u64;
        let mut write_failures = 0u32;
        let sizes = config.transfer_sizes();
        let last = *sizes.end();

        for size in sizes {
            if cancel.is_cancelled() {
                break;
            }
            if reader.has_faulted() && !config.ignore_errors {
                skipped = last - size + 1;
                debug!(size, skipped, "Reader failed, skipping remaining transfers");
                break;
            }

            debug!(size, "Transfer");
            let outcome = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                outcome = writer.write_transfer(size as usize) => outcome,
            };

            match outcome {
                Ok(outcome) => {
                    transfers += 1;
                    bytes_written += outcome.written as u64;
                    write_failures += outcome.failures;
                }
                Err(e) => {
                    error!(error = %e, "Error opening write device");
                    cancel.cancel();
                    let _ = reader.join().await;
                    return Err(e);
                }
            }

            if config.mode == SessionMode::AutoIncrement && size < last {
                if let Some(delay) = config.step_delay {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        transition(&mut state, SessionState::Draining);
        let verification = reader.join().await?;

        transition(&mut state, SessionState::Reported);
        let report = SessionReport {
            transfers,
            skipped,
            bytes_written,
            write_failures,
            ..SessionReport::new(config, verification)
        };

        info!(
            passed = report.passed(),
            transfers = report.transfers,
            bytes_written = report.bytes_written,
            bytes_read = report.verification.bytes_read,
            "Loopback session finished"
        );

        Ok(report)
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!(from = %state, to = %next, "Session state");
    *state = next;
}

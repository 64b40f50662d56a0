//! In-memory loopback wire for deterministic testing of loopback sessions.
//!
//! [`MockConnector`] implements the [`Connector`] trait. Every handle it
//! opens shares one wire: bytes sent on a write handle become readable on
//! a read handle, just like a UART with TX wired to RX. The connector also
//! records what happened on the wire and can inject the faults a real
//! loopback suffers from (corrupted bytes, stale data, slow or failing
//! opens, failing flushes, dead writes, hang-ups).
//!
//! # Example
//!
//! ```
//! use uartloop_test_harness::MockConnector;
//!
//! let wire = MockConnector::new();
//! // The byte at wire position 4 arrives as 'x' instead of '4'.
//! wire.corrupt_at(4, b'x');
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use uartloop_core::error::{Error, Result};
use uartloop_core::transport::{Access, Connector, Direction, Transport};

/// Something that happened on the mock wire, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A handle was opened.
    Opened(Access),
    /// Pending data was dropped on a handle.
    Discarded(Direction),
    /// A write handle sent this many bytes.
    Sent(usize),
    /// A handle was closed.
    Closed(Access),
}

#[derive(Debug, Default)]
struct WireState {
    /// Bytes in flight between the write side and the read side.
    pending: VecDeque<u8>,
    /// Number of bytes ever put on the wire; positions for corruption.
    sent_total: u64,
    /// Bytes sent, grouped by write handle.
    writes: Vec<Vec<u8>>,
    events: Vec<WireEvent>,
    corruptions: HashMap<u64, u8>,
    open_delays: HashMap<Access, Duration>,
    open_failures: HashSet<Access>,
    discard_failures: HashSet<Direction>,
    fail_sends: bool,
    write_limit: Option<usize>,
    hung_up: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<WireState>,
    data_ready: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WireState> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A mock [`Connector`] whose handles share one in-memory loopback wire.
///
/// Cloning a `MockConnector` yields another view of the same wire, so a
/// test can keep one clone for inspection and hand the other to a session.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    /// Create a fault-free wire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the byte at wire position `position` (counting every byte
    /// ever sent, across all write handles) with `byte`.
    pub fn corrupt_at(&self, position: u64, byte: u8) {
        self.shared.lock().corruptions.insert(position, byte);
    }

    /// Delay every open with the given access by `delay`.
    pub fn delay_open(&self, access: Access, delay: Duration) {
        self.shared.lock().open_delays.insert(access, delay);
    }

    /// Make every open with the given access fail.
    pub fn fail_open(&self, access: Access) {
        self.shared.lock().open_failures.insert(access);
    }

    /// Make every `discard()` in the given direction fail.
    pub fn fail_discard(&self, direction: Direction) {
        self.shared.lock().discard_failures.insert(direction);
    }

    /// Make every `send()` fail with an I/O error.
    pub fn fail_sends(&self) {
        self.shared.lock().fail_sends = true;
    }

    /// Accept at most `limit` bytes per `send()`, producing short writes.
    pub fn limit_writes(&self, limit: usize) {
        self.shared.lock().write_limit = Some(limit);
    }

    /// Put bytes on the wire as if they had been received earlier.
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.lock().pending.extend(bytes.iter().copied());
        self.shared.data_ready.notify_one();
    }

    /// Simulate the line going away: once pending bytes are drained, reads
    /// fail with [`Error::ConnectionLost`].
    pub fn hang_up(&self) {
        self.shared.lock().hung_up = true;
        self.shared.data_ready.notify_one();
    }

    /// Bytes sent so far, one entry per write handle, before corruption.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.lock().writes.clone()
    }

    /// Every event on the wire so far.
    pub fn events(&self) -> Vec<WireEvent> {
        self.shared.lock().events.clone()
    }

    /// Number of bytes on the wire not yet read.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, device: &str, access: Access) -> Result<Box<dyn Transport>> {
        let delay = self.shared.lock().open_delays.get(&access).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.shared.lock();
        if state.open_failures.contains(&access) {
            return Err(Error::DeviceOpen {
                device: device.to_string(),
                reason: "mock open failure".into(),
            });
        }
        state.events.push(WireEvent::Opened(access));
        let session = match access {
            Access::Write => {
                state.writes.push(Vec::new());
                Some(state.writes.len() - 1)
            }
            Access::Read => None,
        };
        tracing::trace!(device = %device, access = ?access, "mock device opened");

        Ok(Box::new(MockTransport {
            shared: Arc::clone(&self.shared),
            access,
            session,
            connected: true,
        }))
    }
}

/// One handle on the mock wire.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
    access: Access,
    /// Index into `WireState::writes` for write handles.
    session: Option<usize>,
    connected: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let session = self.session.ok_or_else(|| {
            Error::Transport("send on a handle opened for reading".into())
        })?;

        let mut state = self.shared.lock();
        if state.fail_sends {
            return Err(Error::Io(std::io::Error::other("mock send failure")));
        }
        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        for &byte in &data[..n] {
            let position = state.sent_total;
            let on_wire = state.corruptions.get(&position).copied().unwrap_or(byte);
            state.pending.push_back(on_wire);
            state.writes[session].push(byte);
            state.sent_total += 1;
        }
        state.events.push(WireEvent::Sent(n));
        drop(state);

        self.shared.data_ready.notify_one();
        Ok(n)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            {
                let mut state = self.shared.lock();
                if !state.pending.is_empty() {
                    let n = state.pending.len().min(buf.len());
                    for slot in buf.iter_mut().take(n) {
                        // Length checked above.
                        *slot = state.pending.pop_front().unwrap_or_default();
                    }
                    return Ok(n);
                }
                if state.hung_up {
                    return Err(Error::ConnectionLost);
                }
            }

            // `notify_one` stores a permit when nobody is waiting, so a byte
            // sent between the check above and this await is not missed.
            let notified = self.shared.data_ready.notified();
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(Error::Timeout);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn discard(&mut self, direction: Direction) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut state = self.shared.lock();
        if state.discard_failures.contains(&direction) {
            return Err(Error::Transport("mock discard failure".into()));
        }
        if direction == Direction::Input {
            state.pending.clear();
        }
        state.events.push(WireEvent::Discarded(direction));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            self.shared.lock().events.push(WireEvent::Closed(self.access));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: &str = "/dev/mock";

    #[tokio::test]
    async fn written_bytes_are_read_back() {
        let wire = MockConnector::new();
        let mut writer = wire.open(DEV, Access::Write).await.unwrap();
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();

        assert_eq!(writer.send(b"0123").await.unwrap(), 4);

        let mut buf = [0u8; 8];
        let n = reader
            .receive(&mut buf, Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"0123");
    }

    #[tokio::test]
    async fn writes_are_grouped_per_handle() {
        let wire = MockConnector::new();
        for chunk in [&b"012"[..], &b"345"[..]] {
            let mut writer = wire.open(DEV, Access::Write).await.unwrap();
            writer.send(chunk).await.unwrap();
            writer.close().await.unwrap();
        }
        assert_eq!(wire.writes(), vec![b"012".to_vec(), b"345".to_vec()]);
    }

    #[tokio::test]
    async fn corruption_applies_to_wire_position() {
        let wire = MockConnector::new();
        wire.corrupt_at(1, b'x');
        let mut writer = wire.open(DEV, Access::Write).await.unwrap();
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();
        writer.send(b"012").await.unwrap();

        let mut buf = [0u8; 3];
        let n = reader.receive(&mut buf, None).await.unwrap();
        assert_eq!(&buf[..n], b"0x2");
        // The capture keeps what the writer meant to send.
        assert_eq!(wire.writes(), vec![b"012".to_vec()]);
    }

    #[tokio::test]
    async fn discard_input_drops_stale_bytes() {
        let wire = MockConnector::new();
        wire.inject(b"99");
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();
        reader.discard(Direction::Input).await.unwrap();
        assert_eq!(wire.pending(), 0);
        assert_eq!(
            wire.events(),
            vec![
                WireEvent::Opened(Access::Read),
                WireEvent::Discarded(Direction::Input)
            ]
        );
    }

    #[tokio::test]
    async fn receive_times_out_on_silent_wire() {
        let wire = MockConnector::new();
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();
        let mut buf = [0u8; 1];
        let result = reader
            .receive(&mut buf, Some(Duration::from_millis(10)))
            .await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn receive_waits_for_late_bytes() {
        let wire = MockConnector::new();
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();

        let sender = wire.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut writer = sender.open(DEV, Access::Write).await.unwrap();
            writer.send(b"5").await.unwrap();
        });

        let mut buf = [0u8; 1];
        let n = reader.receive(&mut buf, None).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], b'5');
    }

    #[tokio::test]
    async fn hang_up_fails_reads_after_drain() {
        let wire = MockConnector::new();
        wire.inject(b"0");
        wire.hang_up();
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(reader.receive(&mut buf, None).await.unwrap(), 1);
        let result = reader.receive(&mut buf, None).await;
        assert!(matches!(result.unwrap_err(), Error::ConnectionLost));
    }

    #[tokio::test]
    async fn open_failure_is_device_open_error() {
        let wire = MockConnector::new();
        wire.fail_open(Access::Read);
        let result = wire.open(DEV, Access::Read).await;
        assert!(matches!(result, Err(Error::DeviceOpen { .. })));
        // The write side is unaffected.
        assert!(wire.open(DEV, Access::Write).await.is_ok());
    }

    #[tokio::test]
    async fn short_writes_and_failed_sends() {
        let wire = MockConnector::new();
        wire.limit_writes(2);
        let mut writer = wire.open(DEV, Access::Write).await.unwrap();
        assert_eq!(writer.send(b"0123").await.unwrap(), 2);

        wire.fail_sends();
        assert!(matches!(writer.send(b"0").await.unwrap_err(), Error::Io(_)));
    }

    #[tokio::test]
    async fn discard_failure_keeps_stale_bytes() {
        let wire = MockConnector::new();
        wire.inject(b"99");
        wire.fail_discard(Direction::Input);
        let mut reader = wire.open(DEV, Access::Read).await.unwrap();
        assert!(matches!(
            reader.discard(Direction::Input).await.unwrap_err(),
            Error::Transport(_)
        ));
        assert_eq!(wire.pending(), 2);
        // The output side still flushes.
        let mut writer = wire.open(DEV, Access::Write).await.unwrap();
        writer.discard(Direction::Output).await.unwrap();
    }

    #[tokio::test]
    async fn closed_handle_rejects_sends() {
        let wire = MockConnector::new();
        let mut writer = wire.open(DEV, Access::Write).await.unwrap();
        writer.close().await.unwrap();
        assert!(matches!(
            writer.send(b"0").await.unwrap_err(),
            Error::NotConnected
        ));
    }
}

//! Error types for uartloop.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Device-level and session-level failures
//! are both captured here. Verification outcomes (pattern mismatches, read
//! failures seen by the reader) are not errors of the session itself; they
//! are recorded as a [`Fault`] in the reader's report.

use std::fmt;
use std::time::Duration;

/// The error type for all uartloop operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port configuration, line control).
    #[error("transport error: {0}")]
    Transport(String),

    /// A device could not be opened.
    ///
    /// On the writer side this is fatal to the session; on the reader side
    /// it is reported through [`Fault::DeviceUnavailable`] instead.
    #[error("failed to open device {device}: {reason}")]
    DeviceOpen {
        /// Path of the device that failed to open.
        device: String,
        /// Human readable cause reported by the OS or backend.
        reason: String,
    },

    /// Fewer bytes were accepted by the device than requested.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Number of bytes the writer tried to send.
        expected: usize,
        /// Number of bytes the device accepted.
        written: usize,
    },

    /// Timed out waiting for a byte from the input device.
    #[error("timeout waiting for data")]
    Timeout,

    /// The reader did not signal readiness within the configured deadline.
    #[error("reader not ready after {0:?}")]
    ReadyTimeout(Duration),

    /// The device handle has already been closed.
    #[error("not connected")]
    NotConnected,

    /// The device went away or reached end-of-stream unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An invalid configuration value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The reader task panicked or was aborted before returning its report.
    #[error("reader task failed: {0}")]
    ReaderTask(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The first thing that went wrong during verification.
///
/// Unlike [`Error`], a `Fault` is plain data so it can be cloned into the
/// session report and inspected after the reader task has been joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The input device could not be opened; no bytes were verified.
    DeviceUnavailable {
        /// Path of the input device.
        device: String,
        /// Cause reported when opening.
        reason: String,
    },
    /// Stale input could not be dropped after opening, so the reader never
    /// became ready.
    FlushFailed {
        /// Path of the input device.
        device: String,
        /// Cause reported by the flush.
        reason: String,
    },
    /// A byte differed from the expected pattern digit.
    Mismatch {
        /// Zero-based position in the read session.
        position: u64,
        /// The pattern byte that should have arrived.
        expected: u8,
        /// The byte that actually arrived.
        actual: u8,
    },
    /// The input device returned an error or end-of-stream.
    ReadFailed(String),
    /// No byte arrived within the configured read timeout.
    TimedOut(Duration),
    /// The session was cancelled while the reader was waiting.
    Cancelled,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::DeviceUnavailable { device, reason } => {
                write!(f, "input device {device} unavailable: {reason}")
            }
            Fault::FlushFailed { device, reason } => {
                write!(f, "failed to flush input device {device}: {reason}")
            }
            Fault::Mismatch {
                position,
                expected,
                actual,
            } => write!(
                f,
                "read {} instead of {} at byte {position}",
                printable(*actual),
                printable(*expected)
            ),
            Fault::ReadFailed(reason) => write!(f, "read error: {reason}"),
            Fault::TimedOut(after) => write!(f, "no data received within {after:?}"),
            Fault::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Render a byte the way the trace output shows it: the character itself if
/// printable, otherwise its hex value.
pub fn printable(byte: u8) -> String {
    if byte.is_ascii_graphic() {
        format!("'{}'", byte as char)
    } else {
        format!("0x{byte:02X}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_device_open() {
        let e = Error::DeviceOpen {
            device: "/dev/ttyAMA1".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(
            e.to_string(),
            "failed to open device /dev/ttyAMA1: No such file or directory"
        );
    }

    #[test]
    fn error_display_short_write() {
        let e = Error::ShortWrite {
            expected: 10,
            written: 4,
        };
        assert_eq!(e.to_string(), "short write: 4 of 10 bytes");
    }

    #[test]
    fn error_display_ready_timeout() {
        let e = Error::ReadyTimeout(Duration::from_millis(250));
        assert_eq!(e.to_string(), "reader not ready after 250ms");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for data");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn fault_display_mismatch() {
        let f = Fault::Mismatch {
            position: 7,
            expected: b'7',
            actual: b'x',
        };
        assert_eq!(f.to_string(), "read 'x' instead of '7' at byte 7");
    }

    #[test]
    fn fault_display_mismatch_non_printable() {
        let f = Fault::Mismatch {
            position: 0,
            expected: b'0',
            actual: 0x00,
        };
        assert_eq!(f.to_string(), "read 0x00 instead of '0' at byte 0");
    }

    #[test]
    fn fault_display_device_unavailable() {
        let f = Fault::DeviceUnavailable {
            device: "/dev/ttyAMA3".into(),
            reason: "busy".into(),
        };
        assert_eq!(f.to_string(), "input device /dev/ttyAMA3 unavailable: busy");
    }

    #[test]
    fn fault_display_flush_failed() {
        let f = Fault::FlushFailed {
            device: "/dev/ttyAMA3".into(),
            reason: "tcflush failed".into(),
        };
        assert_eq!(
            f.to_string(),
            "failed to flush input device /dev/ttyAMA3: tcflush failed"
        );
    }
}

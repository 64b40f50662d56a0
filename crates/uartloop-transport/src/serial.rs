//! Serial port transport for loopback traffic.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for UART character devices, and [`SerialConnector`],
//! which opens them by path for the writer and the reader.
//!
//! The loopback tool opens the output device once per transfer and the
//! input device once per session. When both sides point at the same device
//! (a single UART with TX wired to RX), the port must not be held
//! exclusively, so exclusive access is released right after opening.
//!
//! # Example
//!
//! ```no_run
//! use uartloop_core::transport::{Access, Connector, Direction};
//! use uartloop_transport::SerialConnector;
//!
//! # async fn example() -> uartloop_core::Result<()> {
//! let connector = SerialConnector::with_baud_rate(115_200);
//! let mut port = connector.open("/dev/ttyAMA1", Access::Write).await?;
//! port.discard(Direction::Output).await?;
//! port.send(b"0123456789").await?;
//! port.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use uartloop_core::config::DEFAULT_BAUD_RATE;
use uartloop_core::error::{Error, Result};
use uartloop_core::transport::{Access, Connector, Direction, Transport};

fn clear_buffer(direction: Direction) -> ClearBuffer {
    match direction {
        Direction::Input => ClearBuffer::Input,
        Direction::Output => ClearBuffer::Output,
    }
}

/// One open handle on a serial device.
pub struct SerialTransport {
    /// The underlying serial port stream
    port: Option<SerialStream>,
    /// Device path for logging/debugging
    port_name: String,
    /// Which side of the loopback this handle serves
    access: Access,
}

impl SerialTransport {
    /// Open a serial device at `baud_rate`, 8N1, without flow control.
    ///
    /// A bare TX/RX loopback wire carries no handshake lines, so the line
    /// format is fixed and only the rate is configurable.
    pub async fn open(port: &str, access: Access, baud_rate: u32) -> Result<Self> {
        tracing::debug!(port = %port, access = ?access, baud_rate, "Opening serial device");

        #[allow(unused_mut)]
        let mut serial_stream = tokio_serial::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial device");
                Error::DeviceOpen {
                    device: port.to_string(),
                    reason: e.to_string(),
                }
            })?;

        // The reader keeps its handle open for the whole session while the
        // writer reopens the device per transfer. On a self-looped UART both
        // use the same path, so TIOCEXCL must not stay set.
        #[cfg(unix)]
        if let Err(e) = serial_stream.set_exclusive(false) {
            tracing::warn!(port = %port, error = %e, "Failed to release exclusive access");
        }

        tracing::debug!(port = %port, access = ?access, "Serial device opened");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
            access,
        })
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected
    {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), "Sending data");

        let mut written = 0;
        while written < data.len() {
            let n = port.write(&data[written..]).await.map_err(|e| {
                tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
                map_io_error(e)
            })?;
            if n == 0 {
                break;
            }
            written += n;
        }

        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial device");
            Error::Io(e)
        })?;

        Ok(written)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        let result = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, port.read(buf)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::trace!(
                        port = %self.port_name,
                        timeout_ms = timeout.as_millis(),
                        "Timeout waiting for data"
                    );
                    return Err(Error::Timeout);
                }
            },
            None => port.read(buf).await,
        };

        match result {
            Ok(0) if !buf.is_empty() => {
                tracing::warn!(port = %self.port_name, "End of stream on serial device");
                Err(Error::ConnectionLost)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
        }
    }

    async fn discard(&mut self, direction: Direction) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.clear(clear_buffer(direction)).map_err(|e| {
            Error::Transport(format!(
                "failed to discard {direction:?} buffer on {}: {e}",
                self.port_name
            ))
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if self.access == Access::Write {
                if let Err(e) = port.flush().await {
                    tracing::warn!(
                        port = %self.port_name,
                        error = %e,
                        "Failed to flush before closing (continuing anyway)"
                    );
                }
            }
            tracing::debug!(port = %self.port_name, access = ?self.access, "Serial device closed");
        }
        Ok(())
    }
}

/// Opens [`SerialTransport`] handles at one shared baud rate.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
}

impl SerialConnector {
    /// Create a connector that opens every device at `baud_rate`.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    /// The rate applied to every device this connector opens.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::with_baud_rate(DEFAULT_BAUD_RATE)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, device: &str, access: Access) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open(device, access, self.baud_rate).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_default_baud_rate() {
        assert_eq!(SerialConnector::default().baud_rate(), 115_200);
    }

    #[test]
    fn test_connector_with_baud_rate() {
        let connector = SerialConnector::with_baud_rate(9600);
        assert_eq!(connector.baud_rate(), 9600);
    }

    #[test]
    fn test_direction_conversion() {
        assert!(matches!(clear_buffer(Direction::Input), ClearBuffer::Input));
        assert!(matches!(clear_buffer(Direction::Output), ClearBuffer::Output));
    }

    #[tokio::test]
    async fn test_open_missing_device_is_device_open_error() {
        let connector = SerialConnector::default();
        let result = connector
            .open("/dev/uartloop-does-not-exist", Access::Read)
            .await;
        match result {
            Err(Error::DeviceOpen { device, .. }) => {
                assert_eq!(device, "/dev/uartloop-does-not-exist")
            }
            Err(other) => panic!("expected DeviceOpen, got {other}"),
            Ok(_) => panic!("expected DeviceOpen, got a transport"),
        }
    }
}

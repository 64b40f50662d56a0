// Command-line surface of the loopback tool.
//
// The short flags and their meaning follow the long-standing uart-loopback
// test utility so existing test scripts keep working; the long-only options
// at the bottom are opt-in additions.

use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;

use uartloop::{
    CompareMode, DEFAULT_BAUD_RATE, DEFAULT_INPUT_DEVICE, DEFAULT_OUTPUT_DEVICE, LoopbackBuilder,
};

/// Validate a UART loopback by writing a digit pattern to one serial device
/// and verifying it on another.
#[derive(Parser, Debug)]
#[command(name = "uart-loopback", version, about)]
pub struct Cli {
    /// Serial device to write out from.
    #[arg(short = 'o', long = "out", value_name = "DEVICE", default_value = DEFAULT_OUTPUT_DEVICE)]
    pub output: String,

    /// Serial device to read in from.
    #[arg(short = 'i', long = "in", value_name = "DEVICE", default_value = DEFAULT_INPUT_DEVICE)]
    pub input: String,

    /// Number of bytes to transfer (the maximum when auto-incrementing).
    #[arg(
        short = 's',
        long,
        value_name = "BYTES",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub size: u32,

    /// Display every byte written and read, as trace lines on stderr.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Display the test result regardless of the verbose setting.
    #[arg(short = 'r', long)]
    pub results: bool,

    /// Increase the transfer size from 1 up to the maximum transfer size.
    #[arg(short = 'a', long)]
    pub auto_increment: bool,

    /// Carry on with the test regardless of errors.
    #[arg(short = 'I', long)]
    pub ignore_errors: bool,

    /// Transfer the data one byte at a time.
    #[arg(short = 'b', long)]
    pub transfer_by_byte: bool,

    /// Remove the pause between automatic incremental transfers.
    #[arg(short = 'n', long)]
    pub no_delay: bool,

    /// Line rate applied to both devices (always 8N1, no flow control).
    #[arg(long, value_name = "BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Fail if a byte does not arrive within this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub read_timeout: Option<u64>,

    /// Fail if the input device is not ready within this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub ready_timeout: Option<u64>,

    /// Compare received bytes numerically, treating non-digits as 0.
    #[arg(long)]
    pub legacy_compare: bool,
}

impl Cli {
    /// Translate the parsed flags into a session builder.
    pub fn builder(&self) -> LoopbackBuilder {
        let mut builder = LoopbackBuilder::new()
            .output_device(&self.output)
            .input_device(&self.input)
            .transfer_size(self.size)
            .auto_increment(self.auto_increment)
            .transfer_by_byte(self.transfer_by_byte)
            .ignore_errors(self.ignore_errors)
            .no_delay(self.no_delay)
            .baud_rate(self.baud);

        if let Some(ms) = self.read_timeout {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.ready_timeout {
            builder = builder.ready_timeout(Duration::from_millis(ms));
        }
        if self.legacy_compare {
            builder = builder.compare(CompareMode::Legacy);
        }
        builder
    }

    /// Default log filter: warnings only, or the full per-byte trace when
    /// verbose. `RUST_LOG` overrides either.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "warn,uart_loopback=debug,uartloop=trace,uartloop_transport=debug"
        } else {
            "warn"
        }
    }
}

/// Exit status for a command line that did not parse: 0 for help and
/// version output, 1 for everything else.
pub fn parse_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

//! uartloop-core: Core traits, types, and error definitions for uartloop.
//!
//! This crate defines the device-agnostic pieces shared by every other
//! crate in the workspace. The writer and reader in `uartloop` depend only
//! on these types, never on a concrete serial backend.
//!
//! # Key types
//!
//! - [`Transport`] / [`Connector`] -- byte-level device handles and how to open them
//! - [`pattern`] -- the repeating digit pattern both sides agree on
//! - [`LoopbackConfig`] -- immutable session settings
//! - [`Error`] / [`Result`] / [`Fault`] -- error handling

pub mod config;
pub mod error;
pub mod pattern;
pub mod transport;

pub use config::{LoopbackConfig, SessionMode, WriteStrategy};
pub use error::{Error, Fault, Result};
pub use pattern::CompareMode;
pub use transport::{Access, Connector, Direction, Transport};

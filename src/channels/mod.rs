//! Channel abstraction for message I/O.

pub mod channel;
pub mod cli;
pub mod matrix;

pub use channel::*;
pub use cli::{CliChannel, CliClient};
pub use matrix::MatrixClient;

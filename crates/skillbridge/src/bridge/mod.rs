//! Wire layer between the optimizer and the simulator.
//!
//! # Architecture
//!
//! - **text**: `<len>\n<body>` frames from the simulator, raw expressions to it
//! - **codec**: 4-byte big-endian length + JSON framing codec
//! - **peer**: the codec applied to a split optimizer socket
//! - **protocol**: request/reply types carried inside JSON frames
//! - **transport**: UNIX or TCP listener for the single optimizer connection

pub mod codec;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod text;
pub mod transport;

pub use error::ChannelError;

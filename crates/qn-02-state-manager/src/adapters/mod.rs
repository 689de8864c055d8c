//! Adapters Layer
//!
//! - `framing`: 4-byte length-prefixed frames, blocking and async
//! - `client`: blocking `QuantumRegister` over the wire

pub mod client;
pub mod framing;

pub use client::{kill_server, KeySpace, StateManagerClient};
pub use framing::{read_frame, read_frame_async, write_frame, write_frame_async, MAX_FRAME_LEN};

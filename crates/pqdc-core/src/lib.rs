//! Core primitives shared by the pqdc protocol engine and harness.
//!
//! The surface is deliberately small: CBOR helpers for handshake payloads and a
//! length-prefixed framing layer that carries every handshake message and
//! protected record over a byte stream.

pub mod cbor;
pub mod frame;

pub use cbor::{from_slice as cbor_from_slice, to_vec as cbor_to_vec, Error as CborError};
pub use frame::{read_frame, write_frame, FrameError, FRAME_HEADER_LEN, FRAME_MAX_PAYLOAD};

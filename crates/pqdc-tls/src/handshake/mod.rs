//! Client and server handshake state machines.
//!
//! Flow, with bracketed steps only in hybrid mode:
//!
//! ```text
//! ClientHello(x25519, [mlkem pk], [dc schemes])  ->
//!                 <- ServerHello(x25519, [mlkem ct])
//!                 <- {EncryptedExtensions([mlkem pk])}
//!                 <- {Certificate(chain, [dc])}
//!                 <- {CertificateVerify}
//! [{KemCiphertext}] ->
//! {Finished}      ->
//!                 <- {Finished}
//! ```
//!
//! `{}` marks messages under handshake traffic keys.

pub(crate) mod client;
pub(crate) mod server;

use rand::{rngs::OsRng, RngCore};

use crate::messages::RANDOM_LEN;
use crate::schedule::SHA384_OUTPUT_LEN;

const CERTIFICATE_VERIFY_CONTEXT: &[u8] = b"pqdc server CertificateVerify";

macro_rules! expect_message {
    ($message:expr, $variant:ident) => {
        match $message {
            $crate::messages::HandshakeMessage::$variant(inner) => inner,
            other => {
                return Err($crate::error::TlsError::UnexpectedMessage {
                    expected: stringify!($variant),
                    got: other.name(),
                })
            }
        }
    };
}
pub(crate) use expect_message;

/// Content covered by the CertificateVerify signature.
pub(crate) fn certificate_verify_message(transcript_hash: &[u8; SHA384_OUTPUT_LEN]) -> Vec<u8> {
    let mut message = Vec::with_capacity(64 + CERTIFICATE_VERIFY_CONTEXT.len() + 1 + SHA384_OUTPUT_LEN);
    message.extend_from_slice(&[0x20; 64]);
    message.extend_from_slice(CERTIFICATE_VERIFY_CONTEXT);
    message.push(0x00);
    message.extend_from_slice(transcript_hash);
    message
}

pub(crate) fn random() -> [u8; RANDOM_LEN] {
    let mut out = [0u8; RANDOM_LEN];
    OsRng.fill_bytes(&mut out);
    out
}

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use pqdc_core::{cbor_from_slice, cbor_to_vec, read_frame, write_frame, FRAME_HEADER_LEN};
use std::{env, fmt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use zeroize::Zeroize;

use crate::error::TlsError;
use crate::messages::HandshakeMessage;
use crate::schedule::Transcript;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
cpufeatures::new!(aes_hw, "aes", "pclmulqdq");

const TAG_LEN: usize = 16;

/// Largest application payload sealed into a single record.
pub const MAX_RECORD_PLAINTEXT: usize = 16 * 1024;

pub(crate) const ALERT_CLOSE_NOTIFY: u8 = 0;

/// AEAD protecting records once the handshake secret is known. The key
/// schedule is SHA-384 for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherSuite {
    pub fn wire(self) -> u16 {
        match self {
            CipherSuite::Aes256Gcm => 0x1302,
            CipherSuite::ChaCha20Poly1305 => 0x1303,
        }
    }

    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            0x1302 => Some(CipherSuite::Aes256Gcm),
            0x1303 => Some(CipherSuite::ChaCha20Poly1305),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }

    /// Local preference order: AES-GCM first when the CPU accelerates it.
    /// `PQDC_CIPHER=aes|chacha` pins a single suite.
    pub fn preferred() -> Vec<CipherSuite> {
        match env::var("PQDC_CIPHER").ok().as_deref() {
            Some("aes") => return vec![CipherSuite::Aes256Gcm],
            Some("chacha") => return vec![CipherSuite::ChaCha20Poly1305],
            _ => {}
        }
        if supports_aes_gcm() {
            vec![CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305]
        } else {
            vec![CipherSuite::ChaCha20Poly1305, CipherSuite::Aes256Gcm]
        }
    }
}

fn supports_aes_gcm() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        aes_hw::get()
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// Inner content type carried inside every protected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    fn byte(self) -> u8 {
        match self {
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
        }
    }

    fn from_byte(value: u8) -> Option<Self> {
        match value {
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("nonce space exhausted")]
    NonceExhausted,
    #[error("failed to seal record")]
    Encrypt,
    #[error("record failed authentication")]
    Decrypt,
    #[error("record carried unknown content type {0}")]
    UnknownContentType(u8),
    #[error("record carried no content type")]
    Empty,
}

/// Symmetric keys and IVs for one direction pair.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct SessionKeySet {
    pub send_key: [u8; 32],
    pub send_iv: [u8; 12],
    pub recv_key: [u8; 32],
    pub recv_iv: [u8; 12],
}

enum AeadImpl {
    ChaCha(ChaCha20Poly1305),
    Aes(Box<Aes256Gcm>),
}

impl AeadImpl {
    fn new(suite: CipherSuite, key: &[u8; 32]) -> Self {
        match suite {
            CipherSuite::Aes256Gcm => {
                AeadImpl::Aes(Box::new(Aes256Gcm::new(GenericArray::from_slice(key))))
            }
            CipherSuite::ChaCha20Poly1305 => {
                AeadImpl::ChaCha(ChaCha20Poly1305::new(ChaChaKey::from_slice(key)))
            }
        }
    }

    fn encrypt(&self, nonce: &[u8; 12], payload: Payload<'_, '_>) -> Result<Vec<u8>, RecordError> {
        match self {
            AeadImpl::ChaCha(cipher) => cipher
                .encrypt(ChaChaNonce::from_slice(nonce), payload)
                .map_err(|_| RecordError::Encrypt),
            AeadImpl::Aes(cipher) => cipher
                .encrypt(GenericArray::from_slice(nonce), payload)
                .map_err(|_| RecordError::Encrypt),
        }
    }

    fn decrypt(&self, nonce: &[u8; 12], payload: Payload<'_, '_>) -> Result<Vec<u8>, RecordError> {
        match self {
            AeadImpl::ChaCha(cipher) => cipher
                .decrypt(ChaChaNonce::from_slice(nonce), payload)
                .map_err(|_| RecordError::Decrypt),
            AeadImpl::Aes(cipher) => cipher
                .decrypt(GenericArray::from_slice(nonce), payload)
                .map_err(|_| RecordError::Decrypt),
        }
    }
}

/// Stateful AEAD context for one key stage. Each record is sealed with a
/// counter nonce and authenticates its own frame header.
pub struct RecordProtection {
    suite: CipherSuite,
    send_aead: AeadImpl,
    recv_aead: AeadImpl,
    send_iv: [u8; 12],
    recv_iv: [u8; 12],
    send_counter: u64,
    recv_counter: u64,
}

impl fmt::Debug for RecordProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordProtection")
            .field("suite", &self.suite.label())
            .field("send_counter", &self.send_counter)
            .field("recv_counter", &self.recv_counter)
            .finish()
    }
}

impl RecordProtection {
    pub fn new(suite: CipherSuite, keys: SessionKeySet) -> Self {
        Self {
            suite,
            send_aead: AeadImpl::new(suite, &keys.send_key),
            recv_aead: AeadImpl::new(suite, &keys.recv_key),
            send_iv: keys.send_iv,
            recv_iv: keys.recv_iv,
            send_counter: 0,
            recv_counter: 0,
        }
    }

    pub fn seal(&mut self, content_type: ContentType, payload: &[u8]) -> Result<Vec<u8>, RecordError> {
        let mut inner = Vec::with_capacity(payload.len() + 1);
        inner.extend_from_slice(payload);
        inner.push(content_type.byte());
        let aad = record_header(inner.len() + TAG_LEN);

        let nonce = compose_nonce(&self.send_iv, self.send_counter);
        let sealed = self.send_aead.encrypt(
            &nonce,
            Payload {
                msg: &inner,
                aad: &aad,
            },
        );
        inner.zeroize();
        let sealed = sealed?;
        self.send_counter = self
            .send_counter
            .checked_add(1)
            .ok_or(RecordError::NonceExhausted)?;
        Ok(sealed)
    }

    pub fn open(&mut self, record: &[u8]) -> Result<(ContentType, Vec<u8>), RecordError> {
        let aad = record_header(record.len());
        let nonce = compose_nonce(&self.recv_iv, self.recv_counter);
        let mut inner = self.recv_aead.decrypt(
            &nonce,
            Payload {
                msg: record,
                aad: &aad,
            },
        )?;
        self.recv_counter = self
            .recv_counter
            .checked_add(1)
            .ok_or(RecordError::NonceExhausted)?;

        let type_byte = inner.pop().ok_or(RecordError::Empty)?;
        let content_type =
            ContentType::from_byte(type_byte).ok_or(RecordError::UnknownContentType(type_byte))?;
        Ok((content_type, inner))
    }
}

impl Drop for RecordProtection {
    fn drop(&mut self) {
        self.send_iv.zeroize();
        self.recv_iv.zeroize();
    }
}

fn record_header(len: usize) -> [u8; FRAME_HEADER_LEN] {
    (len as u32).to_be_bytes()
}

fn compose_nonce(iv: &[u8; 12], counter: u64) -> [u8; 12] {
    let mut nonce = *iv;
    for (idx, byte) in counter.to_be_bytes().iter().enumerate() {
        nonce[4 + idx] ^= byte;
    }
    nonce
}

/// Framed transport plus the protection stage currently in force. Before the
/// first [`RecordLayer::install`] frames carry plaintext handshake messages.
#[derive(Debug)]
pub(crate) struct RecordLayer<S> {
    io: S,
    protection: Option<RecordProtection>,
}

impl<S> RecordLayer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: S) -> Self {
        Self {
            io,
            protection: None,
        }
    }

    pub(crate) fn install(&mut self, protection: RecordProtection) {
        self.protection = Some(protection);
    }

    pub(crate) fn io(&self) -> &S {
        &self.io
    }

    pub(crate) fn io_mut(&mut self) -> &mut S {
        &mut self.io
    }

    pub(crate) async fn write_record(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<(), TlsError> {
        match self.protection.as_mut() {
            Some(protection) => {
                let sealed = protection.seal(content_type, payload)?;
                write_frame(&mut self.io, &sealed).await?;
            }
            None if content_type == ContentType::Handshake => {
                write_frame(&mut self.io, payload).await?;
            }
            None => return Err(TlsError::HandshakeIncomplete),
        }
        Ok(())
    }

    pub(crate) async fn read_record(&mut self) -> Result<(ContentType, Vec<u8>), TlsError> {
        let frame = read_frame(&mut self.io).await?;
        match self.protection.as_mut() {
            Some(protection) => Ok(protection.open(&frame)?),
            None => Ok((ContentType::Handshake, frame)),
        }
    }

    /// Encode, hash into the transcript, and send a handshake message.
    pub(crate) async fn send_handshake(
        &mut self,
        message: &HandshakeMessage,
        transcript: &mut Transcript,
    ) -> Result<(), TlsError> {
        let encoded = cbor_to_vec(message)?;
        transcript.update(&encoded);
        self.write_record(ContentType::Handshake, &encoded).await
    }

    /// Receive the next handshake message and hash it into the transcript.
    pub(crate) async fn recv_handshake(
        &mut self,
        transcript: &mut Transcript,
    ) -> Result<HandshakeMessage, TlsError> {
        let (content_type, payload) = self.read_record().await?;
        match content_type {
            ContentType::Handshake => {
                let message = cbor_from_slice(&payload)?;
                transcript.update(&payload);
                Ok(message)
            }
            ContentType::Alert => Err(TlsError::Alert(payload.first().copied().unwrap_or(u8::MAX))),
            ContentType::ApplicationData => Err(TlsError::UnexpectedMessage {
                expected: "handshake",
                got: "application data",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirrored(suite: CipherSuite) -> (RecordProtection, RecordProtection) {
        let keys = SessionKeySet {
            send_key: [1u8; 32],
            send_iv: [2u8; 12],
            recv_key: [3u8; 32],
            recv_iv: [4u8; 12],
        };
        let peer = SessionKeySet {
            send_key: keys.recv_key,
            send_iv: keys.recv_iv,
            recv_key: keys.send_key,
            recv_iv: keys.send_iv,
        };
        (RecordProtection::new(suite, keys), RecordProtection::new(suite, peer))
    }

    #[test]
    fn content_type_survives_sealing() {
        for suite in [CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305] {
            let (mut sender, mut receiver) = mirrored(suite);
            let record = sender
                .seal(ContentType::ApplicationData, b"hello, server")
                .expect("seal");
            let (content_type, plain) = receiver.open(&record).expect("open");
            assert_eq!(content_type, ContentType::ApplicationData);
            assert_eq!(plain, b"hello, server");
        }
    }

    #[test]
    fn replayed_record_fails_authentication() {
        let (mut sender, mut receiver) = mirrored(CipherSuite::ChaCha20Poly1305);
        let record = sender.seal(ContentType::Handshake, b"finished").expect("seal");
        receiver.open(&record).expect("first open");
        assert!(matches!(receiver.open(&record), Err(RecordError::Decrypt)));
    }
}

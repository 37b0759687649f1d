use serde::{Deserialize, Serialize};

pub(crate) const RANDOM_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ClientHello {
    pub random: [u8; RANDOM_LEN],
    pub versions: Vec<u16>,
    pub cipher_suites: Vec<u16>,
    pub x25519_share: Vec<u8>,
    /// ML-KEM-768 public key; present only when the client wants the hybrid
    /// exchange.
    pub mlkem_share: Option<Vec<u8>>,
    /// Signature schemes the client accepts in a delegated credential. Absent
    /// when the client does not support delegated credentials at all.
    pub delegated_credential_schemes: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ServerHello {
    pub random: [u8; RANDOM_LEN],
    pub version: u16,
    pub cipher_suite: u16,
    pub x25519_share: Vec<u8>,
    pub kem_ciphertext: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EncryptedExtensions {
    pub hybrid_kem: bool,
    /// Ephemeral ML-KEM key the client encapsulates to before Finished.
    pub kem_public: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CertificateMessage {
    pub chain: Vec<Vec<u8>>,
    pub delegated_credential: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CertificateVerify {
    pub scheme: u16,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KemCiphertext {
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Finished {
    pub verify_data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    EncryptedExtensions(EncryptedExtensions),
    Certificate(CertificateMessage),
    CertificateVerify(CertificateVerify),
    KemCiphertext(KemCiphertext),
    Finished(Finished),
}

impl HandshakeMessage {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            HandshakeMessage::ClientHello(_) => "ClientHello",
            HandshakeMessage::ServerHello(_) => "ServerHello",
            HandshakeMessage::EncryptedExtensions(_) => "EncryptedExtensions",
            HandshakeMessage::Certificate(_) => "Certificate",
            HandshakeMessage::CertificateVerify(_) => "CertificateVerify",
            HandshakeMessage::KemCiphertext(_) => "KemCiphertext",
            HandshakeMessage::Finished(_) => "Finished",
        }
    }
}

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use pqdc_tls::{
    CertificateError, CertifiedKey, CipherSuite, Config, CredentialError, DelegatedCredential,
    HandshakeEvent, HandshakeEventSink, HandshakePhase, ProtocolVersion, Role, SignatureScheme,
    TlsError, TlsStream, TrustStore, MAX_TTL,
};
use tokio::io::DuplexStream;

const SELF_SIGNED_CERT: &str =
    include_str!("../../pqdc-harness/fixtures/delegator-self-signed.crt.pem");
const SELF_SIGNED_KEY: &str =
    include_str!("../../pqdc-harness/fixtures/delegator-self-signed.key.pem");
const DELEGATOR_CERT: &str = include_str!("../../pqdc-harness/fixtures/delegator.crt.pem");
const DELEGATOR_KEY: &str = include_str!("../../pqdc-harness/fixtures/delegator.key.pem");
const ROOT_CERT: &str = include_str!("../../pqdc-harness/fixtures/root.crt.pem");
const ROOT_KEY: &str = include_str!("../../pqdc-harness/fixtures/root.key.pem");

type Outcome = (
    Result<TlsStream<DuplexStream>, TlsError>,
    Result<TlsStream<DuplexStream>, TlsError>,
);

fn self_signed() -> CertifiedKey {
    CertifiedKey::from_pem(SELF_SIGNED_CERT, SELF_SIGNED_KEY).expect("self-signed fixture")
}

fn delegator() -> CertifiedKey {
    CertifiedKey::from_pem(DELEGATOR_CERT, DELEGATOR_KEY).expect("delegator fixture")
}

/// Validity that leaves `remaining` of lifetime from now.
fn remaining(cert: &CertifiedKey, remaining: Duration) -> Duration {
    SystemTime::now()
        .duration_since(cert.info().not_before)
        .expect("fixture not_before is in the past")
        + remaining
}

fn with_credential(cert: CertifiedKey, scheme: SignatureScheme, validity: Duration) -> CertifiedKey {
    let pair = DelegatedCredential::issue(&cert, scheme, validity).expect("issue credential");
    cert.with_delegated_credential(pair)
}

fn server(cert: CertifiedKey) -> Config {
    Config::default()
        .with_versions(ProtocolVersion::Tls10, ProtocolVersion::Tls13)
        .with_certificate(cert)
}

fn client() -> Config {
    Config::default()
        .with_versions(ProtocolVersion::Tls10, ProtocolVersion::Tls13)
        .with_insecure_skip_verify(true)
        .with_delegated_credentials(true)
}

async fn handshake(client: Config, server: Config) -> Outcome {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::join!(
        TlsStream::connect(client_io, Arc::new(client)),
        TlsStream::accept(server_io, Arc::new(server)),
    )
}

#[tokio::test]
async fn ecdsa_delegated_credential_is_verified_and_carries_data() {
    let cert = self_signed();
    let validity = remaining(&cert, Duration::from_secs(24 * 60 * 60));
    let cert = with_credential(cert, SignatureScheme::EcdsaP256Sha256, validity);

    let (client, server) = handshake(client(), server(cert)).await;
    let mut client = client.expect("client handshake");
    let mut server = server.expect("server handshake");

    let state = client.connection_state();
    assert!(state.verified_delegated_credential);
    assert!(!state.did_hybrid_kem);
    assert_eq!(state.version, ProtocolVersion::Tls13);
    assert_eq!(state.signature_scheme, SignatureScheme::EcdsaP256Sha256);
    assert_eq!(state.peer_certificates.len(), 1);
    assert!(!server.connection_state().verified_delegated_credential);

    client.write_all(b"hello, server").await.expect("client write");
    let mut buf = [0u8; 13];
    server.read_exact(&mut buf).await.expect("server read");
    assert_eq!(&buf, b"hello, server");

    server.write_all(b"hello, client").await.expect("server write");
    client.read_exact(&mut buf).await.expect("client read");
    assert_eq!(&buf, b"hello, client");

    client.close().await.expect("client close");
    let mut tail = [0u8; 1];
    assert_eq!(server.read(&mut tail).await.expect("close_notify"), 0);
}

#[tokio::test]
async fn hybrid_handshake_with_mldsa_credential() {
    let cert = delegator();
    let validity = remaining(&cert, Duration::from_secs(24 * 60 * 60));
    let cert = with_credential(cert, SignatureScheme::MlDsa65, validity);

    let (client, server) = handshake(
        client().with_post_quantum(true),
        server(cert).with_post_quantum(true),
    )
    .await;
    let client = client.expect("client handshake");
    let server = server.expect("server handshake");

    assert!(client.connection_state().verified_delegated_credential);
    assert_eq!(
        client.connection_state().signature_scheme,
        SignatureScheme::MlDsa65
    );
    assert!(client.connection_state().did_hybrid_kem);
    assert!(server.connection_state().did_hybrid_kem);
}

#[tokio::test]
async fn one_sided_post_quantum_falls_back_to_classical() {
    for (client_pq, server_pq) in [(true, false), (false, true)] {
        let (client, server) = handshake(
            client().with_post_quantum(client_pq),
            server(self_signed()).with_post_quantum(server_pq),
        )
        .await;
        let client = client.expect("client handshake");
        let server = server.expect("server handshake");
        assert!(!client.connection_state().did_hybrid_kem);
        assert!(!server.connection_state().did_hybrid_kem);
    }
}

#[tokio::test]
async fn client_without_support_gets_certificate_signature() {
    let cert = self_signed();
    let validity = remaining(&cert, MAX_TTL);
    let cert = with_credential(cert, SignatureScheme::EcdsaP256Sha256, validity);

    let (client, server) = handshake(client().with_delegated_credentials(false), server(cert)).await;
    let client = client.expect("client handshake");
    server.expect("server handshake");
    assert!(!client.connection_state().verified_delegated_credential);
}

#[tokio::test]
async fn expired_credential_is_not_offered() {
    let cert = with_credential(self_signed(), SignatureScheme::EcdsaP256Sha256, Duration::ZERO);

    let (client, server) = handshake(client(), server(cert)).await;
    let client = client.expect("client handshake");
    server.expect("server handshake");
    assert!(!client.connection_state().verified_delegated_credential);
}

#[tokio::test]
async fn unadvertised_scheme_is_not_offered() {
    let cert = self_signed();
    let validity = remaining(&cert, Duration::from_secs(3600));
    let cert = with_credential(cert, SignatureScheme::MlDsa65, validity);

    let (client, server) = handshake(
        client().with_delegated_credential_schemes([SignatureScheme::EcdsaP256Sha256]),
        server(cert),
    )
    .await;
    let client = client.expect("client handshake");
    server.expect("server handshake");
    assert!(!client.connection_state().verified_delegated_credential);
    assert_eq!(
        client.connection_state().signature_scheme,
        SignatureScheme::EcdsaP256Sha256
    );
}

#[tokio::test]
async fn credential_outliving_max_ttl_is_rejected() {
    let cert = self_signed();
    let validity = remaining(&cert, MAX_TTL + Duration::from_secs(3600));
    let cert = with_credential(cert, SignatureScheme::EcdsaP256Sha256, validity);

    let (client, _server) = handshake(client(), server(cert)).await;
    let err = client.expect_err("client must reject");
    assert!(matches!(
        err,
        TlsError::InvalidDelegatedCredential(CredentialError::TtlExceeded { .. })
    ));
}

#[tokio::test]
async fn credential_from_another_leaf_is_rejected() {
    let cert = delegator();
    let validity = remaining(&cert, Duration::from_secs(3600));
    let pair = DelegatedCredential::issue(&self_signed(), SignatureScheme::EcdsaP256Sha256, validity)
        .expect("issue");
    let cert = cert.with_delegated_credential(pair);

    let (client, _server) = handshake(client(), server(cert)).await;
    let err = client.expect_err("client must reject");
    assert!(matches!(
        err,
        TlsError::InvalidDelegatedCredential(CredentialError::Signature(_))
    ));
}

#[tokio::test]
async fn root_certificate_cannot_delegate() {
    let root = CertifiedKey::from_pem(ROOT_CERT, ROOT_KEY).expect("root fixture");
    let err = DelegatedCredential::issue(&root, SignatureScheme::EcdsaP256Sha256, MAX_TTL)
        .expect_err("root lacks DelegationUsage");
    assert!(matches!(err, CredentialError::NotDelegable));
}

#[tokio::test]
async fn legacy_only_client_is_refused() {
    let (client, server) = handshake(
        client().with_versions(ProtocolVersion::Tls10, ProtocolVersion::Tls12),
        server(self_signed()),
    )
    .await;
    assert!(matches!(
        server.expect_err("server refuses"),
        TlsError::UnsupportedVersion(ProtocolVersion::Tls12)
    ));
    assert!(client.is_err());

    let (_, server) = handshake(
        self::client().with_versions(ProtocolVersion::Tls10, ProtocolVersion::Tls11),
        self::server(self_signed()).with_versions(ProtocolVersion::Tls12, ProtocolVersion::Tls13),
    )
    .await;
    assert!(matches!(
        server.expect_err("no overlap"),
        TlsError::NoCommonVersion
    ));
}

#[tokio::test]
async fn pinned_leaf_verifies_inside_its_validity_window() {
    let cert = self_signed();
    let leaf = cert.leaf_der().to_vec();
    let inside = cert.info().not_before + Duration::from_secs(30 * 24 * 60 * 60);

    let pinned = Config::default()
        .with_root_certificates(TrustStore::new().with_root(leaf))
        .with_time(inside);
    let (client, server) = handshake(pinned, server(cert.clone()).with_time(inside)).await;
    client.expect("pinned leaf accepted");
    server.expect("server handshake");

    let root = CertifiedKey::from_pem(ROOT_CERT, ROOT_KEY).expect("root fixture");
    let wrong_root = Config::default()
        .with_root_certificates(TrustStore::new().with_root(root.leaf_der().to_vec()))
        .with_time(inside);
    let (client, _) = handshake(wrong_root, self::server(cert)).await;
    assert!(matches!(
        client.expect_err("unrelated root"),
        TlsError::Certificate(CertificateError::UnknownIssuer { .. })
    ));
}

#[tokio::test]
async fn pinned_cipher_suite_is_negotiated() {
    for suite in [CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305] {
        let (client, server) = handshake(
            client().with_cipher_suites([suite]),
            server(self_signed())
                .with_cipher_suites([CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305]),
        )
        .await;
        let client = client.expect("client handshake");
        let server = server.expect("server handshake");
        assert_eq!(client.connection_state().cipher_suite, suite);
        assert_eq!(server.connection_state().cipher_suite, suite);
    }
}

#[tokio::test]
async fn disjoint_cipher_suites_fail() {
    let (client, server) = handshake(
        client().with_cipher_suites([CipherSuite::Aes256Gcm]),
        server(self_signed()).with_cipher_suites([CipherSuite::ChaCha20Poly1305]),
    )
    .await;
    assert!(matches!(
        server.expect_err("no common suite"),
        TlsError::NoCommonCipherSuite
    ));
    assert!(client.expect_err("server hung up").is_peer_hang_up());
}

#[derive(Debug, Default)]
struct RecordingSink {
    events: Mutex<Vec<HandshakeEvent>>,
}

impl HandshakeEventSink for RecordingSink {
    fn on_event(&self, event: &HandshakeEvent) {
        self.events.lock().expect("sink mutex").push(*event);
    }
}

#[tokio::test]
async fn every_expected_phase_is_reported_in_order() {
    let sink = Arc::new(RecordingSink::default());
    let (client, server) = handshake(
        client()
            .with_post_quantum(true)
            .with_event_sink(sink.clone()),
        server(self_signed())
            .with_post_quantum(true)
            .with_event_sink(sink.clone()),
    )
    .await;
    client.expect("client handshake");
    server.expect("server handshake");

    let events = sink.events.lock().expect("sink mutex").clone();
    for role in [Role::Client, Role::Server] {
        let reported: Vec<HandshakePhase> = events
            .iter()
            .filter(|event| event.role == role)
            .map(|event| event.phase)
            .collect();
        assert_eq!(reported, HandshakePhase::expected(role, true), "{role} phases");
    }
}

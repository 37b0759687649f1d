use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{certificate_verify_message, expect_message, random};
use crate::certificate::{CertificateError, CertificateInfo};
use crate::config::Config;
use crate::credential::DelegatedCredential;
use crate::error::TlsError;
use crate::events::{HandshakePhase, Role};
use crate::kem::{KemProvider, MlKem768, X25519Share};
use crate::messages::{ClientHello, Finished, HandshakeMessage, KemCiphertext};
use crate::record::{CipherSuite, RecordLayer, RecordProtection};
use crate::schedule::{self, Transcript};
use crate::scheme::SignatureScheme;
use crate::stream::ConnectionState;
use crate::version::ProtocolVersion;

pub(crate) async fn run<S>(
    layer: &mut RecordLayer<S>,
    config: &Config,
) -> Result<ConnectionState, TlsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let versions = ProtocolVersion::range(config.min_version, config.max_version);
    if versions.is_empty() {
        return Err(TlsError::NoCommonVersion);
    }
    let now = config.now();
    let kem = MlKem768;
    let mut transcript = Transcript::new();

    let x25519 = X25519Share::generate();
    let mlkem = config.post_quantum.then(|| kem.generate_keypair());
    let hello = ClientHello {
        random: random(),
        versions: versions.iter().map(|version| version.wire()).collect(),
        cipher_suites: config.cipher_suites.iter().map(|suite| suite.wire()).collect(),
        x25519_share: x25519.public().to_vec(),
        mlkem_share: mlkem.as_ref().map(|(public, _)| public.clone()),
        delegated_credential_schemes: config.support_delegated_credential.then(|| {
            config
                .delegated_credential_schemes
                .iter()
                .map(|scheme| scheme.wire())
                .collect()
        }),
    };
    layer
        .send_handshake(&HandshakeMessage::ClientHello(hello), &mut transcript)
        .await?;
    config.emit(Role::Client, HandshakePhase::WriteClientHello);

    let server_hello = expect_message!(layer.recv_handshake(&mut transcript).await?, ServerHello);
    let version = ProtocolVersion::from_wire(server_hello.version)
        .filter(|version| versions.contains(version))
        .ok_or(TlsError::IllegalParameter("server selected a version that was not offered"))?;
    if version != ProtocolVersion::Tls13 {
        return Err(TlsError::UnsupportedVersion(version));
    }
    let suite = CipherSuite::from_wire(server_hello.cipher_suite)
        .filter(|suite| config.cipher_suites.contains(suite))
        .ok_or(TlsError::IllegalParameter("server selected a cipher suite that was not offered"))?;
    let mut shared = x25519.agree(&server_hello.x25519_share)?;
    config.emit(Role::Client, HandshakePhase::ProcessServerHello);

    let hybrid = match (server_hello.kem_ciphertext.as_deref(), mlkem.as_ref()) {
        (Some(ciphertext), Some((_, secret))) => {
            let kem_shared = kem.decapsulate(ciphertext, secret)?;
            shared.extend_from_slice(&kem_shared);
            config.emit(Role::Client, HandshakePhase::ReadKemCiphertext);
            true
        }
        (Some(_), None) => {
            return Err(TlsError::IllegalParameter("KEM ciphertext without a KEM key share"))
        }
        (None, _) => false,
    };

    let handshake = schedule::derive_handshake(&shared, &transcript.current_hash())?;
    layer.install(RecordProtection::new(
        suite,
        handshake.traffic.for_role(Role::Client),
    ));

    let extensions = expect_message!(
        layer.recv_handshake(&mut transcript).await?,
        EncryptedExtensions
    );
    if extensions.hybrid_kem != hybrid || extensions.kem_public.is_some() != hybrid {
        return Err(TlsError::IllegalParameter("hybrid negotiation mismatch"));
    }
    config.emit(Role::Client, HandshakePhase::ReadEncryptedExtensions);

    let certificate = expect_message!(layer.recv_handshake(&mut transcript).await?, Certificate);
    let leaf_der = certificate
        .chain
        .first()
        .ok_or(CertificateError::EmptyChain)?;
    let leaf = if config.insecure_skip_verify {
        CertificateInfo::parse(leaf_der)?
    } else {
        config.root_certificates.verify_chain(&certificate.chain, now)?
    };
    let delegated = match certificate.delegated_credential.as_deref() {
        Some(_) if !config.support_delegated_credential => {
            return Err(TlsError::UnsolicitedDelegatedCredential)
        }
        Some(encoded) => {
            let credential = DelegatedCredential::unmarshal(encoded)
                .map_err(TlsError::InvalidDelegatedCredential)?;
            if let Err(err) =
                credential.verify(leaf_der, &leaf, now, &config.delegated_credential_schemes)
            {
                warn!(target: "pqdc::tls::client", error = %err, "rejecting delegated credential");
                return Err(TlsError::InvalidDelegatedCredential(err));
            }
            Some(credential)
        }
        None => None,
    };
    config.emit(Role::Client, HandshakePhase::ReadCertificate);

    let signed_hash = transcript.current_hash();
    let verify = expect_message!(
        layer.recv_handshake(&mut transcript).await?,
        CertificateVerify
    );
    let scheme = SignatureScheme::from_wire(verify.scheme)?;
    let (expected_scheme, public_key) = match &delegated {
        Some(credential) => (
            credential.expected_cert_verify_algorithm,
            credential.public_key.as_slice(),
        ),
        None => (leaf.signature_scheme()?, leaf.public_key.as_slice()),
    };
    if scheme != expected_scheme {
        return Err(TlsError::IllegalParameter(
            "CertificateVerify scheme does not match the authenticating key",
        ));
    }
    scheme.verify(
        public_key,
        &certificate_verify_message(&signed_hash),
        &verify.signature,
    )?;
    config.emit(Role::Client, HandshakePhase::ReadCertificateVerify);

    let auth_shared: Option<Zeroizing<Vec<u8>>> = match extensions.kem_public.as_deref() {
        Some(server_public) => {
            let (ciphertext, kem_shared) = kem.encapsulate(server_public)?;
            layer
                .send_handshake(
                    &HandshakeMessage::KemCiphertext(KemCiphertext { ciphertext }),
                    &mut transcript,
                )
                .await?;
            config.emit(Role::Client, HandshakePhase::WriteKemCiphertext);
            Some(kem_shared)
        }
        None => None,
    };

    let master = schedule::derive_master(
        &handshake,
        auth_shared.as_ref().map(|secret| secret.as_slice()),
        &transcript.current_hash(),
    )?;
    let verify_data =
        schedule::finished_mac(master.finished_key(Role::Client), &transcript.current_hash())?;
    layer
        .send_handshake(
            &HandshakeMessage::Finished(Finished { verify_data }),
            &mut transcript,
        )
        .await?;
    config.emit(Role::Client, HandshakePhase::WriteClientFinished);

    let expected =
        schedule::finished_mac(master.finished_key(Role::Server), &transcript.current_hash())?;
    let finished = expect_message!(layer.recv_handshake(&mut transcript).await?, Finished);
    schedule::verify_finished(&expected, &finished.verify_data)?;
    config.emit(Role::Client, HandshakePhase::ReadServerFinished);

    layer.install(RecordProtection::new(
        suite,
        master.traffic.for_role(Role::Client),
    ));

    let verified_delegated_credential = delegated.is_some();
    let kem_label = if hybrid { kem.name() } else { "none" };
    debug!(
        target: "pqdc::tls::client",
        %version,
        suite = suite.label(),
        %scheme,
        hybrid,
        kem = kem_label,
        delegated_credential = verified_delegated_credential,
        "client handshake complete"
    );

    Ok(ConnectionState {
        version,
        cipher_suite: suite,
        signature_scheme: scheme,
        verified_delegated_credential,
        did_hybrid_kem: hybrid,
        peer_certificates: certificate.chain,
        handshake_complete: true,
    })
}

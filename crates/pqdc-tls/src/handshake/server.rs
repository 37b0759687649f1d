use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{certificate_verify_message, expect_message, random};
use crate::config::Config;
use crate::credential::select_delegated_credential;
use crate::error::TlsError;
use crate::events::{HandshakePhase, Role};
use crate::kem::{KemProvider, MlKem768, X25519Share};
use crate::messages::{
    CertificateMessage, CertificateVerify, EncryptedExtensions, Finished, HandshakeMessage,
    ServerHello,
};
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
    let certified = config.certificates.first().ok_or(TlsError::NoCertificate)?;
    let kem = MlKem768;
    let mut transcript = Transcript::new();

    let hello = expect_message!(layer.recv_handshake(&mut transcript).await?, ClientHello);
    let version = ProtocolVersion::negotiate(&hello.versions, config.min_version, config.max_version)
        .ok_or(TlsError::NoCommonVersion)?;
    if version != ProtocolVersion::Tls13 {
        return Err(TlsError::UnsupportedVersion(version));
    }
    let suite = hello
        .cipher_suites
        .iter()
        .filter_map(|wire| CipherSuite::from_wire(*wire))
        .find(|suite| config.cipher_suites.contains(suite))
        .ok_or(TlsError::NoCommonCipherSuite)?;
    let hybrid = config.post_quantum && hello.mlkem_share.is_some();
    let offered_schemes: Option<Vec<SignatureScheme>> =
        hello.delegated_credential_schemes.as_ref().map(|schemes| {
            schemes
                .iter()
                .filter_map(|wire| SignatureScheme::from_wire(*wire).ok())
                .collect()
        });
    config.emit(Role::Server, HandshakePhase::ProcessClientHello);

    let x25519 = X25519Share::generate();
    let x25519_share = x25519.public().to_vec();
    let mut shared = x25519.agree(&hello.x25519_share)?;
    let kem_ciphertext = match hello.mlkem_share.as_deref() {
        Some(client_public) if hybrid => {
            let (ciphertext, kem_shared) = kem.encapsulate(client_public)?;
            shared.extend_from_slice(&kem_shared);
            Some(ciphertext)
        }
        _ => None,
    };
    let server_hello = ServerHello {
        random: random(),
        version: version.wire(),
        cipher_suite: suite.wire(),
        x25519_share,
        kem_ciphertext,
    };
    layer
        .send_handshake(&HandshakeMessage::ServerHello(server_hello), &mut transcript)
        .await?;
    config.emit(Role::Server, HandshakePhase::WriteServerHello);
    if hybrid {
        config.emit(Role::Server, HandshakePhase::WriteKemCiphertext);
    }

    let handshake = schedule::derive_handshake(&shared, &transcript.current_hash())?;
    layer.install(RecordProtection::new(
        suite,
        handshake.traffic.for_role(Role::Server),
    ));

    let auth_kem = hybrid.then(|| kem.generate_keypair());
    let extensions = EncryptedExtensions {
        hybrid_kem: hybrid,
        kem_public: auth_kem.as_ref().map(|(public, _)| public.clone()),
    };
    layer
        .send_handshake(
            &HandshakeMessage::EncryptedExtensions(extensions),
            &mut transcript,
        )
        .await?;
    config.emit(Role::Server, HandshakePhase::WriteEncryptedExtensions);

    let delegated = offered_schemes.as_deref().and_then(|offered| {
        select_delegated_credential(
            certified.delegated_credentials(),
            certified.info(),
            offered,
            config.now(),
        )
    });
    if offered_schemes.is_some() && delegated.is_none() && !certified.delegated_credentials().is_empty() {
        debug!(
            target: "pqdc::tls::server",
            "no usable delegated credential for this client; signing with the certificate key"
        );
    }
    let certificate = CertificateMessage {
        chain: certified.chain().to_vec(),
        delegated_credential: delegated
            .map(|pair| pair.credential.marshal())
            .transpose()
            .map_err(TlsError::InvalidDelegatedCredential)?,
    };
    layer
        .send_handshake(&HandshakeMessage::Certificate(certificate), &mut transcript)
        .await?;
    config.emit(Role::Server, HandshakePhase::WriteCertificate);

    let signer = match delegated {
        Some(pair) => &pair.private_key,
        None => certified.signing_key(),
    };
    let scheme = signer.scheme();
    let signature = signer.sign(&certificate_verify_message(&transcript.current_hash()))?;
    layer
        .send_handshake(
            &HandshakeMessage::CertificateVerify(CertificateVerify {
                scheme: scheme.wire(),
                signature,
            }),
            &mut transcript,
        )
        .await?;
    config.emit(Role::Server, HandshakePhase::WriteCertificateVerify);

    let auth_shared = match auth_kem.as_ref() {
        Some((_, secret)) => {
            let message =
                expect_message!(layer.recv_handshake(&mut transcript).await?, KemCiphertext);
            let kem_shared = kem.decapsulate(&message.ciphertext, secret)?;
            config.emit(Role::Server, HandshakePhase::ReadKemCiphertext);
            Some(kem_shared)
        }
        None => None,
    };

    let master = schedule::derive_master(
        &handshake,
        auth_shared.as_ref().map(|secret| secret.as_slice()),
        &transcript.current_hash(),
    )?;
    let expected =
        schedule::finished_mac(master.finished_key(Role::Client), &transcript.current_hash())?;
    let finished = expect_message!(layer.recv_handshake(&mut transcript).await?, Finished);
    schedule::verify_finished(&expected, &finished.verify_data)?;
    config.emit(Role::Server, HandshakePhase::ReadClientFinished);

    let verify_data =
        schedule::finished_mac(master.finished_key(Role::Server), &transcript.current_hash())?;
    layer
        .send_handshake(
            &HandshakeMessage::Finished(Finished { verify_data }),
            &mut transcript,
        )
        .await?;
    config.emit(Role::Server, HandshakePhase::WriteServerFinished);

    layer.install(RecordProtection::new(
        suite,
        master.traffic.for_role(Role::Server),
    ));

    let kem_label = if hybrid { kem.name() } else { "none" };
    debug!(
        target: "pqdc::tls::server",
        %version,
        suite = suite.label(),
        %scheme,
        hybrid,
        kem = kem_label,
        delegated_credential = delegated.is_some(),
        "server handshake complete"
    );

    Ok(ConnectionState {
        version,
        cipher_suite: suite,
        signature_scheme: scheme,
        verified_delegated_credential: false,
        did_hybrid_kem: hybrid,
        peer_certificates: Vec::new(),
        handshake_complete: true,
    })
}

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha384};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::TlsError;
use crate::events::Role;
use crate::record::SessionKeySet;

pub(crate) const SHA384_OUTPUT_LEN: usize = 48;

const LABEL_CLIENT_HS_KEY: &[u8] = b"pqdc/c hs key";
const LABEL_CLIENT_HS_IV: &[u8] = b"pqdc/c hs iv";
const LABEL_SERVER_HS_KEY: &[u8] = b"pqdc/s hs key";
const LABEL_SERVER_HS_IV: &[u8] = b"pqdc/s hs iv";
const LABEL_DERIVED: &[u8] = b"pqdc/derived";
const LABEL_CLIENT_AP_KEY: &[u8] = b"pqdc/c ap key";
const LABEL_CLIENT_AP_IV: &[u8] = b"pqdc/c ap iv";
const LABEL_SERVER_AP_KEY: &[u8] = b"pqdc/s ap key";
const LABEL_SERVER_AP_IV: &[u8] = b"pqdc/s ap iv";
const LABEL_FINISHED_CLIENT: &[u8] = b"pqdc/c finished";
const LABEL_FINISHED_SERVER: &[u8] = b"pqdc/s finished";

type HmacSha384 = Hmac<Sha384>;

/// Traffic keys for both directions at one stage of the handshake.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub(crate) struct TrafficKeys {
    client_key: [u8; 32],
    client_iv: [u8; 12],
    server_key: [u8; 32],
    server_iv: [u8; 12],
}

impl TrafficKeys {
    fn derive(
        hkdf: &Hkdf<Sha384>,
        labels: [&[u8]; 4],
        context: &[u8],
    ) -> Result<Self, TlsError> {
        Ok(Self {
            client_key: expand(hkdf, labels[0], context)?,
            client_iv: expand(hkdf, labels[1], context)?,
            server_key: expand(hkdf, labels[2], context)?,
            server_iv: expand(hkdf, labels[3], context)?,
        })
    }

    pub(crate) fn for_role(&self, role: Role) -> SessionKeySet {
        match role {
            Role::Client => SessionKeySet {
                send_key: self.client_key,
                send_iv: self.client_iv,
                recv_key: self.server_key,
                recv_iv: self.server_iv,
            },
            Role::Server => SessionKeySet {
                send_key: self.server_key,
                send_iv: self.server_iv,
                recv_key: self.client_key,
                recv_iv: self.client_iv,
            },
        }
    }
}

pub(crate) struct HandshakeSecrets {
    prk: Zeroizing<Vec<u8>>,
    pub(crate) traffic: TrafficKeys,
}

pub(crate) struct MasterSecrets {
    client_finished: Zeroizing<[u8; SHA384_OUTPUT_LEN]>,
    server_finished: Zeroizing<[u8; SHA384_OUTPUT_LEN]>,
    pub(crate) traffic: TrafficKeys,
}

impl MasterSecrets {
    pub(crate) fn finished_key(&self, role: Role) -> &[u8] {
        match role {
            Role::Client => &self.client_finished[..],
            Role::Server => &self.server_finished[..],
        }
    }
}

/// Extract the handshake secret from the key-exchange output (X25519, plus
/// ML-KEM when hybrid) salted with the transcript through ServerHello.
pub(crate) fn derive_handshake(
    shared: &[u8],
    transcript_hash: &[u8; SHA384_OUTPUT_LEN],
) -> Result<HandshakeSecrets, TlsError> {
    let (prk, hkdf) = Hkdf::<Sha384>::extract(Some(&transcript_hash[..]), shared);
    let traffic = TrafficKeys::derive(
        &hkdf,
        [
            LABEL_CLIENT_HS_KEY,
            LABEL_CLIENT_HS_IV,
            LABEL_SERVER_HS_KEY,
            LABEL_SERVER_HS_IV,
        ],
        transcript_hash,
    )?;
    Ok(HandshakeSecrets {
        prk: Zeroizing::new(prk.to_vec()),
        traffic,
    })
}

/// Mix the authenticated KEM secret (if any) into the handshake secret and
/// derive finished and application keys bound to `transcript_hash`.
pub(crate) fn derive_master(
    handshake: &HandshakeSecrets,
    auth_shared: Option<&[u8]>,
    transcript_hash: &[u8; SHA384_OUTPUT_LEN],
) -> Result<MasterSecrets, TlsError> {
    let handshake_hkdf = Hkdf::<Sha384>::from_prk(&handshake.prk)
        .map_err(|_| TlsError::KeySchedule("invalid handshake secret"))?;
    let salt: Zeroizing<[u8; SHA384_OUTPUT_LEN]> =
        Zeroizing::new(expand(&handshake_hkdf, LABEL_DERIVED, &[])?);
    let zeros = [0u8; SHA384_OUTPUT_LEN];
    let hkdf = Hkdf::<Sha384>::new(Some(&salt[..]), auth_shared.unwrap_or(&zeros[..]));

    Ok(MasterSecrets {
        client_finished: Zeroizing::new(expand(&hkdf, LABEL_FINISHED_CLIENT, transcript_hash)?),
        server_finished: Zeroizing::new(expand(&hkdf, LABEL_FINISHED_SERVER, transcript_hash)?),
        traffic: TrafficKeys::derive(
            &hkdf,
            [
                LABEL_CLIENT_AP_KEY,
                LABEL_CLIENT_AP_IV,
                LABEL_SERVER_AP_KEY,
                LABEL_SERVER_AP_IV,
            ],
            transcript_hash,
        )?,
    })
}

fn expand<const N: usize>(
    hkdf: &Hkdf<Sha384>,
    label: &[u8],
    context: &[u8],
) -> Result<[u8; N], TlsError> {
    let mut out = [0u8; N];
    hkdf.expand_multi_info(&[label, context], &mut out)
        .map_err(|_| TlsError::KeySchedule("hkdf expand"))?;
    Ok(out)
}

pub(crate) fn finished_mac(key: &[u8], transcript_hash: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut mac = HmacSha384::new_from_slice(key)
        .map_err(|_| TlsError::KeySchedule("invalid finished key"))?;
    mac.update(transcript_hash);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn verify_finished(expected: &[u8], received: &[u8]) -> Result<(), TlsError> {
    if expected.len() == received.len() && bool::from(expected.ct_eq(received)) {
        Ok(())
    } else {
        Err(TlsError::FinishedVerification)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Transcript {
    hasher: Sha384,
}

impl Transcript {
    pub(crate) fn new() -> Self {
        Self {
            hasher: Sha384::new(),
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub(crate) fn current_hash(&self) -> [u8; SHA384_OUTPUT_LEN] {
        let digest = self.hasher.clone().finalize();
        let mut out = [0u8; SHA384_OUTPUT_LEN];
        out.copy_from_slice(&digest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_secret_changes_every_master_key() {
        let mut transcript = Transcript::new();
        transcript.update(b"client hello");
        let hash = transcript.current_hash();
        let handshake = derive_handshake(&[7u8; 32], &hash).expect("handshake");

        let classical = derive_master(&handshake, None, &hash).expect("classical");
        let hybrid = derive_master(&handshake, Some(&[9u8; 32]), &hash).expect("hybrid");

        assert_ne!(
            classical.finished_key(Role::Client),
            hybrid.finished_key(Role::Client)
        );
        assert!(classical.traffic != hybrid.traffic);
    }

    #[test]
    fn finished_comparison_is_length_checked() {
        let mac = finished_mac(&[1u8; 48], b"transcript").expect("mac");
        verify_finished(&mac, &mac).expect("same mac");
        assert!(matches!(
            verify_finished(&mac, &mac[..16]),
            Err(TlsError::FinishedVerification)
        ));
    }
}

use std::fmt;

use p256::ecdsa::signature::{Signer, Verifier};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use pqcrypto_mldsa::mldsa65;
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

/// Signature algorithms understood by the engine, identified on the wire by
/// their TLS SignatureScheme code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    /// `ecdsa_secp256r1_sha256`
    EcdsaP256Sha256,
    /// ML-DSA-65 (Dilithium3 class)
    MlDsa65,
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("unknown signature scheme 0x{0:04x}")]
    UnknownScheme(u16),
    #[error("malformed {0} public key")]
    MalformedPublicKey(SignatureScheme),
    #[error("malformed {0} private key")]
    MalformedPrivateKey(SignatureScheme),
    #[error("malformed {0} signature")]
    MalformedSignature(SignatureScheme),
    #[error("{0} signature did not verify")]
    BadSignature(SignatureScheme),
}

impl SignatureScheme {
    pub fn wire(self) -> u16 {
        match self {
            SignatureScheme::EcdsaP256Sha256 => 0x0403,
            SignatureScheme::MlDsa65 => 0x0905,
        }
    }

    pub fn from_wire(value: u16) -> Result<Self, SignatureError> {
        match value {
            0x0403 => Ok(SignatureScheme::EcdsaP256Sha256),
            0x0905 => Ok(SignatureScheme::MlDsa65),
            other => Err(SignatureError::UnknownScheme(other)),
        }
    }

    pub fn is_post_quantum(self) -> bool {
        matches!(self, SignatureScheme::MlDsa65)
    }

    /// Verify `signature` over `message` with a raw public key encoded the way
    /// the scheme encodes it on the wire (SEC1 point or ML-DSA public key).
    pub fn verify(
        self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureError> {
        match self {
            SignatureScheme::EcdsaP256Sha256 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|_| SignatureError::MalformedPublicKey(self))?;
                let signature = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| SignatureError::MalformedSignature(self))?;
                key.verify(message, &signature)
                    .map_err(|_| SignatureError::BadSignature(self))
            }
            SignatureScheme::MlDsa65 => {
                let key = mldsa65::PublicKey::from_bytes(public_key)
                    .map_err(|_| SignatureError::MalformedPublicKey(self))?;
                let signature = mldsa65::DetachedSignature::from_bytes(signature)
                    .map_err(|_| SignatureError::MalformedSignature(self))?;
                mldsa65::verify_detached_signature(&signature, message, &key)
                    .map_err(|_| SignatureError::BadSignature(self))
            }
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureScheme::EcdsaP256Sha256 => f.write_str("ecdsa_secp256r1_sha256"),
            SignatureScheme::MlDsa65 => f.write_str("mldsa65"),
        }
    }
}

/// Private half of a signing identity: either a certificate key or a
/// delegated credential key.
#[derive(Clone)]
pub enum SigningKey {
    EcdsaP256(p256::ecdsa::SigningKey),
    MlDsa65(Zeroizing<Vec<u8>>),
}

impl SigningKey {
    /// Generate a fresh key pair and return it with the wire encoding of its
    /// public key.
    pub fn generate(scheme: SignatureScheme) -> (Self, Vec<u8>) {
        match scheme {
            SignatureScheme::EcdsaP256Sha256 => {
                let key = p256::ecdsa::SigningKey::random(&mut OsRng);
                let public = key
                    .verifying_key()
                    .as_affine()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                (SigningKey::EcdsaP256(key), public)
            }
            SignatureScheme::MlDsa65 => {
                let (public, secret) = mldsa65::keypair();
                (
                    SigningKey::MlDsa65(Zeroizing::new(secret.as_bytes().to_vec())),
                    public.as_bytes().to_vec(),
                )
            }
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            SigningKey::EcdsaP256(_) => SignatureScheme::EcdsaP256Sha256,
            SigningKey::MlDsa65(_) => SignatureScheme::MlDsa65,
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        match self {
            SigningKey::EcdsaP256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            SigningKey::MlDsa65(secret) => {
                let key = mldsa65::SecretKey::from_bytes(secret)
                    .map_err(|_| SignatureError::MalformedPrivateKey(SignatureScheme::MlDsa65))?;
                Ok(mldsa65::detached_sign(message, &key).as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("scheme", &self.scheme())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_schemes_sign_and_verify() {
        for scheme in [SignatureScheme::EcdsaP256Sha256, SignatureScheme::MlDsa65] {
            let (key, public) = SigningKey::generate(scheme);
            let signature = key.sign(b"delegated").expect("sign");
            scheme
                .verify(&public, b"delegated", &signature)
                .expect("verify");
            let err = scheme
                .verify(&public, b"tampered", &signature)
                .expect_err("wrong message");
            assert!(matches!(err, SignatureError::BadSignature(s) if s == scheme));
        }
    }

    #[test]
    fn unknown_code_point_is_rejected() {
        assert!(matches!(
            SignatureScheme::from_wire(0x0807),
            Err(SignatureError::UnknownScheme(0x0807))
        ));
        assert_eq!(
            SignatureScheme::from_wire(SignatureScheme::MlDsa65.wire()).expect("known"),
            SignatureScheme::MlDsa65
        );
        assert!(SignatureScheme::MlDsa65.is_post_quantum());
        assert!(!SignatureScheme::EcdsaP256Sha256.is_post_quantum());
    }
}

use std::fmt;

use pqcrypto_mlkem::mlkem768::{self, Ciphertext, PublicKey, SecretKey};
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::EphemeralSecret;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum KemError {
    #[error("invalid {0}")]
    Invalid(&'static str),
    #[error("x25519 exchange produced a non-contributory shared secret")]
    NonContributory,
}

/// Key encapsulation used for the post-quantum half of the hybrid exchange.
pub trait KemProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    /// Returns `(public_key, secret_key)`.
    fn generate_keypair(&self) -> (Vec<u8>, Zeroizing<Vec<u8>>);
    /// Returns `(ciphertext, shared_secret)`.
    fn encapsulate(&self, public_key: &[u8]) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), KemError>;
    fn decapsulate(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KemError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MlKem768;

impl KemProvider for MlKem768 {
    fn name(&self) -> &'static str {
        "ml-kem-768"
    }

    fn generate_keypair(&self) -> (Vec<u8>, Zeroizing<Vec<u8>>) {
        let (public, secret) = mlkem768::keypair();
        (
            public.as_bytes().to_vec(),
            Zeroizing::new(secret.as_bytes().to_vec()),
        )
    }

    fn encapsulate(&self, public_key: &[u8]) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), KemError> {
        let public_key =
            PublicKey::from_bytes(public_key).map_err(|_| KemError::Invalid("ML-KEM public key"))?;
        let (shared, ciphertext) = mlkem768::encapsulate(&public_key);
        Ok((
            ciphertext.as_bytes().to_vec(),
            Zeroizing::new(shared.as_bytes().to_vec()),
        ))
    }

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KemError> {
        let secret_key =
            SecretKey::from_bytes(secret_key).map_err(|_| KemError::Invalid("ML-KEM secret key"))?;
        let ciphertext =
            Ciphertext::from_bytes(ciphertext).map_err(|_| KemError::Invalid("ML-KEM ciphertext"))?;
        let shared = mlkem768::decapsulate(&ciphertext, &secret_key);
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}

/// Ephemeral X25519 key share for the classical half of the exchange.
pub struct X25519Share {
    secret: EphemeralSecret,
    public: [u8; 32],
}

impl X25519Share {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(&mut OsRng);
        let public = x25519_dalek::PublicKey::from(&secret).to_bytes();
        Self { secret, public }
    }

    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn agree(self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>, KemError> {
        let peer: [u8; 32] = peer
            .try_into()
            .map_err(|_| KemError::Invalid("X25519 key share"))?;
        let shared = self
            .secret
            .diffie_hellman(&x25519_dalek::PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(KemError::NonContributory);
        }
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}

impl fmt::Debug for X25519Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X25519Share")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mlkem_encapsulation_agrees() {
        let kem = MlKem768;
        assert_eq!(kem.name(), "ml-kem-768");
        let (public, secret) = kem.generate_keypair();
        let (ciphertext, sender) = kem.encapsulate(&public).expect("encapsulate");
        let receiver = kem.decapsulate(&ciphertext, &secret).expect("decapsulate");
        assert_eq!(*sender, *receiver);
    }

    #[test]
    fn x25519_rejects_all_zero_peer() {
        let share = X25519Share::generate();
        let err = share.agree(&[0u8; 32]).expect_err("low order point");
        assert!(matches!(err, KemError::NonContributory));
    }
}

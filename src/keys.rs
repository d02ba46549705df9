use std::{fs, io, path::Path};

use ed25519_dalek::{Signer, SigningKey};
use rand::{rngs::OsRng, RngCore};

use crate::address::Address;
use crate::tx::{SignedTransaction, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid secret key hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("secret key must be 32 bytes (64 hex chars), got {0}")]
    Length(usize),
    #[error("cannot read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Ed25519 signing identity of an account.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::from_secret_bytes(&secret)
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(secret_hex.trim())?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Reads a secret written by [`Keypair::write_to_dir`] (`sk.hex`).
    pub fn from_file(path: &Path) -> Result<Self, KeyError> {
        let text = fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_secret_hex(&text)
    }

    /// Writes `sk.hex`, `pk.hex` and `address` into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("sk.hex"), self.secret_hex())?;
        fs::write(dir.join("pk.hex"), hex::encode(self.public_key()))?;
        fs::write(dir.join("address"), self.address().to_string())?;
        Ok(())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }

    pub fn sign(&self, transaction: Transaction) -> SignedTransaction {
        let signature = self.signing.sign(&transaction.digest());
        SignedTransaction {
            transaction,
            public_key: self.public_key(),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hex_round_trips() {
        let key = Keypair::generate();
        let restored = Keypair::from_secret_hex(&key.secret_hex()).unwrap();
        assert_eq!(restored.address(), key.address());
        assert_eq!(restored.public_key(), key.public_key());
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(matches!(
            Keypair::from_secret_hex("abcd"),
            Err(KeyError::Length(2))
        ));
    }

    #[test]
    fn key_files_are_readable_back() {
        let dir = tempfile::tempdir().unwrap();
        let key = Keypair::generate();
        key.write_to_dir(dir.path()).unwrap();

        let restored = Keypair::from_file(&dir.path().join("sk.hex")).unwrap();
        assert_eq!(restored.address(), key.address());
        let address = fs::read_to_string(dir.path().join("address")).unwrap();
        assert_eq!(address.parse::<Address>().unwrap(), key.address());
    }
}

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{hex32, hex_bytes, Address};
use crate::contracts::ContractKind;
use crate::ledger::{Amount, LedgerError, LedgerEvent, TxHash};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub nonce: u64,
    #[serde(default)]
    pub value: Amount,
    pub call: Call,
}

impl Transaction {
    /// Signing digest over a canonical encoding of every field.
    pub fn digest(&self) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update(b"fundraiser-tx");
        hasher.update(self.from.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.value.to_le_bytes());
        match &self.call {
            Call::DeployRegistry => hasher.update(b"deploy-registry"),
            Call::Invoke { contract, method } => {
                hasher.update(b"invoke");
                hasher.update(contract.as_bytes());
                match method {
                    Method::CreateNewInstance {
                        minimum_contribution,
                    } => {
                        hasher.update(b"create-new-instance");
                        hasher.update(minimum_contribution.to_le_bytes());
                    }
                    Method::Contribute => hasher.update(b"contribute"),
                }
            }
        }
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Call {
    DeployRegistry,
    Invoke { contract: Address, method: Method },
}

impl Call {
    pub const DEPLOY_REGISTRY: &'static str = "deployRegistry";
}

/// State-mutating contract methods.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Method {
    CreateNewInstance { minimum_contribution: Amount },
    Contribute,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::CreateNewInstance { .. } => "createNewInstance",
            Method::Contribute => "contribute",
        }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self, Method::Contribute)
    }

    pub fn target_kind(&self) -> ContractKind {
        match self {
            Method::CreateNewInstance { .. } => ContractKind::Registry,
            Method::Contribute => ContractKind::Campaign,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    #[serde(with = "hex32")]
    pub public_key: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    pub fn hash(&self) -> TxHash {
        self.transaction.digest()
    }

    /// Checks the key against the sender and the signature against the
    /// digest. Returns the digest on success.
    pub fn verify(&self) -> Result<TxHash, LedgerError> {
        let from = self.transaction.from;
        if Address::from_public_key(&self.public_key) != from {
            return Err(LedgerError::KeyMismatch { from });
        }
        let key =
            VerifyingKey::from_bytes(&self.public_key).map_err(|_| LedgerError::InvalidSignature)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| LedgerError::InvalidSignature)?;
        let digest = self.hash();
        key.verify_strict(&digest, &signature)
            .map_err(|_| LedgerError::InvalidSignature)?;
        Ok(digest)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    RegistryDeployed { registry: Address },
    InstanceCreated { instance: Address },
    Contributed { campaign: Address, amount: Amount },
}

/// Record of a committed transaction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    #[serde(with = "hex32")]
    pub hash: TxHash,
    pub height: u64,
    pub outcome: Outcome,
    pub events: Vec<LedgerEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    fn contribute_tx(key: &Keypair) -> Transaction {
        Transaction {
            from: key.address(),
            nonce: 0,
            value: 200,
            call: Call::Invoke {
                contract: Address::from_bytes([1; 20]),
                method: Method::Contribute,
            },
        }
    }

    #[test]
    fn signed_transaction_verifies() {
        let key = Keypair::generate();
        let signed = key.sign(contribute_tx(&key));
        assert_eq!(signed.verify().unwrap(), signed.hash());
    }

    #[test]
    fn tampered_value_breaks_signature() {
        let key = Keypair::generate();
        let mut signed = key.sign(contribute_tx(&key));
        signed.transaction.value = 10_000;
        assert_eq!(signed.verify().unwrap_err(), LedgerError::InvalidSignature);
    }

    #[test]
    fn foreign_key_is_rejected() {
        let key = Keypair::generate();
        let other = Keypair::generate();
        let mut signed = other.sign(contribute_tx(&key));
        signed.transaction.from = key.address();
        assert_eq!(
            signed.verify().unwrap_err(),
            LedgerError::KeyMismatch {
                from: key.address()
            }
        );
    }

    #[test]
    fn digest_covers_method_arguments() {
        let key = Keypair::generate();
        let mut a = contribute_tx(&key);
        a.call = Call::Invoke {
            contract: Address::from_bytes([1; 20]),
            method: Method::CreateNewInstance {
                minimum_contribution: 100,
            },
        };
        let mut b = a.clone();
        b.call = Call::Invoke {
            contract: Address::from_bytes([1; 20]),
            method: Method::CreateNewInstance {
                minimum_contribution: 101,
            },
        };
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn signed_transaction_json_round_trips() {
        let key = Keypair::generate();
        let signed = key.sign(contribute_tx(&key));
        let json = serde_json::to_string(&signed).unwrap();
        let back: SignedTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signed);
        back.verify().unwrap();
    }
}

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{hex32, Address};
use crate::config::GenesisConfig;
use crate::contracts::{
    CallContext, ContractError, ContractKind, ContractState, InstanceRegistry, Query,
    QueryResponse,
};
use crate::tx::{Call, Method, Outcome, Receipt, SignedTransaction};

mod chain;

pub use chain::Ledger;

pub type Amount = u64;
pub type TxHash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("no contract deployed at {address}")]
    UnknownContract { address: Address },
    #[error("{kind} contract at {contract} does not support {method}")]
    UnsupportedMethod {
        contract: Address,
        kind: ContractKind,
        method: &'static str,
    },
    #[error("{method} does not accept value")]
    NonPayable { method: &'static str },
    #[error("insufficient funds in account {account}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        account: Address,
        balance: Amount,
        needed: Amount,
    },
    #[error("balance overflow in account {account}")]
    BalanceOverflow { account: Address },
    #[error("nonce mismatch for {account}: expected {expected}, got {actual}")]
    NonceMismatch {
        account: Address,
        expected: u64,
        actual: u64,
    },
    #[error("public key does not derive sender address {from}")]
    KeyMismatch { from: Address },
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("address {address} is already occupied")]
    AddressCollision { address: Address },
}

impl LedgerError {
    /// The contract-level rejection, when the failure came from contract policy.
    pub fn contract_error(&self) -> Option<ContractError> {
        match self {
            LedgerError::Contract(err) => Some(*err),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    pub balance: Amount,
    pub nonce: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerMeta {
    pub height: u64,
    pub timestamp: u64,
    #[serde(with = "hex32::option", default)]
    pub previous_receipt: Option<TxHash>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Emission {
        to: Address,
        amount: Amount,
    },
    RegistryDeployed {
        registry: Address,
        deployer: Address,
    },
    InstanceCreated {
        registry: Address,
        instance: Address,
        manager: Address,
        minimum_contribution: Amount,
    },
    Contribution {
        campaign: Address,
        contributor: Address,
        amount: Amount,
    },
}

/// State changes a contract method asks the ledger to apply on its behalf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerMutation {
    Deploy {
        address: Address,
        contract: ContractState,
    },
    Log(LedgerEvent),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: LedgerMeta,
    pub accounts: BTreeMap<Address, Account>,
    pub contracts: BTreeMap<Address, ContractState>,
    pub events: Vec<LedgerEvent>,
    #[serde(with = "hex32")]
    pub state_root: [u8; 32],
}

/// Committed ledger contents. Mutating methods are only ever run against a
/// private working copy owned by [`Ledger::submit`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerState {
    pub meta: LedgerMeta,
    pub accounts: BTreeMap<Address, Account>,
    pub contracts: BTreeMap<Address, ContractState>,
    pub events: Vec<LedgerEvent>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_genesis(config: &GenesisConfig) -> Result<Self, LedgerError> {
        let mut state = Self::new();
        state.meta.timestamp = config.timestamp;
        for entry in &config.accounts {
            state.credit_account(&entry.address, entry.balance)?;
            state.events.push(LedgerEvent::Emission {
                to: entry.address,
                amount: entry.balance,
            });
        }
        Ok(state)
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    pub fn contract(&self, address: &Address) -> Option<&ContractState> {
        self.contracts.get(address)
    }

    pub fn credit_account(&mut self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let entry = self.accounts.entry(*account).or_default();
        entry.balance = entry
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { account: *account })?;
        Ok(())
    }

    pub fn debit_account(&mut self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance(account);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: *account,
                balance,
                needed: amount,
            });
        }
        if let Some(entry) = self.accounts.get_mut(account) {
            entry.balance -= amount;
        }
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.debit_account(from, amount)?;
        self.credit_account(to, amount)
    }

    /// Runs one transaction in place. A returned error leaves `self` partially
    /// modified; callers must discard the state on failure.
    pub fn execute(
        &mut self,
        signed: &SignedTransaction,
        timestamp: u64,
    ) -> Result<Receipt, LedgerError> {
        let hash = signed.verify()?;
        let tx = &signed.transaction;
        let expected = self.nonce(&tx.from);
        if tx.nonce != expected {
            return Err(LedgerError::NonceMismatch {
                account: tx.from,
                expected,
                actual: tx.nonce,
            });
        }

        let events_start = self.events.len();
        let outcome = match &tx.call {
            Call::DeployRegistry => {
                if tx.value > 0 {
                    return Err(LedgerError::NonPayable {
                        method: Call::DEPLOY_REGISTRY,
                    });
                }
                let registry = Address::for_contract(&tx.from, tx.nonce);
                self.apply_mutations(&[
                    LedgerMutation::Deploy {
                        address: registry,
                        contract: ContractState::Registry(InstanceRegistry::new()),
                    },
                    LedgerMutation::Log(LedgerEvent::RegistryDeployed {
                        registry,
                        deployer: tx.from,
                    }),
                ])?;
                info!("registry deployed at {registry} by {}", tx.from);
                Outcome::RegistryDeployed { registry }
            }
            Call::Invoke { contract, method } => {
                self.invoke(tx.from, *contract, tx.value, method)?
            }
        };

        self.accounts.entry(tx.from).or_default().nonce += 1;
        self.meta.height += 1;
        self.meta.timestamp = timestamp;
        self.meta.previous_receipt = Some(hash);

        Ok(Receipt {
            hash,
            height: self.meta.height,
            outcome,
            events: self.events[events_start..].to_vec(),
        })
    }

    fn invoke(
        &mut self,
        caller: Address,
        contract: Address,
        value: Amount,
        method: &Method,
    ) -> Result<Outcome, LedgerError> {
        let kind = self
            .contracts
            .get(&contract)
            .map(ContractState::kind)
            .ok_or(LedgerError::UnknownContract { address: contract })?;
        if method.target_kind() != kind {
            return Err(LedgerError::UnsupportedMethod {
                contract,
                kind,
                method: method.name(),
            });
        }
        if value > 0 {
            if !method.is_payable() {
                return Err(LedgerError::NonPayable {
                    method: method.name(),
                });
            }
            self.transfer(&caller, &contract, value)?;
        }

        let ctx = CallContext {
            caller,
            this: contract,
            value,
        };
        let (outcome, mutations) = match (self.contracts.get_mut(&contract), method) {
            (
                Some(ContractState::Registry(registry)),
                Method::CreateNewInstance {
                    minimum_contribution,
                },
            ) => {
                let (instance, mutations) =
                    registry.create_new_instance(&ctx, *minimum_contribution)?;
                info!("registry {contract} created instance {instance} for {caller}");
                (Outcome::InstanceCreated { instance }, mutations)
            }
            (Some(ContractState::Campaign(campaign)), Method::Contribute) => {
                let mutations = campaign.contribute(&ctx)?;
                (
                    Outcome::Contributed {
                        campaign: contract,
                        amount: value,
                    },
                    mutations,
                )
            }
            _ => {
                return Err(LedgerError::UnsupportedMethod {
                    contract,
                    kind,
                    method: method.name(),
                })
            }
        };
        self.apply_mutations(&mutations)?;
        Ok(outcome)
    }

    pub fn apply_mutations(&mut self, mutations: &[LedgerMutation]) -> Result<(), LedgerError> {
        for mutation in mutations {
            match mutation {
                LedgerMutation::Deploy { address, contract } => {
                    if self.contracts.contains_key(address) {
                        return Err(LedgerError::AddressCollision { address: *address });
                    }
                    self.contracts.insert(*address, contract.clone());
                    self.accounts.entry(*address).or_default();
                }
                LedgerMutation::Log(event) => self.events.push(event.clone()),
            }
        }
        Ok(())
    }

    pub fn query(&self, contract: &Address, query: &Query) -> Result<QueryResponse, LedgerError> {
        let state = self
            .contracts
            .get(contract)
            .ok_or(LedgerError::UnknownContract { address: *contract })?;
        state
            .query(contract, self.balance(contract), query)
            .ok_or(LedgerError::UnsupportedMethod {
                contract: *contract,
                kind: state.kind(),
                method: query.name(),
            })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            accounts: self.accounts.clone(),
            contracts: self.contracts.clone(),
            events: self.events.clone(),
            state_root: compute_state_root(&self.accounts, &self.contracts),
        }
    }
}

fn compute_state_root(
    accounts: &BTreeMap<Address, Account>,
    contracts: &BTreeMap<Address, ContractState>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(accounts.len() + contracts.len());
    for (address, account) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(address.as_bytes());
        hasher.update(account.balance.to_le_bytes());
        hasher.update(account.nonce.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (address, contract) in contracts {
        let mut hasher = Sha256::new();
        hasher.update(b"contract");
        hasher.update(address.as_bytes());
        hasher.update(contract.commitment());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"fundraiser-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            // odd node is paired with itself
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

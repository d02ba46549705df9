use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use log::{debug, warn};

use super::{Amount, LedgerError, LedgerEvent, LedgerSnapshot, LedgerState};
use crate::address::Address;
use crate::config::GenesisConfig;
use crate::contracts::{CampaignSummary, Query, QueryResponse};
use crate::tx::{Receipt, SignedTransaction};

/// Published view. `state.events` is always empty; the event log lives in
/// `events` so a submission never clones history.
#[derive(Debug, Default)]
struct Committed {
    state: Arc<LedgerState>,
    events: Vec<LedgerEvent>,
}

/// The transactional boundary every contract runs behind.
///
/// Submissions are serialized by `sequencer` and executed against a private
/// clone of the committed accounts and contracts; only a fully successful
/// execution is published. Readers take the published `Arc` and never wait on
/// execution.
#[derive(Debug, Default)]
pub struct Ledger {
    committed: RwLock<Committed>,
    sequencer: Mutex<()>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(mut state: LedgerState) -> Self {
        let events = std::mem::take(&mut state.events);
        Self {
            committed: RwLock::new(Committed {
                state: Arc::new(state),
                events,
            }),
            sequencer: Mutex::new(()),
        }
    }

    pub fn from_genesis(config: &GenesisConfig) -> Result<Self, LedgerError> {
        LedgerState::from_genesis(config).map(Self::from_state)
    }

    fn read(&self) -> RwLockReadGuard<'_, Committed> {
        // Only whole states are ever written, so a poisoned lock still holds a
        // consistent value.
        self.committed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest committed accounts and contracts, without the event log.
    pub fn state(&self) -> Arc<LedgerState> {
        Arc::clone(&self.read().state)
    }

    /// Every committed event, oldest first.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.read().events.clone()
    }

    /// Full committed state including the event log, in the shape the state
    /// file stores.
    pub fn export(&self) -> LedgerState {
        let committed = self.read();
        LedgerState {
            events: committed.events.clone(),
            ..LedgerState::clone(&committed.state)
        }
    }

    pub fn submit(
        &self,
        transaction: &SignedTransaction,
        timestamp: u64,
    ) -> Result<Receipt, LedgerError> {
        let _turn = self.sequencer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = LedgerState::clone(&self.state());
        match working.execute(transaction, timestamp) {
            Ok(receipt) => {
                let mut committed = self.committed.write().unwrap_or_else(PoisonError::into_inner);
                committed.events.append(&mut working.events);
                committed.state = Arc::new(working);
                drop(committed);
                debug!(
                    "committed tx {} at height {}",
                    hex::encode(receipt.hash),
                    receipt.height
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(
                    "rejected tx {} from {}: {err}",
                    hex::encode(transaction.hash()),
                    transaction.transaction.from
                );
                Err(err)
            }
        }
    }

    pub fn query(&self, contract: &Address, query: &Query) -> Result<QueryResponse, LedgerError> {
        self.state().query(contract, query)
    }

    pub fn deployed_instances(&self, registry: &Address) -> Result<Vec<Address>, LedgerError> {
        match self.query(registry, &Query::GetDeployedInstances)? {
            QueryResponse::Addresses(addresses) => Ok(addresses),
            _ => Err(self.unexpected(registry, &Query::GetDeployedInstances)),
        }
    }

    pub fn manager(&self, campaign: &Address) -> Result<Address, LedgerError> {
        match self.query(campaign, &Query::Manager)? {
            QueryResponse::Address(manager) => Ok(manager),
            _ => Err(self.unexpected(campaign, &Query::Manager)),
        }
    }

    pub fn is_contributor(&self, campaign: &Address, identity: &Address) -> Result<bool, LedgerError> {
        let query = Query::Contributors {
            identity: *identity,
        };
        match self.query(campaign, &query)? {
            QueryResponse::Bool(flag) => Ok(flag),
            _ => Err(self.unexpected(campaign, &query)),
        }
    }

    pub fn minimum_contribution(&self, campaign: &Address) -> Result<Amount, LedgerError> {
        match self.query(campaign, &Query::MinimumContribution)? {
            QueryResponse::Amount(amount) => Ok(amount),
            _ => Err(self.unexpected(campaign, &Query::MinimumContribution)),
        }
    }

    pub fn summary(&self, campaign: &Address) -> Result<CampaignSummary, LedgerError> {
        match self.query(campaign, &Query::GetSummary)? {
            QueryResponse::Summary(summary) => Ok(summary),
            _ => Err(self.unexpected(campaign, &Query::GetSummary)),
        }
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.state().balance(address)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.state().nonce(address)
    }

    pub fn height(&self) -> u64 {
        self.state().meta.height
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let committed = self.read();
        LedgerSnapshot {
            events: committed.events.clone(),
            ..committed.state.snapshot()
        }
    }

    fn unexpected(&self, contract: &Address, query: &Query) -> LedgerError {
        let state = self.state();
        match state.contract(contract) {
            Some(found) => LedgerError::UnsupportedMethod {
                contract: *contract,
                kind: found.kind(),
                method: query.name(),
            },
            None => LedgerError::UnknownContract { address: *contract },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::config::GenesisAccount;
    use crate::contracts::{ContractError, ContractKind};
    use crate::keys::Keypair;
    use crate::tx::{Call, Method, Outcome, Transaction};

    fn ledger_with(keys: &[&Keypair], balance: Amount) -> Ledger {
        Ledger::from_genesis(&GenesisConfig {
            timestamp: 0,
            accounts: keys
                .iter()
                .map(|k| GenesisAccount {
                    address: k.address(),
                    balance,
                })
                .collect(),
        })
        .unwrap()
    }

    fn send(ledger: &Ledger, key: &Keypair, value: Amount, call: Call) -> Result<Receipt, LedgerError> {
        let tx = key.sign(Transaction {
            from: key.address(),
            nonce: ledger.nonce(&key.address()),
            value,
            call,
        });
        ledger.submit(&tx, ledger.height() + 1)
    }

    fn campaign(ledger: &Ledger, manager: &Keypair, minimum: Amount) -> Address {
        let registry = match send(ledger, manager, 0, Call::DeployRegistry).unwrap().outcome {
            Outcome::RegistryDeployed { registry } => registry,
            other => panic!("unexpected outcome {other:?}"),
        };
        let create = Call::Invoke {
            contract: registry,
            method: Method::CreateNewInstance {
                minimum_contribution: minimum,
            },
        };
        match send(ledger, manager, 0, create).unwrap().outcome {
            Outcome::InstanceCreated { instance } => instance,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn failed_submission_leaves_committed_state_untouched() {
        let manager = Keypair::generate();
        let backer = Keypair::generate();
        let ledger = ledger_with(&[&manager, &backer], 1_000);
        let instance = campaign(&ledger, &manager, 100);
        let before = ledger.snapshot();

        let err = send(
            &ledger,
            &backer,
            10,
            Call::Invoke {
                contract: instance,
                method: Method::Contribute,
            },
        )
        .unwrap_err();
        assert_eq!(
            err.contract_error(),
            Some(ContractError::InsufficientContribution {
                minimum: 100,
                supplied: 10
            })
        );
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.balance(&backer.address()), 1_000);
        assert_eq!(ledger.nonce(&backer.address()), 0);
        assert!(!ledger.is_contributor(&instance, &backer.address()).unwrap());
    }

    #[test]
    fn insufficient_balance_rejects_contribution() {
        let manager = Keypair::generate();
        let backer = Keypair::generate();
        let ledger = ledger_with(&[&manager, &backer], 150);
        let instance = campaign(&ledger, &manager, 100);

        let err = send(
            &ledger,
            &backer,
            200,
            Call::Invoke {
                contract: instance,
                method: Method::Contribute,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: backer.address(),
                balance: 150,
                needed: 200
            }
        );
        assert!(!ledger.is_contributor(&instance, &backer.address()).unwrap());
    }

    #[test]
    fn typed_queries_reject_wrong_contract_kind() {
        let manager = Keypair::generate();
        let ledger = ledger_with(&[&manager], 0);
        let instance = campaign(&ledger, &manager, 10);
        assert_eq!(
            ledger.deployed_instances(&instance).unwrap_err(),
            LedgerError::UnsupportedMethod {
                contract: instance,
                kind: ContractKind::Campaign,
                method: "getDeployedInstances"
            }
        );
    }

    #[test]
    fn event_log_is_kept_beside_the_working_state() {
        let manager = Keypair::generate();
        let backer = Keypair::generate();
        let ledger = ledger_with(&[&manager, &backer], 1_000);
        let instance = campaign(&ledger, &manager, 100);
        let receipt = send(
            &ledger,
            &backer,
            100,
            Call::Invoke {
                contract: instance,
                method: Method::Contribute,
            },
        )
        .unwrap();

        // two emissions, registry, instance, contribution
        let events = ledger.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events.last(), receipt.events.last());
        assert!(ledger.state().events.is_empty());
        assert_eq!(ledger.snapshot().events, events);

        let exported = ledger.export();
        assert_eq!(exported.events, events);
        let restored = Ledger::from_state(exported);
        assert_eq!(restored.snapshot(), ledger.snapshot());
    }

    #[test]
    fn concurrent_submissions_commit_in_a_total_order() {
        let manager = Keypair::generate();
        let backers: Vec<Keypair> = (0..8).map(|_| Keypair::generate()).collect();
        let mut all: Vec<&Keypair> = backers.iter().collect();
        all.push(&manager);
        let ledger = ledger_with(&all, 10_000);
        let instance = campaign(&ledger, &manager, 100);
        let start = ledger.height();

        let heights: Vec<u64> = thread::scope(|scope| {
            let handles: Vec<_> = backers
                .iter()
                .map(|backer| {
                    let ledger = &ledger;
                    scope.spawn(move || {
                        send(
                            ledger,
                            backer,
                            150,
                            Call::Invoke {
                                contract: instance,
                                method: Method::Contribute,
                            },
                        )
                        .map(|receipt| receipt.height)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });

        let mut sorted = heights.clone();
        sorted.sort_unstable();
        let expected: Vec<u64> = (start + 1..=start + backers.len() as u64).collect();
        assert_eq!(sorted, expected);
        assert_eq!(ledger.balance(&instance), 150 * backers.len() as u64);
        assert_eq!(ledger.summary(&instance).unwrap().contributor_count, 8);
    }
}

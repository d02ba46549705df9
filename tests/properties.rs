use std::collections::BTreeSet;

use proptest::prelude::*;

use fundraiser_ledger::{
    config::{GenesisAccount, GenesisConfig},
    keys::Keypair,
    tx::{Call, Method, Outcome, Receipt, Transaction},
    Address, Amount, ContractError, Ledger, LedgerError,
};

const FUNDS: Amount = 1_000_000_000;

fn send(ledger: &Ledger, key: &Keypair, value: Amount, call: Call) -> Result<Receipt, LedgerError> {
    let tx = key.sign(Transaction {
        from: key.address(),
        nonce: ledger.nonce(&key.address()),
        value,
        call,
    });
    ledger.submit(&tx, 0)
}

fn ledger_for(keys: &[Keypair]) -> Ledger {
    Ledger::from_genesis(&GenesisConfig {
        timestamp: 0,
        accounts: keys
            .iter()
            .map(|k| GenesisAccount {
                address: k.address(),
                balance: FUNDS,
            })
            .collect(),
    })
    .unwrap()
}

fn deploy_registry(ledger: &Ledger, key: &Keypair) -> Address {
    match send(ledger, key, 0, Call::DeployRegistry).unwrap().outcome {
        Outcome::RegistryDeployed { registry } => registry,
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn create(ledger: &Ledger, key: &Keypair, registry: Address, minimum: Amount) -> Result<Address, LedgerError> {
    let call = Call::Invoke {
        contract: registry,
        method: Method::CreateNewInstance {
            minimum_contribution: minimum,
        },
    };
    match send(ledger, key, 0, call)?.outcome {
        Outcome::InstanceCreated { instance } => Ok(instance),
        other => panic!("unexpected outcome {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn each_creation_appends_one_distinct_instance(
        minimums in prop::collection::vec(1..=Amount::MAX, 1..8),
    ) {
        let keys = vec![Keypair::generate(), Keypair::generate()];
        let ledger = ledger_for(&keys);
        let registry = deploy_registry(&ledger, &keys[0]);
        let mut seen = BTreeSet::new();

        for (i, minimum) in minimums.iter().enumerate() {
            let creator = &keys[i % keys.len()];
            let before = ledger.deployed_instances(&registry).unwrap();
            let instance = create(&ledger, creator, registry, *minimum).unwrap();
            let after = ledger.deployed_instances(&registry).unwrap();

            prop_assert_eq!(after.len(), before.len() + 1);
            prop_assert_eq!(&after[..before.len()], &before[..]);
            prop_assert_eq!(after.last().copied(), Some(instance));
            prop_assert!(seen.insert(instance));
            prop_assert_eq!(ledger.manager(&instance).unwrap(), creator.address());
            prop_assert_eq!(ledger.minimum_contribution(&instance).unwrap(), *minimum);
        }
    }

    #[test]
    fn contribution_succeeds_exactly_at_or_above_minimum(
        minimum in 1..10_000u64,
        value in 0..20_000u64,
    ) {
        let keys = vec![Keypair::generate(), Keypair::generate()];
        let ledger = ledger_for(&keys);
        let registry = deploy_registry(&ledger, &keys[0]);
        let campaign = create(&ledger, &keys[0], registry, minimum).unwrap();
        let backer = &keys[1];
        let before = ledger.snapshot();

        let result = send(&ledger, backer, value, Call::Invoke {
            contract: campaign,
            method: Method::Contribute,
        });

        if value >= minimum {
            prop_assert!(result.is_ok());
            prop_assert!(ledger.is_contributor(&campaign, &backer.address()).unwrap());
            prop_assert_eq!(ledger.balance(&campaign), value);
            prop_assert_eq!(ledger.balance(&backer.address()), FUNDS - value);
        } else {
            prop_assert_eq!(
                result.unwrap_err().contract_error(),
                Some(ContractError::InsufficientContribution { minimum, supplied: value })
            );
            prop_assert!(!ledger.is_contributor(&campaign, &backer.address()).unwrap());
            prop_assert_eq!(ledger.snapshot(), before);
        }
    }

    #[test]
    fn repeated_contributions_keep_presence_and_count(
        values in prop::collection::vec(100..1_000u64, 1..6),
    ) {
        let keys = vec![Keypair::generate(), Keypair::generate()];
        let ledger = ledger_for(&keys);
        let registry = deploy_registry(&ledger, &keys[0]);
        let campaign = create(&ledger, &keys[0], registry, 100).unwrap();

        for value in &values {
            send(&ledger, &keys[1], *value, Call::Invoke {
                contract: campaign,
                method: Method::Contribute,
            }).unwrap();
            prop_assert!(ledger.is_contributor(&campaign, &keys[1].address()).unwrap());
        }
        let summary = ledger.summary(&campaign).unwrap();
        prop_assert_eq!(summary.contributor_count, 1);
        prop_assert_eq!(summary.balance, values.iter().sum::<u64>());
    }
}

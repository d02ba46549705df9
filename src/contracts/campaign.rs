use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CallContext, ContractError};
use crate::address::Address;
use crate::ledger::{Amount, LedgerEvent, LedgerMutation};

/// Per-campaign contribution ledger.
///
/// `manager` and `minimum_contribution` are fixed at construction. An entry in
/// `contributors` only ever goes from absent to `true`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignLedger {
    manager: Address,
    minimum_contribution: Amount,
    contributors: BTreeMap<Address, bool>,
}

/// What a fundraiser page shows for one campaign.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignSummary {
    pub address: Address,
    pub manager: Address,
    pub minimum_contribution: Amount,
    pub balance: Amount,
    pub contributor_count: u64,
}

impl CampaignLedger {
    pub fn new(manager: Address, minimum_contribution: Amount) -> Result<Self, ContractError> {
        if minimum_contribution == 0 {
            return Err(ContractError::InvalidThreshold);
        }
        Ok(Self {
            manager,
            minimum_contribution,
            contributors: BTreeMap::new(),
        })
    }

    /// Records the caller as a contributor. The attached value has already
    /// been moved into this campaign's account by the ledger.
    pub fn contribute(&mut self, ctx: &CallContext) -> Result<Vec<LedgerMutation>, ContractError> {
        if ctx.value < self.minimum_contribution {
            return Err(ContractError::InsufficientContribution {
                minimum: self.minimum_contribution,
                supplied: ctx.value,
            });
        }
        self.contributors.insert(ctx.caller, true);
        Ok(vec![LedgerMutation::Log(LedgerEvent::Contribution {
            campaign: ctx.this,
            contributor: ctx.caller,
            amount: ctx.value,
        })])
    }

    pub fn manager(&self) -> Address {
        self.manager
    }

    pub fn minimum_contribution(&self) -> Amount {
        self.minimum_contribution
    }

    pub fn is_contributor(&self, identity: &Address) -> bool {
        self.contributors.get(identity).copied().unwrap_or(false)
    }

    pub fn contributors(&self) -> &BTreeMap<Address, bool> {
        &self.contributors
    }

    pub fn contributor_count(&self) -> u64 {
        self.contributors.values().filter(|flag| **flag).count() as u64
    }

    pub fn summary(&self, address: Address, balance: Amount) -> CampaignSummary {
        CampaignSummary {
            address,
            manager: self.manager,
            minimum_contribution: self.minimum_contribution,
            balance,
            contributor_count: self.contributor_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn call(caller: u8, value: Amount) -> CallContext {
        CallContext {
            caller: addr(caller),
            this: addr(0xCC),
            value,
        }
    }

    #[test]
    fn zero_threshold_is_invalid() {
        assert_eq!(
            CampaignLedger::new(addr(1), 0).unwrap_err(),
            ContractError::InvalidThreshold
        );
    }

    #[test]
    fn qualifying_contribution_records_contributor() {
        let mut campaign = CampaignLedger::new(addr(1), 100).unwrap();
        let mutations = campaign.contribute(&call(2, 200)).unwrap();
        assert!(campaign.is_contributor(&addr(2)));
        assert_eq!(
            mutations,
            vec![LedgerMutation::Log(LedgerEvent::Contribution {
                campaign: addr(0xCC),
                contributor: addr(2),
                amount: 200,
            })]
        );
    }

    #[test]
    fn exact_minimum_qualifies() {
        let mut campaign = CampaignLedger::new(addr(1), 100).unwrap();
        campaign.contribute(&call(2, 100)).unwrap();
        assert!(campaign.is_contributor(&addr(2)));
    }

    #[test]
    fn small_contribution_is_rejected_and_not_recorded() {
        let mut campaign = CampaignLedger::new(addr(1), 100).unwrap();
        assert_eq!(
            campaign.contribute(&call(3, 10)).unwrap_err(),
            ContractError::InsufficientContribution {
                minimum: 100,
                supplied: 10
            }
        );
        assert!(!campaign.is_contributor(&addr(3)));
        assert_eq!(campaign.contributor_count(), 0);
    }

    #[test]
    fn repeat_contributions_count_once() {
        let mut campaign = CampaignLedger::new(addr(1), 100).unwrap();
        campaign.contribute(&call(2, 150)).unwrap();
        campaign.contribute(&call(2, 300)).unwrap();
        campaign.contribute(&call(4, 100)).unwrap();
        assert!(campaign.is_contributor(&addr(2)));
        assert_eq!(campaign.contributor_count(), 2);

        let summary = campaign.summary(addr(0xCC), 550);
        assert_eq!(summary.manager, addr(1));
        assert_eq!(summary.balance, 550);
        assert_eq!(summary.contributor_count, 2);
    }

    #[test]
    fn manager_is_not_implicitly_a_contributor() {
        let campaign = CampaignLedger::new(addr(1), 1).unwrap();
        assert_eq!(campaign.manager(), addr(1));
        assert!(!campaign.is_contributor(&addr(1)));
    }
}

use serde::{Deserialize, Serialize};

use super::{CallContext, CampaignLedger, ContractError, ContractState};
use crate::address::Address;
use crate::ledger::{Amount, LedgerEvent, LedgerMutation};

/// Factory and directory of campaign ledgers.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceRegistry {
    deployed_instances: Vec<Address>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a campaign managed by the caller and records its address.
    ///
    /// The address is derived from this registry and the number of instances
    /// it has created so far. The returned mutations deploy the campaign; if
    /// applying them fails the transaction must be discarded as a whole.
    pub fn create_new_instance(
        &mut self,
        ctx: &CallContext,
        minimum_contribution: Amount,
    ) -> Result<(Address, Vec<LedgerMutation>), ContractError> {
        let campaign = CampaignLedger::new(ctx.caller, minimum_contribution)?;
        let instance = Address::for_contract(&ctx.this, self.deployed_instances.len() as u64);
        self.deployed_instances.push(instance);
        let mutations = vec![
            LedgerMutation::Deploy {
                address: instance,
                contract: ContractState::Campaign(campaign),
            },
            LedgerMutation::Log(LedgerEvent::InstanceCreated {
                registry: ctx.this,
                instance,
                manager: ctx.caller,
                minimum_contribution,
            }),
        ];
        Ok((instance, mutations))
    }

    pub fn deployed_instances(&self) -> &[Address] {
        &self.deployed_instances
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::Amount;

mod campaign;
mod registry;

pub use campaign::{CampaignLedger, CampaignSummary};
pub use registry::InstanceRegistry;

/// Rejections raised by contract policy. Any of these aborts the whole
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("minimum contribution must be a positive integer")]
    InvalidThreshold,
    #[error("contribution of {supplied} is below the minimum of {minimum}")]
    InsufficientContribution { minimum: Amount, supplied: Amount },
    /// Reserved for manager-only operations; none are exposed yet.
    #[error("caller is not authorized for this operation")]
    Unauthorized,
}

/// Caller, callee and attached value of the call being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub this: Address,
    pub value: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Registry,
    Campaign,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractKind::Registry => f.write_str("registry"),
            ContractKind::Campaign => f.write_str("campaign"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractState {
    Registry(InstanceRegistry),
    Campaign(CampaignLedger),
}

impl ContractState {
    pub fn kind(&self) -> ContractKind {
        match self {
            ContractState::Registry(_) => ContractKind::Registry,
            ContractState::Campaign(_) => ContractKind::Campaign,
        }
    }

    /// Canonical byte encoding used for state roots.
    pub fn commitment(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ContractState::Registry(registry) => {
                buf.extend_from_slice(b"registry");
                buf.extend_from_slice(&(registry.deployed_instances().len() as u64).to_le_bytes());
                for instance in registry.deployed_instances() {
                    buf.extend_from_slice(instance.as_bytes());
                }
            }
            ContractState::Campaign(campaign) => {
                buf.extend_from_slice(b"campaign");
                buf.extend_from_slice(campaign.manager().as_bytes());
                buf.extend_from_slice(&campaign.minimum_contribution().to_le_bytes());
                for (contributor, flag) in campaign.contributors() {
                    buf.extend_from_slice(contributor.as_bytes());
                    buf.push(u8::from(*flag));
                }
            }
        }
        buf
    }

    /// Read-only dispatch. `None` means the contract has no such method.
    pub fn query(&self, this: &Address, balance: Amount, query: &Query) -> Option<QueryResponse> {
        match (self, query) {
            (ContractState::Registry(registry), Query::GetDeployedInstances) => Some(
                QueryResponse::Addresses(registry.deployed_instances().to_vec()),
            ),
            (ContractState::Campaign(campaign), Query::Manager) => {
                Some(QueryResponse::Address(campaign.manager()))
            }
            (ContractState::Campaign(campaign), Query::Contributors { identity }) => {
                Some(QueryResponse::Bool(campaign.is_contributor(identity)))
            }
            (ContractState::Campaign(campaign), Query::MinimumContribution) => {
                Some(QueryResponse::Amount(campaign.minimum_contribution()))
            }
            (ContractState::Campaign(campaign), Query::GetSummary) => {
                Some(QueryResponse::Summary(campaign.summary(*this, balance)))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    GetDeployedInstances,
    Manager,
    Contributors { identity: Address },
    MinimumContribution,
    GetSummary,
}

impl Query {
    pub fn name(&self) -> &'static str {
        match self {
            Query::GetDeployedInstances => "getDeployedInstances",
            Query::Manager => "manager",
            Query::Contributors { .. } => "contributors",
            Query::MinimumContribution => "minimumContribution",
            Query::GetSummary => "getSummary",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryResponse {
    Addresses(Vec<Address>),
    Address(Address),
    Bool(bool),
    Amount(Amount),
    Summary(CampaignSummary),
}

//! Crowdfunding contracts on a transactional in-process ledger.
//!
//! Two contracts are hosted:
//!
//! * [`contracts::InstanceRegistry`] deploys campaign ledgers on demand and
//!   keeps their addresses in creation order.
//! * [`contracts::CampaignLedger`] enforces a minimum contribution and records
//!   which identities have contributed.
//!
//! Both run behind [`ledger::Ledger`], which applies each signed transaction
//! all-or-nothing and in a strict total order, and serves read-only queries
//! from the latest committed state.

pub mod address;
pub mod config;
pub mod contracts;
pub mod interface;
pub mod keys;
pub mod ledger;
pub mod store;
pub mod tx;

pub use address::Address;
pub use contracts::{CampaignLedger, CampaignSummary, ContractError, InstanceRegistry};
pub use ledger::{Amount, Ledger, LedgerError};

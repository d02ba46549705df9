use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::Amount;

/// Initial ledger contents, read from a JSON file.
///
/// ```json
/// { "timestamp": 0, "accounts": [ { "address": "0x…", "balance": 1000 } ] }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GenesisConfig {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Amount,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GenesisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

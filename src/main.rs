use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use fundraiser_ledger::{
    config::GenesisConfig,
    contracts::ContractKind,
    interface::interface_for,
    keys::Keypair,
    ledger::{Amount, Ledger},
    store::StateStore,
    tx::{Call, Method, Outcome, Transaction},
    Address,
};

//==================== arguments ====================//

#[derive(Parser)]
#[command(name = "fundraiser", version, about = "Crowdfunding contracts on a local ledger")]
struct Cli {
    /// Ledger state file.
    #[arg(long, global = true, env = "FUNDRAISER_STATE", default_value = "fundraiser-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an account keypair (sk.hex, pk.hex, address).
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Create a fresh state file from a genesis config.
    Genesis {
        #[arg(long)]
        config: PathBuf,
        /// Overwrite an existing state file.
        #[arg(long)]
        force: bool,
    },
    /// Deploy an empty instance registry.
    DeployRegistry {
        #[arg(long)]
        key: PathBuf,
    },
    /// createNewInstance(minimumContribution) on a registry.
    CreateInstance {
        #[arg(long)]
        registry: Address,
        #[arg(long)]
        minimum: Amount,
        #[arg(long)]
        key: PathBuf,
    },
    /// contribute() to a campaign with attached value.
    Contribute {
        #[arg(long)]
        campaign: Address,
        #[arg(long)]
        value: Amount,
        #[arg(long)]
        key: PathBuf,
    },
    /// getDeployedInstances() of a registry.
    Instances {
        #[arg(long)]
        registry: Address,
    },
    /// manager() of a campaign.
    Manager {
        #[arg(long)]
        campaign: Address,
    },
    /// contributors(address) of a campaign.
    IsContributor {
        #[arg(long)]
        campaign: Address,
        #[arg(long)]
        address: Address,
    },
    /// getSummary() of a campaign.
    Summary {
        #[arg(long)]
        campaign: Address,
    },
    /// Balance and nonce of an account or contract.
    Balance {
        #[arg(long)]
        address: Address,
    },
    /// Full state with its root.
    Snapshot,
    /// Print a contract interface description.
    Interface {
        #[arg(value_enum)]
        contract: InterfaceArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InterfaceArg {
    Registry,
    Campaign,
}

impl From<InterfaceArg> for ContractKind {
    fn from(arg: InterfaceArg) -> Self {
        match arg {
            InterfaceArg::Registry => ContractKind::Registry,
            InterfaceArg::Campaign => ContractKind::Campaign,
        }
    }
}

//==================== errors ====================//

enum Failure {
    /// Bad input, IO or a corrupt file.
    Usage(String),
    /// The ledger refused the transaction or query.
    Rejected(String),
}

impl Failure {
    fn usage(err: impl std::fmt::Display) -> Self {
        Failure::Usage(err.to_string())
    }

    fn rejected(err: impl std::fmt::Display) -> Self {
        Failure::Rejected(err.to_string())
    }
}

type CmdResult = Result<(), Failure>;

//==================== helpers ====================//

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn open_ledger(store: &StateStore) -> Result<Ledger, Failure> {
    if !store.exists() {
        return Err(Failure::Usage(format!(
            "no state at {}; run `fundraiser genesis` first",
            store.path().display()
        )));
    }
    store.load().map(Ledger::from_state).map_err(Failure::usage)
}

fn print_json(value: &impl Serialize) -> CmdResult {
    let json = serde_json::to_string_pretty(value).map_err(Failure::usage)?;
    println!("{json}");
    Ok(())
}

/// Signs `call` with the key at `key_path`, submits it and persists the
/// result only when the ledger accepted it. The state file stays locked from
/// load to save so concurrent invocations apply in turn.
fn transact(store: &StateStore, key_path: &Path, value: Amount, call: Call) -> Result<Outcome, Failure> {
    store
        .with_lock(|| -> Result<Outcome, Failure> {
            let ledger = open_ledger(store)?;
            let key = Keypair::from_file(key_path).map_err(Failure::usage)?;
            let from = key.address();
            let tx = key.sign(Transaction {
                from,
                nonce: ledger.nonce(&from),
                value,
                call,
            });
            let receipt = ledger.submit(&tx, now()).map_err(Failure::rejected)?;
            store.save(&ledger.export()).map_err(Failure::usage)?;
            info!(
                "tx {} committed at height {}",
                hex::encode(receipt.hash),
                receipt.height
            );
            Ok(receipt.outcome)
        })
        .map_err(Failure::usage)?
}

//==================== commands ====================//

fn keygen_cmd(out_dir: &Path) -> CmdResult {
    let key = Keypair::generate();
    key.write_to_dir(out_dir).map_err(Failure::usage)?;
    println!("{}", key.address());
    println!("keypair written → {}", out_dir.display());
    Ok(())
}

fn genesis_cmd(store: &StateStore, config_path: &Path, force: bool) -> CmdResult {
    let config = GenesisConfig::load(config_path).map_err(Failure::usage)?;
    store
        .with_lock(|| -> CmdResult {
            if store.exists() && !force {
                return Err(Failure::Usage(format!(
                    "{} already exists (use --force to overwrite)",
                    store.path().display()
                )));
            }
            let ledger = Ledger::from_genesis(&config).map_err(Failure::rejected)?;
            store.save(&ledger.export()).map_err(Failure::usage)
        })
        .map_err(Failure::usage)??;
    println!(
        "genesis with {} accounts → {}",
        config.accounts.len(),
        store.path().display()
    );
    Ok(())
}

fn run(cli: Cli) -> CmdResult {
    let store = StateStore::new(cli.state);
    match cli.command {
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::Genesis { config, force } => genesis_cmd(&store, &config, force),
        Command::DeployRegistry { key } => {
            match transact(&store, &key, 0, Call::DeployRegistry)? {
                Outcome::RegistryDeployed { registry } => println!("{registry}"),
                other => print_json(&other)?,
            }
            Ok(())
        }
        Command::CreateInstance {
            registry,
            minimum,
            key,
        } => {
            let call = Call::Invoke {
                contract: registry,
                method: Method::CreateNewInstance {
                    minimum_contribution: minimum,
                },
            };
            match transact(&store, &key, 0, call)? {
                Outcome::InstanceCreated { instance } => println!("{instance}"),
                other => print_json(&other)?,
            }
            Ok(())
        }
        Command::Contribute {
            campaign,
            value,
            key,
        } => {
            let call = Call::Invoke {
                contract: campaign,
                method: Method::Contribute,
            };
            let outcome = transact(&store, &key, value, call)?;
            print_json(&outcome)
        }
        Command::Instances { registry } => {
            let ledger = open_ledger(&store)?;
            for instance in ledger.deployed_instances(&registry).map_err(Failure::rejected)? {
                println!("{instance}");
            }
            Ok(())
        }
        Command::Manager { campaign } => {
            let ledger = open_ledger(&store)?;
            println!("{}", ledger.manager(&campaign).map_err(Failure::rejected)?);
            Ok(())
        }
        Command::IsContributor { campaign, address } => {
            let ledger = open_ledger(&store)?;
            let flag = ledger
                .is_contributor(&campaign, &address)
                .map_err(Failure::rejected)?;
            println!("{flag}");
            Ok(())
        }
        Command::Summary { campaign } => {
            let ledger = open_ledger(&store)?;
            print_json(&ledger.summary(&campaign).map_err(Failure::rejected)?)
        }
        Command::Balance { address } => {
            let ledger = open_ledger(&store)?;
            println!(
                "balance={} nonce={}",
                ledger.balance(&address),
                ledger.nonce(&address)
            );
            Ok(())
        }
        Command::Snapshot => {
            let ledger = open_ledger(&store)?;
            print_json(&ledger.snapshot())
        }
        Command::Interface { contract } => print_json(&interface_for(contract.into())),
    }
}

//==================== main ====================//

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Rejected(msg)) => {
            eprintln!("rejected: {msg}");
            ExitCode::from(1)
        }
        Err(Failure::Usage(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(2)
        }
    }
}

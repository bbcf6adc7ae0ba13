#![forbid(unsafe_code)]
//! Command-line driver for the banknote ledger simulator

use banknote_ledger::blockchain::{Block, BlockChain, BlockPayload, RejectionReason};
use banknote_ledger::config::{load_config, SimConfig, DEFAULT_CONFIG_PATH};
use banknote_ledger::crypto::{CryptoService, KeyPair, VerifyTask};
use banknote_ledger::definition::ChainDefinition;
use banknote_ledger::validator::{create_rejection_block, NetworkParams, Validator};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const BUILTIN_DEFINITION: &str = "\
# serial ranges and face values
1-1000 1
1001-2000 5
2001-3000 10
";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates a P-256 key pair
    Keygen,
    /// Parses a chain definition and prints its ranges and hash
    Definition {
        /// Text or JSON definition file
        file: PathBuf,
    },
    /// Prints the modelled broadcast time for a network
    Broadcast {
        #[arg(long, default_value_t = 10)]
        node_count: u32,
        #[arg(long, default_value_t = 3.0)]
        avg_connections: f64,
        #[arg(long, default_value_t = 9.0)]
        max_delay: f64,
    },
    /// Issues a note, passes it along a line of owners and validates the result
    Simulate {
        /// Simulation config file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Where to write the serialized chain
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Keygen => keygen()?,
        Commands::Definition { file } => definition(&file)?,
        Commands::Broadcast {
            node_count,
            avg_connections,
            max_delay,
        } => broadcast(NetworkParams::new(node_count, avg_connections, max_delay)),
        Commands::Simulate { config, output } => {
            let config = load_config(&config)?;
            simulate(&config, output)?;
        }
    }
    Ok(())
}

fn keygen() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;
    println!("{}", serde_json::to_string_pretty(&keypair)?);
    Ok(())
}

fn definition(file: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let def = ChainDefinition::parse_auto(&content)?;

    println!("{}", "Chain definition".bright_cyan().bold());
    println!("  hash:  {}", def.definition_hash().bright_white());
    println!("  notes: {}", def.total_count());
    println!("  value: {}", def.total_value());
    for range in def.ranges() {
        println!(
            "  {:>8} - {:<8} {:>8} x{}",
            range.start, range.end, range.value, range.count
        );
    }
    Ok(())
}

fn broadcast(params: NetworkParams) {
    let validator = Validator::new(params);
    println!(
        "broadcast time: {:.2} ticks, max allowed delay: {:.2} ticks",
        validator.broadcast_time(),
        validator.max_allowed_delay()
    );
}

fn load_definition(config: &SimConfig) -> Result<ChainDefinition, Box<dyn std::error::Error>> {
    if config.simulation.definition.is_empty() {
        return Ok(ChainDefinition::parse_text(BUILTIN_DEFINITION)?);
    }
    let content = std::fs::read_to_string(&config.simulation.definition)?;
    Ok(ChainDefinition::parse_auto(&content)?)
}

fn simulate(config: &SimConfig, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let service = config.crypto.build_service()?;
    let validator = Validator::new(config.network.params());
    let definition = load_definition(config)?;

    println!("{}", "Banknote simulation".bright_cyan().bold());
    println!(
        "  serial {} | {} transfers | receive delay {} | broadcast time {:.2}",
        config.simulation.serial,
        config.simulation.transfers,
        config.simulation.receive_delay,
        validator.broadcast_time()
    );

    let issuer = service.generate_key_pair()?;
    let owners = (0..=config.simulation.transfers)
        .map(|_| service.generate_key_pair())
        .collect::<Result<Vec<_>, _>>()?;

    let mut chain = BlockChain::new(definition, config.simulation.serial.clone())?;
    let mut tick = 1;
    chain.create_owner_block(&owners[0].public_key, &issuer.private_key, tick)?;
    for pair in owners.windows(2) {
        tick += 1;
        chain.create_transfer_block(&pair[1].public_key, &pair[0].private_key, tick)?;
    }

    let mut rejections = Vec::new();
    for block in chain.blocks().iter().skip(1) {
        let receive_time = block.time() + config.simulation.receive_delay;
        if !validator.validate_reception(block, receive_time).is_valid {
            rejections.push(create_rejection_block(
                block,
                "simulated-node",
                RejectionReason::TimeViolation,
                receive_time,
            )?);
        }
    }

    report_double_spend(&chain, &owners)?;
    let all_signed = verify_signatures(&service, &chain);

    println!();
    println!("  value:          {}", chain.value());
    println!("  blocks:         {}", chain.len());
    println!("  chain valid:    {}", status(chain.validate_chain()));
    println!("  full verify:    {}", status(chain.verify_full()));
    println!("  signatures:     {}", status(all_signed));
    println!("  late blocks:    {}", rejections.len());
    println!(
        "  crypto metrics: {}",
        serde_json::to_string(&service.metrics().snapshot())?
    );

    if let Some(path) = output {
        std::fs::write(&path, chain.to_json()?)?;
        println!("  wrote chain to {}", path.display().to_string().bright_white());
    }
    Ok(())
}

/// Has the second-to-last owner try to spend the note again.
fn report_double_spend(chain: &BlockChain, owners: &[KeyPair]) -> Result<(), Box<dyn std::error::Error>> {
    let transfers: Vec<&Block> = chain
        .blocks()
        .iter()
        .filter(|b| matches!(b.payload(), BlockPayload::Transfer { .. }))
        .collect();
    let Some(last) = transfers.last() else {
        return Ok(());
    };
    let Some(spender) = owners.iter().find(|k| k.public_key == last.creator()) else {
        return Ok(());
    };

    let attempt = Block::create_signed(
        BlockPayload::Transfer {
            blockchain_id: chain.id().to_string(),
            target_user_id: KeyPair::generate()?.public_key,
        },
        last.prev_block_id().map(str::to_string),
        &spender.private_key,
        last.time(),
    )?;
    let fork = chain.detect_fork(&attempt);
    println!(
        "  double spend:   {}",
        match fork.reason {
            Some(reason) => format!("detected ({:?})", reason).yellow(),
            None => "not detected".red(),
        }
    );
    Ok(())
}

fn verify_signatures(service: &CryptoService, chain: &BlockChain) -> bool {
    let tasks: Vec<VerifyTask> = chain
        .blocks()
        .iter()
        .filter(|b| !b.is_root())
        .filter_map(|b| {
            Some(VerifyTask {
                id: b.id().to_string(),
                signature: b.signature().to_string(),
                message: b.canonical_payload().ok()?,
                public_key: b.creator().to_string(),
            })
        })
        .collect();
    service
        .batch_verify(tasks)
        .iter()
        .all(|r| r.result() == Some(&true))
}

fn status(ok: bool) -> ColoredString {
    if ok {
        "ok".green()
    } else {
        "FAILED".red()
    }
}

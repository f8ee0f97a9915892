//! Time-Lock CLI
//!
//! Command-line interface for time-lock encryption:
//! - Local DKG runs for inspecting keyper setups
//! - Epoch identifiers for timestamps
//! - Encryption and decryption through the service
//! - Local decryption with a released, verified epoch key

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use timelock_api::DecryptionKeyQuery;
use timelock_client::TimelockClient;
use timelock_core::primitives::g2_to_bytes;
use timelock_core::{keygen, EpochIdentifier};
use tracing::{info, Level};

/// Time-lock encryption client
#[derive(Parser)]
#[command(name = "timelock")]
#[command(about = "Threshold time-lock encryption client")]
#[command(version)]
struct Cli {
    /// Service URL
    #[arg(short, long, env = "TIMELOCK_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

/// How a ciphertext is bound to its epoch
#[derive(Args, Debug, Clone)]
struct Target {
    /// Unix timestamp (explicit mode)
    #[arg(long, conflicts_with_all = ["epoch_id", "identifier"])]
    timestamp: Option<i64>,

    /// Custom epoch identity (explicit mode)
    #[arg(long, conflicts_with = "identifier")]
    epoch_id: Option<String>,

    /// Identifier returned by an auto-mode encryption
    #[arg(long)]
    identifier: Option<String>,
}

impl Target {
    fn query(&self) -> DecryptionKeyQuery {
        DecryptionKeyQuery {
            timestamp: self.timestamp,
            epoch_id: self.epoch_id.clone(),
            identifier: self.identifier.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process DKG and print the resulting keys
    Keygen {
        /// Number of keypers
        #[arg(short, long)]
        n: usize,

        /// Threshold (t-of-n)
        #[arg(short, long)]
        t: usize,

        /// Hex-encoded 32-byte seed for a reproducible run
        #[arg(long)]
        seed: Option<String>,
    },

    /// Print the epoch identifier for a timestamp
    Epoch {
        timestamp: i64,
    },

    /// Encrypt a message through the service
    Encrypt {
        message: String,

        #[command(flatten)]
        target: Target,
    },

    /// Decrypt a ciphertext through the service
    Decrypt {
        /// Hex-encoded ciphertext
        ciphertext: String,

        #[command(flatten)]
        target: Target,
    },

    /// Fetch the epoch key, verify it and decrypt locally
    Open {
        /// Hex-encoded ciphertext
        ciphertext: String,

        #[command(flatten)]
        target: Target,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = TimelockClient::new(&cli.url);

    match cli.command {
        Commands::Keygen { n, t, ref seed } => {
            run_keygen(n, t, seed.as_deref()).await?;
        }
        Commands::Epoch { timestamp } => {
            let identifier = EpochIdentifier::from_timestamp(timestamp)?;
            println!("{}", identifier.to_hex());
        }
        Commands::Encrypt { ref message, ref target } => {
            run_encrypt(&client, message, target).await?;
        }
        Commands::Decrypt { ref ciphertext, ref target } => {
            run_decrypt(&client, ciphertext, target).await?;
        }
        Commands::Open { ref ciphertext, ref target } => {
            if target.timestamp.is_none() && target.epoch_id.is_none() && target.identifier.is_none() {
                bail!("one of --timestamp, --epoch-id or --identifier is required");
            }
            let message = client.open(ciphertext, &target.query()).await?;
            println!("{}", String::from_utf8_lossy(&message));
        }
    }

    Ok(())
}

async fn run_keygen(n: usize, t: usize, seed: Option<&str>) -> Result<()> {
    let seed = match seed {
        Some(text) => Some(parse_seed(text)?),
        None => None,
    };

    info!(n_keypers = n, threshold = t, "Starting DKG");

    let results = keygen::run_local_dkg(n, t, seed).await?;
    let Some(first) = results.first() else {
        bail!("DKG produced no results");
    };

    println!("Eon Key: {}", first.master_public_key_hex());
    println!("Threshold: {}-of-{}", first.threshold, first.n_participants);
    println!("Qualified: {:?}", first.qualified);
    println!("Public Key Shares:");
    for (id, share) in first.public_key_shares.iter().enumerate() {
        println!("  {}: {}", id, hex::encode(g2_to_bytes(share)));
    }

    Ok(())
}

async fn run_encrypt(client: &TimelockClient, message: &str, target: &Target) -> Result<()> {
    match (target.timestamp, &target.epoch_id, &target.identifier) {
        (Some(timestamp), None, None) => {
            println!("{}", client.encrypt_with_time(message, timestamp).await?);
        }
        (None, Some(epoch_id), None) => {
            println!("{}", client.encrypt_custom(message, epoch_id).await?);
        }
        (None, None, None) => {
            let response = client.encrypt(message).await?;
            println!("Ciphertext: {}", response.message);
            println!("Identifier: {}", response.identifier);
        }
        _ => bail!("encryption takes --timestamp, --epoch-id or neither"),
    }
    Ok(())
}

async fn run_decrypt(client: &TimelockClient, ciphertext: &str, target: &Target) -> Result<()> {
    let message = match (target.timestamp, &target.epoch_id, &target.identifier) {
        (Some(timestamp), None, None) => client.decrypt_with_time(ciphertext, timestamp).await?,
        (None, Some(epoch_id), None) => client.decrypt_custom(ciphertext, epoch_id).await?,
        (None, None, Some(identifier)) => client.decrypt(ciphertext, identifier).await?,
        _ => bail!("one of --timestamp, --epoch-id or --identifier is required"),
    };
    println!("{}", message);
    Ok(())
}

fn parse_seed(text: &str) -> Result<[u8; 32]> {
    hex::decode(text)?
        .try_into()
        .map_err(|_| anyhow::anyhow!("Seed must be 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed(&"07".repeat(32)).unwrap(), [7u8; 32]);
        assert!(parse_seed("0707").is_err());
        assert!(parse_seed("zz").is_err());
    }

    #[test]
    fn test_target_flags() {
        let cli = Cli::try_parse_from(["timelock", "open", "00", "--timestamp", "1700000000"]).unwrap();
        match cli.command {
            Commands::Open { target, .. } => {
                let query = target.query();
                assert_eq!(query.timestamp, Some(1_700_000_000));
                assert!(query.epoch_id.is_none());
            }
            _ => panic!("expected open"),
        }

        assert!(Cli::try_parse_from([
            "timelock", "decrypt", "00", "--timestamp", "1", "--epoch-id", "x"
        ])
        .is_err());
    }
}

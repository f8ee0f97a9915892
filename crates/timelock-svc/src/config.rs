//! Service configuration

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use timelock_core::{EpochMode, DEFAULT_KEYPERS, DEFAULT_THRESHOLD};

/// How the service picks epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Callers pass a timestamp or a custom identity
    Explicit,
    /// The service rotates a current epoch every EPOCH_DELAY seconds
    Auto,
}

/// Time-lock service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "timelock-svc")]
#[command(about = "Threshold time-lock encryption service")]
pub struct Args {
    /// Listen host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Epoch mode
    #[arg(long, env = "EPOCH_MODE", value_enum, default_value_t = ModeArg::Explicit)]
    pub epoch_mode: ModeArg,

    /// Epoch length in seconds (auto mode)
    #[arg(long, env = "EPOCH_DELAY")]
    pub epoch_delay: Option<i64>,

    /// Number of keypers in the DKG
    #[arg(short = 'n', long, env = "KEYPERS", default_value_t = DEFAULT_KEYPERS)]
    pub keypers: usize,

    /// Shares needed to derive an epoch key
    #[arg(short, long, env = "THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: usize,

    /// 32-byte hex seed for a reproducible DKG
    #[arg(long, env = "DKG_SEED")]
    pub dkg_seed: Option<String>,

    /// Derive sigma from the wall clock like older deployments
    #[arg(long, env = "LEGACY_SIGMA")]
    pub legacy_sigma: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn mode(&self) -> Result<EpochMode> {
        match self.epoch_mode {
            ModeArg::Explicit => Ok(EpochMode::Explicit),
            ModeArg::Auto => {
                let delay = self
                    .epoch_delay
                    .context("EPOCH_DELAY is required in auto epoch mode")?;
                if delay <= 0 {
                    bail!("EPOCH_DELAY must be positive, got {}", delay);
                }
                Ok(EpochMode::Auto { delay })
            }
        }
    }

    pub fn seed(&self) -> Result<Option<[u8; 32]>> {
        self.dkg_seed
            .as_deref()
            .map(|text| {
                let bytes = hex::decode(text).context("DKG_SEED is not hex")?;
                <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| anyhow!("DKG_SEED must be 32 bytes, got {}", bytes.len()))
            })
            .transpose()
    }
}

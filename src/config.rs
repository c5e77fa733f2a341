// region:    --- Modules

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::send::DEFAULT_REDUNDANCY_FACTOR;
use crate::{Error, Result};

// endregion: --- Modules

/*
Environment variables (a .env file is loaded first by the binary):
    TRANSFER_MODE      send | recv | simulate
    LOCAL_ADDRESS      bind address                     (default 0.0.0.0)
    LOCAL_PORT         bind port                        (default 8000 send, 8001 recv)
    FOREIGN_ADDRESS    receiver address, send only
    FOREIGN_PORT       receiver port                    (default 8001)
    CHUNK_LENGTH       bytes per chunk                  (default 300)
    REDUNDANCY_FACTOR  frames per cycle / chunk count   (default 2.0)
    FRAME_INTERVAL_MS  display cadence                  (default 100)
    SEND_CYCLES        display cycles, 0 = forever      (default 0)
    SENDING_FILE       payload file, send / simulate
    RECEIVED_FILE      output file, recv / simulate     (default ./received.bin)
    LOSS_RATE          simulated frame loss in [0, 1)   (default 0.3)
    SIMULATION_SEED    seed of the simulated channel    (default 0)
*/

pub const DEFAULT_CHUNK_LENGTH: usize = 300;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 100;
pub const DEFAULT_LOSS_RATE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Send,
    Recv,
    Simulate,
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "send" => Ok(Self::Send),
            "recv" => Ok(Self::Recv),
            "simulate" => Ok(Self::Simulate),
            other => Err(format!(
                "'{other}' is not one of send, recv, simulate"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub mode: TransferMode,
    pub local_address: String,
    pub local_port: u16,
    pub foreign_address: Option<String>,
    pub foreign_port: u16,
    pub chunk_length: usize,
    pub redundancy_factor: f64,
    pub frame_interval: Duration,
    pub send_cycles: u64,
    pub sending_file: Option<PathBuf>,
    pub received_file: PathBuf,
    pub loss_rate: f64,
    pub simulation_seed: u64,
}

impl TransferConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode: TransferMode = required(&lookup, "TRANSFER_MODE")?;
        let default_local_port = match mode {
            TransferMode::Recv => 8001,
            _ => 8000,
        };

        let config = Self {
            mode,
            local_address: optional(&lookup, "LOCAL_ADDRESS")?
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            local_port: optional(&lookup, "LOCAL_PORT")?.unwrap_or(default_local_port),
            foreign_address: optional(&lookup, "FOREIGN_ADDRESS")?,
            foreign_port: optional(&lookup, "FOREIGN_PORT")?.unwrap_or(8001),
            chunk_length: optional(&lookup, "CHUNK_LENGTH")?.unwrap_or(DEFAULT_CHUNK_LENGTH),
            redundancy_factor: optional(&lookup, "REDUNDANCY_FACTOR")?
                .unwrap_or(DEFAULT_REDUNDANCY_FACTOR),
            frame_interval: Duration::from_millis(
                optional(&lookup, "FRAME_INTERVAL_MS")?.unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
            ),
            send_cycles: optional(&lookup, "SEND_CYCLES")?.unwrap_or(0),
            sending_file: optional(&lookup, "SENDING_FILE")?,
            received_file: optional(&lookup, "RECEIVED_FILE")?
                .unwrap_or_else(|| PathBuf::from("./received.bin")),
            loss_rate: optional(&lookup, "LOSS_RATE")?.unwrap_or(DEFAULT_LOSS_RATE),
            simulation_seed: optional(&lookup, "SIMULATION_SEED")?.unwrap_or(0),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_length == 0 {
            return Err(invalid("CHUNK_LENGTH", "must be positive"));
        }
        if !self.redundancy_factor.is_finite() || self.redundancy_factor < 1.0 {
            return Err(invalid("REDUNDANCY_FACTOR", "must be at least 1.0"));
        }
        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(invalid("LOSS_RATE", "must be in [0, 1)"));
        }
        match self.mode {
            TransferMode::Send if self.foreign_address.is_none() => {
                Err(invalid("FOREIGN_ADDRESS", "required in send mode"))
            }
            TransferMode::Send if self.sending_file.is_none() => {
                Err(invalid("SENDING_FILE", "required in send mode"))
            }
            _ => Ok(()),
        }
    }
}

fn invalid(var: &str, reason: impl Into<String>) -> Error {
    Error::Config {
        var: var.to_string(),
        reason: reason.into(),
    }
}

fn required<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(lookup, var)?.ok_or_else(|| invalid(var, "not set"))
}

fn optional<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| invalid(var, format!("cannot parse '{raw}': {err}"))),
        _ => Ok(None),
    }
}

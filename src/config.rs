//! Configuration for the wagering engines.
//!
//! Loaded from a TOML file with `STAKEHOUSE_*` environment overrides, then
//! validated before any engine is built. Everything that can be rejected at
//! configuration time is rejected here rather than inside an operation.

use crate::escrow::FEE_CAP_BPS;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Configuration and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasinoConfig {
    /// Single privileged operator for all admin operations.
    pub admin: String,
    pub raffle: RaffleConfig,
    pub duel: DuelConfig,
    pub bingo: BingoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaffleConfig {
    /// Price per ticket in base units.
    pub ticket_price: u64,
    pub max_tickets_per_player: u64,
    pub platform_address: String,
    pub charity_address: String,
    /// Basis points taken from each pool for the platform.
    pub platform_fee_bps: u16,
    /// Basis points taken from each pool for the charity.
    pub charity_fee_bps: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelConfig {
    pub min_bet: u64,
    pub max_bet: u64,
    /// Bankroll the house starts with; payouts draw against it.
    pub initial_house_funding: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BingoConfig {
    /// Price per card in base units.
    pub card_price: u64,
}

impl Default for CasinoConfig {
    fn default() -> Self {
        Self {
            admin: "operator".to_string(),
            raffle: RaffleConfig::default(),
            duel: DuelConfig::default(),
            bingo: BingoConfig::default(),
        }
    }
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            ticket_price: 10_000_000,
            max_tickets_per_player: 100,
            platform_address: "platform-treasury".to_string(),
            charity_address: "charity-treasury".to_string(),
            platform_fee_bps: 250,
            charity_fee_bps: 250,
        }
    }
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            min_bet: 1_000_000,
            max_bet: 1_000_000_000,
            initial_house_funding: 10_000_000_000,
        }
    }
}

impl Default for BingoConfig {
    fn default() -> Self {
        Self {
            card_price: 10_000_000,
        }
    }
}

/// Loader with file and environment-variable sources.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load from file (if set), apply env overrides, validate.
    pub fn load(&self) -> ConfigResult<CasinoConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            CasinoConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> ConfigResult<CasinoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut CasinoConfig) -> ConfigResult<()> {
        if let Ok(admin) = env::var("STAKEHOUSE_ADMIN") {
            config.admin = admin;
        }
        if let Ok(price) = env::var("STAKEHOUSE_TICKET_PRICE") {
            config.raffle.ticket_price = parse_env("STAKEHOUSE_TICKET_PRICE", &price)?;
        }
        if let Ok(max) = env::var("STAKEHOUSE_MAX_TICKETS") {
            config.raffle.max_tickets_per_player = parse_env("STAKEHOUSE_MAX_TICKETS", &max)?;
        }
        if let Ok(min_bet) = env::var("STAKEHOUSE_MIN_BET") {
            config.duel.min_bet = parse_env("STAKEHOUSE_MIN_BET", &min_bet)?;
        }
        if let Ok(max_bet) = env::var("STAKEHOUSE_MAX_BET") {
            config.duel.max_bet = parse_env("STAKEHOUSE_MAX_BET", &max_bet)?;
        }
        if let Ok(price) = env::var("STAKEHOUSE_CARD_PRICE") {
            config.bingo.card_price = parse_env("STAKEHOUSE_CARD_PRICE", &price)?;
        }
        Ok(())
    }

    fn validate(&self, config: &CasinoConfig) -> ConfigResult<()> {
        if config.admin.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "admin".to_string(),
                value: String::new(),
                reason: "admin address cannot be empty".to_string(),
            });
        }

        if config.raffle.ticket_price == 0 {
            return Err(ConfigError::InvalidValue {
                field: "raffle.ticket_price".to_string(),
                value: "0".to_string(),
                reason: "ticket price cannot be zero".to_string(),
            });
        }
        if config.raffle.max_tickets_per_player == 0 {
            return Err(ConfigError::InvalidValue {
                field: "raffle.max_tickets_per_player".to_string(),
                value: "0".to_string(),
                reason: "per-player limit cannot be zero".to_string(),
            });
        }

        let total_bps =
            config.raffle.platform_fee_bps as u32 + config.raffle.charity_fee_bps as u32;
        if total_bps > FEE_CAP_BPS {
            return Err(ConfigError::InvalidValue {
                field: "raffle.platform_fee_bps + raffle.charity_fee_bps".to_string(),
                value: total_bps.to_string(),
                reason: format!("combined fees cannot exceed {} bps", FEE_CAP_BPS),
            });
        }

        if config.duel.min_bet == 0 {
            return Err(ConfigError::InvalidValue {
                field: "duel.min_bet".to_string(),
                value: "0".to_string(),
                reason: "minimum bet cannot be zero".to_string(),
            });
        }
        if config.duel.min_bet > config.duel.max_bet {
            return Err(ConfigError::InvalidValue {
                field: "duel.max_bet".to_string(),
                value: config.duel.max_bet.to_string(),
                reason: "maximum bet is below the minimum bet".to_string(),
            });
        }

        if config.bingo.card_price == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bingo.card_price".to_string(),
                value: "0".to_string(),
                reason: "card price cannot be zero".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, config: &CasinoConfig, path: &str) -> ConfigResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to write to {}: {}", path, e)))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env(field: &str, value: &str) -> ConfigResult<u64> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: "expected an unsigned integer".to_string(),
    })
}

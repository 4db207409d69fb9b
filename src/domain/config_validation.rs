//! Building a validated [`SimulationConfig`] from a [`ConfigPort`].
//!
//! Missing keys fall back to the defaults; malformed values are rejected with
//! the section and key that carried them.

use crate::domain::ambiguity::AmbiguityPolicy;
use crate::domain::config::SimulationConfig;
use crate::domain::error::SimError;
use crate::ports::config_port::ConfigPort;

pub fn build_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, SimError> {
    let defaults = SimulationConfig::default();
    let sim = SimulationConfig {
        initial_balance: read_double(config, "account", "initial_balance", defaults.initial_balance)?,
        leverage: read_double(config, "account", "leverage", defaults.leverage)?,
        fee_rate: read_double(config, "account", "fee_rate", defaults.fee_rate)?,
        trigger_multiplier: read_double(
            config,
            "entry",
            "trigger_multiplier",
            defaults.trigger_multiplier,
        )?,
        max_wait_bars: read_wait_bars(config, defaults.max_wait_bars)?,
        max_risk: read_double(config, "exits", "max_risk", defaults.max_risk)?,
        target_return: read_double(config, "exits", "target_return", defaults.target_return)?,
        stop_atr_multiplier: read_double(
            config,
            "exits",
            "stop_atr_multiplier",
            defaults.stop_atr_multiplier,
        )?,
        target_atr_multiplier: read_double(
            config,
            "exits",
            "target_atr_multiplier",
            defaults.target_atr_multiplier,
        )?,
        ambiguity: read_ambiguity(config, defaults.ambiguity)?,
        risk_free_rate: read_double(config, "report", "risk_free_rate", defaults.risk_free_rate)?,
        periods_per_year: config
            .get_double("report", "periods_per_year")
            .map_err(|reason| SimError::invalid("report", "periods_per_year", reason))?,
    };
    sim.validate()?;
    Ok(sim)
}

pub fn validate_simulation_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    build_simulation_config(config).map(|_| ())
}

/// `[simulation] seed`, if set.
pub fn read_seed(config: &dyn ConfigPort) -> Result<Option<u64>, SimError> {
    config
        .get_uint("simulation", "seed")
        .map_err(|reason| SimError::invalid("simulation", "seed", reason))
}

fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SimError> {
    match config.get_double(section, key) {
        Ok(value) => Ok(value.unwrap_or(default)),
        Err(reason) => Err(SimError::invalid(section, key, reason)),
    }
}

fn read_wait_bars(config: &dyn ConfigPort, default: usize) -> Result<usize, SimError> {
    let value = config
        .get_uint("entry", "max_wait_bars")
        .map_err(|reason| SimError::invalid("entry", "max_wait_bars", reason))?;
    match value {
        None => Ok(default),
        Some(v) => usize::try_from(v)
            .map_err(|_| SimError::invalid("entry", "max_wait_bars", "max_wait_bars is too large")),
    }
}

fn read_ambiguity(
    config: &dyn ConfigPort,
    default: AmbiguityPolicy,
) -> Result<AmbiguityPolicy, SimError> {
    match config.get_string("exits", "ambiguity") {
        None => Ok(default),
        Some(name) => name
            .parse()
            .map_err(|reason: String| SimError::invalid("exits", "ambiguity", reason)),
    }
}

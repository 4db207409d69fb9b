//! Resolution of bars whose range contains both the stop and the target.
//!
//! OHLC data cannot tell which level was touched first. The default policy
//! flips a fair coin using an injected [`RandomSource`], so runs stay
//! reproducible under a fixed seed.

use std::str::FromStr;

use super::position::ExitReason;

/// Source of uniform draws in `[0, 1)`.
pub trait RandomSource {
    fn draw(&mut self) -> f64;
}

impl<R: rand::RngCore> RandomSource for R {
    fn draw(&mut self) -> f64 {
        rand::Rng::r#gen::<f64>(self)
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    draws: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(draws: Vec<f64>) -> Self {
        ScriptedSource { draws, cursor: 0 }
    }

    /// Every draw lands on the target side of the coin.
    pub fn always_target() -> Self {
        Self::new(vec![0.0])
    }

    /// Every draw lands on the stop side of the coin.
    pub fn always_stop() -> Self {
        Self::new(vec![0.99])
    }
}

impl RandomSource for ScriptedSource {
    fn draw(&mut self) -> f64 {
        if self.draws.is_empty() {
            return 0.5;
        }
        let value = self.draws[self.cursor % self.draws.len()];
        self.cursor += 1;
        value
    }
}

/// How an ambiguous bar is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// 50/50 between stop and target.
    #[default]
    CoinFlip,
    /// Average of stop and target.
    Midpoint,
    /// Always the stop (worst case).
    StopFirst,
    /// Always the target (best case).
    TargetFirst,
}

impl AmbiguityPolicy {
    pub const NAMES: [&'static str; 4] = ["coin_flip", "midpoint", "stop_first", "target_first"];

    /// Exit price and reason for an ambiguous bar.
    pub fn resolve(
        self,
        stop: f64,
        target: f64,
        source: &mut dyn RandomSource,
    ) -> (f64, ExitReason) {
        match self {
            AmbiguityPolicy::CoinFlip => {
                if source.draw() < 0.5 {
                    (target, ExitReason::TakeProfit)
                } else {
                    (stop, ExitReason::StopLoss)
                }
            }
            AmbiguityPolicy::Midpoint => ((stop + target) / 2.0, ExitReason::Blended),
            AmbiguityPolicy::StopFirst => (stop, ExitReason::StopLoss),
            AmbiguityPolicy::TargetFirst => (target, ExitReason::TakeProfit),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AmbiguityPolicy::CoinFlip => "coin_flip",
            AmbiguityPolicy::Midpoint => "midpoint",
            AmbiguityPolicy::StopFirst => "stop_first",
            AmbiguityPolicy::TargetFirst => "target_first",
        }
    }
}

impl std::fmt::Display for AmbiguityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "coin_flip" | "random" => Ok(AmbiguityPolicy::CoinFlip),
            "midpoint" | "average" => Ok(AmbiguityPolicy::Midpoint),
            "stop_first" | "worst_case" => Ok(AmbiguityPolicy::StopFirst),
            "target_first" | "best_case" => Ok(AmbiguityPolicy::TargetFirst),
            other => Err(format!(
                "unknown ambiguity policy '{other}', expected one of {}",
                Self::NAMES.join(", ")
            )),
        }
    }
}

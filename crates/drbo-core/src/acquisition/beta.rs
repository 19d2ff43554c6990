//! Exploration weight `β_t` for upper confidence bounds.

use std::f64::consts::PI;

use drbo_config::BetaConfig;
use serde::{Deserialize, Serialize};

/// How `β_t` evolves over rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetaSchedule {
    /// The same `β` every round.
    Constant { value: f64 },
    /// `β_t = sqrt(2 ln(|D| t² π² / (6δ)))` for a finite domain `D`
    /// (Srinivas et al., 2010, Theorem 1).
    Srinivas { delta: f64 },
}

impl Default for BetaSchedule {
    fn default() -> Self {
        BetaSchedule::Constant { value: 2.0 }
    }
}

impl From<&BetaConfig> for BetaSchedule {
    fn from(config: &BetaConfig) -> Self {
        match *config {
            BetaConfig::Constant { value } => BetaSchedule::Constant { value },
            BetaConfig::Srinivas { delta } => BetaSchedule::Srinivas { delta },
        }
    }
}

impl BetaSchedule {
    /// `β` for 1-based round `t` over a domain of `domain_size` points.
    pub fn beta(&self, t: usize, domain_size: usize) -> f64 {
        match *self {
            BetaSchedule::Constant { value } => value,
            BetaSchedule::Srinivas { delta } => {
                let t = t.max(1) as f64;
                let d = domain_size.max(1) as f64;
                let inner = d * t * t * PI * PI / (6.0 * delta);
                (2.0 * inner.ln()).max(0.0).sqrt()
            }
        }
    }
}

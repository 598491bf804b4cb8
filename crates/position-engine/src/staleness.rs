use common::StalenessScore;
use serde::{Deserialize, Serialize};

const TIME_MAX: f64 = 40.0;
const PRICE_MAX: f64 = 30.0;
const VOLUME_MAX: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessParams {
    #[serde(default = "default_min_hold_hours")]
    pub min_hold_hours: f64,
    #[serde(default = "default_mid_hold_hours")]
    pub mid_hold_hours: f64,
    #[serde(default = "default_max_hold_hours")]
    pub max_hold_hours: f64,
    /// Gain (percent) below which holding past mid/max is penalised.
    #[serde(default = "default_min_gain_pct")]
    pub min_gain_pct: f64,
    #[serde(default = "default_flat_penalty")]
    pub flat_penalty: f64,
    #[serde(default = "default_volume_decay_strict")]
    pub volume_decay_strict: f64,
    #[serde(default = "default_volume_decay_loose")]
    pub volume_decay_loose: f64,
    #[serde(default = "default_stale_score")]
    pub stale_score: f64,
}

fn default_min_hold_hours() -> f64 {
    24.0
}
fn default_mid_hold_hours() -> f64 {
    48.0
}
fn default_max_hold_hours() -> f64 {
    96.0
}
fn default_min_gain_pct() -> f64 {
    5.0
}
fn default_flat_penalty() -> f64 {
    15.0
}
fn default_volume_decay_strict() -> f64 {
    0.3
}
fn default_volume_decay_loose() -> f64 {
    0.5
}
fn default_stale_score() -> f64 {
    70.0
}

impl Default for StalenessParams {
    fn default() -> Self {
        Self {
            min_hold_hours: default_min_hold_hours(),
            mid_hold_hours: default_mid_hold_hours(),
            max_hold_hours: default_max_hold_hours(),
            min_gain_pct: default_min_gain_pct(),
            flat_penalty: default_flat_penalty(),
            volume_decay_strict: default_volume_decay_strict(),
            volume_decay_loose: default_volume_decay_loose(),
            stale_score: default_stale_score(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StalenessInput {
    pub hours_held: f64,
    /// Unrealized P&L percent; `None` while the entry price is pending.
    pub pnl_pct: Option<f64>,
    pub entry_social_volume: u32,
    pub current_social_volume: u32,
}

impl StalenessParams {
    fn time_component(&self, hours: f64) -> f64 {
        if hours <= self.mid_hold_hours {
            return 0.0;
        }
        if hours >= self.max_hold_hours {
            return TIME_MAX;
        }
        let span = (self.max_hold_hours - self.mid_hold_hours).max(f64::EPSILON);
        TIME_MAX * (hours - self.mid_hold_hours) / span
    }

    fn price_component(&self, hours: f64, pnl_pct: Option<f64>) -> f64 {
        match pnl_pct {
            Some(pnl) if pnl < 0.0 => {
                let loss = pnl.abs() * 3.0;
                // Past mid hold a loser is never fresher than a flat position.
                let floor = if hours > self.mid_hold_hours {
                    self.flat_penalty
                } else {
                    0.0
                };
                loss.max(floor).min(PRICE_MAX)
            }
            Some(pnl) if hours > self.mid_hold_hours && pnl < self.min_gain_pct => {
                self.flat_penalty.min(PRICE_MAX)
            }
            _ => 0.0,
        }
    }

    fn volume_component(&self, entry: u32, current: u32) -> f64 {
        if entry == 0 {
            return 0.0;
        }
        let ratio = current as f64 / entry as f64;
        if ratio < self.volume_decay_strict {
            VOLUME_MAX
        } else if ratio < self.volume_decay_loose {
            VOLUME_MAX / 2.0
        } else {
            0.0
        }
    }

    /// Score a held equity/crypto position. Options never reach here.
    pub fn score(&self, input: &StalenessInput) -> StalenessScore {
        if input.hours_held < self.min_hold_hours {
            return StalenessScore {
                score: 0.0,
                is_stale: false,
                reason: format!("held {:.1}h < min hold", input.hours_held),
            };
        }

        let time = self.time_component(input.hours_held);
        let price = self.price_component(input.hours_held, input.pnl_pct);
        let volume =
            self.volume_component(input.entry_social_volume, input.current_social_volume);
        let score = (time + price + volume).min(100.0);

        let overstayed = input.hours_held >= self.max_hold_hours
            && input.pnl_pct.map(|p| p < self.min_gain_pct).unwrap_or(false);
        let is_stale = score >= self.stale_score || overstayed;

        let mut reason = format!(
            "time={:.0} price={:.0} volume={:.0}",
            time, price, volume
        );
        if overstayed {
            reason.push_str(" (past max hold without enough gain)");
        }

        StalenessScore {
            score,
            is_stale,
            reason,
        }
    }
}

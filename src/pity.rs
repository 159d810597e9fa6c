//! Pity curve: per-pull 5★ probability as a function of the pull index.

use crate::error::{GachaError, Result};

/// Immutable rate parameters of a banner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BannerParameters {
    /// 5★ probability before soft pity starts.
    pub base_rate: f64,
    /// Pull index at which a 5★ is certain.
    pub hard_pity: u32,
    /// Pull index at which the ramp begins.
    pub soft_pity_start: u32,
    /// Probability that a 5★ drawn without any guarantee is the wanted one.
    pub wanted_given_5star: f64,
}

impl BannerParameters {
    pub fn new(
        base_rate: f64,
        hard_pity: u32,
        soft_pity_start: u32,
        wanted_given_5star: f64,
    ) -> Result<Self> {
        let params = BannerParameters {
            base_rate,
            hard_pity,
            soft_pity_start,
            wanted_given_5star,
        };
        params.validate()?;
        Ok(params)
    }

    /// Character event banner: 0.6%, soft pity at 74, hard pity at 90, 50/50.
    pub fn character() -> Self {
        BannerParameters {
            base_rate: 0.006,
            hard_pity: 90,
            soft_pity_start: 74,
            wanted_given_5star: 0.5,
        }
    }

    /// Weapon event banner: 0.7%, soft pity at 63, hard pity at 77, 75% in pool x 50% chosen.
    pub fn weapon() -> Self {
        BannerParameters {
            base_rate: 0.007,
            hard_pity: 77,
            soft_pity_start: 63,
            wanted_given_5star: 0.375,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_rate.is_finite() && self.base_rate > 0.0 && self.base_rate <= 1.0) {
            return Err(GachaError::Configuration(format!(
                "base_rate must be in (0, 1], got {}",
                self.base_rate
            )));
        }
        if self.soft_pity_start == 0 {
            return Err(GachaError::Configuration(
                "soft_pity_start must be at least 1".to_string(),
            ));
        }
        if self.soft_pity_start > self.hard_pity {
            return Err(GachaError::Configuration(format!(
                "soft_pity_start ({}) exceeds hard_pity ({})",
                self.soft_pity_start, self.hard_pity
            )));
        }
        if !(self.wanted_given_5star.is_finite()
            && self.wanted_given_5star > 0.0
            && self.wanted_given_5star <= 1.0)
        {
            return Err(GachaError::Configuration(format!(
                "wanted_given_5star must be in (0, 1], got {}",
                self.wanted_given_5star
            )));
        }
        Ok(())
    }

    /// Per-pull increment once soft pity is reached. The ceil to whole percents
    /// is how the game's published curve is approximated and must stay coarse.
    pub fn ramp_step(&self) -> f64 {
        let span = (self.hard_pity - self.soft_pity_start + 1) as f64;
        (100.0 / span).ceil() / 100.0
    }

    /// 5★ probability of the pull whose pity index is `pull_index`
    /// (the first pull after a 5★ has index 1).
    pub fn rate(&self, pull_index: u32) -> f64 {
        if pull_index >= self.hard_pity {
            return 1.0;
        }
        if pull_index < self.soft_pity_start {
            return self.base_rate;
        }
        let offset = (pull_index - self.soft_pity_start + 1) as f64;
        (self.base_rate + self.ramp_step() * offset).min(1.0)
    }

    /// `(pull_index, rate)` for every pull up to hard pity.
    pub fn curve(&self) -> Vec<(u32, f64)> {
        (1..=self.hard_pity).map(|i| (i, self.rate(i))).collect()
    }

    /// Mean number of pulls between two 5★ drops, from pity 0.
    pub fn expected_pulls_per_five_star(&self) -> f64 {
        let mut survival = 1.0;
        let mut expected = 0.0;
        for k in 1..=self.hard_pity {
            let p = self.rate(k);
            expected += k as f64 * survival * p;
            survival *= 1.0 - p;
            if p >= 1.0 {
                break;
            }
        }
        expected
    }
}

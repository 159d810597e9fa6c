//! Character + weapon banners sharing one wish budget.

use crate::banner::BannerStateMachine;
use crate::error::{GachaError, Result};
use crate::exact::{convolve, ExactEngine, Pmf};
use crate::sim::{success_fraction, MonteCarlo};
use log::debug;

/// Wanted copies per banner (constellations / refinements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Targets {
    pub character: u32,
    pub weapon: u32,
}

impl Default for Targets {
    fn default() -> Self {
        Targets {
            character: 1,
            weapon: 1,
        }
    }
}

/// Outcome of one budget split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub character_wishes: u32,
    pub weapon_wishes: u32,
    /// Probability the character target is missed with its share.
    pub p_no_character: f64,
    /// Probability the weapon target is missed with its share.
    pub p_no_weapon: f64,
    /// Both targets reached.
    pub both: f64,
    /// At least one of the two targets reached.
    pub either: f64,
}

pub struct CombinedBannerAllocator {
    character: BannerStateMachine,
    weapon: BannerStateMachine,
}

impl CombinedBannerAllocator {
    pub fn new(character: BannerStateMachine, weapon: BannerStateMachine) -> Self {
        CombinedBannerAllocator { character, weapon }
    }

    fn split(total_budget: u32, character_wishes: u32) -> Result<u32> {
        total_budget.checked_sub(character_wishes).ok_or_else(|| {
            GachaError::DomainRange(format!(
                "character share {} exceeds total budget {}",
                character_wishes, total_budget
            ))
        })
    }

    fn target_pmf(machine: &BannerStateMachine, target: u32, wishes: u32) -> Result<Pmf> {
        ExactEngine::new(*machine.definition())?.k_item_pmf_from(target, wishes, machine.start())
    }

    // Product of (1 - h_j) over the allocated pulls, h_j being the per-pull hazard of the target.
    fn miss_probability(machine: &BannerStateMachine, target: u32, wishes: u32) -> Result<f64> {
        let pmf = Self::target_pmf(machine, target, wishes)?;
        Ok(pmf
            .hazards()
            .iter()
            .map(|h| 1.0 - h)
            .product::<f64>()
            .clamp(0.0, 1.0))
    }

    /// Single-item miss chance from the per-pull rate `rate(pity + j) * wanted_given_5star`.
    /// Ignores the guarantee, radiance, fate points and the pity reset, so it is only a
    /// rough figure within one pity cycle. Kept for comparison with the exact form.
    pub fn naive_miss_probability(machine: &BannerStateMachine, wishes: u32) -> f64 {
        let params = &machine.definition().params;
        let pity = machine.start().pity;
        (1..=wishes)
            .map(|j| 1.0 - params.rate(pity + j) * params.wanted_given_5star)
            .product::<f64>()
            .clamp(0.0, 1.0)
    }

    /// `joint_probability` for one wanted item per banner, using the per-pull approximation.
    pub fn naive_joint_probability(
        &self,
        total_budget: u32,
        character_wishes: u32,
    ) -> Result<Allocation> {
        let weapon_wishes = Self::split(total_budget, character_wishes)?;
        let p_no_character = Self::naive_miss_probability(&self.character, character_wishes);
        let p_no_weapon = Self::naive_miss_probability(&self.weapon, weapon_wishes);
        Ok(Allocation {
            character_wishes,
            weapon_wishes,
            p_no_character,
            p_no_weapon,
            both: (1.0 - p_no_character) * (1.0 - p_no_weapon),
            either: 1.0 - p_no_character * p_no_weapon,
        })
    }

    /// Exact joint probability for `character_wishes` on the character banner and the rest on the weapon banner.
    pub fn joint_probability(
        &self,
        total_budget: u32,
        character_wishes: u32,
        targets: Targets,
    ) -> Result<Allocation> {
        let weapon_wishes = Self::split(total_budget, character_wishes)?;
        let p_no_character = Self::miss_probability(&self.character, targets.character, character_wishes)?;
        let p_no_weapon = Self::miss_probability(&self.weapon, targets.weapon, weapon_wishes)?;
        Ok(Allocation {
            character_wishes,
            weapon_wishes,
            p_no_character,
            p_no_weapon,
            both: (1.0 - p_no_character) * (1.0 - p_no_weapon),
            either: 1.0 - p_no_character * p_no_weapon,
        })
    }

    /// Paired trials of both banners under the split; fraction where both targets are reached.
    pub fn joint_monte_carlo(
        &self,
        sim: &MonteCarlo,
        total_budget: u32,
        character_wishes: u32,
        targets: Targets,
        trials: usize,
    ) -> Result<f64> {
        let weapon_wishes = Self::split(total_budget, character_wishes)?;
        let outcomes = sim.run_trials(
            trials,
            || (self.character.clone(), self.weapon.clone()),
            |pair: &mut (BannerStateMachine, BannerStateMachine), rng| {
                let (character, weapon) = pair;
                let (char_ok, _) = character.try_pull(character_wishes, targets.character, rng);
                let (weapon_ok, _) = weapon.try_pull(weapon_wishes, targets.weapon, rng);
                char_ok && weapon_ok
            },
        )?;
        Ok(success_fraction(&outcomes))
    }

    /// Wishes after which both targets are reached whatever the rolls are.
    pub fn worst_case_pulls(&self, targets: Targets) -> u32 {
        self.character.definition().worst_case_pulls(targets.character)
            + self.weapon.definition().worst_case_pulls(targets.weapon)
    }

    /// Character banner first, every leftover wish on the weapon banner.
    pub fn sequential_probability(&self, total_budget: u32, targets: Targets) -> Result<f64> {
        if self.worst_case_pulls(targets) <= total_budget {
            return Ok(1.0);
        }
        let character = Self::target_pmf(&self.character, targets.character, total_budget)?;
        let weapon = Self::target_pmf(&self.weapon, targets.weapon, total_budget)?;
        let both = convolve(&character, &weapon, total_budget);
        debug!(
            "[Combined] sequential budget={} targets={:?} coverage={:.6}",
            total_budget,
            targets,
            both.coverage()
        );
        Ok(both.cumulative(total_budget))
    }

    pub fn sequential_monte_carlo(
        &self,
        sim: &MonteCarlo,
        total_budget: u32,
        targets: Targets,
        trials: usize,
    ) -> Result<f64> {
        if self.worst_case_pulls(targets) <= total_budget {
            return Ok(1.0);
        }
        let outcomes = sim.run_trials(
            trials,
            || (self.character.clone(), self.weapon.clone()),
            |pair: &mut (BannerStateMachine, BannerStateMachine), rng| {
                let (character, weapon) = pair;
                let (char_ok, remaining) = character.try_pull(total_budget, targets.character, rng);
                char_ok && weapon.try_pull(remaining, targets.weapon, rng).0
            },
        )?;
        Ok(success_fraction(&outcomes))
    }

    /// Every split from 0 to `total_budget` in `step` increments, plus the full budget.
    pub fn sweep(&self, total_budget: u32, step: u32, targets: Targets) -> Result<Vec<Allocation>> {
        let step = step.max(1);
        let mut splits: Vec<u32> = (0..=total_budget).step_by(step as usize).collect();
        if splits.last() != Some(&total_budget) {
            splits.push(total_budget);
        }
        splits
            .into_iter()
            .map(|w| self.joint_probability(total_budget, w, targets))
            .collect()
    }
}

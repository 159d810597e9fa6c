//! Exact probability mass functions over the pull at which wanted items arrive.
//!
//! All arithmetic is plain f64 accumulation: every term is a product of
//! probabilities, so there is no cancellation to guard against and double
//! precision keeps the totals within ~1e-12 of the true mass.

use crate::banner::{BannerDefinition, MechanicState, StartState};
use crate::error::{GachaError, Result};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;

// Mass below this is reported as complete coverage.
const COVERAGE_EPSILON: f64 = 1e-9;

/// Probability that an event happens exactly at pull index `i`, for `i` in `0..=max_wishes`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pmf {
    probs: Vec<f64>,
}

impl Pmf {
    pub fn from_probs(probs: Vec<f64>) -> Self {
        Pmf { probs }
    }

    /// All mass at index 0: the event needs no pulls.
    pub fn point_mass(max_wishes: u32) -> Self {
        let mut probs = vec![0.0; max_wishes as usize + 1];
        probs[0] = 1.0;
        Pmf { probs }
    }

    pub fn max_wishes(&self) -> u32 {
        self.probs.len().saturating_sub(1) as u32
    }

    pub fn get(&self, index: u32) -> f64 {
        self.probs.get(index as usize).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.probs.iter().enumerate().map(|(i, &p)| (i as u32, p))
    }

    pub fn total_mass(&self) -> f64 {
        self.probs.iter().sum()
    }

    /// Share of the true distribution captured within `max_wishes`.
    pub fn coverage(&self) -> f64 {
        self.total_mass().clamp(0.0, 1.0)
    }

    /// Mass lying beyond `max_wishes`.
    pub fn tail_mass(&self) -> f64 {
        1.0 - self.coverage()
    }

    pub fn is_complete(&self) -> bool {
        self.tail_mass() < COVERAGE_EPSILON
    }

    /// Probability that the event happened within `wishes` pulls.
    pub fn cumulative(&self, wishes: u32) -> f64 {
        if wishes > self.max_wishes() && !self.is_complete() {
            warn!(
                "[Exact] cumulative over {} wishes but PMF stops at {} (tail mass {:.3e})",
                wishes,
                self.max_wishes(),
                self.tail_mass()
            );
        }
        let end = (wishes as usize + 1).min(self.probs.len());
        self.probs[..end].iter().sum::<f64>().clamp(0.0, 1.0)
    }

    /// `Σ a * pmf[a]`. Under-counts when the PMF is truncated.
    pub fn mean(&self) -> f64 {
        if !self.is_complete() {
            warn!(
                "[Exact] mean over truncated PMF (coverage {:.6})",
                self.coverage()
            );
        }
        self.iter().map(|(i, p)| i as f64 * p).sum()
    }

    /// Pretty-printed JSON of the mass vector.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(GachaError::Export)
    }

    /// Per-pull conditional probability that the event happens at pull `j`
    /// given it has not happened before, for `j` in `0..=max_wishes`.
    /// Once no mass survives the hazard is 1.
    pub fn hazards(&self) -> Vec<f64> {
        let mut survival = 1.0;
        self.probs
            .iter()
            .map(|&p| {
                let h = if survival > 0.0 {
                    (p / survival).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                survival = (survival - p).max(0.0);
                h
            })
            .collect()
    }
}

/// Discrete convolution truncated at `max_wishes`:
/// `result[n] = Σ_{i=0}^{n} a[i] * b[n - i]`.
pub fn convolve(a: &Pmf, b: &Pmf, max_wishes: u32) -> Pmf {
    let n_max = max_wishes as usize;
    let mut out = vec![0.0; n_max + 1];
    for (i, &pa) in a.probs.iter().enumerate().take(n_max + 1) {
        if pa == 0.0 {
            continue;
        }
        for (j, &pb) in b.probs.iter().enumerate().take(n_max + 1 - i) {
            out[i + j] += pa * pb;
        }
    }
    Pmf { probs: out }
}

pub fn cumulative_probability(pmf: &Pmf, wishes: u32) -> f64 {
    pmf.cumulative(wishes)
}

/// Sampling-free counterpart of `BannerStateMachine`.
#[derive(Debug, Clone, Copy)]
pub struct ExactEngine {
    definition: BannerDefinition,
}

impl ExactEngine {
    pub fn new(definition: BannerDefinition) -> Result<Self> {
        definition.validate()?;
        Ok(ExactEngine { definition })
    }

    pub fn definition(&self) -> &BannerDefinition {
        &self.definition
    }

    /// Pull index of the next 5★ of any kind, starting `initial_pity` pulls into the curve.
    pub fn five_star_pmf(&self, max_wishes: u32, initial_pity: u32) -> Result<Pmf> {
        let params = &self.definition.params;
        if initial_pity > params.hard_pity {
            return Err(GachaError::DomainRange(format!(
                "initial pity {} exceeds hard pity {}",
                initial_pity, params.hard_pity
            )));
        }
        let mut probs = vec![0.0; max_wishes as usize + 1];
        let mut survival = 1.0;
        for a in 1..=max_wishes {
            let rate = params.rate(initial_pity + a);
            probs[a as usize] = survival * rate;
            survival *= 1.0 - rate;
            if survival <= 0.0 {
                break;
            }
        }
        Ok(Pmf { probs })
    }

    /// `weights[m]` is the probability that the `k`-th wanted item is the `m`-th 5★,
    /// following the mechanic state from `start`. At most `max_draws` 5★ are considered.
    pub fn draw_count_weights(&self, k: u32, start: MechanicState, max_draws: u32) -> Vec<f64> {
        if k == 0 {
            return vec![1.0];
        }
        let kind = &self.definition.kind;
        let wanted_rate = self.definition.params.wanted_given_5star;

        let mut weights = vec![0.0];
        let mut live: BTreeMap<(u32, MechanicState), f64> = BTreeMap::new();
        live.insert((0, start), 1.0);

        while !live.is_empty() && (weights.len() as u32) <= max_draws {
            let mut next = BTreeMap::new();
            let mut finished = 0.0;
            for ((obtained, state), mass) in live {
                for t in kind.transitions(state, wanted_rate) {
                    let p = mass * t.probability;
                    let obtained = obtained + u32::from(t.wanted);
                    if obtained >= k {
                        finished += p;
                    } else {
                        *next.entry((obtained, t.next)).or_insert(0.0) += p;
                    }
                }
            }
            weights.push(finished);
            live = next;
        }
        weights
    }

    /// PMF of the first wanted item with a clean radiance/fate-point counter.
    pub fn single_item_pmf(&self, max_wishes: u32, initial_pity: u32, guarantee: bool) -> Result<Pmf> {
        self.single_item_pmf_from(
            max_wishes,
            StartState {
                pity: initial_pity,
                guarantee,
                streak: 0,
            },
        )
    }

    pub fn single_item_pmf_from(&self, max_wishes: u32, start: StartState) -> Result<Pmf> {
        self.k_item_pmf_from(1, max_wishes, start)
    }

    /// PMF of the pull at which the `k`-th wanted item arrives.
    pub fn k_item_pmf(&self, k: u32, max_wishes: u32, initial_pity: u32, guarantee: bool) -> Result<Pmf> {
        self.k_item_pmf_from(
            k,
            max_wishes,
            StartState {
                pity: initial_pity,
                guarantee,
                streak: 0,
            },
        )
    }

    /// Mixes the m-th 5★ arrival PMFs by the probability that the k-th wanted
    /// item is the m-th 5★. Pity restarts at 0 after every 5★, so only the first
    /// arrival uses the initial pity.
    pub fn k_item_pmf_from(&self, k: u32, max_wishes: u32, start: StartState) -> Result<Pmf> {
        self.definition.check_start(&start)?;
        if k == 0 {
            return Ok(Pmf::point_mass(max_wishes));
        }
        let weights = self.draw_count_weights(k, start.mechanic(), max_wishes);
        let fresh = self.five_star_pmf(max_wishes, 0)?;
        let mut arrival = self.five_star_pmf(max_wishes, start.pity)?;
        let mut out = vec![0.0; max_wishes as usize + 1];

        for (m, &w) in weights.iter().enumerate().skip(1) {
            if m > 1 {
                arrival = convolve(&arrival, &fresh, max_wishes);
            }
            if arrival.total_mass() == 0.0 {
                break;
            }
            if w == 0.0 {
                continue;
            }
            for (slot, &p) in out.iter_mut().zip(arrival.probs.iter()) {
                *slot += w * p;
            }
        }

        let pmf = Pmf { probs: out };
        debug!(
            "[Exact] {} k={} start={:?} max_wishes={} draws={} coverage={:.6}",
            self.definition.kind.label(),
            k,
            start,
            max_wishes,
            weights.len() - 1,
            pmf.coverage()
        );
        Ok(pmf)
    }

    /// Probability of `k` wanted items within `wishes` pulls.
    pub fn probability_within(&self, k: u32, wishes: u32, start: StartState) -> Result<f64> {
        Ok(self.k_item_pmf_from(k, wishes, start)?.cumulative(wishes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banner::{BannerKind, FatePointRule, RadianceRule};
    use crate::pity::BannerParameters;

    fn character() -> ExactEngine {
        ExactEngine::new(BannerDefinition::character()).unwrap()
    }

    fn weapon() -> ExactEngine {
        ExactEngine::new(BannerDefinition::weapon()).unwrap()
    }

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() < eps, "{} != {}", a, b);
    }

    #[test]
    fn five_star_arrives_by_hard_pity() {
        let engine = character();
        let pmf = engine.five_star_pmf(90, 0).unwrap();
        assert_eq!(pmf.get(0), 0.0);
        assert_close(pmf.get(1), 0.006, 1e-15);
        assert_close(pmf.cumulative(90), 1.0, 1e-12);

        let from_pity = engine.five_star_pmf(20, 80).unwrap();
        assert_close(from_pity.cumulative(10), 1.0, 1e-12);
        assert_eq!(from_pity.get(11), 0.0);
    }

    #[test]
    fn weapon_draw_weights_follow_epitomized_path() {
        let w = weapon().draw_count_weights(1, MechanicState::default(), 100);
        assert_eq!(w.len(), 4);
        assert_close(w[1], 3.0 / 8.0, 1e-12);
        assert_close(w[2], 17.0 / 64.0, 1e-12);
        assert_close(w[3], 23.0 / 64.0, 1e-12);
    }

    #[test]
    fn character_draw_weights() {
        let engine = character();
        let clean = engine.draw_count_weights(1, MechanicState::default(), 100);
        assert_eq!(clean, vec![0.0, 0.5, 0.5]);
        let radiant = engine.draw_count_weights(1, MechanicState::new(false, 2), 100);
        assert_close(radiant[1], 0.75, 1e-12);
        assert_close(radiant[2], 0.25, 1e-12);
        let forced = engine.draw_count_weights(1, MechanicState::new(false, 3), 100);
        assert_eq!(forced, vec![0.0, 1.0]);
        let two = engine.draw_count_weights(2, MechanicState::default(), 100);
        assert_close(two.iter().sum::<f64>(), 1.0, 1e-12);
        assert_eq!(two.len(), 5);
    }

    #[test]
    fn guaranteed_single_item_is_the_five_star_curve() {
        let engine = character();
        let guaranteed = engine.single_item_pmf(120, 10, true).unwrap();
        let any = engine.five_star_pmf(120, 10).unwrap();
        for i in 0..=120 {
            assert_close(guaranteed.get(i), any.get(i), 1e-15);
        }
        assert_close(guaranteed.cumulative(80), 1.0, 1e-12);
    }

    #[test]
    fn clean_character_needs_two_hard_pities_at_worst() {
        let engine = character();
        let pmf = engine.single_item_pmf(180, 0, false).unwrap();
        assert!(pmf.cumulative(90) < 0.75);
        assert_close(pmf.cumulative(180), 1.0, 1e-12);
        assert!(pmf.is_complete());
    }

    #[test]
    fn clean_weapon_needs_three_hard_pities_at_worst() {
        let engine = weapon();
        let pmf = engine.single_item_pmf(231, 0, false).unwrap();
        assert!(pmf.cumulative(154) < 1.0 - 1e-6);
        assert_close(pmf.cumulative(231), 1.0, 1e-12);
    }

    #[test]
    fn single_item_matches_closed_form_mixture() {
        // 50/50 without radiance: half the mass on the first 5★, half on the second.
        let def = BannerDefinition::new(
            BannerParameters::character(),
            BannerKind::Character(RadianceRule::disabled()),
        )
        .unwrap();
        let engine = ExactEngine::new(def).unwrap();
        let first = engine.five_star_pmf(200, 0).unwrap();
        let second = convolve(&first, &first, 200);
        let pmf = engine.single_item_pmf(200, 0, false).unwrap();
        for i in 0..=200 {
            assert_close(pmf.get(i), 0.5 * first.get(i) + 0.5 * second.get(i), 1e-15);
        }
    }

    #[test]
    fn first_item_is_a_mixture_of_five_star_arrivals() {
        let max = 300;
        for pity in [0, 40, 70] {
            let engine = character();
            let first = engine.five_star_pmf(max, pity).unwrap();
            let second = convolve(&first, &engine.five_star_pmf(max, 0).unwrap(), max);
            let pmf = engine.k_item_pmf(1, max, pity, false).unwrap();
            for i in 0..=max {
                assert_close(pmf.get(i), 0.5 * first.get(i) + 0.5 * second.get(i), 1e-15);
            }
            let guaranteed = engine.k_item_pmf(1, max, pity, true).unwrap();
            for i in 0..=max {
                assert_close(guaranteed.get(i), first.get(i), 1e-15);
            }

            // Epitomized path: wanted on the 1st, 2nd or 3rd 5★ with 3/8, 17/64, 23/64.
            let engine = weapon();
            let fresh = engine.five_star_pmf(max, 0).unwrap();
            let first = engine.five_star_pmf(max, pity).unwrap();
            let second = convolve(&first, &fresh, max);
            let third = convolve(&second, &fresh, max);
            let pmf = engine.k_item_pmf(1, max, pity, false).unwrap();
            for i in 0..=max {
                let expected = 3.0 / 8.0 * first.get(i)
                    + 17.0 / 64.0 * second.get(i)
                    + 23.0 / 64.0 * third.get(i);
                assert_close(pmf.get(i), expected, 1e-12);
            }
        }
    }

    #[test]
    fn unvalidated_definition_is_rejected() {
        let def = BannerDefinition {
            params: BannerParameters::weapon(),
            kind: BannerKind::Weapon(FatePointRule {
                in_pool_rate: 0.25,
                cap: 2,
            }),
        };
        assert!(matches!(
            ExactEngine::new(def),
            Err(GachaError::Configuration(_))
        ));
        let mut params = BannerParameters::character();
        params.soft_pity_start = 95;
        let def = BannerDefinition {
            params,
            kind: BannerKind::character(),
        };
        assert!(matches!(
            ExactEngine::new(def),
            Err(GachaError::Configuration(_))
        ));
    }

    #[test]
    fn more_items_take_longer() {
        let engine = character();
        let one = engine.k_item_pmf(1, 600, 0, false).unwrap();
        let three = engine.k_item_pmf(3, 600, 0, false).unwrap();
        for w in [60, 120, 240, 360] {
            assert!(three.cumulative(w) <= one.cumulative(w));
        }
        assert_close(three.cumulative(540), 1.0, 1e-12);
        assert!(three.mean() > 2.5 * one.mean());
    }

    #[test]
    fn zero_items_need_no_pulls() {
        let pmf = character().k_item_pmf(0, 50, 0, false).unwrap();
        assert_eq!(pmf.cumulative(0), 1.0);
        assert_eq!(pmf.mean(), 0.0);
    }

    #[test]
    fn truncation_is_reported_through_coverage() {
        let pmf = character().single_item_pmf(60, 0, false).unwrap();
        assert!(!pmf.is_complete());
        assert!(pmf.tail_mass() > 0.5);
        assert_close(pmf.coverage() + pmf.tail_mass(), 1.0, 1e-12);
        assert_close(pmf.cumulative(1000), pmf.coverage(), 1e-12);
    }

    #[test]
    fn invalid_start_is_rejected() {
        let engine = weapon();
        assert!(matches!(
            engine.single_item_pmf(100, 78, false),
            Err(GachaError::DomainRange(_))
        ));
        let start = StartState {
            pity: 0,
            guarantee: false,
            streak: 3,
        };
        assert!(engine.k_item_pmf_from(1, 100, start).is_err());
    }

    #[test]
    fn convolution_conserves_mass_under_truncation() {
        let engine = character();
        let a = engine.single_item_pmf(150, 0, false).unwrap();
        let b = engine.single_item_pmf(150, 20, true).unwrap();
        let c = convolve(&a, &b, 150);
        assert!(c.total_mass() <= a.total_mass() * b.total_mass() + 1e-12);
        assert_eq!(c.max_wishes(), 150);
    }

    #[test]
    fn convolution_with_point_mass_is_identity() {
        let a = weapon().single_item_pmf(120, 0, false).unwrap();
        let delta = Pmf::point_mass(120);
        assert_eq!(convolve(&a, &delta, 120), a);
        assert_eq!(convolve(&delta, &a, 120), a);
    }

    #[test]
    fn hazards_rebuild_survival() {
        let pmf = character().k_item_pmf(2, 250, 15, false).unwrap();
        let hazards = pmf.hazards();
        let mut survival = 1.0;
        for (w, h) in hazards.iter().enumerate() {
            survival *= 1.0 - h;
            assert_close(1.0 - survival, pmf.cumulative(w as u32), 1e-9);
        }
    }

    #[test]
    fn pmf_exports_as_json() {
        let json = Pmf::point_mass(2).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["probs"], serde_json::json!([1.0, 0.0, 0.0]));
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let pmf = weapon().k_item_pmf(3, 700, 50, true).unwrap();
        assert!(pmf.as_slice().iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(pmf.total_mass() <= 1.0 + 1e-12);
    }
}

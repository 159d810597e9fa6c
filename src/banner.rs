//! Banner state machine: pity counters, the 50/50 guarantee, radiance and fate points.

use crate::error::{GachaError, Result};
use crate::pity::BannerParameters;
use crate::rng::chance;
use rand_core::RngCore;

/// Carry-over state that decides whether a 5★ is the wanted one.
///
/// `streak` is the radiance counter (consecutive lost 50/50s) on a character
/// banner and the fate point count on a weapon banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MechanicState {
    pub guarantee: bool,
    pub streak: u32,
}

impl MechanicState {
    pub fn new(guarantee: bool, streak: u32) -> Self {
        MechanicState { guarantee, streak }
    }
}

/// Capturing-radiance thresholds. `None` disables the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadianceRule {
    /// Radiance count at which a lost 50/50 is rolled a second time.
    pub reroll_at: Option<u32>,
    /// Radiance count at which a lost 50/50 is turned into a win.
    pub force_at: Option<u32>,
}

impl Default for RadianceRule {
    fn default() -> Self {
        RadianceRule {
            reroll_at: Some(2),
            force_at: Some(3),
        }
    }
}

impl RadianceRule {
    /// Plain 50/50 with guarantee.
    pub fn disabled() -> Self {
        RadianceRule {
            reroll_at: None,
            force_at: None,
        }
    }

    // Counts above the largest threshold behave identically, so the counter saturates there.
    fn ceiling(&self) -> u32 {
        match (self.reroll_at, self.force_at) {
            (_, Some(force)) => force,
            (Some(reroll), None) => reroll + 1,
            (None, None) => 0,
        }
    }

    fn forced(&self, streak: u32) -> bool {
        self.force_at.is_some_and(|force| streak >= force)
    }

    fn rerolled(&self, streak: u32) -> bool {
        self.reroll_at == Some(streak)
    }

    fn bump(&self, streak: u32) -> u32 {
        (streak + 1).min(self.ceiling())
    }
}

/// Epitomized-path weapon mechanic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FatePointRule {
    /// Probability that an unguaranteed 5★ belongs to the featured pool.
    pub in_pool_rate: f64,
    /// Fate points at which the next 5★ is forced to be the wanted weapon.
    pub cap: u32,
}

impl Default for FatePointRule {
    fn default() -> Self {
        FatePointRule {
            in_pool_rate: 0.75,
            cap: 2,
        }
    }
}

/// One possible outcome of a 5★ draw for the exact engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub probability: f64,
    pub wanted: bool,
    pub next: MechanicState,
}

/// The closed set of banner kinds and their wanted-vs-unwanted sub-roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BannerKind {
    Character(RadianceRule),
    Weapon(FatePointRule),
}

impl BannerKind {
    pub fn character() -> Self {
        BannerKind::Character(RadianceRule::default())
    }

    pub fn weapon() -> Self {
        BannerKind::Weapon(FatePointRule::default())
    }

    pub fn label(&self) -> &'static str {
        match self {
            BannerKind::Character(_) => "character",
            BannerKind::Weapon(_) => "weapon",
        }
    }

    pub fn validate(&self, params: &BannerParameters) -> Result<()> {
        match self {
            BannerKind::Character(rule) => {
                if let (Some(reroll), Some(force)) = (rule.reroll_at, rule.force_at) {
                    if reroll >= force {
                        return Err(GachaError::Configuration(format!(
                            "radiance reroll_at ({}) must be below force_at ({})",
                            reroll, force
                        )));
                    }
                }
                Ok(())
            }
            BannerKind::Weapon(rule) => {
                if !(rule.in_pool_rate.is_finite()
                    && rule.in_pool_rate > 0.0
                    && rule.in_pool_rate <= 1.0)
                {
                    return Err(GachaError::Configuration(format!(
                        "in_pool_rate must be in (0, 1], got {}",
                        rule.in_pool_rate
                    )));
                }
                if params.wanted_given_5star > rule.in_pool_rate {
                    return Err(GachaError::Configuration(format!(
                        "wanted_given_5star ({}) exceeds in_pool_rate ({})",
                        params.wanted_given_5star, rule.in_pool_rate
                    )));
                }
                Ok(())
            }
        }
    }

    /// Largest meaningful `streak` value for this kind.
    pub fn max_streak(&self) -> u32 {
        match self {
            BannerKind::Character(rule) => rule.ceiling(),
            BannerKind::Weapon(rule) => rule.cap,
        }
    }

    /// Upper bound on the number of 5★ draws needed for one wanted item from any state.
    pub fn max_draws_per_wanted(&self) -> u32 {
        match self {
            BannerKind::Character(_) => 2,
            BannerKind::Weapon(rule) => rule.cap + 1,
        }
    }

    /// Samples whether a 5★ is the wanted one and advances `state`.
    pub fn roll_wanted<R: RngCore + ?Sized>(
        &self,
        state: &mut MechanicState,
        wanted_rate: f64,
        rng: &mut R,
    ) -> bool {
        match self {
            BannerKind::Character(rule) => {
                if state.guarantee {
                    state.guarantee = false;
                    return true;
                }
                if chance(rng, wanted_rate) {
                    state.streak = 0;
                    return true;
                }
                let won = if rule.forced(state.streak) {
                    true
                } else if rule.rerolled(state.streak) {
                    chance(rng, wanted_rate)
                } else {
                    false
                };
                if won {
                    state.streak = 0;
                } else {
                    state.streak = rule.bump(state.streak);
                    state.guarantee = true;
                }
                won
            }
            BannerKind::Weapon(rule) => {
                if state.streak >= rule.cap {
                    *state = MechanicState::default();
                    return true;
                }
                let in_pool = state.guarantee || chance(rng, rule.in_pool_rate);
                if !in_pool {
                    state.guarantee = true;
                    state.streak += 1;
                    return false;
                }
                state.guarantee = false;
                if chance(rng, wanted_rate / rule.in_pool_rate) {
                    state.streak = 0;
                    true
                } else {
                    state.streak += 1;
                    false
                }
            }
        }
    }

    /// Every outcome of a 5★ draw from `state` with its probability.
    pub fn transitions(&self, state: MechanicState, wanted_rate: f64) -> Vec<Transition> {
        let mut out = Vec::with_capacity(3);
        match self {
            BannerKind::Character(rule) => {
                if state.guarantee {
                    out.push(Transition {
                        probability: 1.0,
                        wanted: true,
                        next: MechanicState::new(false, state.streak),
                    });
                    return out;
                }
                let win = MechanicState::new(false, 0);
                let loss = MechanicState::new(true, rule.bump(state.streak));
                let lose_first = 1.0 - wanted_rate;
                out.push(Transition {
                    probability: wanted_rate,
                    wanted: true,
                    next: win,
                });
                if rule.forced(state.streak) {
                    out.push(Transition {
                        probability: lose_first,
                        wanted: true,
                        next: win,
                    });
                } else if rule.rerolled(state.streak) {
                    out.push(Transition {
                        probability: lose_first * wanted_rate,
                        wanted: true,
                        next: win,
                    });
                    out.push(Transition {
                        probability: lose_first * (1.0 - wanted_rate),
                        wanted: false,
                        next: loss,
                    });
                } else {
                    out.push(Transition {
                        probability: lose_first,
                        wanted: false,
                        next: loss,
                    });
                }
            }
            BannerKind::Weapon(rule) => {
                if state.streak >= rule.cap {
                    out.push(Transition {
                        probability: 1.0,
                        wanted: true,
                        next: MechanicState::default(),
                    });
                    return out;
                }
                let in_pool = if state.guarantee { 1.0 } else { rule.in_pool_rate };
                let chosen = wanted_rate / rule.in_pool_rate;
                if in_pool < 1.0 {
                    out.push(Transition {
                        probability: 1.0 - in_pool,
                        wanted: false,
                        next: MechanicState::new(true, state.streak + 1),
                    });
                }
                out.push(Transition {
                    probability: in_pool * chosen,
                    wanted: true,
                    next: MechanicState::default(),
                });
                out.push(Transition {
                    probability: in_pool * (1.0 - chosen),
                    wanted: false,
                    next: MechanicState::new(false, state.streak + 1),
                });
            }
        }
        out.retain(|t| t.probability > 0.0);
        out
    }
}

/// Rate parameters plus the mechanic of one banner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BannerDefinition {
    pub params: BannerParameters,
    pub kind: BannerKind,
}

impl BannerDefinition {
    pub fn new(params: BannerParameters, kind: BannerKind) -> Result<Self> {
        let definition = BannerDefinition { params, kind };
        definition.validate()?;
        Ok(definition)
    }

    /// Checked again by every engine that accepts a definition.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.kind.validate(&self.params)
    }

    pub fn character() -> Self {
        BannerDefinition {
            params: BannerParameters::character(),
            kind: BannerKind::character(),
        }
    }

    pub fn weapon() -> Self {
        BannerDefinition {
            params: BannerParameters::weapon(),
            kind: BannerKind::weapon(),
        }
    }

    /// Rejects start states the banner could never be in.
    pub fn check_start(&self, start: &StartState) -> Result<()> {
        if start.pity > self.params.hard_pity {
            return Err(GachaError::DomainRange(format!(
                "initial pity {} exceeds hard pity {}",
                start.pity, self.params.hard_pity
            )));
        }
        let max_streak = self.kind.max_streak();
        if start.streak > max_streak {
            return Err(GachaError::DomainRange(format!(
                "{} streak {} exceeds {}",
                self.kind.label(),
                start.streak,
                max_streak
            )));
        }
        Ok(())
    }

    /// Pulls after which the target is reached whatever the rolls are.
    pub fn worst_case_pulls(&self, target: u32) -> u32 {
        self.params.hard_pity * self.kind.max_draws_per_wanted() * target
    }
}

/// Where the player currently stands on a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartState {
    pub pity: u32,
    pub guarantee: bool,
    pub streak: u32,
}

impl StartState {
    pub fn mechanic(&self) -> MechanicState {
        MechanicState::new(self.guarantee, self.streak)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PityState {
    /// Pulls since the last 5★.
    pub current_pity: u32,
    /// Pulls performed in the current trial.
    pub total_pulls: u32,
    pub mechanic: MechanicState,
}

/// Single-banner simulator. One instance per trial stream; never shared.
#[derive(Debug, Clone)]
pub struct BannerStateMachine {
    definition: BannerDefinition,
    start: StartState,
    state: PityState,
}

impl BannerStateMachine {
    pub fn new(definition: BannerDefinition, start: StartState) -> Result<Self> {
        definition.validate()?;
        definition.check_start(&start)?;
        let mut machine = BannerStateMachine {
            definition,
            start,
            state: PityState::default(),
        };
        machine.init();
        Ok(machine)
    }

    pub fn definition(&self) -> &BannerDefinition {
        &self.definition
    }

    pub fn start(&self) -> StartState {
        self.start
    }

    pub fn state(&self) -> &PityState {
        &self.state
    }

    /// Resets to the start of a trial.
    pub fn init(&mut self) {
        self.state = PityState {
            current_pity: self.start.pity,
            total_pulls: 0,
            mechanic: self.start.mechanic(),
        };
    }

    /// One wish. Returns whether the wanted 5★ dropped.
    pub fn pull<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> bool {
        self.state.current_pity += 1;
        self.state.total_pulls += 1;
        let params = &self.definition.params;
        if !chance(rng, params.rate(self.state.current_pity)) {
            return false;
        }
        self.state.current_pity = 0;
        self.definition
            .kind
            .roll_wanted(&mut self.state.mechanic, params.wanted_given_5star, rng)
    }

    /// Pulls from a fresh trial until `target` wanted items dropped; returns the pulls used.
    pub fn pull_until_wanted<R: RngCore + ?Sized>(&mut self, target: u32, rng: &mut R) -> u32 {
        self.init();
        let mut obtained = 0;
        while obtained < target {
            if self.pull(rng) {
                obtained += 1;
            }
        }
        self.state.total_pulls
    }

    /// Pulls from a fresh trial with at most `budget` wishes.
    /// Returns whether `target` was reached and the wishes left over.
    pub fn try_pull<R: RngCore + ?Sized>(
        &mut self,
        budget: u32,
        target: u32,
        rng: &mut R,
    ) -> (bool, u32) {
        self.init();
        let mut obtained = 0;
        while obtained < target {
            if self.state.total_pulls >= budget {
                return (false, 0);
            }
            if self.pull(rng) {
                obtained += 1;
            }
        }
        (true, budget - self.state.total_pulls)
    }
}

//! Typed JSON configuration. Every section is optional; missing fields take the defaults below.

use crate::banner::{
    BannerDefinition, BannerKind, BannerStateMachine, FatePointRule, RadianceRule, StartState,
};
use crate::error::{GachaError, Result};
use crate::pity::BannerParameters;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Curve overrides; unset fields keep the banner's published values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateConfig {
    pub base_rate: Option<f64>,
    pub hard_pity: Option<u32>,
    pub soft_pity_start: Option<u32>,
    pub wanted_given_5star: Option<f64>,
}

impl RateConfig {
    pub fn to_parameters(&self, defaults: BannerParameters) -> Result<BannerParameters> {
        BannerParameters::new(
            self.base_rate.unwrap_or(defaults.base_rate),
            self.hard_pity.unwrap_or(defaults.hard_pity),
            self.soft_pity_start.unwrap_or(defaults.soft_pity_start),
            self.wanted_given_5star.unwrap_or(defaults.wanted_given_5star),
        )
    }
}

/// Where the player stands: pity since the last 5★, guarantee flag, radiance / fate points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StartConfig {
    pub initial_pity: u32,
    pub guarantee: bool,
    pub streak: u32,
}

impl From<StartConfig> for StartState {
    fn from(c: StartConfig) -> Self {
        StartState {
            pity: c.initial_pity,
            guarantee: c.guarantee,
            streak: c.streak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadianceConfig {
    pub enabled: bool,
    pub reroll_at: Option<u32>,
    pub force_at: Option<u32>,
}

impl Default for RadianceConfig {
    fn default() -> Self {
        let rule = RadianceRule::default();
        RadianceConfig {
            enabled: true,
            reroll_at: rule.reroll_at,
            force_at: rule.force_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FatePointConfig {
    pub in_pool_rate: f64,
    pub cap: u32,
}

impl Default for FatePointConfig {
    fn default() -> Self {
        let rule = FatePointRule::default();
        FatePointConfig {
            in_pool_rate: rule.in_pool_rate,
            cap: rule.cap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CharacterConfig {
    pub rates: RateConfig,
    pub start: StartConfig,
    pub radiance: RadianceConfig,
}

impl CharacterConfig {
    pub fn definition(&self) -> Result<BannerDefinition> {
        let rule = if self.radiance.enabled {
            RadianceRule {
                reroll_at: self.radiance.reroll_at,
                force_at: self.radiance.force_at,
            }
        } else {
            RadianceRule::disabled()
        };
        BannerDefinition::new(
            self.rates.to_parameters(BannerParameters::character())?,
            BannerKind::Character(rule),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeaponConfig {
    pub rates: RateConfig,
    pub start: StartConfig,
    pub fate_points: FatePointConfig,
}

impl WeaponConfig {
    pub fn definition(&self) -> Result<BannerDefinition> {
        let rule = FatePointRule {
            in_pool_rate: self.fate_points.in_pool_rate,
            cap: self.fate_points.cap,
        };
        BannerDefinition::new(
            self.rates.to_parameters(BannerParameters::weapon())?,
            BannerKind::Weapon(rule),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub trials: usize,
    /// Fixed seed for reproducible runs; a fresh one is drawn when absent.
    pub seed: Option<u64>,
    pub chunk_size: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            trials: 100_000,
            seed: None,
            chunk_size: crate::sim::DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// 0 = every core minus `reserve_cores`.
    pub max_threads: usize,
    pub reserve_cores: usize,
    pub stack_size_mb: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            max_threads: 0,
            reserve_cores: 1,
            stack_size_mb: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub character: CharacterConfig,
    pub weapon: WeaponConfig,
    pub simulation: SimulationConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Reads `path`, falling back to `../../path` when run from `target/<profile>`.
    pub fn load(path: &str) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(first_err) => {
                let alt = format!("../../{}", path);
                match fs::read_to_string(&alt) {
                    Ok(s) => {
                        info!("[Config] found in parent directory: {}", alt);
                        s
                    }
                    Err(_) => {
                        return Err(GachaError::ConfigIo {
                            path: path.to_string(),
                            source: first_err,
                        })
                    }
                }
            }
        };
        let config = Self::from_json(&contents)?;
        info!("[Config] loaded {}", path);
        Ok(config)
    }

    /// Loads `path` when it exists, the defaults otherwise.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() || Path::new(&format!("../../{}", path)).exists() {
            Self::load(path)
        } else {
            info!("[Config] {} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.character_machine()?;
        self.weapon_machine()?;
        if self.simulation.trials == 0 {
            return Err(GachaError::Configuration(
                "simulation.trials must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn character_machine(&self) -> Result<BannerStateMachine> {
        BannerStateMachine::new(self.character.definition()?, self.character.start.into())
    }

    pub fn weapon_machine(&self) -> Result<BannerStateMachine> {
        BannerStateMachine::new(self.weapon.definition()?, self.weapon.start.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_standard_banners() {
        let config = Config::default();
        assert_eq!(
            config.character.definition().unwrap(),
            BannerDefinition::character()
        );
        assert_eq!(config.weapon.definition().unwrap(), BannerDefinition::weapon());
        assert_eq!(config.simulation.trials, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_merges_with_defaults() {
        let json = r#"{
            "character": { "start": { "initial_pity": 70, "guarantee": true } },
            "weapon": { "fate_points": { "cap": 1 } },
            "simulation": { "seed": 7 }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.character.start.initial_pity, 70);
        assert!(config.character.start.guarantee);
        assert_eq!(config.character.rates.hard_pity, None);
        assert_eq!(config.character.definition().unwrap().params.hard_pity, 90);
        assert_eq!(config.weapon.fate_points.cap, 1);
        assert_eq!(config.weapon.fate_points.in_pool_rate, 0.75);
        assert_eq!(config.weapon.definition().unwrap().params.hard_pity, 77);
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.simulation.trials, 100_000);
    }

    #[test]
    fn disabled_radiance_gives_plain_fifty_fifty() {
        let json = r#"{ "character": { "radiance": { "enabled": false } } }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(
            config.character.definition().unwrap().kind,
            BannerKind::Character(RadianceRule::disabled())
        );
    }

    #[test]
    fn invalid_values_fail_at_load() {
        let bad_curve = r#"{ "weapon": { "rates": { "soft_pity_start": 80 } } }"#;
        assert!(matches!(
            Config::from_json(bad_curve),
            Err(GachaError::Configuration(_))
        ));
        let bad_start = r#"{ "character": { "start": { "initial_pity": 95 } } }"#;
        assert!(matches!(
            Config::from_json(bad_start),
            Err(GachaError::DomainRange(_))
        ));
        let unknown = r#"{ "charcter": {} }"#;
        assert!(matches!(
            Config::from_json(unknown),
            Err(GachaError::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let res = Config::load("definitely/not/here.json");
        assert!(matches!(res, Err(GachaError::ConfigIo { .. })));
    }
}

//! wishcalc - pity-aware wish probability engine for character and weapon banners.
//!
//! Two complementary techniques answer "how many wishes until I get it?":
//! Monte-Carlo simulation of `BannerStateMachine`s (`sim`), and exact
//! probability mass functions built by convolution (`exact`). `combined`
//! puts the two banners together under one wish budget.

pub mod banner;
pub mod combined;
pub mod config;
pub mod error;
pub mod exact;
pub mod pity;
pub mod rng;
pub mod sim;
pub mod worker;

pub use banner::{
    BannerDefinition, BannerKind, BannerStateMachine, FatePointRule, MechanicState, PityState,
    RadianceRule, StartState,
};
pub use combined::{Allocation, CombinedBannerAllocator, Targets};
pub use config::Config;
pub use error::{GachaError, Result};
pub use exact::{convolve, cumulative_probability, ExactEngine, Pmf};
pub use pity::BannerParameters;
pub use rng::Rng;
pub use sim::{MonteCarlo, SampleSummary};
pub use worker::SimWorker;

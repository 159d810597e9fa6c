use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use log::{debug, error, info};
use std::time::Instant;

use wishcalc::config::StartConfig;
use wishcalc::{
    BannerStateMachine, CombinedBannerAllocator, Config, ExactEngine, MonteCarlo, Result, Rng,
    SampleSummary, SimWorker, Targets,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "data/config.json")]
    config: String,

    /// Random seed (overrides the config)
    #[arg(short, long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BannerChoice {
    Character,
    Weapon,
}

/// Overrides for where the player currently stands on the chosen banner.
#[derive(clap::Args, Clone, Copy, Default)]
struct StartArgs {
    /// Pulls since the last 5★
    #[arg(long)]
    pity: Option<u32>,
    /// Whether the next 5★ is guaranteed (in-pool for the weapon banner)
    #[arg(long, value_name = "true|false")]
    guarantee: Option<bool>,
    /// Radiance counter (character) or fate points (weapon)
    #[arg(long)]
    streak: Option<u32>,
}

impl StartArgs {
    fn apply(&self, start: &mut StartConfig) {
        if let Some(pity) = self.pity {
            start.initial_pity = pity;
        }
        if let Some(guarantee) = self.guarantee {
            start.guarantee = guarantee;
        }
        if let Some(streak) = self.streak {
            start.streak = streak;
        }
    }
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Print the per-pull 5★ rate up to hard pity
    Curve {
        #[arg(short, long, value_enum, default_value_t = BannerChoice::Character)]
        banner: BannerChoice,
    },
    /// Sample the number of pulls needed for a target
    Simulate {
        #[arg(short, long, value_enum, default_value_t = BannerChoice::Character)]
        banner: BannerChoice,
        /// Wanted copies
        #[arg(short, long, default_value_t = 1)]
        target: u32,
        /// Number of trials (defaults to the config)
        #[arg(short = 'n', long)]
        trials: Option<usize>,
        #[command(flatten)]
        start: StartArgs,
    },
    /// Chance to reach a target within a wish budget, simulated and exact
    Budget {
        #[arg(short, long, value_enum, default_value_t = BannerChoice::Character)]
        banner: BannerChoice,
        #[arg(short, long)]
        wishes: u32,
        #[arg(short, long, default_value_t = 1)]
        target: u32,
        #[arg(short = 'n', long)]
        trials: Option<usize>,
        #[command(flatten)]
        start: StartArgs,
    },
    /// Exact probability within a wish budget
    Exact {
        #[arg(short, long, value_enum, default_value_t = BannerChoice::Character)]
        banner: BannerChoice,
        #[arg(short, long)]
        wishes: u32,
        #[arg(short, long, default_value_t = 1)]
        target: u32,
        /// Print the PMF as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        start: StartArgs,
    },
    /// Split a budget between the character and weapon banners
    Combined {
        #[arg(short, long)]
        wishes: u32,
        /// Wishes for the character banner (defaults to half)
        #[arg(long)]
        character_wishes: Option<u32>,
        #[arg(long, default_value_t = 1)]
        char_target: u32,
        #[arg(long, default_value_t = 1)]
        weapon_target: u32,
        /// Try every split in steps of this size instead of a single one
        #[arg(long)]
        sweep: Option<u32>,
        #[arg(short = 'n', long)]
        trials: Option<usize>,
        /// Skip the Monte-Carlo cross-check
        #[arg(long)]
        exact_only: bool,
    },
    /// Character banner first, leftovers to the weapon banner
    Sequential {
        #[arg(short, long)]
        wishes: u32,
        #[arg(long, default_value_t = 1)]
        char_target: u32,
        #[arg(long, default_value_t = 1)]
        weapon_target: u32,
        #[arg(short = 'n', long)]
        trials: Option<usize>,
        #[arg(long)]
        exact_only: bool,
    },
}

fn header(title: &str) {
    println!("\n{}", format!("=== {} ===", title).cyan().bold());
}

fn machine_for(config: &Config, banner: BannerChoice, start: &StartArgs) -> Result<BannerStateMachine> {
    let mut config = *config;
    match banner {
        BannerChoice::Character => {
            start.apply(&mut config.character.start);
            config.character_machine()
        }
        BannerChoice::Weapon => {
            start.apply(&mut config.weapon.start);
            config.weapon_machine()
        }
    }
}

fn percent(p: f64) -> String {
    format!("{:.2}%", p * 100.0)
}

fn run(args: Args) -> Result<()> {
    let config = Config::load_or_default(&args.config)?;
    let seed = args
        .seed
        .or(config.simulation.seed)
        .unwrap_or_else(|| Rng::from_entropy().next_u64());
    info!("Seed: {}", seed);

    let default_trials = config.simulation.trials;
    let worker = SimWorker::from_config(&config.worker)?;
    let progress = |done: usize| debug!("[MonteCarlo] {} trials done", done);
    let sim = MonteCarlo::new(&worker, seed)
        .with_chunk_size(config.simulation.chunk_size)
        .with_progress(&progress);

    match args.command {
        Commands::Curve { banner } => {
            let machine = machine_for(&config, banner, &StartArgs::default())?;
            let params = machine.definition().params;
            header(&format!("{} banner pity curve", machine.definition().kind.label()));
            for (pull, rate) in params.curve() {
                println!("Pull {:>3}: {:>7} chance for a 5★", pull, percent(rate));
            }
            println!(
                "Expected pulls per 5★: {:.2}",
                params.expected_pulls_per_five_star()
            );
        }
        Commands::Simulate { banner, target, trials, start } => {
            let machine = machine_for(&config, banner, &start)?;
            let trials = trials.unwrap_or(default_trials);
            header(&format!(
                "{} banner: pulls for {} wanted 5★",
                machine.definition().kind.label(),
                target
            ));
            let started = Instant::now();
            let samples = sim.estimate_pulls_to_target(&machine, target, trials)?;
            let elapsed = started.elapsed();
            if let Some(summary) = SampleSummary::from_samples(&samples) {
                println!(
                    "Average: {:.2} | Median: {} | Min: {} | Max: {} | Std dev: {:.2}",
                    summary.mean, summary.median, summary.min, summary.max, summary.std_dev
                );
            }
            let def = machine.definition();
            let pmf = ExactEngine::new(*def)?.k_item_pmf_from(
                target,
                def.worst_case_pulls(target),
                machine.start(),
            )?;
            println!("Exact expectation: {:.2} pulls", pmf.mean());
            println!(
                "{} trials in {:.2?} ({:.0} trials/sec)",
                trials,
                elapsed,
                trials as f64 / elapsed.as_secs_f64()
            );
        }
        Commands::Budget { banner, wishes, target, trials, start } => {
            let machine = machine_for(&config, banner, &start)?;
            let trials = trials.unwrap_or(default_trials);
            header(&format!(
                "{} banner: {} wanted 5★ in {} wishes",
                machine.definition().kind.label(),
                target,
                wishes
            ));
            let simulated = sim.estimate_budget_success_rate(&machine, wishes, target, trials)?;
            let exact = ExactEngine::new(*machine.definition())?.probability_within(
                target,
                wishes,
                machine.start(),
            )?;
            println!("Simulated: {} ({} trials)", percent(simulated), trials);
            println!("Exact:     {}", percent(exact).green().bold());
        }
        Commands::Exact { banner, wishes, target, json, start } => {
            let machine = machine_for(&config, banner, &start)?;
            let engine = ExactEngine::new(*machine.definition())?;
            let pmf = engine.k_item_pmf_from(target, wishes, machine.start())?;
            if json {
                println!("{}", pmf.to_json()?);
                return Ok(());
            }
            header(&format!(
                "{} banner: {} wanted 5★ in {} wishes",
                machine.definition().kind.label(),
                target,
                wishes
            ));
            println!("Probability: {}", percent(pmf.cumulative(wishes)).green().bold());
            let def = machine.definition();
            let full = engine.k_item_pmf_from(target, def.worst_case_pulls(target), machine.start())?;
            println!("Expected pulls: {:.2}", full.mean());
        }
        Commands::Combined {
            wishes,
            character_wishes,
            char_target,
            weapon_target,
            sweep,
            trials,
            exact_only,
        } => {
            let allocator =
                CombinedBannerAllocator::new(config.character_machine()?, config.weapon_machine()?);
            let targets = Targets {
                character: char_target,
                weapon: weapon_target,
            };
            header(&format!(
                "{} character + {} weapon wanted 5★ in {} wishes",
                char_target, weapon_target, wishes
            ));
            if let Some(step) = sweep {
                let rows = allocator.sweep(wishes, step, targets)?;
                for row in &rows {
                    println!(
                        "character {:>4} / weapon {:>4}: both {:>7} | either {:>7}",
                        row.character_wishes,
                        row.weapon_wishes,
                        percent(row.both),
                        percent(row.either)
                    );
                }
                if let Some(best) = rows.iter().max_by(|a, b| a.both.total_cmp(&b.both)) {
                    println!(
                        "{}",
                        format!(
                            "Best split: {} character / {} weapon ({})",
                            best.character_wishes,
                            best.weapon_wishes,
                            percent(best.both)
                        )
                        .green()
                        .bold()
                    );
                }
                return Ok(());
            }
            let character_wishes = character_wishes.unwrap_or(wishes / 2);
            let allocation = allocator.joint_probability(wishes, character_wishes, targets)?;
            println!(
                "Split: {} character / {} weapon",
                allocation.character_wishes, allocation.weapon_wishes
            );
            println!("Miss character: {}", percent(allocation.p_no_character));
            println!("Miss weapon:    {}", percent(allocation.p_no_weapon));
            println!("Both:           {}", percent(allocation.both).green().bold());
            println!("Either:         {}", percent(allocation.either));
            if !exact_only {
                let trials = trials.unwrap_or(default_trials);
                let simulated =
                    allocator.joint_monte_carlo(&sim, wishes, character_wishes, targets, trials)?;
                println!("Simulated both: {} ({} trials)", percent(simulated), trials);
            }
        }
        Commands::Sequential {
            wishes,
            char_target,
            weapon_target,
            trials,
            exact_only,
        } => {
            let allocator =
                CombinedBannerAllocator::new(config.character_machine()?, config.weapon_machine()?);
            let targets = Targets {
                character: char_target,
                weapon: weapon_target,
            };
            header(&format!(
                "{} character then {} weapon wanted 5★ in {} wishes",
                char_target, weapon_target, wishes
            ));
            let exact = allocator.sequential_probability(wishes, targets)?;
            println!("Exact:     {}", percent(exact).green().bold());
            if !exact_only {
                let trials = trials.unwrap_or(default_trials);
                let simulated = allocator.sequential_monte_carlo(&sim, wishes, targets, trials)?;
                println!("Simulated: {} ({} trials)", percent(simulated), trials);
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_args(argv: &[&str]) -> StartArgs {
        let mut full = vec!["wishcalc", "exact", "--wishes", "90"];
        full.extend_from_slice(argv);
        match Args::try_parse_from(full).unwrap().command {
            Commands::Exact { start, .. } => start,
            _ => unreachable!(),
        }
    }

    #[test]
    fn guarantee_flag_overrides_config_both_ways() {
        let mut start = StartConfig {
            initial_pity: 20,
            guarantee: true,
            streak: 1,
        };
        start_args(&["--guarantee", "false"]).apply(&mut start);
        assert!(!start.guarantee);
        start_args(&["--guarantee", "true", "--pity", "5"]).apply(&mut start);
        assert!(start.guarantee);
        assert_eq!(start.initial_pity, 5);
        assert_eq!(start.streak, 1);
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let mut start = StartConfig {
            initial_pity: 33,
            guarantee: true,
            streak: 2,
        };
        start_args(&[]).apply(&mut start);
        assert_eq!(
            start,
            StartConfig {
                initial_pity: 33,
                guarantee: true,
                streak: 2,
            }
        );
    }
}

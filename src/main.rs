//! Trait Evolution CLI - Run trajectories and parameter sweeps from JSON configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::de::DeserializeOwned;
use trait_evolution::{
    compute::{SweepResult, SweepRunner, Trajectory, save_json, save_table},
    schema::{SimulationConfig, SweepConfig},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_configs();
        return;
    }

    if args.len() < 3 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[2]);
    let output = args.get(3).map(PathBuf::from);

    match args[1].as_str() {
        "run" => run_trajectory(&config_path, output.as_deref()),
        "sweep" => run_sweep(&config_path, output.as_deref()),
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!();
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <run|sweep> <config.json> [output]", program);
    eprintln!();
    eprintln!("Run trait evolution simulations from JSON configuration.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run    Run a single trajectory");
    eprintln!("  sweep  Run a parameter sweep in parallel");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json  Path to a trajectory or sweep configuration file");
    eprintln!("  output       Output file: .json for JSON, .csv for CSV, otherwise TSV");
    eprintln!();
    eprintln!("Example configurations are printed with the --example flag.");
}

fn load_config<T: DeserializeOwned>(path: &Path) -> T {
    let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    })
}

fn write_output(path: &Path, result: &SweepResult) {
    let saved = if path.extension().is_some_and(|e| e == "json") {
        save_json(path, result)
    } else {
        save_table(path, result)
    };
    if let Err(e) = saved {
        eprintln!("Error writing {}: {}", path.display(), e);
        std::process::exit(1);
    }
    println!("Results written to {}", path.display());
}

fn run_trajectory(config_path: &Path, output: Option<&Path>) {
    let config: SimulationConfig = load_config(config_path);

    println!("Trait Evolution Trajectory");
    println!("==========================");
    println!(
        "Rates: invention={}, combination={}, modification={}, loss={}",
        config.rates.invention,
        config.rates.combination,
        config.rates.modification,
        if config.judgment().is_some() {
            0.0
        } else {
            config.rates.loss()
        }
    );
    if let Some(judgment) = config.judgment() {
        println!(
            "Judgment: judge={}, reinvest={}",
            judgment.judge, judgment.reinvest
        );
    }
    println!("Seeds: {}", config.seeds.alphabet_size);
    println!("Iterations: {}", config.iterations);
    println!();

    let start = Instant::now();
    let trajectory = Trajectory::new(config.clone()).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });
    let result = trajectory.run().unwrap_or_else(|e| {
        eprintln!("Simulation failed: {}", e);
        std::process::exit(1);
    });
    let elapsed = start.elapsed();

    if let Some(last) = result.last() {
        println!("Final state:");
        println!("  Traits: {}", last.trait_number);
        println!("  Trait complexity: {:.3}", last.trait_complexity);
        println!("  Lineages: {}", last.lineage_number);
        println!(
            "  Utility: max={:.4}, mean={:.4}",
            last.maximum_utility, last.mean_utility
        );
    }
    if let Some(reason) = result.final_reason {
        println!("  Final reason: {:.4}", reason);
    }
    if let Some(seed) = result.seed {
        println!("Seed: {}", seed);
    }
    println!(
        "Events: {} inventions, {} combinations, {} modifications, {} losses, {} rejections ({} retries)",
        result.stats.inventions,
        result.stats.combinations,
        result.stats.modifications,
        result.stats.losses,
        result.stats.rejections,
        result.stats.retries
    );
    println!(
        "Time: {:.2}s ({:.0} iterations/s)",
        elapsed.as_secs_f32(),
        result.len() as f32 / elapsed.as_secs_f32()
    );

    if let Some(path) = output {
        write_output(path, &SweepResult::single(&config, result));
    }
}

fn run_sweep(config_path: &Path, output: Option<&Path>) {
    let config: SweepConfig = load_config(config_path);

    let runner = SweepRunner::new(config).unwrap_or_else(|e| {
        eprintln!("Invalid sweep configuration: {}", e);
        std::process::exit(1);
    });
    let total = runner.config().job_count();

    println!("Trait Evolution Sweep");
    println!("=====================");
    println!(
        "Points: {}",
        runner.config().grid.points(&runner.config().base).len()
    );
    println!("Replicates: {}", runner.config().replicates);
    println!("Trajectories: {}", total);
    println!("Iterations each: {}", runner.config().base.iterations);
    println!();

    let report_every = (total / 10).max(1);
    let result = runner
        .run_with_callback(|progress| {
            if progress.completed % report_every == 0 {
                println!(
                    "  Completed {}/{} trajectories",
                    progress.completed, progress.total
                );
            }
        })
        .unwrap_or_else(|e| {
            eprintln!("Sweep failed: {}", e);
            std::process::exit(1);
        });

    println!();
    println!(
        "Time: {:.2}s ({:.1} trajectories/s)",
        result.elapsed_seconds,
        result.len() as f64 / result.elapsed_seconds.max(f64::EPSILON)
    );

    if let Some(path) = output {
        write_output(path, &result);
    }
}

fn print_example_configs() {
    let cultural = SimulationConfig::cultural(0.4, 0.3, 0.2).with_seed(1);
    println!("Trajectory configuration (cultural evolution):");
    println!(
        "{}",
        serde_json::to_string_pretty(&cultural).unwrap_or_default()
    );
    println!();

    let ai = SimulationConfig::ai(0.2, 0.4, 0.4, 0.8, 0.6, true).with_seed(1);
    println!("Trajectory configuration (AI evolution):");
    println!("{}", serde_json::to_string_pretty(&ai).unwrap_or_default());
    println!();

    let sweep = SweepConfig {
        random_seed: Some(1),
        ..Default::default()
    };
    println!("Sweep configuration:");
    println!("{}", serde_json::to_string_pretty(&sweep).unwrap_or_default());
}

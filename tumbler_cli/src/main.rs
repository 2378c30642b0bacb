use tumbler_core::config::TumblerConfig;
use tumbler_core::executor::{CommandExecutor, CommandExecutorConfig};
use tumbler_core::fuzzer::{FuzzReport, Fuzzer, FuzzerOptions, Verdict};
use tumbler_core::input::Input;
use tumbler_core::mutator::MutatorSet;
use tumbler_core::oracle::{CrashOracle, CrashRecord};
use tumbler_core::scheduler::RandomScheduler;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "Usage: tumbler_cli [OPTIONS] \"<command_to_fuzz>\"";
const DEFAULT_CONFIG_PATH: &str = "tumbler.toml";
/// Exit status when the run found at least one crash, or the usage is wrong.
const CRASH_EXIT_CODE: u8 = 1;
/// Exit status when the run could not start at all.
const FATAL_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Target command, relative to the working directory, with its arguments
    /// as one string.
    command: Option<String>,
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(short, long)]
    iterations: Option<u64>,
    #[clap(long)]
    timeout_ms: Option<u64>,
    #[clap(long)]
    rng_seed: Option<u64>,
    #[clap(long)]
    seed_input: Option<String>,
    #[clap(long, value_parser)]
    seed_file: Option<PathBuf>,
    #[clap(long, value_parser)]
    working_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut cli = Cli::parse();

    let Some(command) = cli.command.take() else {
        eprintln!("{USAGE}");
        return ExitCode::from(CRASH_EXIT_CODE);
    };

    match run(cli, command) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(CRASH_EXIT_CODE),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

fn load_config(cli: &Cli) -> Result<TumblerConfig, anyhow::Error> {
    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            TumblerConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                TumblerConfig::load_from_file(&default_config_path)?
            } else {
                TumblerConfig::default()
            }
        }
    };

    if let Some(iterations) = cli.iterations {
        config.fuzzer.iterations = iterations;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.executor.timeout_ms = timeout_ms;
    }
    if let Some(rng_seed) = cli.rng_seed {
        config.fuzzer.rng_seed = Some(rng_seed);
    }
    if let Some(seed_input) = &cli.seed_input {
        config.fuzzer.seed_input = seed_input.clone();
        config.fuzzer.seed_file = None;
    }
    if let Some(seed_file) = &cli.seed_file {
        config.fuzzer.seed_file = Some(seed_file.clone());
    }
    if let Some(working_dir) = &cli.working_dir {
        config.executor.working_dir = working_dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli, command: String) -> Result<FuzzReport<Vec<u8>>, anyhow::Error> {
    let config = load_config(&cli)?;
    info!("Effective configuration: {config:#?}");

    config.executor.check_target(&command)?;
    let seed_input = config.fuzzer.load_seed()?;
    let platform = config.executor.platform.resolve();
    info!("Target platform: {}", platform.name());

    let rng_seed = config.fuzzer.rng_seed.unwrap_or_else(rand::random::<u64>);
    info!("RNG seed: {rng_seed} (pass --rng-seed {rng_seed} to replay)");
    let rng = ChaCha8Rng::seed_from_u64(rng_seed);

    let executor = CommandExecutor::new(CommandExecutorConfig {
        command: command.clone(),
        working_dir: config.executor.working_dir.clone(),
        timeout: config.executor.timeout(),
        platform,
    });

    let options = FuzzerOptions {
        iterations: config.fuzzer.iterations,
        max_consecutive_spawn_failures: config.fuzzer.max_consecutive_spawn_failures,
    };
    let mutators = MutatorSet::standard();
    info!("Mutators: {}", mutators.names().join(", "));
    let mut fuzzer = Fuzzer::new(
        mutators,
        executor,
        CrashOracle::new(platform),
        RandomScheduler::new(),
        rng,
        seed_input,
        options,
    )
    .context("Failed to set up the fuzzer")?;

    let (program, args) = platform.shell_invocation(&command);
    println!("Command: {program} {}", args.join(" "));
    println!("Running {} fuzzing iterations...", config.fuzzer.iterations);

    while let Some(outcome) = fuzzer.step()? {
        if outcome.verdict != Verdict::Adopted {
            if let Some(record) = fuzzer.crashes().last() {
                print_crash(record);
            }
        }
    }

    let report = fuzzer.finish();
    println!(
        "Iterations: {}, Crashes: {}, Elapsed: {:.2?}",
        report.iterations,
        report.crashes.len(),
        report.elapsed
    );
    if let Some(reason) = &report.aborted {
        println!("Run aborted: {reason}");
    }
    Ok(report)
}

fn print_crash(record: &CrashRecord<Vec<u8>>) {
    println!("Crash detected!");
    println!("Input: {}", record.input.to_lossy_string());
    println!("Input MD5: {}", record.input_hash);
    match record.kind.exit_status() {
        Some(code) => println!("Exit Code: {code}"),
        None => println!("Kind: {}", record.kind),
    }
    println!("Output: {}", String::from_utf8_lossy(&record.output));
}

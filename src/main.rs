use clap::{Parser, Subcommand};
use flowgate::config;
use flowgate::dataplane::TracingProgrammer;
use flowgate::replay::{self, Trace};
use flowgate::telemetry::{init_logging, MetricsRegistry};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowgate")]
#[command(about = "Packet-in decision core for an OpenFlow controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the zone each address belongs to
    Classify {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Addresses to classify
        #[arg(required = true)]
        addrs: Vec<String>,
    },
    /// Replay a recorded event trace through the decision engine
    Replay {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Trace file
        trace: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate config.lock from config.toml
    Generate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Output path for config.lock
        #[arg(short, long, default_value = "config.lock")]
        output: PathBuf,
    },
    /// Validate config.toml without generating lock file
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Generate { config, output } => cmd_config_generate(&config, &output),
            ConfigAction::Validate { config } => cmd_config_validate(&config),
        },
        Commands::Classify { config, addrs } => cmd_classify(&config, &addrs),
        Commands::Replay { config, trace } => cmd_replay(&config, &trace),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_config_generate(config_path: &PathBuf, output_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let lock = config::generate_lock(&cfg);
    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    let output = format!(
        "# Generated by flowgate - DO NOT EDIT\n# Source: {}\n\n{}",
        config_path.display(),
        lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_classify(config_path: &PathBuf, addrs: &[String]) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;
    let classifier = cfg.classifier().map_err(|e| e.to_string())?;

    let mut failed = 0;
    for addr in addrs {
        match classifier.classify_str(addr) {
            Ok(Some(zone)) => println!("{}\t{}", addr, zone),
            Ok(None) => println!("{}\tunclassified", addr),
            Err(e) => {
                println!("[ERROR] {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(format!("{} address(es) could not be classified", failed))
    } else {
        Ok(())
    }
}

fn cmd_replay(config_path: &PathBuf, trace_path: &PathBuf) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;
    init_logging(Some(&cfg.logging));

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let trace = Trace::load(trace_path).map_err(|e| e.to_string())?;

    let metrics = Arc::new(MetricsRegistry::new());
    let engine = config::build_engine(&cfg, Arc::clone(&metrics)).map_err(|e| e.to_string())?;
    let summary = replay::run(&trace, &engine, &TracingProgrammer, &cfg.aging);

    let mut verdicts: BTreeMap<String, usize> = BTreeMap::new();
    for decision in &summary.decisions {
        *verdicts.entry(format!("{:?}", decision.verdict)).or_default() += 1;
    }

    println!(
        "[INFO] Replayed {} packet-in(s), {} event(s) skipped",
        summary.decisions.len(),
        summary.skipped
    );
    for (verdict, count) in &verdicts {
        println!("  {:<32} {}", verdict, count);
    }
    for (name, value) in metrics.export() {
        println!("  {:<32} {}", name, value);
    }

    Ok(())
}

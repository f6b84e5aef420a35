use clap::{Parser, Subcommand};
use plexus_cache::{CacheConfig, CleanerError, ConfigError};
use plexus_core::{EvalPlan, GraphError, Processor, desc::NetworkDesc};
use std::{fs, io, path::PathBuf, process::ExitCode};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete unused cache entries and limit the cache to its size budget.
    Clean {
        /// A RON cache config. Defaults are used if the file does not exist.
        #[arg(long, default_value = "plexus-cache.ron")]
        config: PathBuf,
        /// Overrides the configured cache root.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Overrides the configured size budget in megabytes.
        #[arg(long)]
        max_mb: Option<u64>,
    },
    /// Print the evaluation order of a RON network description.
    Order {
        /// The network description file.
        file: PathBuf,
        /// Only plan for these end processors.
        #[arg(long = "end")]
        ends: Vec<String>,
    },
}

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cleaner(#[from] CleanerError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("failed to read {path:?}: {err}")]
    Read {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("failed to parse network description: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Clean {
            config,
            root,
            max_mb,
        } => clean(config, root, max_mb),
        Command::Order { file, ends } => order(file, &ends),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn clean(config: PathBuf, root: Option<PathBuf>, max_mb: Option<u64>) -> Result<(), Error> {
    let mut config = CacheConfig::load(&config)?;
    if let Some(root) = root {
        config.root = root;
    }
    if let Some(max_mb) = max_mb {
        config.max_size_mb = max_mb;
    }
    let mut cleaner = match config.cleaner() {
        Ok(cleaner) => cleaner,
        Err(CleanerError::MissingRoot(root)) => {
            log::info!("no cache at {root:?}, nothing to clean");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let unused = cleaner.delete_unused();
    let evicted = cleaner.limit_cache(config.max_size_mb);
    log::info!(
        "deleted {unused} unused and {evicted} evicted entries, {} entries remain",
        cleaner.entries().len()
    );
    Ok(())
}

fn order(file: PathBuf, ends: &[String]) -> Result<(), Error> {
    let src = fs::read_to_string(&file).map_err(|err| Error::Read { path: file, err })?;
    let net: NetworkDesc = ron::from_str(&src)?;
    let plan = if ends.is_empty() {
        EvalPlan::new(&net.processors)?
    } else {
        let ends: Vec<&str> = ends.iter().map(String::as_str).collect();
        EvalPlan::for_ends(&net.processors, &ends)?
    };

    println!("order:");
    for (ix, p) in plan.order().iter().enumerate() {
        let ready = if p.is_ready() { "" } else { " (not ready)" };
        println!("  {ix:>3}. {}{ready}", p.id());
    }
    println!("stages:");
    for (ix, stage) in plan.stages().iter().enumerate() {
        let ids: Vec<&str> = stage.iter().map(|p| p.id()).collect();
        println!("  {ix:>3}. {}", ids.join(", "));
    }
    let ends: Vec<&str> = plan.ends().iter().map(|p| p.id()).collect();
    println!("ends: {}", ends.join(", "));
    Ok(())
}

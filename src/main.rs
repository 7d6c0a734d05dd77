use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use mocap_vae::config::{Config, DEFAULT_CONFIG_PATH};
use mocap_vae::train::{self, engine::HandoffEngine};

#[derive(Parser)]
#[command(name = "mocap-vae", version, about = "Entry point to train the model")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let cfg = Config::load(&cli.config)?;
    let mut engine = HandoffEngine::default();
    let plan = train::run(&cfg, &mut engine)?;

    log::info!("run prepared in {}", plan.log_dir.display());
    Ok(())
}

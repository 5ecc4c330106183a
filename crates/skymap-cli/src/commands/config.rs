use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use skymap_core::pipeline::config::{FilterConfig, PointingConfig, ReductionConfig};

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a full default ReductionConfig as TOML, with the optional
/// sections filled in so every key is visible.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = ReductionConfig {
        filter: Some(FilterConfig::default()),
        pointing: Some(PointingConfig::default()),
        ..Default::default()
    };
    let toml_str = config.to_toml()?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}

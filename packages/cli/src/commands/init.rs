use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::Path;
use trellis_editor::config::DEFAULT_CONFIG_NAME;
use trellis_editor::EngineConfig;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Host allowed to serve external resources (repeatable)
    #[arg(long = "allow-host")]
    pub allowed_hosts: Vec<String>,

    /// Image used in place of broken image sources
    #[arg(long)]
    pub placeholder: Option<String>,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    let mut config = EngineConfig::default();
    config.validation.allowed_hosts = args.allowed_hosts;
    config.validation.placeholder_image = args.placeholder;

    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("Breakpoints:");
    for bp in &config.breakpoints {
        println!("  {} {}", bp.name.bright_white(), bp.media);
    }

    Ok(())
}

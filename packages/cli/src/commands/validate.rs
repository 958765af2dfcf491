use crate::project::Project;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use trellis_editor::{ValidationWarning, WarningKind};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Document body (JSON), relative to the project directory
    pub document: String,

    /// Project directory holding the document and its assets
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Directory holding trellis.config.json (defaults to the project)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Apply safe corrections and write the document back
    #[arg(long)]
    pub fix: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn validate(args: ValidateArgs, cwd: &Path) -> Result<()> {
    if args.format != "text" && args.format != "json" {
        return Err(anyhow!("Invalid format: {}. Use: text or json", args.format));
    }

    let dir = args.project.clone().unwrap_or_else(|| cwd.to_path_buf());
    let mut project = Project::open(&dir, args.config.as_deref())?;
    let mut session = project.open_session(&args.document, "styles.css")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let job = session.validation_job(&project.store);
    let warnings = runtime.block_on(job.run())?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&warnings)?);
    } else {
        print_warnings(&args.document, &warnings);
    }

    if args.fix && warnings.iter().any(|w| w.correction.is_some()) {
        let fixed = session.apply_validation(warnings)?;
        project.write_document(&args.document, &session)?;
        if args.format == "text" {
            println!("  {} Applied {} fixes to {}", "✓".green(), fixed, args.document);
        }
    }

    Ok(())
}

fn print_warnings(document: &str, warnings: &[ValidationWarning]) {
    if warnings.is_empty() {
        println!("{} {}", "✓".green(), document);
        return;
    }

    println!("{}", document.bright_white().bold());
    for warning in warnings {
        let kind = match warning.kind {
            WarningKind::BrokenReference => "broken".red(),
            WarningKind::DisallowedDependency => "disallowed".red(),
            WarningKind::InsecureReference => "insecure".yellow(),
        };
        println!(
            "  {} {} {}=\"{}\"",
            kind,
            warning.path.to_string().dimmed(),
            warning.attribute,
            warning.value
        );
        if let Some(correction) = &warning.correction {
            println!("    {} {}", "→".cyan(), correction);
        }
    }
    println!();
    println!("{} warnings", warnings.len().to_string().yellow());
}

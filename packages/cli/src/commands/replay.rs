use crate::project::Project;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use trellis_editor::{Breakpoint, EditorSession, NodePath, SerializedNode};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Document body (JSON), relative to the project directory
    pub document: String,

    /// Stylesheet to load and save back
    #[arg(short, long, default_value = "styles.css")]
    pub styles: String,

    /// Edit script (JSON array of steps)
    #[arg(long)]
    pub script: PathBuf,

    /// Project directory (defaults to the current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Directory holding trellis.config.json (defaults to the project)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the edited document here
    #[arg(short, long)]
    pub out: Option<String>,

    /// Apply the script without saving anything
    #[arg(long)]
    pub dry_run: bool,
}

/// One scripted user action
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    SetStyle {
        target: NodePath,
        property: String,
        value: String,
        #[serde(default)]
        breakpoints: Vec<Breakpoint>,
    },
    SetInlineStyle {
        target: NodePath,
        property: String,
        value: Option<String>,
    },
    SetAttribute {
        target: NodePath,
        name: String,
        value: Option<String>,
    },
    SetText {
        target: NodePath,
        text: String,
    },
    Insert {
        parent: NodePath,
        index: usize,
        node: SerializedNode,
    },
    Delete {
        target: NodePath,
    },
    Move {
        target: NodePath,
        parent: NodePath,
        index: usize,
    },
    /// A continuous edit: every value is a frame, the last one is recorded
    Drag {
        target: NodePath,
        property: String,
        values: Vec<String>,
        #[serde(default)]
        breakpoints: Vec<Breakpoint>,
        #[serde(default)]
        cancel: bool,
    },
    Undo,
    Redo,
    Activate {
        breakpoint: Breakpoint,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::SetStyle { .. } => "setStyle",
            Step::SetInlineStyle { .. } => "setInlineStyle",
            Step::SetAttribute { .. } => "setAttribute",
            Step::SetText { .. } => "setText",
            Step::Insert { .. } => "insert",
            Step::Delete { .. } => "delete",
            Step::Move { .. } => "move",
            Step::Drag { .. } => "drag",
            Step::Undo => "undo",
            Step::Redo => "redo",
            Step::Activate { .. } => "activate",
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ReplaySummary {
    /// Steps that changed something
    pub applied: usize,
    /// Steps that resolved nothing or had nothing to do
    pub skipped: usize,
}

pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    serde_json::from_str(text).context("parsing edit script")
}

/// Run each step against the session; the first error stops the script
pub fn run_script(session: &mut EditorSession, steps: &[Step]) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (index, step) in steps.iter().enumerate() {
        let applied = run_step(session, step)
            .with_context(|| format!("step {} ({})", index + 1, step.name()))?;
        if applied {
            summary.applied += 1;
            println!("  {} {}", "✓".green(), step.name());
        } else {
            summary.skipped += 1;
            println!("  {} {} (nothing to do)", "–".yellow(), step.name());
        }
    }

    Ok(summary)
}

fn run_step(session: &mut EditorSession, step: &Step) -> Result<bool> {
    let applied = match step {
        Step::SetStyle {
            target,
            property,
            value,
            breakpoints,
        } => session.set_style(target, property, value, breakpoints)?.is_some(),
        Step::SetInlineStyle {
            target,
            property,
            value,
        } => session
            .set_inline_style(target, property, value.as_deref())?
            .is_some(),
        Step::SetAttribute {
            target,
            name,
            value,
        } => session.set_attribute(target, name, value.as_deref())?.is_some(),
        Step::SetText { target, text } => session.set_text(target, text)?.is_some(),
        Step::Insert {
            parent,
            index,
            node,
        } => session.insert_node(parent, *index, node.clone())?.is_some(),
        Step::Delete { target } => session.delete_node(target)?.is_some(),
        Step::Move {
            target,
            parent,
            index,
        } => session.move_node(target, parent, *index)?.is_some(),
        Step::Drag {
            target,
            property,
            values,
            breakpoints,
            cancel,
        } => {
            session.begin_gesture(target, property, breakpoints)?;
            for value in values {
                session.update_gesture(value)?;
            }
            if *cancel {
                session.cancel_gesture()?;
                false
            } else {
                session.commit_gesture()?.is_some()
            }
        }
        Step::Undo => session.undo()?.is_some(),
        Step::Redo => session.redo()?.is_some(),
        Step::Activate { breakpoint } => {
            session.activate_breakpoint(breakpoint.clone())?;
            true
        }
    };
    Ok(applied)
}

pub fn replay(args: ReplayArgs, cwd: &Path) -> Result<()> {
    let dir = args.project.clone().unwrap_or_else(|| cwd.to_path_buf());
    let mut project = Project::open(&dir, args.config.as_deref())?;

    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let steps = parse_script(&script)?;

    println!(
        "{} {} ({} steps)",
        "▶ Replaying".bright_blue().bold(),
        args.document,
        steps.len()
    );
    let mut session = project.open_session(&args.document, &args.styles)?;
    let summary = run_script(&mut session, &steps)?;
    info!(applied = summary.applied, skipped = summary.skipped, "Script finished");

    println!();
    println!(
        "{} applied, {} skipped, {} undo levels",
        summary.applied.to_string().green(),
        summary.skipped.to_string().yellow(),
        session.history().undo_levels()
    );

    if args.dry_run {
        println!("{}", "Dry run, nothing saved".yellow());
        return Ok(());
    }

    session.save_styles(&mut project.store, &args.styles)?;
    println!("  {} Saved {}", "✓".green(), args.styles);

    if let Some(out) = &args.out {
        project.write_document(out, &session)?;
        println!("  {} Wrote {}", "✓".green(), project.root().join(out).display());
    }

    Ok(())
}

//! `efm-replay`: run a recorded form session against an in-memory canvas.
//!
//! Useful for reproducing a user's session without the host application:
//! every step goes through the same `Session` the host integration uses,
//! then the resulting canvas, document, and lints are printed.

mod script;

use anyhow::{Context, Result, bail};
use clap::Parser;
use efm_core::catalog::CatalogSource;
use efm_core::lint::LintSeverity;
use efm_sync::canvas::Canvas;
use efm_sync::config::SyncConfig;
use efm_sync::memory::MemoryHost;
use efm_sync::session::{EventOutcome, Session};
use script::Step;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "efm-replay")]
#[command(about = "Replay an EFM form session and print the resulting canvas")]
struct Cli {
    /// Replay script: one form message or command per line
    script: PathBuf,

    /// Session config (JSON). Defaults apply to missing keys.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Material catalog as a JSON table: a header row, then data rows
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Print the final document as JSON
    #[arg(long)]
    json: bool,

    /// Stop at the first step that fails
    #[arg(long)]
    strict: bool,
}

/// Catalog table read from a JSON file.
struct JsonTableFile(PathBuf);

impl CatalogSource for JsonTableFile {
    fn load(&self) -> Result<Vec<Vec<Value>>, String> {
        let text = std::fs::read_to_string(&self.0)
            .map_err(|e| format!("{}: {e}", self.0.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("{}: {e}", self.0.display()))
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_json(&read(path)?).map_err(anyhow::Error::msg)?,
        None => SyncConfig::default(),
    };
    let steps = script::parse_script(&read(&cli.script)?)
        .map_err(|e| anyhow::anyhow!("{}: {e}", cli.script.display()))?;

    let mut session = Session::new(config);
    let mut host = MemoryHost::new();
    if let Some(path) = &cli.catalog {
        session.load_catalog(&mut host, &JsonTableFile(path.clone()));
    }

    for (n, step) in steps.into_iter().enumerate() {
        let label = format!("{step:?}");
        match run_step(&mut session, &mut host, step) {
            Ok(Some(outcome)) => println!("[{:>3}] {}", n + 1, summarize(&outcome)),
            Ok(None) => println!("[{:>3}] -", n + 1),
            Err(err) if cli.strict => bail!("step {} ({label}) failed: {err}", n + 1),
            Err(err) => println!("[{:>3}] error: {err}", n + 1),
        }
    }

    print_canvas(&host);
    print_lints(&session);
    println!("recomputes: {}", host.recomputes);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(session.document())?);
    }
    Ok(())
}

fn run_step(session: &mut Session, host: &mut MemoryHost, step: Step) -> Result<Option<EventOutcome>> {
    let outcome = match step {
        Step::Message(uri) => Some(session.handle_message(host, &uri)?),
        Step::Pick(handles) => {
            host.queue_pick(handles);
            None
        }
        Step::CancelPick => {
            host.queue_cancel();
            None
        }
        Step::Drag { slider, value } => {
            let Some(id) = host.canvas.node_named(&slider).map(|n| n.id) else {
                bail!("no slider named `{slider}` on the canvas");
            };
            host.canvas.set_slider_value(id, value)?;
            Some(session.handle_canvas_change(host))
        }
        Step::Rename { old, new } => Some(session.rename_element(host, &old, &new)?),
        Step::Undo => session.undo(host),
        Step::Redo => session.redo(host),
    };
    Ok(outcome)
}

fn summarize(outcome: &EventOutcome) -> String {
    let report = &outcome.sync;
    let store = if outcome.store_changed {
        "store changed"
    } else {
        "store unchanged"
    };
    let mut parts = vec![store.to_string()];
    for (label, keys) in [
        ("created", &report.created),
        ("updated", &report.updated),
        ("deleted", &report.deleted),
        ("adopted", &report.adopted),
        ("forgotten", &report.forgotten),
        ("conflicts", &report.conflicts),
        ("fallbacks", &report.fallbacks),
    ] {
        if !keys.is_empty() {
            let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
            parts.push(format!("{label} [{}]", names.join(", ")));
        }
    }
    if report.wired > 0 {
        parts.push(format!("wired {}", report.wired));
    }
    if outcome.recomputed {
        parts.push("recompute".into());
    }
    parts.join("; ")
}

fn print_canvas(host: &MemoryHost) {
    println!();
    println!("canvas ({} nodes):", host.canvas.len());
    for info in host.canvas.nodes() {
        let payload = host
            .canvas
            .payload(info.id)
            .map(|p| p.label())
            .unwrap_or("none");
        println!(
            "  {:<10} {:<28} {:<18} {:<9} ({:.0}, {:.0})",
            info.id.to_string(),
            info.name,
            format!("{:?}", info.kind),
            payload,
            info.position.x,
            info.position.y
        );
    }
    for (from, output, to, input) in host.canvas.wires() {
        println!("  wire {from}:{output} -> {to}:{input}");
    }
}

fn print_lints(session: &Session) {
    let lints = session.lints();
    if lints.is_empty() {
        return;
    }
    println!();
    println!("lints:");
    for lint in lints {
        let level = match lint.severity {
            LintSeverity::Warning => "warning",
            LintSeverity::Info => "info",
        };
        println!("  {level}[{}] {}: {}", lint.rule, lint.subject, lint.message);
    }
}

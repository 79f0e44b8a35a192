use anyhow::{Context, Result};
use std::path::Path;

use crate::commands::CommandReport;
use crate::sharenote::config::load_config;
use crate::sharenote::paths::resolve_paths;
use crate::sharenote::watcher::build_runner;

/// Renders the entry a note would become without touching the note or the target.
pub fn run(file: &Path) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let runner = build_runner(&paths, &cfg)?;
    let mut report = CommandReport::new("preview");
    report.detail(format!("note={}", file.display()));

    let entry = match runner.load_note(file) {
        Ok(entry) => entry,
        Err(err) => {
            report.issue(format!("{}: {err}", err.code().as_str()));
            return Ok(report);
        }
    };

    report.detail(format!("title={}", entry.title));
    report.detail(format!("date={}", entry.date()));
    report.detail(format!("timestamp={}", entry.timestamp_label()));
    if let Some(link) = entry.link() {
        report.detail(format!("link={link}"));
    }
    let formatted = runner.formatter().format(&entry);
    for line in formatted.lines() {
        report.detail(format!("| {line}"));
    }

    let canonical = file
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", file.display()))?;
    let note_dir = runner
        .note_dir()
        .canonicalize()
        .unwrap_or_else(|_| runner.note_dir().to_path_buf());
    if canonical.parent() != Some(note_dir.as_path()) {
        report.detail(format!(
            "note is outside note_dir ({}); a pass would not pick it up",
            runner.note_dir().display()
        ));
    }

    Ok(report)
}

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;

use crate::types::{ExchangeEventKind, Stage};

const DETAIL_LIMIT_CHARS: usize = 600;

/// Appends one JSON line per orchestration event. Never read back.
#[derive(Debug, Clone)]
pub struct ExchangeAudit {
    path: Option<PathBuf>,
    run_id: String,
}

#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub event: ExchangeEventKind,
    pub stage: Stage,
    pub turns: usize,
    pub detail: Option<&'a str>,
}

impl ExchangeAudit {
    pub fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            run_id: format!("session-{}", Local::now().format("%Y%m%d-%H%M%S")),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            path: None,
            run_id: String::new(),
        }
    }

    pub fn write(&self, rec: AuditRecord<'_>) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open `{}`", path.display()))?;

        writeln!(file, "{}", self.render(&rec))?;
        Ok(())
    }

    fn render(&self, rec: &AuditRecord<'_>) -> String {
        json!({
            "ts": Local::now().to_rfc3339(),
            "run_id": self.run_id,
            "event": rec.event.as_str(),
            "stage": rec.stage.ordinal(),
            "stage_label": rec.stage.label(),
            "turns": rec.turns,
            "detail": rec.detail.map(|d| truncate_chars(d, DETAIL_LIMIT_CHARS)),
        })
        .to_string()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    const MARKER: &str = "…(truncated)";
    if s.chars().count() <= max {
        return s.to_string();
    }
    let marker_len = MARKER.chars().count();
    if max <= marker_len {
        return MARKER.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - marker_len).collect();
    out.push_str(MARKER);
    out
}

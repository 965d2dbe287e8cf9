pub mod html;

use crate::diff::HistoryReport;
use crate::model::ScanRecord;
use crate::utils::ensure_dir;
use crate::{Error, Result};
use serde_json::to_string_pretty;
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Json,
    Both,
}

impl ReportFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format {
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            "both" => Ok(ReportFormat::Both),
            other => Err(Error::CliUsage(format!("unknown report format {:?}", other))),
        }
    }

    fn html(&self) -> bool {
        matches!(self, ReportFormat::Html | ReportFormat::Both)
    }

    fn json(&self) -> bool {
        matches!(self, ReportFormat::Json | ReportFormat::Both)
    }
}

/// `scan_report_<YYYY-MM-DD-HH-MM>` for the current UTC time.
pub fn default_file_name() -> Result<String> {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day]-[hour]-[minute]"))?;
    Ok(format!("scan_report_{}", stamp))
}

/// Strips any extension from a user given file name.
fn file_stem(file_name: Option<&str>) -> Result<String> {
    match file_name {
        Some(name) => Ok(Path::new(name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string())),
        None => default_file_name(),
    }
}

/// Writes the comparison report in `dir` and returns every written path.
pub fn write_report(
    dir: &Path,
    file_name: Option<&str>,
    title: Option<&str>,
    format: ReportFormat,
    history: &HistoryReport,
) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let stem = file_stem(file_name)?;
    let title = title.map(str::to_string).unwrap_or_else(|| stem.clone());

    let mut written = Vec::new();
    if format.html() {
        let path = dir.join(&stem).with_extension("html");
        fs::write(&path, html::render_history(history, &title))?;
        written.push(path);
    }
    if format.json() {
        let path = dir.join(&stem).with_extension("json");
        fs::write(&path, to_string_pretty(history)?)?;
        written.push(path);
    }

    for path in &written {
        info!("Report written to {}", path.display());
    }
    Ok(written)
}

pub fn write_minimal_report(
    dir: &Path,
    file_name: Option<&str>,
    records: &[ScanRecord],
) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let stem = file_stem(file_name)?;
    let path = dir.join(&stem).with_extension("html");
    fs::write(&path, html::render_minimal(records, &stem))?;
    info!("Minimal report written to {}", path.display());
    Ok(path)
}

use anyhow::{Context, Result};
use chrono::Utc;
use faultline_ids::{TestIdentity, WorkerId};
use faultline_ports::ScreenshotSource;
use std::path::{Path, PathBuf};

/// `<reports>/screenshots/<worker>__<slug>__<timestamp>.png`
pub fn screenshot_path(reports_dir: &Path, worker: &WorkerId, identity: &TestIdentity) -> PathBuf {
    let ts = Utc::now().format("%Y%m%dT%H%M%S%3f");
    reports_dir
        .join("screenshots")
        .join(format!("{worker}__{}__{ts}.png", identity.slug()))
}

/// Capture and persist a screenshot, returning where it was written.
pub fn capture_screenshot(
    source: &dyn ScreenshotSource,
    reports_dir: &Path,
    worker: &WorkerId,
    identity: &TestIdentity,
) -> Result<PathBuf> {
    let bytes = source.capture().context("capture screenshot")?;
    let path = screenshot_path(reports_dir, worker, identity);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
    }
    std::fs::write(&path, bytes).with_context(|| format!("write {path:?}"))?;
    Ok(path)
}

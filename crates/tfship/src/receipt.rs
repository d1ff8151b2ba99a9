//! Persisting the [`PublishReport`] of a run.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::types::PublishReport;

/// Write `report` as pretty JSON, replacing `path` atomically.
pub fn write_report(path: &Path, report: &PublishReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create receipt dir {}", parent.display()))?;
    }
    atomic_write_json(path, report)
}

/// Read a report written by [`write_report`].
pub fn load_report(path: &Path) -> Result<PublishReport> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read receipt {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse receipt JSON {}", path.display()))
}

fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;

    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to rename tmp file {} to {}",
            tmp.display(),
            path.display()
        )
    })?;

    fsync_parent_dir(path);

    Ok(())
}

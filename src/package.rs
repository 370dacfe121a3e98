//! Stage the CSV outputs and dataset metadata into one directory for upload.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::utils::{format_megabytes, osc8_file_link};

pub const METADATA_FILE: &str = "dataset-metadata.json";
pub const README_FILE: &str = "DATASET.md";

/// Recreate `output` and copy every CSV from `data_dir` into it, together
/// with the dataset metadata. Returns the staged files.
pub fn stage(data_dir: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let metadata = data_dir.join(METADATA_FILE);
    if !metadata.is_file() {
        bail!(
            "{} not found; create it before packaging",
            metadata.display()
        );
    }

    let mut csv_files: Vec<PathBuf> = fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read {}", data_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    csv_files.sort();
    if csv_files.is_empty() {
        bail!("no CSV files in {}; run a crawl first", data_dir.display());
    }

    if output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear {}", output.display()))?;
    }
    fs::create_dir_all(output)?;

    let readme = data_dir.join(README_FILE);
    let mut sources = csv_files;
    sources.push(metadata);
    if readme.is_file() {
        sources.push(readme);
    } else {
        warn!(path = %readme.display(), "no dataset description, staging without it");
    }

    let mut staged = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        let dest = output.join(name);
        fs::copy(&source, &dest)
            .with_context(|| format!("Failed to copy {}", source.display()))?;
        staged.push(dest);
    }
    Ok(staged)
}

pub fn run_package(data_dir: &Path, output: &Path) -> Result<()> {
    let staged = stage(data_dir, output)?;

    println!(
        "Staged {} files in {}:",
        staged.len(),
        osc8_file_link(output, &output.to_string_lossy())
    );
    let mut total = 0;
    for path in &staged {
        let size = fs::metadata(path)?.len();
        total += size;
        let name = path.file_name().map_or_else(
            || path.to_string_lossy().into_owned(),
            |n| n.to_string_lossy().into_owned(),
        );
        println!("  {:<40} {}", osc8_file_link(path, &name), format_megabytes(size));
    }
    println!("Total: {}", format_megabytes(total));
    Ok(())
}

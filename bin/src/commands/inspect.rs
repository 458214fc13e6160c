//! Inspect command implementation.

use anyhow::{Context, Result};
use indicatif::DecimalBytes;
use std::path::Path;
use warren_core::Metainfo;

/// Print the identifier, size, trackers and files of a `.torrent` file.
pub(crate) fn inspect(path: &Path) -> Result<()> {
    let metainfo = Metainfo::from_file(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    println!("Name: {}", metainfo.name);
    println!("Info hash: {}", metainfo.info_hash);
    println!("Size: {}", DecimalBytes(metainfo.total_length));

    if !metainfo.trackers.is_empty() {
        println!("\nTrackers:");
        for tracker in &metainfo.trackers {
            println!("  {tracker}");
        }
    }

    println!("\nFiles:");
    for (i, file) in metainfo.files.iter().enumerate() {
        println!(
            "  {}. {} ({})",
            i + 1,
            file.path.display(),
            DecimalBytes(file.length)
        );
    }

    Ok(())
}

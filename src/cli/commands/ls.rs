//! Ls command: list directory contents through `FilePath`.

use crate::path::FilePath;

/// Collect the listing for `dir`.
pub fn list(dir: &FilePath, recursive: bool, ext: Option<&str>) -> Vec<FilePath> {
    let entries = if recursive {
        dir.recursive_children()
    } else {
        dir.children()
    };

    match ext {
        Some(ext) => FilePath::filter_extension(&entries, ext.trim_start_matches('.')),
        None => entries,
    }
}

/// Print the listing for `dir`, one path per line.
pub fn run(dir: FilePath, recursive: bool, ext: Option<&str>) -> anyhow::Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {dir}");
    }

    for entry in list(&dir, recursive, ext) {
        println!("{entry}");
    }
    Ok(())
}

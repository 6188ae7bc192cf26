use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Natural ordering
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Number(u128, usize),
    Text(String),
}

fn chunks(name: &str) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut chars = name.chars().peekable();
    while let Some(&c) = chars.peek() {
        let digit = c.is_ascii_digit();
        let mut run = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() != digit {
                break;
            }
            run.push(c);
            chars.next();
        }
        if digit {
            // Leading zeros break ties so "01" and "1" stay distinct.
            let value = run.parse::<u128>().unwrap_or(u128::MAX);
            out.push(Chunk::Number(value, run.len()));
        } else {
            out.push(Chunk::Text(run.to_lowercase()));
        }
    }
    out
}

fn compare_chunks(a: &Chunk, b: &Chunk) -> Ordering {
    match (a, b) {
        (Chunk::Number(x, lx), Chunk::Number(y, ly)) => x.cmp(y).then(lx.cmp(ly)),
        (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
        // Digits sort before letters, as in a plain byte comparison.
        (Chunk::Number(..), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Number(..)) => Ordering::Greater,
    }
}

/// Compare two names so that digit runs order numerically (`img2` < `img10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    ca.iter()
        .zip(cb.iter())
        .map(|(x, y)| compare_chunks(x, y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| ca.len().cmp(&cb.len()))
        .then_with(|| a.cmp(b))
}

// ---------------------------------------------------------------------------
// Directory listing
// ---------------------------------------------------------------------------

/// List regular files in `dir` whose name ends with `extension`, in natural order.
///
/// The extension is matched case-insensitively, with or without a leading dot.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", extension.trim_start_matches('.').to_lowercase());
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(|e| {
            let e = e.ok()?;
            if !e.file_type().ok()?.is_file() {
                return None;
            }
            let name = e.file_name().to_str()?.to_string();
            name.to_lowercase()
                .ends_with(&suffix)
                .then(|| (name, e.path()))
        })
        .collect();
    files.sort_by(|(a, _), (b, _)| natural_cmp(a, b));

    Ok(files.into_iter().map(|(_, p)| p).collect())
}

/// Parent folder and file name without extension.
pub fn file_info(path: &Path) -> (PathBuf, String) {
    let folder = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let basename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    (folder, basename)
}

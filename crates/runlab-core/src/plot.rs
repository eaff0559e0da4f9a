//! Figure capture: the Python-side hook and the Rust-side collection.
//!
//! The hook itself lives in `harness.py` and is written into the snippet's
//! scratch directory for every run; the snippet executes inside it. The
//! harness saves one PNG per distinct figure object into the workspace as
//! `figure_<n>.png`, n starting at 0 and strictly increasing per execution.
//! After the child exits, `collect_figures` sweeps the workspace in sequence
//! order and base64-encodes each file for inline transport.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Python harness source, written next to the snippet for every execution.
pub const PY_HARNESS: &str = include_str!("harness.py");

const FIGURE_PREFIX: &str = "figure_";
const FIGURE_SUFFIX: &str = ".png";

/// One rendered figure captured during an execution.
#[derive(Debug, Clone)]
pub struct CapturedFigure {
    pub sequence_index: usize,
    pub filename: String,
    pub image_bytes: Vec<u8>,
    pub encoded_payload: String,
}

/// Canonical filename for the figure with the given sequence index.
pub fn figure_filename(index: usize) -> String {
    format!("{}{}{}", FIGURE_PREFIX, index, FIGURE_SUFFIX)
}

/// Parse the sequence index out of a figure filename, or `None` if the name
/// does not follow the `figure_<n>.png` convention.
pub fn parse_figure_index(filename: &str) -> Option<usize> {
    let digits = filename
        .strip_prefix(FIGURE_PREFIX)?
        .strip_suffix(FIGURE_SUFFIX)?;
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Sweep the workspace for figure files and serialize them in sequence
/// order. A file that cannot be read back is dropped with a warning; the
/// remaining figures are unaffected.
pub fn collect_figures(workspace_root: &Path) -> Vec<CapturedFigure> {
    let entries = match fs::read_dir(workspace_root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(
                "could not list workspace {} for figures: {}",
                workspace_root.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut named: Vec<(usize, String)> = entries
        .flatten()
        .filter_map(|entry| {
            let filename = entry.file_name().into_string().ok()?;
            Some((parse_figure_index(&filename)?, filename))
        })
        .collect();
    named.sort_unstable();

    let mut figures = Vec::with_capacity(named.len());
    for (index, filename) in named {
        let path = workspace_root.join(&filename);
        let image_bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("dropping figure {}: {}", filename, e);
                continue;
            }
        };
        let encoded_payload = BASE64.encode(&image_bytes);
        figures.push(CapturedFigure {
            sequence_index: index,
            filename,
            image_bytes,
            encoded_payload,
        });
    }
    figures
}

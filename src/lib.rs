// SPDX-License-Identifier: ISC
//
// Compares two independently produced VCD waveform traces and reports the
// earliest simulation time at which any corresponding pair of signals
// disagrees, reconciling naming, instance prefixes and bit/bus
// representation differences between the two files.

mod compare;
mod matching;
mod signals;
mod vcd;

/// Cargo.toml version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use compare::{format_mismatch, to_hex, Mismatch};
pub use matching::{ComparableEntry, EntryKind};
pub use signals::{normalize, Signal, SignalView, SynthesizedBus, Time};
pub use vcd::{VcdBody, VcdHeader};

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid filter pattern `{pattern}`: {source}")]
    BadFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, DiffError>;

/// All tunables of one comparison run. Everything is explicit; nothing is
/// read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Instance path prefix to strip in the first file.
    pub top1: Option<String>,
    /// Instance path prefix to strip in the second file.
    pub top2: Option<String>,
    /// Entries are kept only if every pattern matches their canonical key.
    pub include: Vec<String>,
    /// Entries matching any pattern are dropped.
    pub exclude: Vec<String>,
    /// Only compare at or after this time.
    pub after: Option<Time>,
    /// Only compare at or before this time.
    pub before: Option<Time>,
}

/// Outcome of a comparison run. "No common signals" is kept distinct from
/// "no differences found": the former usually means wrong prefixes or
/// filters, the latter genuine agreement.
#[derive(Debug, PartialEq, Eq)]
pub enum DiffOutcome {
    /// No comparable entries survived matching and filtering.
    NoCommonSignals,
    /// Every entry agreed at every sampled time in the window.
    Equivalent,
    /// All entries whose first mismatch happens at the globally earliest
    /// diverging time, in canonical-key order.
    Mismatches(Vec<Mismatch>),
}

/// Resolves the comparable-entry keys from the two headers without parsing
/// any value data.
pub fn list_signals(path1: &Path, path2: &Path, options: &DiffOptions) -> Result<Vec<String>> {
    let hdr1 = vcd::read_header(path1)?;
    let hdr2 = vcd::read_header(path2)?;
    let entries = matching::match_signals(&hdr1, &hdr2, options, &mut |_| {})?;
    Ok(entries.into_iter().map(|e| e.key).collect())
}

/// Runs the full comparison: header pass on both files, signal matching,
/// value pass restricted to the matched names, then the earliest-divergence
/// walk. `progress` receives human-readable diagnostics and must not write
/// to the primary output stream.
pub fn diff(
    path1: &Path,
    path2: &Path,
    options: &DiffOptions,
    progress: &mut dyn FnMut(&str),
) -> Result<DiffOutcome> {
    let hdr1 = vcd::read_header(path1)?;
    let hdr2 = vcd::read_header(path2)?;
    progress(&format!("{} signals in first file", hdr1.signals.len()));
    progress(&format!("{} signals in second file", hdr2.signals.len()));

    let entries = matching::match_signals(&hdr1, &hdr2, options, progress)?;
    if entries.is_empty() {
        return Ok(DiffOutcome::NoCommonSignals);
    }
    let (need1, need2) = matching::wanted_names(&entries);

    progress("reading first file");
    let body1 = vcd::read_values(path1, &hdr1, &need1)?;
    progress("reading second file");
    let body2 = vcd::read_values(path2, &hdr2, &need2)?;

    let mismatches = compare::compare_entries(
        &entries,
        &body1,
        &body2,
        options.after,
        options.before,
        progress,
    );
    if mismatches.is_empty() {
        Ok(DiffOutcome::Equivalent)
    } else {
        Ok(DiffOutcome::Mismatches(mismatches))
    }
}

// SPDX-License-Identifier: ISC
//
// Reconciles the two files' signal namespaces into an ordered list of
// comparable entries, including cross-representation bus reconstruction.

use crate::vcd::VcdHeader;
use crate::{DiffError, DiffOptions, Result};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::OnceLock;

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\[(\d+):(\d+)\]$").unwrap())
}

fn bit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\[(\d+)\]$").unwrap())
}

/// How the two sides of a comparable entry are realized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// The same short name is declared as a full signal in both files.
    Direct { name1: String, name2: String },
    /// One file declares `base[msb:lsb]`, the other only the individual bits.
    Bus {
        msb: i64,
        lsb: i64,
        /// True when the range declaration lives in the first file.
        range_in_first: bool,
        /// Full name of the range declaration in its file.
        range_name: String,
        /// Full name of each single-bit signal in the other file, by index.
        bit_names: FxHashMap<i64, String>,
    },
}

/// The unit of comparison, keyed by canonical name (`base` or
/// `base[msb:lsb]`). Entry lists are sorted by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparableEntry {
    pub key: String,
    pub kind: EntryKind,
}

/// Builds the sorted, filtered entry list from both headers.
pub fn match_signals(
    hdr1: &VcdHeader,
    hdr2: &VcdHeader,
    options: &DiffOptions,
    progress: &mut dyn FnMut(&str),
) -> Result<Vec<ComparableEntry>> {
    let (order1, map1) = strip_prefix(&hdr1.signals, options.top1.as_deref());
    let (order2, map2) = strip_prefix(&hdr2.signals, options.top2.as_deref());
    if let Some(top1) = options.top1.as_deref() {
        progress(&format!(
            "{} signals under `{top1}` in first file",
            order1.len()
        ));
    }
    if let Some(top2) = options.top2.as_deref() {
        progress(&format!(
            "{} signals under `{top2}` in second file",
            order2.len()
        ));
    }

    let mut entries = Vec::new();
    for short in order1.iter() {
        let Some(name2) = map2.get(short) else {
            continue;
        };
        entries.push(ComparableEntry {
            key: short.clone(),
            kind: EntryKind::Direct {
                name1: map1[short].clone(),
                name2: name2.clone(),
            },
        });
    }
    let direct_keys: FxHashSet<String> = entries.iter().map(|e| e.key.clone()).collect();

    let (ranges1, bits1) = index_by_base(&order1, &map1);
    let (ranges2, bits2) = index_by_base(&order2, &map2);
    synthesize_buses(&mut entries, &direct_keys, &ranges1, &bits2, true);
    synthesize_buses(&mut entries, &direct_keys, &ranges2, &bits1, false);

    entries.sort_by(|a, b| a.key.cmp(&b.key));
    progress(&format!("{} comparable signal entries", entries.len()));

    let had_filters = !options.include.is_empty() || !options.exclude.is_empty();
    let entries = apply_filters(entries, options)?;
    if had_filters {
        progress(&format!("{} filtered and unignored entries", entries.len()));
    }
    Ok(entries)
}

/// Minimal per-file full-name sets the value parsers need to load.
pub fn wanted_names(entries: &[ComparableEntry]) -> (FxHashSet<String>, FxHashSet<String>) {
    let mut need1 = FxHashSet::default();
    let mut need2 = FxHashSet::default();
    for entry in entries.iter() {
        match &entry.kind {
            EntryKind::Direct { name1, name2 } => {
                need1.insert(name1.clone());
                need2.insert(name2.clone());
            }
            EntryKind::Bus {
                range_in_first,
                range_name,
                bit_names,
                ..
            } => {
                let (range_side, bit_side) = if *range_in_first {
                    (&mut need1, &mut need2)
                } else {
                    (&mut need2, &mut need1)
                };
                range_side.insert(range_name.clone());
                bit_side.extend(bit_names.values().cloned());
            }
        }
    }
    (need1, need2)
}

/// Short-name view of one file's namespace. Names not under the prefix are
/// excluded entirely. Declaration order is kept (first occurrence wins a
/// short name's position, the last one its full name, as with repeated
/// declarations of one wire).
fn strip_prefix(
    signals: &[String],
    prefix: Option<&str>,
) -> (Vec<String>, FxHashMap<String, String>) {
    let mut order = Vec::new();
    let mut map = FxHashMap::default();
    for full in signals.iter() {
        let short = match prefix {
            None => full.clone(),
            Some(p) => match full.strip_prefix(p) {
                Some(rest) => rest.to_string(),
                None => continue,
            },
        };
        if map.insert(short.clone(), full.clone()).is_none() {
            order.push(short);
        }
    }
    (order, map)
}

type RangeIndex = FxHashMap<String, (i64, i64, String)>;
type BitIndex = FxHashMap<String, FxHashMap<i64, String>>;

/// Classifies suffixed short names as `base[msb:lsb]` or `base[idx]`.
/// The first declared range per base wins.
fn index_by_base(order: &[String], map: &FxHashMap<String, String>) -> (RangeIndex, BitIndex) {
    let mut ranges = RangeIndex::default();
    let mut bits = BitIndex::default();
    for short in order.iter() {
        let full = &map[short];
        if let Some(caps) = range_re().captures(short) {
            let (Ok(msb), Ok(lsb)) = (caps[2].parse::<i64>(), caps[3].parse::<i64>()) else {
                continue;
            };
            ranges
                .entry(caps[1].to_string())
                .or_insert((msb, lsb, full.clone()));
        } else if let Some(caps) = bit_re().captures(short) {
            let Ok(idx) = caps[2].parse::<i64>() else {
                continue;
            };
            bits.entry(caps[1].to_string())
                .or_default()
                .entry(idx)
                .or_insert_with(|| full.clone());
        }
    }
    (ranges, bits)
}

/// Adds a bus entry for every range declaration whose exact bit positions
/// are all covered by single-bit signals on the other side. Partial coverage
/// disqualifies the pairing silently; a direct key always wins.
fn synthesize_buses(
    entries: &mut Vec<ComparableEntry>,
    direct_keys: &FxHashSet<String>,
    ranges: &RangeIndex,
    bits: &BitIndex,
    range_in_first: bool,
) {
    for (base, (msb, lsb, range_name)) in ranges.iter() {
        let key = format!("{base}[{msb}:{lsb}]");
        if direct_keys.contains(&key) {
            continue;
        }
        let Some(bit_names) = bits.get(base) else {
            continue;
        };
        if !covers(bit_names, *msb, *lsb) {
            continue;
        }
        entries.push(ComparableEntry {
            key,
            kind: EntryKind::Bus {
                msb: *msb,
                lsb: *lsb,
                range_in_first,
                range_name: range_name.clone(),
                bit_names: bit_names.clone(),
            },
        });
    }
}

fn covers(bits: &FxHashMap<i64, String>, msb: i64, lsb: i64) -> bool {
    let (lo, hi) = if msb >= lsb { (lsb, msb) } else { (msb, lsb) };
    (lo..=hi).all(|i| bits.contains_key(&i))
}

/// Include patterns must all match; any matching exclude pattern drops the
/// entry. Both are unanchored searches over the canonical key.
fn apply_filters(
    mut entries: Vec<ComparableEntry>,
    options: &DiffOptions,
) -> Result<Vec<ComparableEntry>> {
    for pattern in options.include.iter() {
        let re = compile(pattern)?;
        entries.retain(|e| re.is_match(&e.key));
    }
    for pattern in options.exclude.iter() {
        let re = compile(pattern)?;
        entries.retain(|e| !re.is_match(&e.key));
    }
    Ok(entries)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| DiffError::BadFilter {
        pattern: pattern.to_string(),
        source,
    })
}

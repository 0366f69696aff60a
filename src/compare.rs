// SPDX-License-Identifier: ISC
//
// Walks each comparable entry's combined timeline and keeps the set of
// entries that first diverge at the globally earliest time.

use crate::matching::{ComparableEntry, EntryKind};
use crate::signals::{normalize, SignalView, SynthesizedBus, Time};
use crate::vcd::VcdBody;
use rustc_hash::FxHashMap;

/// One entry's earliest disagreement. Values are width-normalized bit
/// strings; the empty string marks a side with no recorded value yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub time: Time,
    pub value1: String,
    pub value2: String,
    pub key: String,
}

/// Compares entries in their given (canonical-key) order and returns every
/// entry whose first mismatch happens at the earliest diverging time.
pub fn compare_entries(
    entries: &[ComparableEntry],
    body1: &VcdBody,
    body2: &VcdBody,
    after: Option<Time>,
    before: Option<Time>,
    progress: &mut dyn FnMut(&str),
) -> Vec<Mismatch> {
    let mut earliest: Vec<Mismatch> = Vec::new();
    for entry in entries.iter() {
        progress(&format!("comparing {}", entry.key));
        let Some((side1, side2)) = entry_views(entry, body1, body2) else {
            continue;
        };
        let Some(mismatch) = first_mismatch(&entry.key, &side1, &side2, after, before) else {
            continue;
        };
        if let Some(first) = earliest.first() {
            if mismatch.time < first.time {
                earliest.clear();
            } else if mismatch.time > first.time {
                continue;
            }
        }
        earliest.push(mismatch);
    }
    earliest
}

/// Earliest time in the window at which the two sides' normalized values
/// disagree. Candidate times are zero, both end times and every change time
/// on either side; between changes both sides are constant, so nothing can
/// be missed.
pub fn first_mismatch(
    key: &str,
    side1: &SignalView,
    side2: &SignalView,
    after: Option<Time>,
    before: Option<Time>,
) -> Option<Mismatch> {
    let mut times: Vec<Time> = vec![0, side1.end_time().max(side2.end_time())];
    side1.collect_change_times(&mut times);
    side2.collect_change_times(&mut times);
    times.sort_unstable();
    times.dedup();

    for t in times {
        if let Some(after) = after {
            if t < after {
                continue;
            }
        }
        if let Some(before) = before {
            if t > before {
                break;
            }
        }
        // unset is a distinguishing value, not a wildcard
        let v1 = side1.sample(t).map(|v| normalize(&v, side1.width()));
        let v2 = side2.sample(t).map(|v| normalize(&v, side2.width()));
        if v1 != v2 {
            return Some(Mismatch {
                time: t,
                value1: v1.unwrap_or_default(),
                value2: v2.unwrap_or_default(),
                key: key.to_string(),
            });
        }
    }
    None
}

fn entry_views<'a>(
    entry: &ComparableEntry,
    body1: &'a VcdBody,
    body2: &'a VcdBody,
) -> Option<(SignalView<'a>, SignalView<'a>)> {
    match &entry.kind {
        EntryKind::Direct { name1, name2 } => Some((
            SignalView::Plain(body1.signals.get(name1)?),
            SignalView::Plain(body2.signals.get(name2)?),
        )),
        EntryKind::Bus {
            msb,
            lsb,
            range_in_first,
            range_name,
            bit_names,
        } => {
            let (range_body, bit_body) = if *range_in_first {
                (body1, body2)
            } else {
                (body2, body1)
            };
            let range = SignalView::Plain(range_body.signals.get(range_name)?);
            let mut bits = FxHashMap::default();
            for (idx, name) in bit_names.iter() {
                bits.insert(*idx, bit_body.signals.get(name)?);
            }
            let bus = SignalView::Bus(SynthesizedBus::new(bits, *msb, *lsb));
            Some(if *range_in_first {
                (range, bus)
            } else {
                (bus, range)
            })
        }
    }
}

/// Renders a binary value string as lowercase hex. Ambiguous values are not
/// hex-collapsed: a string containing any non-`0`/`1` character shows that
/// character instead, so a partially unknown bus is not hidden.
pub fn to_hex(value: &str) -> String {
    let value = value.trim().to_ascii_lowercase();
    if value.len() <= 1 {
        return value;
    }
    if let Some(bad) = value.chars().find(|c| *c != '0' && *c != '1') {
        return bad.to_string();
    }
    // manual base conversion, buses can be wider than any integer type
    let mut nibbles: Vec<u8> = Vec::with_capacity(value.len() / 4 + 1);
    for chunk in value.as_bytes().rchunks(4) {
        let mut nibble = 0u8;
        for bit in chunk.iter() {
            nibble = (nibble << 1) | (bit - b'0');
        }
        nibbles.push(nibble);
    }
    while nibbles.len() > 1 && nibbles[nibbles.len() - 1] == 0 {
        nibbles.pop();
    }
    nibbles
        .iter()
        .rev()
        .map(|n| b"0123456789abcdef"[*n as usize] as char)
        .collect()
}

/// One line per earliest-mismatch entry: time, both values as hex, key.
pub fn format_mismatch(m: &Mismatch) -> String {
    format!(
        "{}  {}  {}  {}",
        m.time,
        to_hex(&m.value1),
        to_hex(&m.value2),
        m.key
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signal;

    fn signal(width: u32, changes: &[(Time, &str)], end_time: Time) -> Signal {
        Signal::new(
            width,
            changes.iter().map(|(t, v)| (*t, v.to_string())).collect(),
            end_time,
        )
    }

    fn plain_mismatch(
        a: &Signal,
        b: &Signal,
        after: Option<Time>,
        before: Option<Time>,
    ) -> Option<Mismatch> {
        first_mismatch(
            "sig",
            &SignalView::Plain(a),
            &SignalView::Plain(b),
            after,
            before,
        )
    }

    #[test]
    fn test_equal_signals_have_no_mismatch() {
        let a = signal(1, &[(0, "0"), (5, "1")], 10);
        let b = signal(1, &[(0, "0"), (5, "1")], 10);
        assert_eq!(plain_mismatch(&a, &b, None, None), None);
    }

    #[test]
    fn test_divergence_between_change_times() {
        let a = signal(1, &[(0, "0"), (5, "1")], 10);
        let b = signal(1, &[(0, "0"), (7, "1")], 10);
        let m = plain_mismatch(&a, &b, None, None).unwrap();
        assert_eq!(m.time, 5);
        assert_eq!(m.value1, "1");
        assert_eq!(m.value2, "0");
    }

    #[test]
    fn test_width_normalization_hides_no_real_difference() {
        // one writer omits leading zeros, the other does not
        let a = signal(4, &[(0, "1")], 10);
        let b = signal(4, &[(0, "0001")], 10);
        assert_eq!(plain_mismatch(&a, &b, None, None), None);
    }

    #[test]
    fn test_unset_differs_from_set() {
        let a = signal(1, &[(0, "0")], 10);
        let b = signal(1, &[(5, "0")], 10);
        let m = plain_mismatch(&a, &b, None, None).unwrap();
        assert_eq!(m.time, 0);
        assert_eq!(m.value1, "0");
        assert_eq!(m.value2, "");
    }

    #[test]
    fn test_both_unset_are_equal() {
        let a = signal(1, &[(5, "1")], 10);
        let b = signal(1, &[(5, "1")], 10);
        assert_eq!(plain_mismatch(&a, &b, None, None), None);
    }

    #[test]
    fn test_time_bounds() {
        let a = signal(1, &[(0, "0"), (4, "1"), (9, "0")], 10);
        let b = signal(1, &[(0, "0"), (4, "0"), (9, "1")], 10);
        // the mismatch at 4 is below the lower bound; the next candidate is 9
        let m = plain_mismatch(&a, &b, Some(5), None).unwrap();
        assert_eq!(m.time, 9);
        assert_eq!(m.value1, "0");
        assert_eq!(m.value2, "1");
        // tightening the upper bound below the first mismatch hides it
        assert_eq!(plain_mismatch(&a, &b, None, Some(3)), None);
    }

    #[test]
    fn test_earliest_tie_set() {
        let mut signals1 = FxHashMap::default();
        let mut signals2 = FxHashMap::default();
        // a and b first diverge at 7, c at 9
        for (name, c1, c2) in [
            ("a", (7u64, "1"), (7u64, "0")),
            ("b", (7, "0"), (7, "1")),
            ("c", (9, "1"), (9, "0")),
        ] {
            signals1.insert(name.to_string(), signal(1, &[(0, "0"), c1], 10));
            signals2.insert(name.to_string(), signal(1, &[(0, "0"), c2], 10));
        }
        let body1 = VcdBody {
            signals: signals1,
            end_time: 10,
        };
        let body2 = VcdBody {
            signals: signals2,
            end_time: 10,
        };
        let entries: Vec<ComparableEntry> = ["a", "b", "c"]
            .iter()
            .map(|n| ComparableEntry {
                key: n.to_string(),
                kind: EntryKind::Direct {
                    name1: n.to_string(),
                    name2: n.to_string(),
                },
            })
            .collect();

        let result = compare_entries(&entries, &body1, &body2, None, None, &mut |_| {});
        let found: Vec<(&str, Time)> = result.iter().map(|m| (m.key.as_str(), m.time)).collect();
        assert_eq!(found, [("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(""), "");
        assert_eq!(to_hex("0"), "0");
        assert_eq!(to_hex("x"), "x");
        assert_eq!(to_hex("z"), "z");
        assert_eq!(to_hex("101010"), "2a");
        assert_eq!(to_hex("0000"), "0");
        assert_eq!(to_hex("00010000"), "10");
        assert_eq!(to_hex("1x10"), "x");
        assert_eq!(to_hex("zz00"), "z");
    }

    #[test]
    fn test_to_hex_wider_than_128_bits() {
        let mut wide = String::from("1");
        wide.push_str(&"0".repeat(131));
        let mut expected = String::from("8");
        expected.push_str(&"0".repeat(32));
        assert_eq!(to_hex(&wide), expected);
    }

    #[test]
    fn test_format_mismatch() {
        let m = Mismatch {
            time: 20,
            value1: "1010".to_string(),
            value2: "1011".to_string(),
            key: "cpu.pc".to_string(),
        };
        assert_eq!(format_mismatch(&m), "20  a  b  cpu.pc");
    }
}

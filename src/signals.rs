// SPDX-License-Identifier: ISC

use rustc_hash::FxHashMap;
use std::borrow::Cow;

pub type Time = u64;

/// Change-only trace of one declared signal. The signal holds its last
/// recorded value until the next change (step function).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    width: u32,
    changes: Vec<(Time, String)>,
    end_time: Time,
}

impl Signal {
    /// `changes` must hold at most one value per timestamp, in parse order.
    pub fn new(width: u32, changes: Vec<(Time, String)>, end_time: Time) -> Self {
        Signal {
            width,
            changes,
            end_time,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Largest time marker observed in the owning file.
    pub fn end_time(&self) -> Time {
        self.end_time
    }

    pub fn change_times(&self) -> impl Iterator<Item = Time> + '_ {
        self.changes.iter().map(|(t, _)| *t)
    }

    /// Last recorded value at or before `t`. `None` until the first change.
    pub fn sample(&self, t: Time) -> Option<&str> {
        let idx = self.changes.partition_point(|(ct, _)| *ct <= t);
        if idx == 0 {
            None
        } else {
            Some(self.changes[idx - 1].1.as_str())
        }
    }
}

/// Multi-bit value synthesized from per-bit traces when only the other file
/// declares the full range. Bit order follows the declared range direction.
pub struct SynthesizedBus<'a> {
    order: Vec<i64>,
    bits: FxHashMap<i64, &'a Signal>,
    end_time: Time,
    change_times: Vec<Time>,
}

impl<'a> SynthesizedBus<'a> {
    pub fn new(bits: FxHashMap<i64, &'a Signal>, msb: i64, lsb: i64) -> Self {
        let order: Vec<i64> = if msb >= lsb {
            (lsb..=msb).rev().collect()
        } else {
            (msb..=lsb).collect()
        };
        let end_time = bits.values().map(|s| s.end_time()).max().unwrap_or(0);
        // any single-bit flip counts as a bus-level change point, even if the
        // concatenated value ends up unchanged
        let mut change_times: Vec<Time> = bits.values().flat_map(|s| s.change_times()).collect();
        change_times.sort_unstable();
        change_times.dedup();
        SynthesizedBus {
            order,
            bits,
            end_time,
            change_times,
        }
    }

    pub fn width(&self) -> u32 {
        self.order.len() as u32
    }

    pub fn end_time(&self) -> Time {
        self.end_time
    }

    pub fn change_times(&self) -> &[Time] {
        &self.change_times
    }

    /// Concatenation of the constituent bits at `t` in declared order.
    /// Unset and high-impedance bits read as `x`.
    pub fn sample(&self, t: Time) -> String {
        let mut out = String::with_capacity(self.order.len());
        for bit in self.order.iter() {
            let c = match self.bits.get(bit).and_then(|s| s.sample(t)) {
                Some("0") => '0',
                Some("1") => '1',
                _ => 'x',
            };
            out.push(c);
        }
        out
    }
}

/// The two shapes one side of a comparable entry can take. Both provide
/// step-function sampling; no dynamic dispatch needed.
pub enum SignalView<'a> {
    Plain(&'a Signal),
    Bus(SynthesizedBus<'a>),
}

impl SignalView<'_> {
    pub fn width(&self) -> u32 {
        match self {
            SignalView::Plain(s) => s.width(),
            SignalView::Bus(b) => b.width(),
        }
    }

    pub fn end_time(&self) -> Time {
        match self {
            SignalView::Plain(s) => s.end_time(),
            SignalView::Bus(b) => b.end_time(),
        }
    }

    pub fn collect_change_times(&self, into: &mut Vec<Time>) {
        match self {
            SignalView::Plain(s) => into.extend(s.change_times()),
            SignalView::Bus(b) => into.extend_from_slice(b.change_times()),
        }
    }

    /// `None` means unset: no value recorded at or before `t`. A synthesized
    /// bus always yields a concrete string (unset bits read as `x`).
    pub fn sample(&self, t: Time) -> Option<Cow<'_, str>> {
        match self {
            SignalView::Plain(s) => s.sample(t).map(Cow::Borrowed),
            SignalView::Bus(b) => Some(Cow::Owned(b.sample(t))),
        }
    }
}

/// Widen a recorded value to the declared width before comparison: a lone
/// `x`/`z` on a multi-bit signal means the entire bus is in that state, and
/// writers may omit leading zeros on vector values.
pub fn normalize(value: &str, width: u32) -> String {
    let width = width.max(1) as usize;
    let value = value.to_ascii_lowercase();
    if width > 1 && (value == "x" || value == "z") {
        return value.repeat(width);
    }
    if width > 1 && value.len() < width {
        let mut out = String::with_capacity(width);
        for _ in 0..(width - value.len()) {
            out.push('0');
        }
        out.push_str(&value);
        return out;
    }
    value
}

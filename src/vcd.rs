// SPDX-License-Identifier: ISC
//
// Line-oriented VCD parsing, split in two passes: the header pass builds the
// signal namespace, the value pass decodes changes for a wanted subset of
// names only. Real-world VCD emitters vary in whitespace and casing, so
// unparseable lines are skipped instead of aborting the run.

use crate::signals::Signal;
use crate::{DiffError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::BufRead;
use std::path::Path;

/// Signal namespace declared by a VCD header. Built once per file,
/// immutable afterwards.
#[derive(Debug, Default)]
pub struct VcdHeader {
    /// Full names (scope path joined with `.`) in declaration order.
    pub signals: Vec<String>,
    /// Bit width per full name.
    pub widths: FxHashMap<String, u32>,
    /// Wire code per full name.
    pub codes: FxHashMap<String, String>,
    /// One wire code may label several aliased declarations.
    pub code_to_names: FxHashMap<String, Vec<String>>,
}

/// Per-name compressed timelines of one file's body.
#[derive(Debug)]
pub struct VcdBody {
    pub signals: FxHashMap<String, Signal>,
    /// Largest time marker seen in the file.
    pub end_time: u64,
}

pub fn read_header(path: &Path) -> Result<VcdHeader> {
    let io_err = |source| DiffError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    parse_header(std::io::BufReader::new(file)).map_err(io_err)
}

pub fn read_values(
    path: &Path,
    header: &VcdHeader,
    wanted: &FxHashSet<String>,
) -> Result<VcdBody> {
    let io_err = |source| DiffError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    parse_values(std::io::BufReader::new(file), header, wanted).map_err(io_err)
}

/// Reads declarations up to `$enddefinitions`. A file without any `$var`
/// lines yields an empty namespace; missing common signals are diagnosed
/// later, at matching time.
pub fn parse_header(mut input: impl BufRead) -> std::io::Result<VcdHeader> {
    let mut header = VcdHeader::default();
    let mut scopes: Vec<String> = Vec::new();
    let mut buf = Vec::with_capacity(128);

    while read_line(&mut input, &mut buf)? {
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("$scope") {
            // `$scope module <name> $end`
            let mut tokens = rest.split_whitespace();
            let _tpe = tokens.next();
            if let Some(name) = tokens.next() {
                scopes.push(name.to_string());
            }
        } else if line.starts_with("$upscope") {
            scopes.pop();
        } else if let Some(rest) = line.strip_prefix("$var") {
            if let Some((width, code, reference)) = parse_var(rest) {
                let full = if scopes.is_empty() {
                    reference
                } else {
                    format!("{}.{}", scopes.join("."), reference)
                };
                header.widths.insert(full.clone(), width);
                header.codes.insert(full.clone(), code.clone());
                header
                    .code_to_names
                    .entry(code)
                    .or_default()
                    .push(full.clone());
                header.signals.push(full);
            }
        } else if line.starts_with("$enddefinitions") {
            break;
        }
    }
    Ok(header)
}

/// `$var wire 8 ! data [7:0] $end` -> width, code, reference.
fn parse_var(body: &str) -> Option<(u32, String, String)> {
    let mut tokens: Vec<&str> = body.split_whitespace().collect();
    if let Some(end) = tokens.iter().position(|t| *t == "$end") {
        tokens.truncate(end);
    }
    if tokens.len() < 4 {
        return None;
    }
    let width = tokens[1].parse::<u32>().ok()?;
    let code = tokens[2].to_string();
    // a spaced bit select or range is still part of the reference name
    let reference = tokens[3..].concat();
    Some((width, code, reference))
}

/// Decodes value changes for the wanted names only. Changes whose wire code
/// labels no wanted name are dropped after a single hash lookup, so an
/// unrelated multi-gigabyte trace body stays cheap to scan.
pub fn parse_values(
    mut input: impl BufRead,
    header: &VcdHeader,
    wanted: &FxHashSet<String>,
) -> std::io::Result<VcdBody> {
    let mut wanted_codes: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for (code, names) in header.code_to_names.iter() {
        let selected: Vec<&str> = names
            .iter()
            .filter(|n| wanted.contains(n.as_str()))
            .map(|n| n.as_str())
            .collect();
        if !selected.is_empty() {
            wanted_codes.insert(code.as_str(), selected);
        }
    }

    let mut raw: FxHashMap<&str, Vec<(u64, String)>> =
        wanted.iter().map(|n| (n.as_str(), Vec::new())).collect();
    let mut current_time = 0u64;
    let mut end_time = 0u64;
    let mut in_body = false;
    let mut buf = Vec::with_capacity(128);

    while read_line(&mut input, &mut buf)? {
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if !in_body {
            in_body = line.starts_with("$enddefinitions");
            continue;
        }
        if line.is_empty() {
            continue;
        }

        if let Some(stamp) = line.strip_prefix('#') {
            // Migen-style empty stamps parse as zero, as does garbage
            current_time = stamp.trim().parse().unwrap_or(0);
            end_time = end_time.max(current_time);
            continue;
        }
        if line.starts_with('$') {
            // `$dumpvars` sections and their `$end` are tolerated, nothing more
            continue;
        }

        let (value, code) = match line.as_bytes()[0] {
            b'b' | b'B' | b'r' | b'R' => {
                let mut parts = line[1..].trim().splitn(2, char::is_whitespace);
                match (parts.next(), parts.next()) {
                    (Some(value), Some(code)) if !value.is_empty() => {
                        (value.to_ascii_lowercase(), code.trim())
                    }
                    _ => continue,
                }
            }
            b'0' | b'1' | b'x' | b'X' | b'z' | b'Z' => {
                (line[..1].to_ascii_lowercase(), line[1..].trim())
            }
            _ => continue,
        };
        if code.is_empty() {
            continue;
        }
        let Some(names) = wanted_codes.get(code) else {
            continue;
        };
        // a code's update applies to every name aliased to it
        for name in names.iter() {
            if let Some(changes) = raw.get_mut(*name) {
                changes.push((current_time, value.clone()));
            }
        }
    }

    let mut signals = FxHashMap::default();
    for (name, changes) in raw.into_iter() {
        let mut compressed: Vec<(u64, String)> = Vec::with_capacity(changes.len());
        for (t, v) in changes.into_iter() {
            match compressed.last_mut() {
                // several updates in one time slot collapse to the settled value
                Some(last) if last.0 == t => last.1 = v,
                _ => compressed.push((t, v)),
            }
        }
        let width = header.widths.get(name).copied().unwrap_or(1);
        signals.insert(name.to_string(), Signal::new(width, compressed, end_time));
    }
    Ok(VcdBody { signals, end_time })
}

fn read_line(input: &mut impl BufRead, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    let read = input.read_until(b'\n', buf)?;
    Ok(read > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = r#"$date today $end
$timescale 1ns $end
$scope module top $end
$var wire 1 ! clk $end
$scope module dut $end
$var wire 4 " data [3:0] $end
$var wire 4 " data_alias $end
$upscope $end
$upscope $end
$enddefinitions $end
"#;

    fn wanted(names: &[&str]) -> FxHashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_header() {
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        assert_eq!(
            header.signals,
            ["top.clk", "top.dut.data[3:0]", "top.dut.data_alias"]
        );
        assert_eq!(header.widths["top.clk"], 1);
        assert_eq!(header.widths["top.dut.data[3:0]"], 4);
        assert_eq!(header.codes["top.clk"], "!");
        assert_eq!(
            header.code_to_names["\""],
            ["top.dut.data[3:0]", "top.dut.data_alias"]
        );
    }

    #[test]
    fn test_parse_header_no_vars() {
        let header = parse_header(Cursor::new("$enddefinitions $end\n#0\n")).unwrap();
        assert!(header.signals.is_empty());
    }

    #[test]
    fn test_parse_header_skips_malformed_lines() {
        let input = "$var wire not_a_width ! broken $end\n$var wire 1 @ ok $end\n$enddefinitions $end\n";
        let header = parse_header(Cursor::new(input)).unwrap();
        assert_eq!(header.signals, ["ok"]);
    }

    #[test]
    fn test_parse_values_scalar_and_vector() {
        let tail = "#0\n0!\nb1010 \"\n#5\n1!\n#10\n";
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        let parsed = parse_values(
            Cursor::new(format!("{HEADER}{tail}")),
            &header,
            &wanted(&["top.clk", "top.dut.data[3:0]"]),
        )
        .unwrap();
        assert_eq!(parsed.end_time, 10);
        let clk = &parsed.signals["top.clk"];
        assert_eq!(clk.sample(0), Some("0"));
        assert_eq!(clk.sample(5), Some("1"));
        assert_eq!(clk.end_time(), 10);
        let data = &parsed.signals["top.dut.data[3:0]"];
        assert_eq!(data.sample(3), Some("1010"));
    }

    #[test]
    fn test_parse_values_alias_fan_out() {
        let tail = "#0\nbx \"\n#2\nb11 \"\n";
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        let parsed = parse_values(
            Cursor::new(format!("{HEADER}{tail}")),
            &header,
            &wanted(&["top.dut.data[3:0]", "top.dut.data_alias"]),
        )
        .unwrap();
        // both aliased names receive every update of their shared code
        assert_eq!(parsed.signals["top.dut.data[3:0]"].sample(2), Some("11"));
        assert_eq!(parsed.signals["top.dut.data_alias"].sample(2), Some("11"));
    }

    #[test]
    fn test_parse_values_collapses_same_timestamp() {
        let tail = "#0\n0!\n1!\n0!\n#3\n1!\n";
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        let parsed = parse_values(
            Cursor::new(format!("{HEADER}{tail}")),
            &header,
            &wanted(&["top.clk"]),
        )
        .unwrap();
        let clk = &parsed.signals["top.clk"];
        // only the settled value per time slot is kept
        assert_eq!(clk.change_times().collect::<Vec<_>>(), [0, 3]);
        assert_eq!(clk.sample(0), Some("0"));
        assert_eq!(clk.sample(3), Some("1"));
    }

    #[test]
    fn test_parse_values_ignores_unwanted_and_junk() {
        let tail = "#0\n1!\nb1111 \"\n$dumpvars\n$end\nnot a change line\nq?\n#7\n";
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        let parsed = parse_values(
            Cursor::new(format!("{HEADER}{tail}")),
            &header,
            &wanted(&["top.clk"]),
        )
        .unwrap();
        assert_eq!(parsed.signals.len(), 1);
        assert_eq!(parsed.end_time, 7);
    }

    #[test]
    fn test_parse_values_uppercase_and_casing() {
        let tail = "#0\nX!\nB1X0Z \"\n";
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        let parsed = parse_values(
            Cursor::new(format!("{HEADER}{tail}")),
            &header,
            &wanted(&["top.clk", "top.dut.data[3:0]"]),
        )
        .unwrap();
        assert_eq!(parsed.signals["top.clk"].sample(0), Some("x"));
        assert_eq!(parsed.signals["top.dut.data[3:0]"].sample(0), Some("1x0z"));
    }

    #[test]
    fn test_wanted_signal_without_changes_is_present() {
        let tail = "#0\n1!\n#9\n";
        let header = parse_header(Cursor::new(HEADER)).unwrap();
        let parsed = parse_values(
            Cursor::new(format!("{HEADER}{tail}")),
            &header,
            &wanted(&["top.clk", "top.dut.data[3:0]"]),
        )
        .unwrap();
        let data = &parsed.signals["top.dut.data[3:0]"];
        assert_eq!(data.sample(9), None);
        assert_eq!(data.end_time(), 9);
    }

    #[test]
    fn test_read_header_missing_file() {
        let err = read_header(Path::new("does/not/exist.vcd")).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.vcd"));
    }
}

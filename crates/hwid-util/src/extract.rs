//! Line-oriented capture extraction.
//!
//! Every parser in this workspace (serial candidates from `getprop` dumps,
//! probe identifiers from logcat buffers, version strings from gradle build
//! files) is an instantiation of [`scan_captures`] with a specific pattern.

use std::io::BufRead;

use regex::{Captures, Regex};
use tracing::warn;

/// Scans `reader` line by line and invokes `on_match` with the captures of
/// every line the pattern matches. Non-matching lines are skipped silently.
///
/// Lines are matched independently; the pattern never spans lines. A stray
/// trailing carriage return (adb on some hosts emits CRCRLF) is stripped
/// before matching. A read error mid-stream is logged and ends the scan
/// early; captures already delivered stand.
pub fn scan_captures<R, F>(reader: R, pattern: &Regex, mut on_match: F)
where
    R: BufRead,
    F: FnMut(&Captures),
{
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("line scan stopped early: {err}");
                return;
            }
        };
        let text = line.strip_suffix('\r').unwrap_or(line.as_str());
        if let Some(caps) = pattern.captures(text) {
            on_match(&caps);
        }
    }
}

/// Convenience wrapper over [`scan_captures`] that collects the first capture
/// group of every matching line, in input order.
pub fn collect_group1<R: BufRead>(reader: R, pattern: &Regex) -> Vec<String> {
    let mut out = Vec::new();
    scan_captures(reader, pattern, |caps| {
        if let Some(group) = caps.get(1) {
            out.push(group.as_str().to_string());
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(raw: &str) -> Regex {
        Regex::new(raw).unwrap()
    }

    #[test]
    fn delivers_captures_in_input_order() {
        let input = "a=1\nskip me\na=2\na=3\n";
        let got = collect_group1(input.as_bytes(), &pattern(r"a=(\d+)"));
        assert_eq!(got, vec!["1", "2", "3"]);
    }

    #[test]
    fn strips_trailing_carriage_return_before_matching() {
        let input = "key=[abc]\r\r\n";
        let got = collect_group1(input.as_bytes(), &pattern(r"key=\[(\w+)\]$"));
        assert_eq!(got, vec!["abc"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let got = collect_group1("".as_bytes(), &pattern(r"(x)"));
        assert!(got.is_empty());
    }

    #[test]
    fn all_groups_are_visible_to_the_callback() {
        let mut pairs = Vec::new();
        scan_captures(
            "[a]: [1]\n[b]: [2]\n".as_bytes(),
            &pattern(r"\[(\w+)\]: \[(\w+)\]"),
            |caps| {
                pairs.push((caps[1].to_string(), caps[2].to_string()));
            },
        );
        assert_eq!(
            pairs,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
    }
}

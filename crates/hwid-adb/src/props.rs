//! Parsing of `adb shell getprop` dumps into serial candidates.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use hwid_util::extract::scan_captures;

// Matches `[gsm.serial]: [VPR081831768      10P]` style lines. The value is
// the first non-whitespace run inside the second bracket pair; anything after
// a space is a padded reference suffix the registry never considers.
static SERIAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*serial.*)\]: \[(\S+).*\]").expect("serial line pattern"));

/// One `[key]: [value]` pair whose key mentions `serial`, scraped from a
/// property dump. Produced fresh on every run; only the `value` identifies a
/// device, the key is kept for display.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialCandidate {
    pub key: String,
    pub value: String,
}

/// Extracts serial candidates from raw property-dump text, in order of
/// appearance. Keys must literally contain `serial` (case-sensitive); lines
/// with an empty value bracket contribute nothing. Duplicates are preserved;
/// deduplication is the registry's concern.
pub fn extract_serials(text: &str) -> Vec<SerialCandidate> {
    let mut serials = Vec::new();
    scan_captures(text.as_bytes(), &SERIAL_LINE, |caps| {
        serials.push(SerialCandidate {
            key: caps[1].to_string(),
            value: caps[2].to_string(),
        });
    });
    serials
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_well_formed_serial_lines() {
        let dump = "[gsm.serial]: [VPR081831768                                                10P]\n\
            \t[gsm.serial]: [VPR081831768]\n\
            \t[serial]: [VPR081831768]\n\
            \t[gsm.serial]: []\n\
            \t[gsm.serial]: \n\
            \t[]: [VPR081831768]\n\n";

        let got = extract_serials(dump);
        assert_eq!(got.len(), 3);
        for candidate in &got {
            assert_eq!(candidate.value, "VPR081831768");
        }
        assert_eq!(got[0].key, "gsm.serial");
        assert_eq!(got[2].key, "serial");
    }

    #[test]
    fn padded_reference_suffix_is_discarded() {
        let got = extract_serials("[ro.serialno]: [ABC123   XYZ]");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].value, "ABC123");
    }

    #[test]
    fn matching_is_case_sensitive_on_serial() {
        assert!(extract_serials("[ro.Serialno]: [ABC123]").is_empty());
    }

    #[test]
    fn duplicates_are_preserved_in_order() {
        let got = extract_serials("[a.serial]: [X]\n[a.serial]: [X]\n[b.serial]: [Y]\n");
        let values: Vec<_> = got.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["X", "X", "Y"]);
    }

    #[test]
    fn empty_input_yields_no_candidates() {
        assert!(extract_serials("").is_empty());
    }
}

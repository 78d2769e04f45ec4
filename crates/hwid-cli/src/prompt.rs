//! Terminal prompts. Parsing is split out so the interactive paths stay
//! trivially thin.

use std::io::{self, Write};

pub fn read_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Reads a 1-based selection and returns the 0-based index, or `None` for
/// empty, unparsable or out-of-range input.
pub fn read_selection(prompt: &str, len: usize) -> io::Result<Option<usize>> {
    let input = read_line(prompt)?;
    Ok(parse_selection(&input, len))
}

pub fn parse_selection(input: &str, len: usize) -> Option<usize> {
    let picked: usize = input.parse().ok()?;
    if picked < 1 || picked > len {
        return None;
    }
    Some(picked - 1)
}

/// Operator override for a suggested device number; anything that does not
/// parse as a number keeps the suggestion.
pub fn parse_number_override(input: &str, suggested: i64) -> i64 {
    input.parse().unwrap_or(suggested)
}

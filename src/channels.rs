//! Channel-selection text parsing and rendering.
//!
//! Operators address scan channels with one-based numbers in free text:
//! `"1,3,(5,7)"` selects channels 1 and 3 plus the inclusive range 5..=7.
//! Internally everything is zero-based, sorted and de-duplicated.
//!
//! Unparseable tokens are skipped with a logged warning rather than failing
//! the whole selection; a typo in one token should not discard the rest of
//! the operator's input.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

#[allow(clippy::unwrap_used)] // the pattern is a compile-time constant
static RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\s*(\d+)\s*,\s*(\d+)\s*\)$").unwrap());

/// Parse a channel-selection string into sorted, de-duplicated zero-based
/// channel indices.
///
/// Tokens are separated by commas outside parentheses. Each token is either a
/// bare one-based channel number or a parenthesized inclusive range `(a,b)`;
/// an inverted range is swapped. Unparseable tokens (including channel 0,
/// which does not exist in the one-based numbering) are skipped with a
/// warning. Empty input yields an empty selection.
pub fn parse(text: &str) -> Vec<usize> {
    let mut channels: BTreeSet<usize> = BTreeSet::new();
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    for token in split_outside_parens(text) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(caps) = RANGE_RE.captures(token) {
            // Both captures are all-digit by construction; overflow on
            // absurdly long digit strings is the only parse failure left.
            let bounds: Option<(usize, usize)> =
                caps[1].parse().ok().zip(caps[2].parse().ok());
            let Some((a, b)) = bounds else {
                warn!(token, "skipping unparseable channel range");
                continue;
            };
            let (lo, hi) = if a > b { (b, a) } else { (a, b) };
            for n in lo.max(1)..=hi {
                channels.insert(n);
            }
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            match token.parse::<usize>() {
                Ok(n) if n >= 1 => {
                    channels.insert(n);
                }
                _ => warn!(token, "skipping channel 0 (numbering is one-based)"),
            }
        } else {
            warn!(token, "skipping unparseable channel token");
        }
    }

    channels.into_iter().map(|n| n - 1).collect()
}

/// Render zero-based channel indices back into the canonical one-based text
/// form.
///
/// Runs of three or more consecutive channels collapse into a `(a,b)` range
/// token; everything else renders as a bare number. `parse(render(set))`
/// returns `set` for any sorted de-duplicated selection.
pub fn render(channels: &[usize]) -> String {
    let mut sorted: Vec<usize> = channels.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut end = start;
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == end + 1 {
            end = sorted[j];
            j += 1;
        }
        if end - start >= 2 {
            parts.push(format!("({},{})", start + 1, end + 1));
        } else {
            for ch in &sorted[i..j] {
                parts.push(format!("{}", ch + 1));
            }
        }
        i = j;
    }
    parts.join(",")
}

/// Split on commas that are not inside parentheses.
fn split_outside_parens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth <= 0 => {
                tokens.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    tokens.push(&text[start..]);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singletons_and_ranges() {
        assert_eq!(parse("1,3,(5,7)"), vec![0, 2, 4, 5, 6]);
    }

    #[test]
    fn empty_input_yields_empty_selection() {
        assert_eq!(parse(""), Vec::<usize>::new());
        assert_eq!(parse("   "), Vec::<usize>::new());
    }

    #[test]
    fn swaps_inverted_ranges() {
        assert_eq!(parse("(7,5)"), vec![4, 5, 6]);
    }

    #[test]
    fn deduplicates_and_sorts() {
        assert_eq!(parse("8,2,8,(2,4)"), vec![1, 2, 3, 7]);
    }

    #[test]
    fn skips_unparseable_tokens() {
        assert_eq!(parse("1,abc,3,(x,9),4"), vec![0, 2, 3]);
    }

    #[test]
    fn skips_channel_zero() {
        assert_eq!(parse("0,2"), vec![1]);
        // a range reaching down to 0 keeps its valid part
        assert_eq!(parse("(0,2)"), vec![0, 1]);
    }

    #[test]
    fn tolerates_whitespace() {
        assert_eq!(parse(" 1 , ( 5 , 7 ) "), vec![0, 4, 5, 6]);
    }

    #[test]
    fn render_collapses_runs() {
        assert_eq!(render(&[0, 2, 4, 5, 6]), "1,3,(5,7)");
        assert_eq!(render(&[0, 1]), "1,2");
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn parse_is_idempotent_through_render() {
        for text in ["1,3,(5,7)", "(1,160)", "80,81,82,83", "2"] {
            let parsed = parse(text);
            let round_tripped = parse(&render(&parsed));
            assert_eq!(parsed, round_tripped, "round trip failed for {text}");
        }
    }
}

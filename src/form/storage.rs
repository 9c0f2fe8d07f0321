//! Form snapshot encoding
//!
//! One line per competitor: `<score> <name> <delta> ...`, the score written to
//! two decimals and the window (oldest first) at full precision.

use crate::error::{RatingError, Result};
use crate::form::tracker::{FormState, FORM_WINDOW};
use crate::types::CompetitorId;

/// A decoded form snapshot line
#[derive(Debug, Clone, PartialEq)]
pub struct FormLine {
    pub aggregate: f64,
    pub competitor: CompetitorId,
    pub history: Vec<f64>,
}

pub fn encode_form<'a>(
    entries: impl IntoIterator<Item = (&'a CompetitorId, f64, &'a FormState)>,
) -> String {
    let mut out = String::new();
    for (competitor, aggregate, state) in entries {
        out.push_str(&format!("{:.2} {}", aggregate, competitor));
        for delta in state.history() {
            out.push_str(&format!(" {}", delta));
        }
        out.push('\n');
    }
    out
}

/// Decode a form snapshot.
///
/// The window is taken from trailing numeric tokens, at most [`FORM_WINDOW`]
/// of them and always leaving one token for the name.
pub fn decode_form(contents: &str) -> Result<Vec<FormLine>> {
    let mut lines = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line_number = index + 1;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() < 2 {
            return Err(RatingError::MalformedRecord {
                line: line_number,
                reason: format!("expected '<score> <name> <deltas...>', got '{}'", raw.trim()),
            }
            .into());
        }

        let aggregate: f64 = tokens[0]
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| RatingError::MalformedRecord {
                line: line_number,
                reason: format!("invalid form score '{}'", tokens[0]),
            })?;

        let rest = &tokens[1..];
        let mut name_end = rest.len();
        while name_end > 1 && rest.len() - name_end < FORM_WINDOW {
            match rest[name_end - 1].parse::<f64>() {
                Ok(value) if value.is_finite() => name_end -= 1,
                _ => break,
            }
        }

        let competitor = rest[..name_end].join(" ");
        let history = rest[name_end..]
            .iter()
            .map(|token| token.parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|_| RatingError::MalformedRecord {
                line: line_number,
                reason: "invalid form delta".to_string(),
            })?;

        lines.push(FormLine {
            aggregate,
            competitor,
            history,
        });
    }

    Ok(lines)
}

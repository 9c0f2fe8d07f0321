//! Match file ingestion
//!
//! Match files hold one fixture per line in tuple form:
//!
//! ```text
//! # matchday 12
//! ("Arsenal", "Chelsea", "win_a"),
//! ("Aston Villa", "Everton", "draw"),
//! ```
//!
//! Quotes and the trailing comma are optional. A bad line is skipped and
//! reported without aborting the rest of the batch.

use crate::error::{is_record_level, RatingError, Result};
use crate::pool::RatingPool;
use crate::types::{MatchRecord, MatchResult};
use serde::Serialize;
use tracing::{info, warn};

/// A line that was not applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub line: usize,
    pub text: String,
    pub reason: String,
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub applied: usize,
    pub skipped: Vec<SkippedRecord>,
}

fn malformed(line: usize, reason: impl Into<String>) -> anyhow::Error {
    RatingError::MalformedRecord {
        line,
        reason: reason.into(),
    }
    .into()
}

/// Attach the source line to a record error raised without one
fn at_line(line: usize, error: anyhow::Error) -> anyhow::Error {
    match error.downcast_ref::<RatingError>() {
        Some(RatingError::MalformedRecord { line: 0, reason }) => malformed(line, reason.clone()),
        _ => error,
    }
}

/// Split on commas that are not inside quotes. A quote only opens at the
/// start of a field, so apostrophes inside bare names are kept.
fn split_fields(inner: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, c) in inner.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) if inner[start..index].trim().is_empty() => quote = Some(c),
            (c, Some(open)) if c == open => quote = None,
            (',', None) => {
                fields.push(&inner[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    fields.push(&inner[start..]);
    fields
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    for quote in ['"', '\''] {
        if field.len() >= 2 && field.starts_with(quote) && field.ends_with(quote) {
            return field[1..field.len() - 1].trim();
        }
    }
    field
}

/// Parse one match file line. Blank lines and `#` comments yield `None`.
pub fn parse_match_line(line: usize, text: &str) -> Result<Option<MatchRecord>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let body = trimmed.strip_suffix(',').unwrap_or(trimmed).trim_end();
    let inner = body
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| {
            let reason = format!("expected a (a, b, result) tuple, got '{}'", trimmed);
            malformed(line, reason)
        })?;

    let fields: Vec<&str> = split_fields(inner).into_iter().map(unquote).collect();
    if fields.len() != 3 || fields.iter().any(|field| field.is_empty()) {
        return Err(malformed(
            line,
            format!("expected three non-empty fields, got '{}'", trimmed),
        ));
    }

    let result: MatchResult = fields[2].parse()?;
    let record = MatchRecord::new(fields[0], fields[1], result)
        .canonical()
        .map_err(|e| at_line(line, e.into()))?;
    Ok(Some(record))
}

fn skip_reason(error: &anyhow::Error) -> &'static str {
    match error.downcast_ref::<RatingError>() {
        Some(RatingError::InvalidResult { .. }) => "invalid_result",
        _ => "malformed_record",
    }
}

/// Apply every record in `text` to `pool` in source order.
///
/// Record-level failures are logged and skipped. Anything else, such as a
/// failed save, stops the batch and is returned.
pub fn apply_lines(pool: &RatingPool, text: &str) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let outcome = parse_match_line(line, raw).and_then(|record| match record {
            Some(record) => pool
                .apply(&record)
                .map(Some)
                .map_err(|e| at_line(line, e)),
            None => Ok(None),
        });

        match outcome {
            Ok(Some(_)) => report.applied += 1,
            Ok(None) => {}
            Err(e) if is_record_level(&e) => {
                warn!(pool = %pool.name(), line, error = %e, "Skipping match record");
                if let Some(metrics) = pool.metrics() {
                    metrics.record_skipped(pool.name(), skip_reason(&e));
                }
                report.skipped.push(SkippedRecord {
                    line,
                    text: raw.trim().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        pool = %pool.name(),
        applied = report.applied,
        skipped = report.skipped.len(),
        "Ingested match file"
    );

    Ok(report)
}

/// Parse a labeled match set for calibration, skipping bad lines
pub fn read_labeled(text: &str) -> (Vec<MatchRecord>, Vec<SkippedRecord>) {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        match parse_match_line(line, raw) {
            Ok(Some(record)) if record.competitor_a == record.competitor_b => {
                skipped.push(SkippedRecord {
                    line,
                    text: raw.trim().to_string(),
                    reason: malformed(line, "a competitor cannot play itself").to_string(),
                });
            }
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => {
                warn!(line, error = %e, "Skipping labeled match");
                skipped.push(SkippedRecord {
                    line,
                    text: raw.trim().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    (records, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::rating::InMemorySnapshot;

    #[test]
    fn test_parse_tuple_forms() {
        let record = parse_match_line(1, r#"("Aston Villa", "Everton", "draw"),"#)
            .unwrap()
            .unwrap();
        assert_eq!(record, MatchRecord::new("Aston Villa", "Everton", MatchResult::Draw));

        let record = parse_match_line(2, "  (Arsenal, Chelsea, win_b)  ")
            .unwrap()
            .unwrap();
        assert_eq!(record.result, MatchResult::WinB);
        assert_eq!(record.competitor_a, "Arsenal");

        let record = parse_match_line(3, "('Brighton & Hove, Albion', 'Fulham', 'win_a')")
            .unwrap()
            .unwrap();
        assert_eq!(record.competitor_a, "Brighton & Hove, Albion");
    }

    #[test]
    fn test_blank_and_comment_lines_ignored() {
        assert!(parse_match_line(1, "").unwrap().is_none());
        assert!(parse_match_line(2, "   ").unwrap().is_none());
        assert!(parse_match_line(3, "# matchday 1").unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines() {
        for text in [
            r#""Arsenal", "Chelsea", "win_a""#,
            r#"("Arsenal", "Chelsea")"#,
            r#"("Arsenal", "", "draw")"#,
            r#"("Arsenal", "Chelsea", "win_a", "extra")"#,
        ] {
            let err = parse_match_line(7, text).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<RatingError>(),
                    Some(RatingError::MalformedRecord { line: 7, .. })
                ),
                "{} should be malformed",
                text
            );
        }

        let err = parse_match_line(8, r#"("Arsenal", "Chelsea", "home_win")"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::InvalidResult { .. })
        ));
    }

    #[test]
    fn test_apply_lines_isolates_bad_records() {
        let pool = RatingPool::with_backends(
            "domestic",
            &AppConfig::default(),
            Box::new(InMemorySnapshot::new()),
            Some(Box::new(InMemorySnapshot::new())),
        )
        .unwrap();

        let text = r#"# opening weekend
("Arsenal", "Chelsea", "win_a"),
("Liverpool", "Everton", "home"),
not a tuple
("Everton", "Everton", "draw"),
("Liverpool", "Everton", "win_a"),
"#;

        let report = apply_lines(&pool, text).unwrap();
        assert_eq!(report.applied, 2);
        let skipped_lines: Vec<usize> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(skipped_lines, vec![3, 4, 5]);
        assert!(report.skipped[2].reason.contains("line 5"));
        assert!(report.skipped[2].reason.contains("cannot play itself"));

        assert_eq!(pool.rating_of("Arsenal").unwrap().unwrap().rating, 1515.0);
        assert_eq!(pool.rating_of("Liverpool").unwrap().unwrap().rating, 1515.0);
        assert_eq!(pool.rating_of("Everton").unwrap().unwrap().matches_played, 1);
    }

    #[test]
    fn test_read_labeled() {
        let text = r#"("Arsenal", "Chelsea", "win_a"),
("Arsenal", "Chelsea", "maybe"),
("Fulham", "Fulham", "draw"),
("Fulham", "Brentford  FC", "draw"),
"#;
        let (records, skipped) = read_labeled(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].result, MatchResult::Draw);
        assert_eq!(records[1].competitor_b, "Brentford FC");
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].line, 2);
        assert_eq!(skipped[1].line, 3);
    }
}

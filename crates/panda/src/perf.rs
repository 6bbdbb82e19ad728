//! Performance data parser for nagios plugin style output.
//!
//! ```text
//! DISK OK - free space: / 3326 MB | /=2643MB;5948;5958;0;5968 'data volume'=12%;;;0;100
//! ```
//!
//! Everything after the first `|` is parsed, or the whole text when there is
//! no `|`. Tokens that do not look like `label=value[uom][;warn;crit;min;max]`
//! are skipped.

use crate::slug::slugify;
use crate::types::Metric;

/// Extract every metric from a probe's output
pub fn parse(service_id: &str, raw_output: &str) -> Vec<Metric> {
    let section = match raw_output.split_once('|') {
        Some((_, perf)) => perf,
        None => raw_output,
    };

    split_tokens(section)
        .iter()
        .filter_map(|token| parse_metric(service_id, token))
        .collect()
}

/// Split on whitespace, keeping quoted labels together
fn split_tokens(section: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in section.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn parse_metric(service_id: &str, token: &str) -> Option<Metric> {
    let (label, data) = split_label(token)?;
    let mut slots = data.split(';');

    let (value, uom) = split_value(slots.next()?)?;
    let mut thresholds = slots.map(parse_number);

    let mut label_id = slugify(&label);
    if label_id.is_empty() {
        label_id = "root".to_string();
    }

    Some(Metric {
        id: format!("{service_id}-{label_id}"),
        label,
        value,
        uom,
        warning: thresholds.next().flatten(),
        critical: thresholds.next().flatten(),
        min: thresholds.next().flatten(),
        max: thresholds.next().flatten(),
    })
}

/// Split `label=data`, removing quotes around the label
fn split_label(token: &str) -> Option<(String, &str)> {
    let first = token.chars().next()?;

    if first == '\'' || first == '"' {
        let closing = token[1..].find(first)? + 1;
        let label = token[1..closing].to_string();
        let data = token[closing + 1..].strip_prefix('=')?;
        Some((label, data))
    } else {
        let (label, data) = token.split_once('=')?;
        Some((label.to_string(), data))
    }
}

/// Split `0.125ms` into the number and its unit of measure
fn split_value(value: &str) -> Option<(f64, Option<String>)> {
    let bytes = value.as_bytes();
    let mut end = 0;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' | b'.' | b'-' | b'+' => end += 1,
            // exponent, only when digits follow
            b'e' | b'E' if end > 0 && is_exponent_tail(&bytes[end + 1..]) => end += 1,
            _ => break,
        }
    }

    let number = value[..end].parse::<f64>().ok()?;
    let uom = &value[end..];

    Some((number, (!uom.is_empty()).then(|| uom.to_string())))
}

fn is_exponent_tail(rest: &[u8]) -> bool {
    let digits = match rest.first() {
        Some(b'-' | b'+') => &rest[1..],
        _ => rest,
    };
    digits.first().is_some_and(u8::is_ascii_digit)
}

fn parse_number(slot: &str) -> Option<f64> {
    let slot = slot.trim();
    if slot.is_empty() {
        return None;
    }
    slot.parse().ok()
}

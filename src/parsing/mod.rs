//! Response decoders.
//!
//! Decoders take a [`Reply`] and either build a fresh structure or update a
//! topology model in place. Every decoder validates the whole reply before
//! touching its target, so a malformed reply leaves the model unchanged.
//! Field counts are fixed per record kind; a short or long record is an
//! error, never a truncation.
//!
//! [`Reply`]: crate::transport::Reply

pub mod daqmx;
pub mod scope;
pub mod sweep;

pub use daqmx::{parse_daqmx_info, parse_output_values};
pub use scope::{
    apply_union_channels, apply_union_data_length, apply_union_devices, apply_union_frequency,
    apply_union_trigger, parse_scope_info, parse_union_count,
};
pub use sweep::{parse_sweep_data, parse_sweep_status, SweepDataChunk, SweepStatusReport};

use std::str::FromStr;

use crate::error::{NevError, NevResult};

/// Contents of every `[...]` block in `text`, which must hold nothing else
/// besides whitespace.
pub(crate) fn bracket_blocks(text: &str) -> NevResult<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let body = rest
            .strip_prefix('[')
            .ok_or_else(|| NevError::parse("'[' opening a record", rest))?;
        let close = body
            .find(']')
            .ok_or_else(|| NevError::parse("']' closing a record", rest))?;
        let inner = &body[..close];
        if inner.contains('[') {
            return Err(NevError::parse("a record without nested brackets", rest));
        }
        blocks.push(inner);
        rest = body[close + 1..].trim_start();
    }
    Ok(blocks)
}

/// Split a record into exactly `count` fields.
pub(crate) fn record_fields<'a>(
    record: &'a str,
    separator: Option<char>,
    count: usize,
    what: &str,
) -> NevResult<Vec<&'a str>> {
    let fields: Vec<&str> = match separator {
        Some(sep) => record.split(sep).map(str::trim).collect(),
        None => record.split_whitespace().collect(),
    };
    if fields.len() != count {
        return Err(NevError::parse(
            format!("{what} with {count} fields (found {})", fields.len()),
            record,
        ));
    }
    Ok(fields)
}

/// Parse one token, naming the field on failure.
pub(crate) fn parse_field<T: FromStr>(token: &str, what: &str) -> NevResult<T> {
    token
        .trim()
        .parse::<T>()
        .map_err(|_| NevError::parse(what.to_string(), token))
}

/// Whitespace-separated floats.
pub(crate) fn parse_floats(text: &str, what: &str) -> NevResult<Vec<f64>> {
    text.split_whitespace().map(|t| parse_field(t, what)).collect()
}

/// The single numeric header argument (e.g. the union id of `#NSUDEVS 0`).
pub(crate) fn single_header_arg<T: FromStr>(args: &[&str], tag: &str) -> NevResult<T> {
    match args {
        [arg] => parse_field(arg, &format!("numeric argument of {tag}")),
        _ => Err(NevError::parse(
            format!("{tag} with one argument"),
            args.join(" "),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_split() {
        assert_eq!(
            bracket_blocks("[1 2] [3,4]\n[]").unwrap(),
            vec!["1 2", "3,4", ""]
        );
        assert!(bracket_blocks("").unwrap().is_empty());
    }

    #[test]
    fn stray_text_and_unbalanced_brackets_fail() {
        assert!(bracket_blocks("[1 2] x [3]").is_err());
        assert!(bracket_blocks("[1 2").is_err());
        assert!(bracket_blocks("[1 [2]]").is_err());
    }

    #[test]
    fn field_counts_are_strict() {
        assert_eq!(
            record_fields("a, b ,c", Some(','), 3, "record").unwrap(),
            vec!["a", "b", "c"]
        );
        assert!(record_fields("a,b", Some(','), 3, "record").is_err());
        assert!(record_fields("a b c d", None, 3, "record").is_err());
    }
}

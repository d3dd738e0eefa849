//! `GET PSA STAT` and `GET PSA DATA` decoders.
//!
//! ```text
//! #PSASTAT
//! 3 0.300000 RUNNING
//! #OK
//!
//! #PSADATA 0 2
//! 0.000000
//! [0.01 0.02 ...]
//! [0.00 -0.03 ...]
//! 0.500000
//! [...]
//! [...]
//! #OK
//! ```

use indexmap::IndexMap;

use super::{bracket_blocks, parse_field, parse_floats};
use crate::error::{NevError, NevResult};
use crate::hardware::ChannelKey;
use crate::sweep::SweepStatus;
use crate::transport::Reply;

const FAILED_TOKEN: &str = "FAILED";
const DEFAULT_FAILURE: &str = "sweep reported FAILED";

/// Decoded `GET PSA STAT` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepStatusReport {
    /// Steps acquired so far
    pub stage: u32,
    /// Sweep value of the last step
    pub last_value: f64,
    /// Status token
    pub status: SweepStatus,
    /// Message following an inline `FAILED` token
    pub failure: Option<String>,
}

impl SweepStatusReport {
    /// Turn an inline failure into [`NevError::SweepFailed`].
    pub fn into_result(self) -> NevResult<Self> {
        match (&self.status, &self.failure) {
            (SweepStatus::Failed, Some(message)) => Err(NevError::SweepFailed(message.clone())),
            (SweepStatus::Failed, None) => Err(NevError::SweepFailed(DEFAULT_FAILURE.into())),
            _ => Ok(self),
        }
    }
}

/// Decode `<stage> <value> <STATUS> [message...]`.
///
/// The server sometimes glues the failure message to the status token
/// (`FAILED!msg`) or puts the fields on the header line; both are accepted.
pub fn parse_sweep_status(reply: &Reply) -> NevResult<SweepStatusReport> {
    let args = reply.expect_header("#PSASTAT")?;
    let tokens: Vec<&str> = args
        .into_iter()
        .chain(reply.body.split_whitespace())
        .collect();
    let (stage, value, status, rest) = match tokens.as_slice() {
        [stage, value, status, rest @ ..] => (*stage, *value, *status, rest),
        _ => {
            return Err(NevError::parse(
                "'<stage> <value> <status>' status record",
                &reply.body,
            ))
        }
    };
    let stage: u32 = parse_field(stage, "step count")?;
    let last_value: f64 = parse_field(value, "sweep value")?;

    let (status, failure) = match status.strip_prefix(FAILED_TOKEN) {
        Some(glued) => {
            let mut words: Vec<&str> = Vec::new();
            if !glued.is_empty() {
                words.push(glued);
            }
            words.extend(rest.iter().copied());
            let message = words.join(" ");
            let message = message.trim_start_matches('!').trim();
            let message = if message.is_empty() {
                DEFAULT_FAILURE.to_string()
            } else {
                message.to_string()
            };
            (SweepStatus::Failed, Some(message))
        }
        None => {
            if !rest.is_empty() {
                return Err(NevError::parse(
                    "nothing after the status token",
                    rest.join(" "),
                ));
            }
            (status.parse()?, None)
        }
    };

    Ok(SweepStatusReport {
        stage,
        last_value,
        status,
        failure,
    })
}

/// Decoded `GET PSA DATA` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepDataChunk {
    /// First step included
    pub start: u32,
    /// One past the last step included
    pub end: u32,
    /// Sweep value per step
    pub x: Vec<f64>,
    /// Reading vectors per channel, one per step
    pub y: IndexMap<ChannelKey, Vec<Vec<f64>>>,
}

/// Decode a `#PSADATA <start> <end>` reply.
///
/// Each step is a sweep value line followed by one `[...]` line per active
/// channel, in `active` order.
pub fn parse_sweep_data(reply: &Reply, active: &[ChannelKey]) -> NevResult<SweepDataChunk> {
    let args = reply.expect_header("#PSADATA")?;
    let (start, end): (u32, u32) = match args.as_slice() {
        [start, end] => (
            parse_field(start, "first step")?,
            parse_field(end, "end step")?,
        ),
        _ => return Err(NevError::parse("'#PSADATA <start> <end>' header", args.join(" "))),
    };
    if end < start {
        return Err(NevError::parse(
            "a step range with end >= start",
            format!("{start} {end}"),
        ));
    }

    let mut x = Vec::new();
    let mut steps: Vec<Vec<Vec<f64>>> = Vec::new();
    for line in reply.lines() {
        if line.starts_with('[') {
            let current = steps
                .last_mut()
                .ok_or_else(|| NevError::parse("a sweep value before readings", line))?;
            for block in bracket_blocks(line)? {
                current.push(parse_floats(block, "reading sample")?);
            }
        } else {
            x.push(parse_field::<f64>(line, "sweep value")?);
            steps.push(Vec::with_capacity(active.len()));
        }
    }

    let expected = (end - start) as usize;
    if steps.len() != expected {
        return Err(NevError::parse(
            format!("{expected} steps for range {start}-{end}"),
            format!("{} steps", steps.len()),
        ));
    }

    let mut y: IndexMap<ChannelKey, Vec<Vec<f64>>> = active
        .iter()
        .map(|key| (*key, Vec::with_capacity(expected)))
        .collect();
    for (index, readings) in steps.into_iter().enumerate() {
        if readings.len() != active.len() {
            return Err(NevError::parse(
                format!("{} channel readings per step", active.len()),
                format!("{} readings at step {}", readings.len(), start as usize + index),
            ));
        }
        for (per_channel, reading) in y.values_mut().zip(readings) {
            per_channel.push(reading);
        }
    }

    Ok(SweepDataChunk { start, end, x, y })
}

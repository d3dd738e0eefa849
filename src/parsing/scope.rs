//! `GET NISCOPEINFO` and `GET NSU ...` decoders.
//!
//! Union-scoped arrays (`CHAN`, `DLEN`, `FREQ`) are matched by position
//! against the union's member order. The counts must agree exactly: a
//! response with one entry too many or too few is rejected instead of being
//! assigned to the wrong device.

use std::collections::HashSet;

use super::{bracket_blocks, parse_field, record_fields, single_header_arg};
use crate::error::{NevError, NevResult};
use crate::hardware::{
    DigitizerDevice, DigitizerSystem, DigitizerUnion, ScopeChannel, TriggerConfig,
    VerticalCoupling, VerticalRange,
};
use crate::transport::Reply;

const SCOPE_FIELDS: usize = 6;
const TRIGGER_FIELDS: usize = 9;

/// Build the digitizer list from a `GET NISCOPEINFO` reply.
///
/// Record layout: `[slot,name,model,channels,chassis,serial]`. Global ids are
/// assigned from the record position.
pub fn parse_scope_info(reply: &Reply) -> NevResult<Vec<DigitizerDevice>> {
    reply.expect_header("#NISCOPEINFO")?;
    let mut devices = Vec::new();
    for (position, block) in bracket_blocks(&reply.body)?.into_iter().enumerate() {
        let f = record_fields(block, Some(','), SCOPE_FIELDS, "NISCOPE device record")?;
        let channel_count: u32 = parse_field(f[3], "channel count")?;
        devices.push(DigitizerDevice {
            id: position as u32,
            slot: parse_field(f[0], "slot")?,
            name: f[1].to_string(),
            model: f[2].to_string(),
            chassis: parse_field(f[4], "chassis")?,
            serial: f[5].to_string(),
            channels: (0..channel_count).map(ScopeChannel::new).collect(),
        });
    }
    Ok(devices)
}

/// Number of unions from a `GET NSU NUM` reply.
pub fn parse_union_count(reply: &Reply) -> NevResult<u32> {
    reply.expect_header("#NSUNUM")?;
    parse_field(&reply.body, "union count")
}

fn union_of<'a>(
    system: &'a mut DigitizerSystem,
    reply: &Reply,
    tag: &str,
) -> NevResult<&'a mut DigitizerUnion> {
    let args = reply.expect_header(tag)?;
    let union_id: u32 = single_header_arg(&args, tag)?;
    system
        .union_mut(union_id)
        .ok_or_else(|| NevError::parse("a known union id", format!("{tag} {union_id}")))
}

fn union_id_of(system: &DigitizerSystem, reply: &Reply, tag: &str) -> NevResult<u32> {
    let args = reply.expect_header(tag)?;
    let union_id: u32 = single_header_arg(&args, tag)?;
    if system.union(union_id).is_none() {
        return Err(NevError::parse("a known union id", format!("{tag} {union_id}")));
    }
    Ok(union_id)
}

/// Split `<leading> [..][..]` into the leading token and the blocks.
fn lead_and_blocks<'a>(body: &'a str, what: &str) -> NevResult<(&'a str, Vec<&'a str>)> {
    let open = body
        .find('[')
        .ok_or_else(|| NevError::parse(format!("{what} followed by '[' records"), body))?;
    let lead = body[..open].trim();
    if lead.is_empty() || lead.contains(char::is_whitespace) {
        return Err(NevError::parse(format!("a single {what}"), body));
    }
    Ok((lead, bracket_blocks(&body[open..])?))
}

/// Apply a `GET NSU DEVS <u>` reply: `<n> [<id> <id> ...]`.
///
/// The listed order becomes the union's protocol order. The union is left
/// untouched when the declared count disagrees with the ids present.
pub fn apply_union_devices(system: &mut DigitizerSystem, reply: &Reply) -> NevResult<()> {
    let union_id = union_id_of(system, reply, "#NSUDEVS")?;
    let (lead, blocks) = lead_and_blocks(&reply.body, "device count")?;
    let declared: usize = parse_field(lead, "device count")?;
    let list = match blocks.as_slice() {
        [list] => *list,
        _ => return Err(NevError::parse("one [..] device id list", &reply.body)),
    };
    let ids: Vec<u32> = list
        .split_whitespace()
        .map(|t| parse_field(t, "device id"))
        .collect::<NevResult<_>>()?;
    if ids.len() != declared {
        return Err(NevError::parse(
            format!("{declared} device ids as declared"),
            &reply.body,
        ));
    }
    let mut seen = HashSet::new();
    for id in &ids {
        if !seen.insert(*id) {
            return Err(NevError::parse("distinct device ids", &reply.body));
        }
        if system.device(*id).is_none() {
            return Err(NevError::parse(
                "ids of known digitizers",
                format!("device {id}"),
            ));
        }
    }
    if let Some(union) = system.union_mut(union_id) {
        union.set_members(&ids);
    }
    Ok(())
}

/// Apply a `GET NSU CHAN <u>` reply: `<total> [<range> <coupling>]...`.
///
/// Blocks are consumed device by device in union order, each device taking
/// as many blocks as it has channels.
pub fn apply_union_channels(system: &mut DigitizerSystem, reply: &Reply) -> NevResult<()> {
    let union_id = union_id_of(system, reply, "#NSUCHAN")?;
    let (lead, blocks) = lead_and_blocks(&reply.body, "channel total")?;
    let declared: usize = parse_field(lead, "channel total")?;
    if blocks.len() != declared {
        return Err(NevError::parse(
            format!("{declared} channel blocks as declared"),
            &reply.body,
        ));
    }

    let members: Vec<u32> = system
        .union(union_id)
        .map(|u| u.device_ids().collect())
        .unwrap_or_default();
    let mut expected = 0;
    for id in &members {
        expected += system.device(*id).map_or(0, DigitizerDevice::channel_count);
    }
    if expected != blocks.len() {
        return Err(NevError::parse(
            format!("{expected} channel blocks for the union's devices"),
            &reply.body,
        ));
    }

    let mut decoded = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let f = record_fields(block, None, 2, "channel configuration")?;
        let range: VerticalRange = f[0].parse()?;
        let coupling: VerticalCoupling = f[1].parse()?;
        decoded.push((range, coupling));
    }

    let mut settings = decoded.into_iter();
    for id in members {
        if let Some(device) = system.device_mut(id) {
            for channel in &mut device.channels {
                if let Some((range, coupling)) = settings.next() {
                    channel.range = range;
                    channel.coupling = coupling;
                }
            }
        }
    }
    Ok(())
}

/// Values beyond the union's member count are ignored; the server pads
/// these arrays to its own device count.
fn per_member_values<T: std::str::FromStr>(
    union: &DigitizerUnion,
    body: &str,
    what: &str,
) -> NevResult<(T, Vec<T>)> {
    let (lead, blocks) = lead_and_blocks(body, what)?;
    let aggregate: T = parse_field(lead, what)?;
    let list = match blocks.as_slice() {
        [list] => *list,
        _ => return Err(NevError::parse(format!("one [..] list of {what}s"), body)),
    };
    let values: Vec<T> = list
        .split_whitespace()
        .map(|t| parse_field(t, what))
        .collect::<NevResult<_>>()?;
    if values.len() < union.len() {
        return Err(NevError::parse(
            format!("{} {what} values, one per union member", union.len()),
            body,
        ));
    }
    Ok((aggregate, values))
}

/// Apply a `GET NSU DLEN <u>` reply: `<aggregate> [<per-device>...]`.
pub fn apply_union_data_length(system: &mut DigitizerSystem, reply: &Reply) -> NevResult<()> {
    let union = union_of(system, reply, "#NSUDLEN")?;
    let (aggregate, values) = per_member_values::<u32>(union, &reply.body, "data length")?;
    union.data_length = aggregate;
    for ((_, member), value) in union.members_mut().zip(values) {
        member.actual_data_length = value;
    }
    Ok(())
}

/// Apply a `GET NSU FREQ <u>` reply: `<aggregate> [<per-device>...]`.
pub fn apply_union_frequency(system: &mut DigitizerSystem, reply: &Reply) -> NevResult<()> {
    let union = union_of(system, reply, "#NSUFREQ")?;
    let (aggregate, values) = per_member_values::<f64>(union, &reply.body, "frequency")?;
    union.frequency = aggregate;
    for ((_, member), value) in union.members_mut().zip(values) {
        member.actual_frequency = value;
    }
    Ok(())
}

/// Apply a `GET NSU TRIG <u>` reply:
/// `[refPosition type source device level slope coupling holdoff delay]`.
pub fn apply_union_trigger(system: &mut DigitizerSystem, reply: &Reply) -> NevResult<()> {
    let union = union_of(system, reply, "#NSUTRIG")?;
    let body = reply.body.as_str();
    let open = body
        .find('[')
        .ok_or_else(|| NevError::parse("a [..] trigger record", body))?;
    let block = match bracket_blocks(&body[open..])?.as_slice() {
        [block] => *block,
        _ => return Err(NevError::parse("exactly one trigger record", body)),
    };
    let f = record_fields(block, None, TRIGGER_FIELDS, "trigger record")?;
    let trigger = TriggerConfig {
        ref_position: parse_field(f[0], "reference position")?,
        trigger_type: f[1].parse()?,
        source: f[2].to_string(),
        device: parse_field(f[3], "trigger device")?,
        level: parse_field(f[4], "trigger level")?,
        slope: f[5].parse()?,
        coupling: f[6].parse()?,
        holdoff: parse_field(f[7], "trigger holdoff")?,
        delay: parse_field(f[8], "trigger delay")?,
    };
    union.trigger = trigger;
    Ok(())
}

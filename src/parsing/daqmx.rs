//! `GET DAQMXINFO` and output read-back decoders.
//!
//! ```text
//! #DAQMXINFO
//! SAO[2,DACS0,PXI-6704,16,1,0.000000,0][3,DACS1,PXI-6704,16,1,0.000000,0]
//! DAO[0,DACD0,PXI-6733,8,1024,100000.000000,0]
//! #OK
//! ```

use super::{bracket_blocks, parse_field, parse_floats, record_fields, single_header_arg};
use crate::error::{NevError, NevResult};
use crate::hardware::{DeviceKind, DeviceRecord, OutputDevice, OutputSystem};
use crate::transport::Reply;

const DEVICE_FIELDS: usize = 7;

fn parse_record(block: &str) -> NevResult<DeviceRecord> {
    let f = record_fields(block, Some(','), DEVICE_FIELDS, "DAQMX device record")?;
    Ok(DeviceRecord {
        id: parse_field(f[0], "device id")?,
        name: f[1].to_string(),
        model: f[2].to_string(),
        channel_count: parse_field(f[3], "channel count")?,
        length_or_chassis: parse_field(f[4], "data length or chassis")?,
        frequency: parse_field(f[5], "frequency")?,
        state: parse_field(f[6], "device state")?,
    })
}

/// Build the output system from a `GET DAQMXINFO` reply.
pub fn parse_daqmx_info(reply: &Reply) -> NevResult<OutputSystem> {
    reply.expect_header("#DAQMXINFO")?;
    let mut system = OutputSystem::new();
    for line in reply.lines() {
        let (prefix, rest) = match (line.get(..3), line.get(3..)) {
            (Some(prefix), Some(rest)) => (prefix, rest),
            _ => return Err(NevError::parse("a device kind prefix", line)),
        };
        let kind: DeviceKind = prefix
            .parse()
            .map_err(|_| NevError::parse("a SAO, DAO, SDO or DDO line prefix", line))?;
        for block in bracket_blocks(rest)? {
            let record = parse_record(block)?;
            if system.get(record.id).is_some() {
                return Err(NevError::parse("unique device ids", block));
            }
            system.insert(OutputDevice::from_record(kind, record));
        }
    }
    Ok(system)
}

/// Decode a `GET SAO|DAO|SDO <id>` reply into per-channel values.
///
/// Static devices answer one value per channel on a single line; dynamic
/// devices answer one `[...]` waveform per channel.
pub fn parse_output_values(reply: &Reply, kind: DeviceKind, id: u32) -> NevResult<Vec<Vec<f64>>> {
    let tag = format!("#{kind}");
    let args = reply.expect_header(&tag)?;
    let echoed: u32 = single_header_arg(&args, &tag)?;
    if echoed != id {
        return Err(NevError::parse(format!("{tag} {id}"), format!("{tag} {echoed}")));
    }
    if kind.is_dynamic() {
        bracket_blocks(&reply.body)?
            .into_iter()
            .map(|block| parse_floats(block, "waveform sample"))
            .collect()
    } else {
        Ok(parse_floats(&reply.body, "output value")?
            .into_iter()
            .map(|v| vec![v])
            .collect())
    }
}

//! Topology introspection.
//!
//! Builds the in-memory hardware model from the server's own description.
//! Digitizer discovery issues `GET NISCOPEINFO`, `GET NSU NUM`, then for each
//! union `DEVS`, `CHAN`, `DLEN`, `FREQ` and `TRIG`, in that order: the
//! per-device arrays of the last four are decoded against the member order
//! established by `DEVS`.

use tracing::{debug, info, instrument};

use crate::error::NevResult;
use crate::hardware::{DeviceKind, DigitizerSystem, OutputSystem};
use crate::parsing::{
    apply_union_channels, apply_union_data_length, apply_union_devices, apply_union_frequency,
    apply_union_trigger, parse_daqmx_info, parse_output_values, parse_scope_info,
    parse_union_count,
};
use crate::protocol::scope::UnionQuery;
use crate::protocol::{DaqmxCommands, ScopeCommands};
use crate::transport::ProtocolClient;

/// Output devices from `GET DAQMXINFO`.
#[instrument(skip(client), err)]
pub async fn discover_outputs(client: &ProtocolClient) -> NevResult<OutputSystem> {
    let reply = DaqmxCommands::new(client.clone()).info().await?;
    let outputs = parse_daqmx_info(&reply)?;
    info!(
        devices = outputs.len(),
        channels = outputs.total_channel_count(),
        "output devices discovered"
    );
    Ok(outputs)
}

/// Digitizers and their unions.
#[instrument(skip(client), err)]
pub async fn discover_digitizers(client: &ProtocolClient) -> NevResult<DigitizerSystem> {
    let scope = ScopeCommands::new(client.clone());
    let mut system = DigitizerSystem::new();
    system.set_devices(parse_scope_info(&scope.info().await?)?);
    let count = parse_union_count(&scope.union_count().await?)?;
    system.reset_unions(count);

    for union_id in 0..count {
        let devices = scope.union_query(UnionQuery::Devs, union_id).await?;
        apply_union_devices(&mut system, &devices)?;
        let channels = scope.union_query(UnionQuery::Chan, union_id).await?;
        apply_union_channels(&mut system, &channels)?;
        let data_length = scope.union_query(UnionQuery::Dlen, union_id).await?;
        apply_union_data_length(&mut system, &data_length)?;
        let frequency = scope.union_query(UnionQuery::Freq, union_id).await?;
        apply_union_frequency(&mut system, &frequency)?;
        let trigger = scope.union_query(UnionQuery::Trig, union_id).await?;
        apply_union_trigger(&mut system, &trigger)?;
        debug!(union_id, "union discovered");
    }

    info!(
        devices = system.devices().count(),
        unions = count,
        channels = system.total_channel_count(),
        "digitizers discovered"
    );
    Ok(system)
}

/// Refresh every output channel's data from `GET SAO|DAO|SDO <id>`.
///
/// `DDO` devices have no read-back verb and are left as they are.
#[instrument(skip(client, outputs), err)]
pub async fn read_back_outputs(client: &ProtocolClient, outputs: &mut OutputSystem) -> NevResult<()> {
    let daqmx = DaqmxCommands::new(client.clone());
    let targets: Vec<(DeviceKind, u32)> = outputs
        .devices()
        .filter(|d| d.kind != DeviceKind::Ddo)
        .map(|d| (d.kind, d.id))
        .collect();
    for (kind, id) in targets {
        let reply = daqmx.values(kind, id).await?;
        let values = parse_output_values(&reply, kind, id)?;
        if let Some(device) = outputs.get_mut(id) {
            if kind.is_dynamic() {
                if let Some(longest) = values.iter().map(Vec::len).max() {
                    device.set_data_length(longest as u32);
                }
            }
            for (channel, data) in device.channels.iter_mut().zip(values) {
                channel.data = data;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{TriggerType, VerticalRange};
    use crate::transport::ScriptedTransport;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn digitizer_queries_follow_protocol_order() {
        let transport = ScriptedTransport::new();
        let script = transport.script();
        script
            .reply(
                "GET NISCOPEINFO",
                "#NISCOPEINFO\n[2,DEV0,NI5122,2,1,123456][3,DEV1,NI5122,2,1,234567]\n#OK",
            )
            .reply("GET NSU NUM", "#NSUNUM\n1\n#OK")
            .reply("GET NSU DEVS 0", "#NSUDEVS 0\n2 [1 0]\n#OK")
            .reply(
                "GET NSU CHAN 0",
                "#NSUCHAN 0\n4 [1.000000 DC][1.000000 DC][5.000000 AC][5.000000 AC]\n#OK",
            )
            .reply("GET NSU DLEN 0", "#NSUDLEN 0\n1024 [1024 1024]\n#OK")
            .reply("GET NSU FREQ 0", "#NSUFREQ 0\n1000000.000000 [1000000.000000 1000000.000000]\n#OK")
            .reply(
                "GET NSU TRIG 0",
                "#NSUTRIG 0\n[0.500000 IMMEDIATE 0 0 0.000000 POSITIVE DC 0.000000 0.000000]\n#OK",
            );

        let system = discover_digitizers(&ProtocolClient::new(transport)).await.unwrap();
        assert_eq!(
            script.calls(),
            vec![
                "GET NISCOPEINFO",
                "GET NSU NUM",
                "GET NSU DEVS 0",
                "GET NSU CHAN 0",
                "GET NSU DLEN 0",
                "GET NSU FREQ 0",
                "GET NSU TRIG 0",
            ]
        );
        assert_eq!(system.device(1).unwrap().channels[0].range, VerticalRange::OneVolt);
        assert_eq!(system.device(0).unwrap().channels[0].range, VerticalRange::FiveVolts);
        assert_eq!(system.union(0).unwrap().trigger.trigger_type, TriggerType::Immediate);
    }

    #[tokio::test]
    async fn simulator_topology_round_trips() {
        let client = ProtocolClient::simulated(Some(5));
        let mut outputs = discover_outputs(&client).await.unwrap();
        assert_eq!(outputs.len(), 6);

        DaqmxCommands::new(client.clone())
            .set_static(DeviceKind::Sao, 2, &[1.5, 2.5])
            .await
            .unwrap();
        read_back_outputs(&client, &mut outputs).await.unwrap();
        let sao = outputs.get(2).unwrap();
        assert_eq!(sao.channels[0].data, vec![1.5]);
        assert_eq!(sao.channels[1].data, vec![2.5]);
        assert_eq!(outputs.get(0).unwrap().channels[0].data.len(), 1024);

        let digitizers = discover_digitizers(&client).await.unwrap();
        assert_eq!(digitizers.total_channel_count(), 4);
        assert_eq!(digitizers.union(0).unwrap().len(), 2);
    }

    #[traced_test]
    #[tokio::test]
    async fn discovery_logs_device_counts() {
        let client = ProtocolClient::simulated(Some(1));
        discover_outputs(&client).await.unwrap();
        discover_digitizers(&client).await.unwrap();
        assert!(logs_contain("output devices discovered"));
        assert!(logs_contain("digitizers discovered"));
        assert!(logs_contain("union discovered"));
    }
}

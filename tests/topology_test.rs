//! Decoders and encoders working on the hardware model.

mod common;

use common::{digitizer, output, scripted_client};
use nev_client::hardware::{DeviceKind, DigitizerSystem, OutputSystem};
use nev_client::parsing::{apply_union_devices, parse_daqmx_info};
use nev_client::protocol::DaqmxCommands;
use nev_client::transport::parse_reply;
use nev_client::NevError;

fn union_of_two() -> DigitizerSystem {
    let mut system = DigitizerSystem::new();
    system.set_devices(vec![digitizer(0, 2), digitizer(1, 2)]);
    system.reset_unions(1);
    let reply = parse_reply("#NSUDEVS 0\n2 [0 1]\n#OK").unwrap();
    apply_union_devices(&mut system, &reply).unwrap();
    system
}

#[test]
fn short_device_list_leaves_union_unchanged() {
    let mut system = union_of_two();
    let before = system.clone();

    let reply = parse_reply("#NSUDEVS 0\n3 [1 0]\n#OK").unwrap();
    let err = apply_union_devices(&mut system, &reply).unwrap_err();

    assert!(matches!(err, NevError::Parse { .. }));
    assert_eq!(system, before);
    assert_eq!(
        system.union(0).unwrap().device_ids().collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[test]
fn device_list_order_is_kept() {
    let mut system = union_of_two();
    let reply = parse_reply("#NSUDEVS 0\n2 [1 0]\n#OK").unwrap();
    apply_union_devices(&mut system, &reply).unwrap();
    assert_eq!(
        system.union(0).unwrap().device_ids().collect::<Vec<_>>(),
        vec![1, 0]
    );
}

#[test]
fn info_listing_keeps_server_order() {
    let reply = parse_reply(
        "#DAQMXINFO\n\
         SAO[2,DACS0,PXI-6704,16,3,0.000000,0]\n\
         DAO[0,DAQ0,PXI-6733,8,1024,100000.000000,0]\n\
         SDO[4,DIO0,PXI-6509,8,3,0.000000,0]\n\
         #OK",
    )
    .unwrap();
    let outputs = parse_daqmx_info(&reply).unwrap();
    let ids: Vec<u32> = outputs.devices().map(|d| d.id).collect();
    assert_eq!(ids, vec![2, 0, 4]);
    assert_eq!(outputs.get(0).unwrap().data_length, 1024);
    assert_eq!(outputs.get(2).unwrap().chassis, Some(3));
}

#[tokio::test]
async fn push_all_fans_out_by_kind_with_stimulus_overlay() {
    let (client, script) = scripted_client();

    let mut outputs = OutputSystem::new();
    let mut sao = output(DeviceKind::Sao, 2, 2, 1);
    sao.channels[0].data = vec![1.5];
    sao.channels[1].data = vec![2.5];
    outputs.insert(sao);

    let mut dao = output(DeviceKind::Dao, 0, 2, 3);
    dao.channels[0].data = vec![1.0, 1.0, 1.0];
    dao.channels[0].stimulus = vec![0.0, 0.0, 0.0, 2.0];
    dao.channels[1].stimulus.clear();
    outputs.insert(dao);

    DaqmxCommands::new(client).push_all(&outputs).await.unwrap();

    assert_eq!(
        script.calls(),
        vec![
            "SET SAO 2 1.5 2.5",
            "SET DAO DLEN 0 3",
            "SET DAO FREQ 0 100000",
            "SET DAO 0 0",
            "[1 1 1 3] [0 0 0] #OK",
        ]
    );
}

#[tokio::test]
async fn rejected_handshake_skips_the_payload() {
    let (client, script) = scripted_client();
    script.reply("SET DAO 0 0", "#NG task busy\n");

    let err = DaqmxCommands::new(client)
        .set_waveform(0, 0, &[vec![0.0, 1.0]])
        .await
        .unwrap_err();
    assert!(matches!(err, NevError::Protocol(_)));
    assert_eq!(script.calls(), vec!["SET DAO 0 0"]);
}

#[tokio::test]
async fn ddo_and_multi_value_static_channels_are_rejected() {
    let (client, script) = scripted_client();
    let daqmx = DaqmxCommands::new(client);

    let ddo = output(DeviceKind::Ddo, 6, 2, 16);
    assert!(matches!(
        daqmx.push_device(&ddo).await,
        Err(NevError::Configuration(_))
    ));

    let mut sdo = output(DeviceKind::Sdo, 4, 1, 3);
    sdo.channels[0].data = vec![1.0, 0.0];
    assert!(matches!(
        daqmx.push_device(&sdo).await,
        Err(NevError::Configuration(_))
    ));
    assert!(script.calls().is_empty());
}

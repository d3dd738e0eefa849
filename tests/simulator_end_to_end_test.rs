//! Full runs against the in-process simulator.

mod common;

use common::fast_runner;
use nev_client::discovery::{discover_digitizers, discover_outputs};
use nev_client::hardware::{ChannelKey, DeviceKind, VerticalCoupling, VerticalRange};
use nev_client::parsing::{parse_sweep_data, parse_sweep_status};
use nev_client::sweep::{
    std_mean_curves, RunRequest, RunState, SweepConfig, SweepDirection, SweepStatus, SweepTarget,
    TimingConfig, XAxis,
};
use nev_client::{NevError, ProtocolClient};

async fn request(client: &ProtocolClient, steps: u32) -> RunRequest {
    RunRequest {
        union_id: 0,
        sweep: SweepConfig {
            target: SweepTarget {
                kind: DeviceKind::Sao,
                device_id: 2,
                channel: 0,
            },
            start: 0.0,
            stop: 5.0,
            steps,
            direction: SweepDirection::Ascending,
        },
        timing: TimingConfig {
            initial_delay_ms: 0,
            ..TimingConfig::default()
        },
        outputs: discover_outputs(client).await.unwrap(),
        digitizers: discover_digitizers(client).await.unwrap(),
    }
}

#[tokio::test]
async fn completed_run_reports_every_step() {
    let client = ProtocolClient::simulated(Some(11));
    let request = request(&client, 5).await;
    let active = request.digitizers.active_channels();
    assert_eq!(active.len(), 4);

    let runner = fast_runner(&client);
    runner.start_run(request).await.unwrap();
    let outcome = runner.wait().await.unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.snapshot.x, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    for key in &active {
        assert_eq!(outcome.snapshot.readings(*key).unwrap().len(), 5);
    }

    let status = parse_sweep_status(&client.send("GET PSA STAT").await.unwrap()).unwrap();
    assert_eq!(status.stage, 5);
    assert_eq!(status.status, SweepStatus::Complete);

    let chunk = parse_sweep_data(&client.send("GET PSA DATA 0-5").await.unwrap(), &active).unwrap();
    assert_eq!(chunk.x.len(), 5);
    for key in &active {
        assert_eq!(chunk.y[key].len(), 5);
    }
}

#[tokio::test]
async fn reduced_curves_follow_the_sweep_value() {
    let client = ProtocolClient::simulated(Some(3));
    let mut request = request(&client, 4).await;
    request
        .digitizers
        .set_channel_active(ChannelKey::new(1, 0), false);
    request
        .digitizers
        .set_channel_active(ChannelKey::new(1, 1), false);

    let runner = fast_runner(&client);
    runner.start_run(request).await.unwrap();
    let outcome = runner.wait().await.unwrap();
    assert_eq!(outcome.state, RunState::Completed);

    let curves = std_mean_curves(&outcome.snapshot, XAxis::SweepValues).unwrap();
    assert_eq!(curves.len(), 2);
    for curve in &curves {
        assert_eq!(curve.x.len(), 4);
        assert!(curve.y.iter().all(|p| p.std > 0.0));
    }
}

#[tokio::test]
async fn descending_sweep_sends_reversed_range() {
    let client = ProtocolClient::simulated(Some(9));
    let mut request = request(&client, 2).await;
    request.sweep.direction = SweepDirection::Descending;

    let runner = fast_runner(&client);
    runner.start_run(request).await.unwrap();
    let outcome = runner.wait().await.unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.snapshot.x, vec![2.5, 0.0]);
}

#[tokio::test]
async fn server_stop_aborts_the_sweep() {
    let client = ProtocolClient::simulated(Some(1));
    let runner = fast_runner(&client);
    runner.start_run(request(&client, 1000).await).await.unwrap();

    client.send("STOP PSA").await.unwrap();
    let outcome = runner.wait().await.unwrap();
    assert_eq!(outcome.state, RunState::Aborted);
}

#[tokio::test]
async fn channel_settings_land_on_their_own_channel() {
    let client = ProtocolClient::simulated(Some(5));
    let mut request = request(&client, 2).await;
    request
        .digitizers
        .set_channel_active(ChannelKey::new(0, 1), false);
    let ch0 = request
        .digitizers
        .device_mut(0)
        .and_then(|d| d.channel_mut(0))
        .unwrap();
    ch0.range = VerticalRange::OneVolt;
    ch0.coupling = VerticalCoupling::Ac;

    let runner = fast_runner(&client);
    runner.start_run(request).await.unwrap();
    assert_eq!(runner.wait().await.unwrap().state, RunState::Completed);

    let chan = client.send_raw("GET NSU CHAN 0").await.unwrap();
    assert!(
        chan.contains("[1.000000 AC][5.000000 DC][5.000000 DC][5.000000 DC]"),
        "{chan}"
    );
}

#[tokio::test]
async fn gap_in_active_channels_leaves_the_server_untouched() {
    let client = ProtocolClient::simulated(Some(5));
    let before = client.send_raw("GET NSU CHAN 0").await.unwrap();

    let mut request = request(&client, 2).await;
    request
        .digitizers
        .set_channel_active(ChannelKey::new(0, 0), false);
    let ch1 = request
        .digitizers
        .device_mut(0)
        .and_then(|d| d.channel_mut(1))
        .unwrap();
    ch1.range = VerticalRange::OneVolt;
    ch1.coupling = VerticalCoupling::Ac;

    let runner = fast_runner(&client);
    let err = runner.start_run(request).await.unwrap_err();
    assert!(matches!(err, NevError::Configuration(_)), "{err}");
    assert_eq!(client.send_raw("GET NSU CHAN 0").await.unwrap(), before);
}

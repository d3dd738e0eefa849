//! Protocol client over a real local socket.

use std::time::Duration;

use nev_client::config::ServerConfig;
use nev_client::parsing::parse_union_count;
use nev_client::{NevError, ProtocolClient};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Server answering each line with `respond(line)`; `None` closes the connection.
async fn serve(respond: fn(&str) -> Option<String>) -> ServerConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match respond(&line) {
                Some(reply) => write.write_all(reply.as_bytes()).await.unwrap(),
                None => return,
            }
        }
    });
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        read_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    }
}

fn nsu_server(line: &str) -> Option<String> {
    Some(match line {
        "GET NSU NUM" => "#NSUNUM\n2\n#OK\n".to_string(),
        "SLOW" => String::new(),
        "BYE" => return None,
        other => format!("#NG unknown command {other}\n"),
    })
}

#[tokio::test]
async fn replies_are_framed_and_decoded() {
    let config = serve(nsu_server).await;
    let client = ProtocolClient::connect(&config).await.unwrap();
    assert!(client.label().starts_with("tcp://127.0.0.1:"));

    let reply = client.send("GET NSU NUM").await.unwrap();
    assert_eq!(parse_union_count(&reply).unwrap(), 2);

    let err = client.send("GET NOPE").await.unwrap_err();
    assert!(matches!(err, NevError::Protocol(ref m) if m == "unknown command GET NOPE"));

    // The connection is still usable after a rejected command.
    assert!(client.send("GET NSU NUM").await.is_ok());
}

#[tokio::test]
async fn missing_marker_times_out() {
    let config = serve(nsu_server).await;
    let client = ProtocolClient::connect(&config).await.unwrap();
    let err = client.send("SLOW").await.unwrap_err();
    assert!(matches!(err, NevError::Timeout(_)));
}

#[tokio::test]
async fn closed_socket_is_connection_lost() {
    let config = serve(nsu_server).await;
    let client = ProtocolClient::connect(&config).await.unwrap();
    let err = client.send("BYE").await.unwrap_err();
    assert!(matches!(err, NevError::ConnectionLost | NevError::Io(_)));
}

#[tokio::test]
async fn multi_line_commands_are_refused() {
    let client = ProtocolClient::simulated(Some(1));
    let err = client.send_raw("GET NSU NUM\nRUN PSA").await.unwrap_err();
    assert!(matches!(err, NevError::Configuration(_)));
}

#[tokio::test]
async fn concurrent_callers_never_interleave() {
    let client = ProtocolClient::simulated(Some(1));
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.send("GET NSU NUM").await })
        })
        .collect();
    for task in tasks {
        let reply = task.await.unwrap().unwrap();
        assert_eq!(parse_union_count(&reply).unwrap(), 1);
    }
}

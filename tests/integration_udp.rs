use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use net_benchmark::{
    logging::CommLog,
    payload,
    protocol::STOP_PAYLOAD,
    server::{ServerConfig, UdpDispatcher},
    session::{ClientSession, SessionConfig, UdpSession},
};
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct TestServer {
    addr: std::net::SocketAddr,
    registry: Arc<net_benchmark::PeerRegistry>,
    handle: JoinHandle<Result<()>>,
    _dir: TempDir,
}

/// Bind a dispatcher on an ephemeral port with the given loss probability
/// and run it in the background.
async fn start_server(loss_probability: f64) -> Result<TestServer> {
    let dir = tempfile::tempdir()?;
    let config = ServerConfig::new("127.0.0.1", 0, dir.path().join("udp_log.txt"))
        .with_loss_probability(loss_probability);
    let server = UdpDispatcher::bind(config).await?;
    let addr = server.local_addr()?;
    let registry = server.registry();
    let handle = tokio::spawn(server.run());
    Ok(TestServer {
        addr,
        registry,
        handle,
        _dir: dir,
    })
}

fn session_config(server: &TestServer, reply_timeout: Duration) -> SessionConfig {
    let mut config = SessionConfig::new("127.0.0.1", server.addr.port());
    config.reply_timeout = reply_timeout;
    config
}

async fn client_log(dir: &TempDir) -> Result<CommLog> {
    Ok(CommLog::append(dir.path().join("client_log.txt")).await?)
}

async fn stop_server(server: TestServer) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = client_log(&dir).await?;
    let config = session_config(&server, Duration::from_secs(1));
    let mut session = UdpSession::bind(99, config, log).await?;
    session.send(STOP_PAYLOAD).await?;
    session.close().await;

    timeout(Duration::from_secs(5), server.handle).await???;
    Ok(())
}

#[tokio::test]
async fn udp_lossless_run_acknowledges_everything() -> Result<()> {
    let server = start_server(0.0).await?;
    let dir = tempfile::tempdir()?;

    // Generous reply bound so scheduler hiccups cannot masquerade as loss.
    let config = session_config(&server, Duration::from_secs(2));
    let mut session = UdpSession::bind(1, config, client_log(&dir).await?).await?;
    let generate = payload::distressed_payload(session.id(), "UDP", 50);
    let result = session.run(50, &generate).await?;

    assert_eq!(result.messages_acked, 50);
    assert_eq!(result.messages_lost, 0);
    assert_eq!(result.packet_loss_pct, Some(0.0));
    assert!(result.throughput_bps > 0.0);

    stop_server(server).await
}

#[tokio::test]
async fn udp_total_loss_counts_every_send() -> Result<()> {
    let server = start_server(1.0).await?;
    let dir = tempfile::tempdir()?;

    let config = session_config(&server, Duration::from_millis(50));
    let mut session = UdpSession::bind(1, config, client_log(&dir).await?).await?;
    let generate = payload::distressed_payload(session.id(), "UDP", 10);
    let result = session.run(10, &generate).await?;

    // Loss probability 1.0 withholds every acknowledgment.
    assert_eq!(result.messages_acked, 0);
    assert_eq!(result.messages_lost, 10);
    assert_eq!(result.packet_loss_pct, Some(100.0));
    assert_eq!(result.avg_latency_secs, 0.0);
    assert!(result.throughput_bps > 0.0);

    stop_server(server).await
}

#[tokio::test]
async fn udp_identities_are_distinct_and_stable_per_address() -> Result<()> {
    let server = start_server(0.0).await?;

    let first = UdpSocket::bind("127.0.0.1:0").await?;
    let second = UdpSocket::bind("127.0.0.1:0").await?;
    let mut reply = [0u8; 1024];

    first.send_to(b"C[1]:Server:hello", server.addr).await?;
    timeout(Duration::from_secs(2), first.recv_from(&mut reply)).await??;
    second.send_to(b"C[2]:Server:hello", server.addr).await?;
    timeout(Duration::from_secs(2), second.recv_from(&mut reply)).await??;

    assert_eq!(server.registry.peers_assigned().await, 2);
    let snapshot = server.registry.snapshot().await;
    let ids: HashSet<_> = snapshot.iter().map(|&(_, id)| id).collect();
    assert_eq!(ids.len(), 2);

    // A reused source address keeps its original identity.
    let first_id = server.registry.lookup(&first.local_addr()?).await.unwrap();
    first.send_to(b"C[1]:Server:again", server.addr).await?;
    timeout(Duration::from_secs(2), first.recv_from(&mut reply)).await??;
    assert_eq!(
        server.registry.lookup(&first.local_addr()?).await,
        Some(first_id)
    );
    assert_eq!(server.registry.peers_assigned().await, 2);

    stop_server(server).await
}

#[tokio::test]
async fn udp_malformed_datagram_registers_nothing() -> Result<()> {
    let server = start_server(0.0).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.send_to(b"nocolon", server.addr).await?;

    // No response arrives for the malformed datagram.
    let mut reply = [0u8; 1024];
    assert!(
        timeout(Duration::from_millis(200), socket.recv_from(&mut reply))
            .await
            .is_err()
    );
    assert_eq!(server.registry.peers_assigned().await, 0);

    // The dispatcher keeps serving well-formed datagrams afterwards.
    socket.send_to(b"C[1]:Server:still here", server.addr).await?;
    let (n, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut reply)).await??;
    assert_eq!(&reply[..n], b"Received 'still here'");
    assert_eq!(server.registry.peers_assigned().await, 1);

    stop_server(server).await
}

#[tokio::test]
async fn udp_empty_datagram_is_ignored() -> Result<()> {
    let server = start_server(0.0).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.send_to(b"", server.addr).await?;
    socket.send_to(b"   ", server.addr).await?;

    let mut reply = [0u8; 1024];
    assert!(
        timeout(Duration::from_millis(200), socket.recv_from(&mut reply))
            .await
            .is_err()
    );
    assert_eq!(server.registry.peers_assigned().await, 0);

    stop_server(server).await
}

#[tokio::test]
async fn udp_stop_halts_the_receive_loop() -> Result<()> {
    let server = start_server(0.0).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.send_to(b"C[9]:Server:STOP", server.addr).await?;

    // The STOP sender is acknowledged before the dispatcher closes.
    let mut reply = [0u8; 1024];
    let (n, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut reply)).await??;
    assert_eq!(&reply[..n], b"Server shutting down...");

    let handle = server.handle;
    timeout(Duration::from_secs(5), handle).await???;

    // Datagrams after shutdown go unanswered.
    socket.send_to(b"C[9]:Server:anyone?", server.addr).await?;
    assert!(
        timeout(Duration::from_millis(200), socket.recv_from(&mut reply))
            .await
            .is_err()
    );
    Ok(())
}

//! Supervisor lifecycle tests: binding, start/shutdown state machine and
//! port release.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use sidecar_helper::lifecycle::{bootstrap, run_until_shutdown, SidecarServer, SupervisorError, SupervisorState};
use sidecar_helper::net::BindError;

use common::{config, refuses_connections, start};

#[tokio::test]
async fn both_ports_accept_as_soon_as_bound() {
    let server = bootstrap(&config(19010, 19011)).expect("bootstrap");
    assert_eq!(server.state(), SupervisorState::Idle);

    // The kernel completes handshakes into the backlog before start().
    tokio::net::TcpStream::connect(server.rpc_addr()).await.expect("rpc port");
    tokio::net::TcpStream::connect(server.http_addr()).await.expect("http port");
}

#[tokio::test]
async fn identical_ports_are_rejected_without_holding_anything() {
    let err = SidecarServer::bind(&config(19012, 19012)).unwrap_err();
    assert!(matches!(err, BindError::SamePort(19012)));

    std::net::TcpListener::bind("127.0.0.1:19012").expect("port must be free");
}

#[tokio::test]
async fn port_in_use_fails_and_releases_the_other_port() {
    let _occupied = std::net::TcpListener::bind("127.0.0.1:19014").unwrap();

    let err = SidecarServer::bind(&config(19013, 19014)).unwrap_err();
    assert!(matches!(err, BindError::Io { .. }), "unexpected error: {err:?}");

    std::net::TcpListener::bind("127.0.0.1:19013").expect("rpc port must be released");
}

#[tokio::test]
async fn port_zero_is_rejected() {
    let err = SidecarServer::bind(&config(0, 19015)).unwrap_err();
    assert!(matches!(err, BindError::InvalidPort { port: 0, .. }));
}

#[tokio::test]
async fn shutdown_before_start_is_not_running() {
    let server = bootstrap(&config(19016, 19017)).unwrap();
    let err = server.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning));
    assert_eq!(server.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let running = start(19018, 19019).await;

    let err = running.server.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyStarted));
    // The first run is unaffected.
    assert_eq!(running.server.state(), SupervisorState::Serving);
    running.client().ping().await.expect("still serving");

    running.server.shutdown(Duration::from_secs(2)).await.unwrap();
    running.task.await.unwrap().unwrap();
}

/// Both scenarios share the fixed ports 19002/19003, so they run in order
/// inside one test; the second run also shows the ports were released.
#[tokio::test]
async fn shutdown_releases_both_ports() {
    shutdown_right_after_start().await;
    shutdown_after_serving_requests().await;
}

async fn shutdown_right_after_start() {
    let server = Arc::new(bootstrap(&config(19002, 19003)).expect("bootstrap"));

    let started = Instant::now();
    let run = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };
    let stop = {
        let server = server.clone();
        tokio::spawn(async move {
            // Shutdown before the supervisor left Idle would be NotRunning.
            while server.state() == SupervisorState::Idle {
                tokio::task::yield_now().await;
            }
            server.shutdown(Duration::from_secs(2)).await
        })
    };

    let exit = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("start() must return within the deadline");
    exit.unwrap().expect("start() must return Ok");
    stop.await.unwrap().expect("clean shutdown");
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(server.state(), SupervisorState::Stopped);
    assert!(refuses_connections("127.0.0.1:19002".parse().unwrap()).await);
    assert!(refuses_connections("127.0.0.1:19003".parse().unwrap()).await);
}

async fn shutdown_after_serving_requests() {
    let server = bootstrap(&config(19002, 19003)).expect("ports are free again");
    let running = common::start_server(server).await;

    let client = running.client();
    client.ping().await.expect("rpc ping");
    client.health().await.expect("healthz");

    running.server.shutdown(Duration::from_secs(2)).await.expect("clean shutdown");
    assert_eq!(running.server.state(), SupervisorState::Stopped);

    let exit = tokio::time::timeout(Duration::from_secs(2), running.task)
        .await
        .expect("start() must return after shutdown");
    exit.unwrap().expect("start() must return Ok");

    assert!(refuses_connections("127.0.0.1:19002".parse().unwrap()).await);
    assert!(refuses_connections("127.0.0.1:19003".parse().unwrap()).await);
}

#[tokio::test]
async fn repeated_shutdown_is_a_no_op() {
    let running = start(19020, 19021).await;

    running.server.shutdown(Duration::from_secs(2)).await.unwrap();
    running.server.shutdown(Duration::from_secs(2)).await.unwrap();
    assert_eq!(running.server.state(), SupervisorState::Stopped);

    // A stopped supervisor cannot be restarted.
    let err = running.server.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyStarted));
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn signal_drives_a_clean_exit() {
    let server = bootstrap(&config(19022, 19023)).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let trigger = async {
        common::wait_until_serving(&server).await;
        server_ping(&server).await;
        let _ = tx.send(());
    };
    let run = run_until_shutdown(server.supervisor(), async {
        let _ = rx.await;
    });

    let (result, ()) = tokio::join!(run, trigger);
    result.expect("signal-driven shutdown succeeds");
    assert_eq!(server.state(), SupervisorState::Stopped);
    assert!(refuses_connections(server.rpc_addr()).await);
}

async fn server_ping(server: &SidecarServer) {
    let client = sidecar_client::SidecarClient::new(
        &server.rpc_addr().to_string(),
        &format!("http://{}", server.http_addr()),
    );
    client.ping().await.expect("ping while serving");
}

//! Shutdown coordination for the sidecar.

use std::future::Future;
use std::time::Duration;

use crate::lifecycle::supervisor::{Supervisor, SupervisorError};

/// Deadline used when a signal requests shutdown.
pub const SIGNAL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline used to stop the remaining front-ends after one failed.
pub const DEFAULT_FAILURE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `supervisor` until it exits on its own or `signal` completes.
///
/// On the signal the supervisor is shut down with
/// [`SIGNAL_SHUTDOWN_DEADLINE`]. A drain timeout is logged and not
/// returned; the result is whatever `start` returns.
pub async fn run_until_shutdown<S>(supervisor: &Supervisor, signal: S) -> Result<(), SupervisorError>
where
    S: Future,
{
    let start = supervisor.start();
    tokio::pin!(start);

    tokio::select! {
        // `start` is polled first so the supervisor is serving before the
        // signal can be acted on.
        biased;

        result = &mut start => return result,
        _ = signal => {}
    }

    match supervisor.shutdown(SIGNAL_SHUTDOWN_DEADLINE).await {
        Ok(()) => {}
        Err(SupervisorError::ShutdownTimeout { protocols, deadline }) => {
            tracing::warn!(protocols = ?protocols, deadline = ?deadline, "Connections were force-closed during shutdown");
        }
        Err(e) => tracing::warn!(error = %e, "Shutdown did not run"),
    }

    start.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ListenerHandle;
    use crate::rpc::RpcFrontEnd;
    use std::sync::Arc;

    #[tokio::test]
    async fn signal_stops_the_supervisor() {
        let listener = ListenerHandle::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr();
        let supervisor = Supervisor::builder()
            .mount(Arc::new(RpcFrontEnd::default()), listener)
            .build();

        let signal = tokio::time::sleep(Duration::from_millis(50));
        tokio::time::timeout(Duration::from_secs(2), run_until_shutdown(&supervisor, signal))
            .await
            .expect("run must end after the signal")
            .unwrap();

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn immediate_signal_still_stops_cleanly() {
        let listener = ListenerHandle::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let supervisor = Supervisor::builder()
            .mount(Arc::new(RpcFrontEnd::default()), listener)
            .build();

        tokio::time::timeout(Duration::from_secs(2), run_until_shutdown(&supervisor, async {}))
            .await
            .expect("run must end after the signal")
            .unwrap();
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::service::AirTouchService;
use crate::types::ConnectionState;
use crate::{Error, Result};

/// Background task that keeps a service refreshed.
///
/// Waits for the connection and requests a full update, then every interval
/// requests a status update (or repeats the full update while one is still
/// outstanding). An I/O failure restarts the service and starts over.
pub struct Poller {
    handle: JoinHandle<()>,
}

impl Poller {
    /// Starts the service if needed and spawns the refresh task.
    pub fn spawn(service: Arc<AirTouchService>, interval: Duration, connect_timeout: Duration) -> Self {
        let handle = tokio::spawn(run(service, interval, connect_timeout));
        Self { handle }
    }

    /// Stops refreshing. The service itself keeps running.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(service: Arc<AirTouchService>, interval: Duration, connect_timeout: Duration) {
    if !service.is_running() {
        service.start();
    }
    let mut healthy = connect_and_refresh(&service, connect_timeout).await;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let result = if healthy {
            poll_once(&service).await
        } else {
            Err(Error::NotConnected)
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_io() => {
                warn!(host = service.host(), error = %e, "AirTouch unreachable, restarting");
                service.restart().await;
                healthy = connect_and_refresh(&service, connect_timeout).await;
            }
            Err(e) => warn!(error = %e, "AirTouch refresh failed"),
        }
    }
}

async fn connect_and_refresh(service: &AirTouchService, connect_timeout: Duration) -> bool {
    let result = async {
        service.wait_connected(connect_timeout).await?;
        service.request_full_update().await
    }
    .await;
    if let Err(e) = &result {
        warn!(host = service.host(), error = %e, "initial full update failed");
    }
    result.is_ok()
}

async fn poll_once(service: &AirTouchService) -> Result<()> {
    match service.connection_state() {
        ConnectionState::Ready => service.request_status_update().await,
        ConnectionState::AwaitingFullUpdate => {
            debug!("full update still outstanding, requesting again");
            service.request_full_update().await
        }
        ConnectionState::Connecting if service.is_connected() => service.request_full_update().await,
        ConnectionState::Connecting | ConnectionState::Disconnected => Err(Error::NotConnected),
    }
}

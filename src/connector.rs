use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::protocol::{Request, Response, read_frame};
use crate::{Error, Result, lock};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) type ResponseCallback = Arc<dyn Fn(Response) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

struct Link {
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    state: watch::Sender<LinkState>,
}

/// Owns the TCP connection to the controller.
///
/// `start` spawns a task that connects (retrying until it succeeds) and then
/// decodes inbound frames, handing each response to the callback in arrival
/// order. The task ends when the controller closes the socket or a read fails.
pub(crate) struct Connector {
    addr: String,
    reconnect_delay: Duration,
    callback: ResponseCallback,
    link: Arc<Link>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connector {
    pub fn new(addr: String, reconnect_delay: Duration, callback: ResponseCallback) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        Self {
            addr,
            reconnect_delay,
            callback,
            link: Arc::new(Link {
                writer: AsyncMutex::new(None),
                state,
            }),
            task: Mutex::new(None),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!(addr = %self.addr, "connector already running");
            return;
        }
        self.link.state.send_replace(LinkState::Connecting);
        *task = Some(tokio::spawn(run(
            self.addr.clone(),
            self.reconnect_delay,
            self.callback.clone(),
            self.link.clone(),
        )));
    }

    /// Stops the receive task and closes the socket. No callback runs after
    /// this returns.
    pub async fn shutdown(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut writer) = self.link.writer.lock().await.take()
            && let Err(e) = writer.shutdown().await
        {
            trace!(error = %e, "socket shutdown failed");
        }
        self.link.state.send_replace(LinkState::Closed);
        debug!(addr = %self.addr, "connector shut down");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn is_connected(&self) -> bool {
        *self.link.state.borrow() == LinkState::Connected
    }

    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotConnected);
        }
        let mut rx = self.link.state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| matches!(s, LinkState::Connected | LinkState::Closed)),
        )
        .await;
        match waited {
            Ok(Ok(state)) if *state == LinkState::Connected => Ok(()),
            Ok(_) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    pub async fn send_request(&self, request: &Request) -> Result<()> {
        let mut writer = self.link.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(Error::NotConnected);
        };
        trace!(
            message_id = request.message_id(),
            message_type = %request.message_type(),
            "sending request"
        );
        if let Err(e) = stream.write_all(&request.to_bytes()).await {
            writer.take();
            self.link.state.send_replace(LinkState::Closed);
            debug!(addr = %self.addr, error = %e, "write to AirTouch failed, link closed");
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

async fn connect(addr: &str, reconnect_delay: Duration) -> TcpStream {
    loop {
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return stream,
            Ok(Err(e)) => warn!(addr, error = %e, "connect to AirTouch failed, retrying"),
            Err(_) => warn!(addr, "connect to AirTouch timed out, retrying"),
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

async fn run(addr: String, reconnect_delay: Duration, callback: ResponseCallback, link: Arc<Link>) {
    let stream = connect(&addr, reconnect_delay).await;
    if let Err(e) = stream.set_nodelay(true) {
        trace!(error = %e, "set TCP_NODELAY failed");
    }
    let (reader, writer) = stream.into_split();
    *link.writer.lock().await = Some(writer);
    link.state.send_replace(LinkState::Connected);
    debug!(addr, "connected to AirTouch");

    receive(BufReader::new(reader), &callback).await;

    link.writer.lock().await.take();
    link.state.send_replace(LinkState::Closed);
}

async fn receive(mut reader: BufReader<OwnedReadHalf>, callback: &ResponseCallback) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(Error::Protocol(msg)) => {
                warn!(%msg, "dropping malformed frame");
                continue;
            }
            Err(e) => {
                debug!(error = %e, "AirTouch connection closed");
                return;
            }
        };
        match Response::from_frame(&frame) {
            Ok(response) => {
                trace!(
                    message_id = response.message_id,
                    message_type = %response.message_type,
                    "received response"
                );
                callback(response);
            }
            Err(e) => warn!(message_id = frame.message_id, error = %e, "dropping undecodable response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, MessageType, Payload};
    use tokio::net::TcpListener;

    fn collecting_connector(port: u16) -> (Connector, Arc<Mutex<Vec<Response>>>) {
        let received = Arc::new(Mutex::new(vec![]));
        let sink = received.clone();
        let callback: ResponseCallback = Arc::new(move |r| sink.lock().unwrap().push(r));
        let connector = Connector::new(format!("127.0.0.1:{port}"), Duration::from_millis(20), callback);
        (connector, received)
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (connector, received) = collecting_connector(listener.local_addr().unwrap().port());
        connector.start();
        let (mut socket, _) = listener.accept().await.unwrap();
        connector.wait_connected(Duration::from_secs(5)).await.unwrap();

        let mut corrupt = Frame::new(0xb080, 1, 0x2d, vec![0; 8]).to_bytes();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;
        socket.write_all(&[0x00, 0x13]).await.unwrap();
        socket.write_all(&corrupt).await.unwrap();
        socket
            .write_all(&Frame::new(0xb080, 2, 0x2b, vec![]).to_bytes())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while received.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let received = received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message_id, 2);
        assert_eq!(received[0].message_type, MessageType::ZoneStatus);
        assert_eq!(received[0].payload, Payload::ZoneStatus(vec![]));
        assert!(connector.is_running());

        connector.shutdown().await;
        assert!(!connector.is_running());
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn failed_write_marks_link_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (connector, _) = collecting_connector(listener.local_addr().unwrap().port());
        connector.start();
        let (socket, _) = listener.accept().await.unwrap();
        connector.wait_connected(Duration::from_secs(5)).await.unwrap();

        // Without the receive task only the writer can notice the peer is gone.
        let task = lock(&connector.task).take().unwrap();
        task.abort();
        let _ = task.await;
        assert!(connector.is_connected());
        drop(socket);
        drop(listener);

        let mut failed = None;
        for _ in 0..50 {
            if let Err(e) = connector.send_request(&Request::ac_status(1)).await {
                failed = Some(e);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(failed.unwrap().is_io());
        assert!(!connector.is_connected());
        assert!(matches!(
            connector.send_request(&Request::ac_status(2)).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let (connector, _) = collecting_connector(1);
        assert!(matches!(
            connector.send_request(&Request::ac_status(1)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            connector.wait_connected(Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
        connector.shutdown().await;
    }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::connector::{Connector, DEFAULT_RECONNECT_DELAY, ResponseCallback};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{AcControl, DEFAULT_PORT, Payload, Request, Response, ZoneControl};
use crate::sequence::{PendingRequests, RequestSequencer};
use crate::status::DeviceSnapshot;
use crate::types::*;
use crate::{Error, Result, lock};

type Listener = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

pub struct AirTouchServiceBuilder {
    host: String,
    port: u16,
    reconnect_delay: Duration,
    listener: Option<Listener>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl AirTouchServiceBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            listener: None,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Pause between failed connection attempts.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&ServiceEvent) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AirTouchService> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".into()));
        }
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, path)?)),
            _ => None,
        };

        Ok(AirTouchService {
            host: self.host,
            port: self.port,
            reconnect_delay: self.reconnect_delay,
            shared: Arc::new(Shared {
                state: Mutex::new(ServiceState::default()),
                sequencer: RequestSequencer::new(),
                listener: RwLock::new(self.listener),
                logger,
            }),
            connector: Mutex::new(None),
        })
    }
}

/// Snapshot plus full-update tracking. Every response is applied here under a
/// single lock so no caller ever sees a half-merged state.
#[derive(Debug, Default)]
pub(crate) struct ServiceState {
    pub(crate) snapshot: DeviceSnapshot,
    pub(crate) pending: PendingRequests,
    pub(crate) config_complete: bool,
}

impl ServiceState {
    pub(crate) fn begin_full_update(&mut self, ids: &[u8]) {
        self.pending.clear();
        self.config_complete = false;
        for &id in ids {
            if !self.pending.track(id) {
                warn!(message_id = id, "message id already outstanding in this full update");
            }
        }
    }

    /// Applies one response and returns the events it produces, in the order
    /// they must be delivered.
    pub(crate) fn handle_response(&mut self, response: &Response) -> Vec<ServiceEvent> {
        let mut events = Vec::new();
        self.snapshot.merge(response);

        if self.config_complete {
            match &response.payload {
                Payload::AcStatus(statuses) => {
                    events.push(ServiceEvent::AcStatusChanged(statuses.clone()))
                }
                Payload::ZoneStatus(statuses) => {
                    events.push(ServiceEvent::ZoneStatusChanged(statuses.clone()))
                }
                _ => {}
            }
        }

        if self.pending.mark_received(response.message_id) {
            trace!(message_id = response.message_id, "full update response received");
        }

        if !self.config_complete && !self.pending.is_empty() {
            if self.pending.all_received() {
                self.config_complete = true;
                debug!(responses = self.pending.len(), "full update complete");
                events.push(ServiceEvent::FullUpdate(self.snapshot.clone()));
            } else {
                debug!(
                    outstanding = self.pending.outstanding(),
                    "waiting for remaining full update responses"
                );
            }
        }
        events
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.config_complete = false;
    }
}

struct Shared {
    state: Mutex<ServiceState>,
    sequencer: RequestSequencer,
    listener: RwLock<Option<Listener>>,
    logger: Option<Mutex<MessageLogger>>,
}

impl Shared {
    fn on_response(&self, response: Response) {
        if let Some(logger) = &self.logger {
            lock(logger).log_response(&response);
        }

        let events = lock(&self.state).handle_response(&response);
        if events.is_empty() {
            return;
        }

        let listener = self
            .listener
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        match listener {
            Some(listener) => {
                for event in &events {
                    listener(event);
                }
            }
            None => debug!(count = events.len(), "no listener registered, dropping events"),
        }
    }

    fn log_request(&self, request: &Request) {
        if let Some(logger) = &self.logger {
            lock(logger).log_request(request);
        }
    }

    fn log_command(&self, action: &str, target: Option<u8>, request: &Request) {
        if let Some(logger) = &self.logger {
            lock(logger).log_command(action, target, request);
        }
    }
}

/// Client for one AirTouch 4 controller.
///
/// Keeps a [`DeviceSnapshot`] current from controller responses and notifies
/// the registered listener once a full update has completed and on every AC
/// or zone status change after that. Requires a tokio runtime.
pub struct AirTouchService {
    host: String,
    port: u16,
    reconnect_delay: Duration,
    shared: Arc<Shared>,
    connector: Mutex<Option<Arc<Connector>>>,
}

impl AirTouchService {
    pub fn builder(host: impl Into<String>) -> AirTouchServiceBuilder {
        AirTouchServiceBuilder::new(host)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Spawns the connector. A no-op while it is already running.
    pub fn start(&self) {
        let mut slot = lock(&self.connector);
        if slot.as_ref().is_some_and(|c| c.is_running()) {
            debug!(host = %self.host, "service already running");
            return;
        }
        lock(&self.shared.state).reset();

        let shared = self.shared.clone();
        let callback: ResponseCallback = Arc::new(move |response| shared.on_response(response));
        let connector = Arc::new(Connector::new(
            format!("{}:{}", self.host, self.port),
            self.reconnect_delay,
            callback,
        ));
        connector.start();
        debug!(host = %self.host, port = self.port, "AirTouch service started");
        *slot = Some(connector);
    }

    /// Stops the connector. No listener call happens after this returns.
    pub async fn shutdown(&self) {
        let connector = lock(&self.connector).take();
        if let Some(connector) = connector {
            connector.shutdown().await;
        }
        lock(&self.shared.state).reset();
    }

    pub async fn restart(&self) {
        debug!(host = %self.host, "restarting AirTouch service");
        self.shutdown().await;
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.current_connector().is_some_and(|c| c.is_running())
    }

    pub fn is_connected(&self) -> bool {
        self.current_connector().is_some_and(|c| c.is_connected())
    }

    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let connector = self.current_connector().ok_or(Error::NotConnected)?;
        connector.wait_connected(timeout).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        let Some(connector) = self.current_connector().filter(|c| c.is_running()) else {
            return ConnectionState::Disconnected;
        };
        if !connector.is_connected() {
            return ConnectionState::Connecting;
        }
        let state = lock(&self.shared.state);
        if state.config_complete {
            ConnectionState::Ready
        } else if state.pending.is_empty() {
            ConnectionState::Connecting
        } else {
            ConnectionState::AwaitingFullUpdate
        }
    }

    /// Replaces the listener set on the builder, if any.
    pub fn register_listener(&self, f: impl Fn(&ServiceEvent) + Send + Sync + 'static) {
        *self
            .shared
            .listener
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::new(f));
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        lock(&self.shared.state).snapshot.clone()
    }

    pub fn next_request_id(&self) -> u8 {
        self.allocate_id().0
    }

    /// Next id, flagged when it wrapped onto a request of the current full
    /// update that is still waiting for its response.
    fn allocate_id(&self) -> (u8, bool) {
        let id = self.shared.sequencer.next_id();
        let collides = lock(&self.shared.state).pending.is_outstanding(id);
        if collides {
            warn!(message_id = id, "message id wrapped onto an outstanding full update request");
        }
        (id, collides)
    }

    pub async fn send_request(&self, request: &Request) -> Result<()> {
        let connector = self.current_connector().ok_or(Error::NotConnected)?;
        self.shared.log_request(request);
        connector.send_request(request).await
    }

    /// Requests every status and configuration message. Completion is
    /// reported through a [`ServiceEvent::FullUpdate`] once all five
    /// responses have arrived, in any order.
    pub async fn request_full_update(&self) -> Result<()> {
        let connector = self
            .current_connector()
            .filter(|c| c.is_connected())
            .ok_or(Error::NotConnected)?;

        let sequencer = &self.shared.sequencer;
        let requests = [
            Request::zone_status(sequencer.next_id()),
            Request::zone_names(sequencer.next_id()),
            Request::ac_status(sequencer.next_id()),
            Request::console_version(sequencer.next_id()),
            Request::ac_abilities(sequencer.next_id()),
        ];
        let ids: Vec<u8> = requests.iter().map(Request::message_id).collect();
        lock(&self.shared.state).begin_full_update(&ids);
        debug!(?ids, "requesting full update");

        for request in &requests {
            self.shared.log_request(request);
            connector.send_request(request).await?;
        }
        Ok(())
    }

    pub async fn request_status_update(&self) -> Result<()> {
        self.send_request(&Request::zone_status(self.next_request_id()))
            .await?;
        self.send_request(&Request::ac_status(self.next_request_id()))
            .await
    }

    pub fn validate_ac_setpoint(&self, ac_number: u8, value: i32) -> Result<()> {
        lock(&self.shared.state).snapshot.validate_ac_setpoint(ac_number, value)
    }

    pub fn validate_ac_mode(&self, ac_number: u8, mode: AcMode) -> Result<()> {
        lock(&self.shared.state).snapshot.validate_ac_mode(ac_number, mode)
    }

    pub fn validate_ac_fan_speed(&self, ac_number: u8, fan_speed: FanSpeed) -> Result<()> {
        lock(&self.shared.state)
            .snapshot
            .validate_ac_fan_speed(ac_number, fan_speed)
    }

    pub fn validate_zone_power(&self, zone_number: u8, power: ZonePower) -> Result<()> {
        lock(&self.shared.state)
            .snapshot
            .validate_zone_power(zone_number, power)
    }

    pub fn validate_zone_setpoint(&self, zone_number: u8, value: i32) -> Result<()> {
        lock(&self.shared.state)
            .snapshot
            .validate_zone_setpoint(zone_number, value)
    }

    pub async fn set_zone_power(&self, zone_number: u8, power: ZonePower) -> Result<()> {
        self.validate_zone_power(zone_number, power)?;
        let request = ZoneControl::new(zone_number)
            .power(power)
            .build(self.next_request_id());
        self.send_command("set_zone_power", Some(zone_number), &request)
            .await
    }

    pub async fn set_zone_setpoint(&self, zone_number: u8, value: i32) -> Result<()> {
        self.validate_zone_setpoint(zone_number, value)?;
        let request = ZoneControl::new(zone_number)
            .setpoint(setpoint_byte(value)?)
            .build(self.next_request_id());
        self.send_command("set_zone_setpoint", Some(zone_number), &request)
            .await
    }

    pub async fn set_zone_open_percentage(&self, zone_number: u8, value: u8) -> Result<()> {
        lock(&self.shared.state)
            .snapshot
            .validate_zone_open_percentage(value)?;
        let request = ZoneControl::new(zone_number)
            .open_percentage(value)
            .build(self.next_request_id());
        self.send_command("set_zone_open_percentage", Some(zone_number), &request)
            .await
    }

    pub async fn set_ac_power(&self, ac_number: u8, on: bool) -> Result<()> {
        let request = AcControl::new(ac_number)
            .power(on)
            .build(self.next_request_id());
        self.send_command("set_ac_power", Some(ac_number), &request)
            .await
    }

    pub async fn set_ac_mode(&self, ac_number: u8, mode: AcMode) -> Result<()> {
        self.validate_ac_mode(ac_number, mode)?;
        let request = AcControl::new(ac_number)
            .mode(mode)
            .build(self.next_request_id());
        self.send_command("set_ac_mode", Some(ac_number), &request)
            .await
    }

    pub async fn set_ac_fan_speed(&self, ac_number: u8, fan_speed: FanSpeed) -> Result<()> {
        self.validate_ac_fan_speed(ac_number, fan_speed)?;
        let request = AcControl::new(ac_number)
            .fan_speed(fan_speed)
            .build(self.next_request_id());
        self.send_command("set_ac_fan_speed", Some(ac_number), &request)
            .await
    }

    pub async fn set_ac_setpoint(&self, ac_number: u8, value: i32) -> Result<()> {
        self.validate_ac_setpoint(ac_number, value)?;
        let request = AcControl::new(ac_number)
            .setpoint(setpoint_byte(value)?)
            .build(self.next_request_id());
        self.send_command("set_ac_setpoint", Some(ac_number), &request)
            .await
    }

    async fn send_command(&self, action: &str, target: Option<u8>, request: &Request) -> Result<()> {
        let connector = self.current_connector().ok_or(Error::NotConnected)?;
        debug!(action, ?target, message_id = request.message_id(), "sending command");
        self.shared.log_command(action, target, request);
        connector.send_request(request).await
    }

    fn current_connector(&self) -> Option<Arc<Connector>> {
        lock(&self.connector).clone()
    }
}

fn setpoint_byte(value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::Protocol(format!("setpoint {value} does not fit in a byte")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use crate::sequence::MAX_MESSAGE_ID;
    use crate::status::tests::{ability, ac, zone};
    use itertools::Itertools;

    const BATCH: [u8; 5] = [11, 12, 13, 14, 15];

    /// Response for the n-th request of a full update, in send order.
    fn batch_response(id: u8, position: usize) -> Response {
        match position {
            0 => Response::new(id, MessageType::ZoneStatus, Payload::ZoneStatus(vec![zone(0, true)])),
            1 => Response::new(
                id,
                MessageType::ZoneName,
                Payload::ZoneName(vec![ZoneName { zone_number: 0, name: "Living".into() }]),
            ),
            2 => Response::new(id, MessageType::AcStatus, Payload::AcStatus(vec![ac(0, 22)])),
            3 => Response::new(id, MessageType::ConsoleVersion, Payload::ConsoleVersion(vec![])),
            _ => Response::new(id, MessageType::AcAbility, Payload::AcAbility(vec![ability(0, 0)])),
        }
    }

    fn full_updates(events: &[ServiceEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ServiceEvent::FullUpdate(_)))
            .count()
    }

    #[test]
    fn full_update_completes_only_after_all_five_in_any_order() {
        for order in (0..BATCH.len()).permutations(BATCH.len()) {
            let mut state = ServiceState::default();
            state.begin_full_update(&BATCH);
            for (step, &position) in order.iter().enumerate() {
                let events = state.handle_response(&batch_response(BATCH[position], position));
                let expected = usize::from(step == BATCH.len() - 1);
                assert_eq!(full_updates(&events), expected, "order {order:?} step {step}");
            }
            assert!(state.config_complete);
            assert_eq!(state.snapshot.zone_name(0), Some("Living"));
            assert_eq!(state.snapshot.find_ac_for_zone(0).unwrap().ac_number, 0);
        }
    }

    #[test]
    fn second_full_update_ignores_late_first_batch_responses() {
        let mut state = ServiceState::default();
        state.begin_full_update(&BATCH);
        for position in 0..3 {
            state.handle_response(&batch_response(BATCH[position], position));
        }

        let second = [16, 17, 18, 19, 20];
        state.begin_full_update(&second);
        for position in 3..5 {
            let events = state.handle_response(&batch_response(BATCH[position], position));
            assert_eq!(full_updates(&events), 0);
        }
        assert!(!state.config_complete);
        assert_eq!(state.pending.outstanding(), 5);

        for (position, &id) in second.iter().enumerate() {
            let events = state.handle_response(&batch_response(id, position));
            assert_eq!(full_updates(&events), usize::from(position == 4));
        }
    }

    #[test]
    fn status_events_only_after_completion() {
        let mut state = ServiceState::default();
        let events = state.handle_response(&batch_response(1, 0));
        assert!(events.is_empty(), "no batch tracked, got {events:?}");

        state.begin_full_update(&BATCH);
        for position in 0..4 {
            let events = state.handle_response(&batch_response(BATCH[position], position));
            assert!(events.is_empty(), "{events:?}");
        }
        let events = state.handle_response(&batch_response(BATCH[4], 4));
        assert_eq!(events.len(), 1);

        let events = state.handle_response(&Response::new(
            30,
            MessageType::ZoneStatus,
            Payload::ZoneStatus(vec![zone(0, false)]),
        ));
        assert_eq!(events, vec![ServiceEvent::ZoneStatusChanged(vec![zone(0, false)])]);

        let events = state.handle_response(&Response::new(
            31,
            MessageType::AcStatus,
            Payload::AcStatus(vec![ac(0, 25)]),
        ));
        assert_eq!(events, vec![ServiceEvent::AcStatusChanged(vec![ac(0, 25)])]);

        let events = state.handle_response(&batch_response(32, 1));
        assert!(events.is_empty());
    }

    #[test]
    fn completion_event_carries_merged_snapshot() {
        let mut state = ServiceState::default();
        state.begin_full_update(&BATCH);
        let mut last = Vec::new();
        for (position, &id) in BATCH.iter().enumerate() {
            last = state.handle_response(&batch_response(id, position));
        }
        match last.as_slice() {
            [ServiceEvent::FullUpdate(snapshot)] => {
                assert_eq!(snapshot, &state.snapshot);
                assert_eq!(snapshot.ac_statuses, vec![ac(0, 22)]);
                assert_eq!(snapshot.zone_statuses, vec![zone(0, true)]);
            }
            other => panic!("expected a single FullUpdate, got {other:?}"),
        }
    }

    #[test]
    fn reset_forgets_completion() {
        let mut state = ServiceState::default();
        state.begin_full_update(&BATCH);
        for (position, &id) in BATCH.iter().enumerate() {
            state.handle_response(&batch_response(id, position));
        }
        state.reset();
        assert!(!state.config_complete);
        assert!(state.pending.is_empty());
        let events = state.handle_response(&batch_response(40, 0));
        assert!(events.is_empty());
        assert_eq!(state.snapshot.zone_statuses, vec![zone(0, true)]);
    }

    #[test]
    fn wrapped_id_colliding_with_outstanding_request_is_flagged() {
        let service = AirTouchService::builder("10.0.0.5").build().unwrap();
        let batch: Vec<u8> = (0..5).map(|_| service.shared.sequencer.next_id()).collect();
        assert_eq!(batch, vec![1, 2, 3, 4, 5]);
        lock(&service.shared.state).begin_full_update(&batch);

        for _ in batch.len()..MAX_MESSAGE_ID as usize {
            let (id, flagged) = service.allocate_id();
            assert!(!flagged, "id {id} flagged before wrapping");
        }
        assert_eq!(service.allocate_id(), (1, true));

        lock(&service.shared.state).handle_response(&batch_response(2, 1));
        assert_eq!(service.allocate_id(), (2, false));
        assert_eq!(service.next_request_id(), 3);
    }

    #[test]
    fn builder_rejects_empty_host() {
        assert!(matches!(
            AirTouchService::builder("  ").build(),
            Err(Error::InvalidConfig(_))
        ));
        let service = AirTouchService::builder("10.0.0.5").port(9100).build().unwrap();
        assert_eq!(service.port(), 9100);
        assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    }
}

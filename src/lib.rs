//! Client for the AirTouch 4 air-conditioning controller's LAN protocol.
//!
//! [`AirTouchService`] keeps a [`DeviceSnapshot`] of every AC unit and zone
//! current and reports changes through a single listener.

mod config;
mod connector;
mod diff;
mod error;
mod logger;
mod poller;
pub mod protocol;
mod sequence;
mod service;
mod status;
mod types;
mod validate;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::AirTouchConfig;
pub use connector::DEFAULT_RECONNECT_DELAY;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use poller::Poller;
pub use protocol::{AcControl, MessageType, Payload, Request, Response, ZoneControl, ZoneSetting};
pub use sequence::{MAX_MESSAGE_ID, PendingRequests, RequestSequencer};
pub use service::{AirTouchService, AirTouchServiceBuilder};
pub use status::DeviceSnapshot;
pub use types::*;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

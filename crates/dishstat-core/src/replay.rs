//! Offline transport serving recorded replies from a JSON capture.
//!
//! A capture is a JSON array of entries tagged by `kind`:
//!
//! ```json
//! [
//!   {"kind": "status", "device_info": {"id": "ut01"}},
//!   {"kind": "history", "current": 12, "pop_ping_drop_rate": [0.0, 1.0]},
//!   {"kind": "unreachable", "request": "history"},
//!   {"kind": "rejected", "request": "location", "code": "permission_denied", "message": "off"}
//! ]
//! ```
//!
//! Entries are served in file order, per request kind. Once a kind runs out
//! the dish behaves as unreachable. Control requests (reboot, stow, sleep
//! config) are always acknowledged.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{LocationReply, ObstructionMapReply, StatusReply};
use crate::error::Result;
use crate::gateway::{CallFailure, Channel, Connector, RejectCode, Request, Response};
use crate::history::HistorySnapshot;

/// Data request a capture entry answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Status,
    History,
    Location,
    ObstructionMap,
}

impl RequestKind {
    fn of(request: &Request) -> Option<Self> {
        match request {
            Request::GetStatus => Some(Self::Status),
            Request::GetHistory => Some(Self::History),
            Request::GetLocation => Some(Self::Location),
            Request::GetObstructionMap => Some(Self::ObstructionMap),
            Request::Reboot | Request::Stow { .. } | Request::SetSleepConfig { .. } => None,
        }
    }
}

/// One recorded reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEntry {
    Status(StatusReply),
    History(HistorySnapshot),
    Location(LocationReply),
    ObstructionMap(ObstructionMapReply),
    Rejected {
        request: RequestKind,
        #[serde(default)]
        code: RejectCode,
        message: String,
    },
    Unreachable {
        request: RequestKind,
    },
}

impl ReplayEntry {
    fn into_reply(self) -> (RequestKind, std::result::Result<Response, CallFailure>) {
        match self {
            Self::Status(s) => (RequestKind::Status, Ok(Response::Status(s))),
            Self::History(h) => (RequestKind::History, Ok(Response::History(h))),
            Self::Location(l) => (RequestKind::Location, Ok(Response::Location(l))),
            Self::ObstructionMap(m) => (RequestKind::ObstructionMap, Ok(Response::ObstructionMap(m))),
            Self::Rejected {
                request,
                code,
                message,
            } => (request, Err(CallFailure::Rejected { code, message })),
            Self::Unreachable { request } => (request, Err(CallFailure::Transport)),
        }
    }
}

type Queues = HashMap<RequestKind, VecDeque<std::result::Result<Response, CallFailure>>>;

/// [`Connector`] backed by a capture. Channels share one set of queues.
#[derive(Debug, Clone, Default)]
pub struct ReplayConnector {
    queues: Rc<RefCell<Queues>>,
}

impl ReplayConnector {
    pub fn from_entries(entries: Vec<ReplayEntry>) -> Self {
        let mut queues = Queues::new();
        for entry in entries {
            let (kind, reply) = entry.into_reply();
            queues.entry(kind).or_default().push_back(reply);
        }
        Self {
            queues: Rc::new(RefCell::new(queues)),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<ReplayEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    /// Load a capture file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let connector = Self::from_json(&json)?;
        log::info!(
            "loaded {} recorded replies from {}",
            connector.remaining(),
            path.display()
        );
        Ok(connector)
    }

    /// Replies not yet served.
    pub fn remaining(&self) -> usize {
        self.queues.borrow().values().map(VecDeque::len).sum()
    }
}

/// Channel handed out by [`ReplayConnector`].
#[derive(Debug)]
pub struct ReplayChannel {
    queues: Rc<RefCell<Queues>>,
}

impl Channel for ReplayChannel {
    fn call(
        &mut self,
        request: &Request,
        _timeout: Duration,
    ) -> std::result::Result<Response, CallFailure> {
        let Some(kind) = RequestKind::of(request) else {
            return Ok(Response::Empty);
        };
        self.queues
            .borrow_mut()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(CallFailure::Transport))
    }

    fn close(&mut self) {}
}

impl Connector for ReplayConnector {
    type Channel = ReplayChannel;

    fn open(&self, target: &str) -> std::result::Result<ReplayChannel, CallFailure> {
        log::debug!("replaying capture in place of {target}");
        Ok(ReplayChannel {
            queues: Rc::clone(&self.queues),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DishError;
    use crate::gateway::DishGateway;

    const CAPTURE: &str = r#"[
        {"kind": "history", "current": 4, "pop_ping_drop_rate": [0.0, 0.0, 1.0, 0.0]},
        {"kind": "status", "device_info": {"id": "ut-replay"}},
        {"kind": "unreachable", "request": "history"},
        {"kind": "rejected", "request": "location", "code": "permission_denied", "message": "off"},
        {"kind": "history", "current": 6, "pop_ping_drop_rate": [0.0, 0.0, 1.0, 0.0]}
    ]"#;

    #[test]
    fn replies_are_served_per_kind_in_order() {
        let connector = ReplayConnector::from_json(CAPTURE).unwrap();
        assert_eq!(connector.remaining(), 5);
        let mut gw = DishGateway::with_default_target(connector.clone());

        assert_eq!(gw.device_id().unwrap(), "ut-replay");
        assert_eq!(gw.history().unwrap().current, 4);
        // The unreachable entry hits a reused channel, so the gateway
        // reconnects and is served the next recorded history.
        assert_eq!(gw.history().unwrap().current, 6);
        assert!(gw.location().unwrap().is_disabled());
        assert_eq!(connector.remaining(), 0);

        gw.close();
        assert!(matches!(
            gw.history().unwrap_err(),
            DishError::Communication { .. }
        ));
    }

    #[test]
    fn exhausted_capture_is_unreachable() {
        let mut gw = DishGateway::with_default_target(ReplayConnector::default());
        assert!(matches!(
            gw.get_status().unwrap_err(),
            DishError::Communication { .. }
        ));
    }

    #[test]
    fn control_requests_are_acknowledged() {
        let mut gw = DishGateway::with_default_target(ReplayConnector::default());
        gw.reboot().unwrap();
        gw.set_stow_state(true).unwrap();
        gw.set_sleep_config(60, 120, true).unwrap();
    }

    #[test]
    fn capture_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        std::fs::write(&path, CAPTURE).unwrap();
        let connector = ReplayConnector::load(&path).unwrap();
        assert_eq!(connector.remaining(), 5);
    }

    #[test]
    fn malformed_capture_is_a_json_error() {
        let err = ReplayConnector::from_json(r#"[{"kind": "telemetry"}]"#).unwrap_err();
        assert!(matches!(err, DishError::Json(_)));
    }
}

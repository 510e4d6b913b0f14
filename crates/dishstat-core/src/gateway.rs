//! Request/response gateway to the dish.
//!
//! The wire transport sits behind [`Connector`] and [`Channel`]. The gateway
//! holds at most one open channel. A call that fails on a channel that was
//! reused from an earlier call is retried exactly once on a fresh channel; a
//! failure on a fresh channel is returned as is.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{
    AlertDetail, LocationRecord, LocationReply, ObstructionDetail, ObstructionMap,
    ObstructionMapReply, StatusRecord, StatusReply,
};
use crate::error::{DishError, Operation, Result};
use crate::history::{BufferLayout, HistorySnapshot};

/// Standard dish address on the local network.
pub const DEFAULT_TARGET: &str = "192.168.100.1:9200";

/// Timeout applied to every remote call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One request to the dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    GetStatus,
    GetHistory,
    GetLocation,
    GetObstructionMap,
    Reboot,
    Stow {
        unstow: bool,
    },
    SetSleepConfig {
        start_minutes: u32,
        duration_minutes: u32,
        enable: bool,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Self::GetStatus => Operation::GetStatus,
            Self::GetHistory => Operation::GetHistory,
            Self::GetLocation => Operation::GetLocation,
            Self::GetObstructionMap => Operation::GetObstructionMap,
            Self::Reboot => Operation::Reboot,
            Self::Stow { .. } => Operation::Stow,
            Self::SetSleepConfig { .. } => Operation::SetSleepConfig,
        }
    }
}

/// Reply payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Status(StatusReply),
    History(HistorySnapshot),
    Location(LocationReply),
    ObstructionMap(ObstructionMapReply),
    /// Acknowledgement with no payload (reboot, stow, sleep config).
    Empty,
}

impl Response {
    fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::History(_) => "history",
            Self::Location(_) => "location",
            Self::ObstructionMap(_) => "obstruction map",
            Self::Empty => "empty",
        }
    }
}

/// Error code attached to a rejected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    PermissionDenied,
    Unimplemented,
    Unavailable,
    #[default]
    Unknown,
}

/// Failure reported by a [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    /// The dish answered with an error status.
    #[error("rejected ({code:?}): {message}")]
    Rejected { code: RejectCode, message: String },
    /// No answer: connection refused, reset or timed out.
    #[error("transport failure")]
    Transport,
}

impl CallFailure {
    fn into_error(self, op: Operation) -> DishError {
        match self {
            Self::Rejected { message, .. } => DishError::CallRejected { op, message },
            Self::Transport => DishError::Communication { op },
        }
    }
}

/// An open connection to the dish.
pub trait Channel {
    /// Issue one request and wait at most `timeout` for the reply.
    fn call(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> std::result::Result<Response, CallFailure>;

    fn close(&mut self);
}

/// Opens channels to a target address.
pub trait Connector {
    type Channel: Channel;

    fn open(&self, target: &str) -> std::result::Result<Self::Channel, CallFailure>;
}

/// Gateway owning the connector and the (lazily opened) channel.
pub struct DishGateway<C: Connector> {
    connector: C,
    target: String,
    channel: Option<C::Channel>,
    timeout: Duration,
}

impl<C: Connector> DishGateway<C> {
    pub fn new(connector: C, target: impl Into<String>) -> Self {
        Self {
            connector,
            target: target.into(),
            channel: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Gateway for the standard dish address.
    pub fn with_default_target(connector: C) -> Self {
        Self::new(connector, DEFAULT_TARGET)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Issue a request, reconnecting once if a reused channel failed.
    fn call(&mut self, request: &Request) -> std::result::Result<Response, CallFailure> {
        loop {
            let reused = self.channel.is_some();
            let mut channel = match self.channel.take() {
                Some(channel) => channel,
                None => self.connector.open(&self.target)?,
            };
            match channel.call(request, self.timeout) {
                Ok(response) => {
                    self.channel = Some(channel);
                    return Ok(response);
                }
                Err(failure) => {
                    channel.close();
                    if !reused {
                        return Err(failure);
                    }
                    log::debug!(
                        "{} failed on a reused connection ({failure}), reconnecting",
                        request.operation()
                    );
                }
            }
        }
    }

    fn request(&mut self, request: Request) -> Result<Response> {
        self.call(&request)
            .map_err(|failure| failure.into_error(request.operation()))
    }

    fn unexpected(op: Operation, response: &Response) -> DishError {
        DishError::protocol(op, format!("unexpected {} reply", response.kind()))
    }

    /// Raw status reply.
    pub fn get_status(&mut self) -> Result<StatusReply> {
        match self.request(Request::GetStatus)? {
            Response::Status(status) => Ok(status),
            other => Err(Self::unexpected(Operation::GetStatus, &other)),
        }
    }

    /// Status split into the status, obstruction and alert records.
    pub fn status(&mut self) -> Result<(StatusRecord, ObstructionDetail, AlertDetail)> {
        Ok(self.get_status()?.into_records())
    }

    /// Device identifier from the status reply.
    pub fn device_id(&mut self) -> Result<String> {
        self.get_status()?
            .device_info
            .and_then(|info| info.id)
            .ok_or_else(|| DishError::protocol(Operation::GetStatus, "reply has no device id"))
    }

    /// Current history ring buffers.
    pub fn history(&mut self) -> Result<HistorySnapshot> {
        match self.request(Request::GetHistory)? {
            Response::History(mut history) => {
                history.layout = BufferLayout::Ring;
                Ok(history)
            }
            other => Err(Self::unexpected(Operation::GetHistory, &other)),
        }
    }

    /// Dish position; all fields empty if location access is disabled.
    pub fn location(&mut self) -> Result<LocationRecord> {
        let op = Operation::GetLocation;
        match self.call(&Request::GetLocation) {
            Ok(Response::Location(reply)) => reply.into_record(),
            Ok(other) => Err(Self::unexpected(op, &other)),
            Err(CallFailure::Rejected {
                code: RejectCode::PermissionDenied,
                ..
            }) => Ok(LocationRecord::default()),
            Err(failure) => Err(failure.into_error(op)),
        }
    }

    pub fn obstruction_map(&mut self) -> Result<ObstructionMap> {
        match self.request(Request::GetObstructionMap)? {
            Response::ObstructionMap(reply) => reply.into_map(),
            other => Err(Self::unexpected(Operation::GetObstructionMap, &other)),
        }
    }

    pub fn reboot(&mut self) -> Result<()> {
        self.request(Request::Reboot).map(drop)
    }

    /// Stow the dish, or unstow it when `unstow` is set.
    pub fn set_stow_state(&mut self, unstow: bool) -> Result<()> {
        self.request(Request::Stow { unstow }).map(drop)
    }

    /// Configure the daily power-save window, in minutes past midnight.
    ///
    /// Disabling sends a start of 0 and a duration of 1.
    pub fn set_sleep_config(
        &mut self,
        start_minutes: u32,
        duration_minutes: u32,
        enable: bool,
    ) -> Result<()> {
        let (start_minutes, duration_minutes) = if enable {
            (start_minutes, duration_minutes)
        } else {
            (0, 1)
        };
        self.request(Request::SetSleepConfig {
            start_minutes,
            duration_minutes,
            enable,
        })
        .map(drop)
    }

    /// Close the held channel, if any.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }
}

impl<C: Connector> Drop for DishGateway<C> {
    fn drop(&mut self) {
        self.close();
    }
}

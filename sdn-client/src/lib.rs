// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Client library for the SDN controller consumed by coursenet.
//!
//! The provisioning core is written against the [`Controller`] trait.  The
//! [`floodlight`] module provides the implementation used in production,
//! speaking Floodlight's device, topology and static flow pusher REST APIs.

use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use common::network::Dpid;
use common::network::MacAddr;
use serde::Deserialize;
use serde::Serialize;

pub mod floodlight;

pub use floodlight::Floodlight;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures talking to the controller.
///
/// These never describe semantic outcomes like "no such device": an empty
/// device list or an empty route are successful responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("communication error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("controller returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid controller response: {0}")]
    Decode(String),
    #[error("operation not supported by this controller: {0}")]
    Unsupported(String),
}

impl ClientError {
    /// Returns `true` if the controller could not be reached at all, as
    /// opposed to answering with an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// A (switch, port) pair at which the controller observes a host.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct AttachmentPoint {
    pub switch: Dpid,
    pub port: u16,
}

impl AttachmentPoint {
    pub fn new(switch: Dpid, port: u16) -> Self {
        AttachmentPoint { switch, port }
    }
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.switch, self.port)
    }
}

/// A host known to the controller's device manager.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Device {
    pub macs: Vec<MacAddr>,
    pub ipv4: Vec<Ipv4Addr>,
    /// Attachment points in the order the controller reported them.
    pub attachment_points: Vec<AttachmentPoint>,
}

/// One element of a route as reported by the controller's topology service.
///
/// Routes are reported as a flat list of (switch, port) tuples, two per
/// traversed switch: the port on which traffic enters, then the port out
/// which it leaves.
pub type NodePort = AttachmentPoint;

/// Header fields a flow rule matches on.  The rule always matches IPv4
/// traffic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMatch {
    pub in_port: Option<u16>,
    pub eth_src: Option<MacAddr>,
    pub ipv4_dst: Ipv4Addr,
    /// IANA protocol number, e.g. 6 for TCP.
    pub ip_proto: u8,
    pub tp_dst: u16,
}

/// A single flow rule to be programmed into one switch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Controller-wide unique name, used to delete the rule later.
    pub name: String,
    pub switch: Dpid,
    pub priority: u16,
    pub matches: FlowMatch,
    /// Port out which matching packets are forwarded.
    pub output: u16,
}

/// How a controller accepts the flows for a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// Each flow is pushed with its own request.
    PerHop,
    /// The whole path is pushed with a single request, which the controller
    /// applies atomically.
    Path,
}

/// The operations the provisioning core needs from an SDN controller.
#[async_trait]
pub trait Controller: Send + Sync {
    /// The flow programming dialect spoken by this controller.
    fn dialect(&self) -> Dialect {
        Dialect::PerHop
    }

    /// Fetch the controller's device inventory.
    async fn devices(&self) -> ClientResult<Vec<Device>>;

    /// Fetch the route between two attachment points.  An empty list means
    /// the controller knows no route.
    async fn route(
        &self,
        src: AttachmentPoint,
        dst: AttachmentPoint,
    ) -> ClientResult<Vec<NodePort>>;

    /// Install a single flow rule.
    async fn push_flow(&self, flow: &FlowSpec) -> ClientResult<()>;

    /// Install every flow of a path in one request.  Only meaningful for
    /// controllers speaking [`Dialect::Path`].
    async fn push_path(&self, flows: &[FlowSpec]) -> ClientResult<()> {
        let _ = flows;
        Err(ClientError::Unsupported("single-shot path programming".into()))
    }

    /// Delete a flow rule by name.  Deleting a rule that does not exist is
    /// not an error.
    async fn delete_flow(&self, name: &str) -> ClientResult<()>;

    /// Names of the flow rules currently programmed into `switch`.
    async fn flow_names(&self, switch: Dpid) -> ClientResult<Vec<String>>;
}

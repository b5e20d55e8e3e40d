// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Locating hosts in the network and finding paths between them.
//!
//! Everything here is answered by the controller at the time of the call;
//! nothing is cached.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use common::network::Dpid;
use common::network::MacAddr;
use sdn_client::AttachmentPoint;
use sdn_client::Controller;
use sdn_client::Device;
use sdn_client::NodePort;
use serde::Deserialize;
use serde::Serialize;
use slog::debug;
use slog::o;
use slog::Logger;

use crate::bounded;
use crate::types::CnError;
use crate::types::CnResult;

/// An address by which a host is looked up in the controller's inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Mac(MacAddr),
    Ipv4(Ipv4Addr),
}

impl Endpoint {
    fn matches(&self, device: &Device) -> bool {
        match self {
            Endpoint::Mac(mac) => device.macs.contains(mac),
            Endpoint::Ipv4(ip) => device.ipv4.contains(ip),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Mac(mac) => write!(f, "{mac}"),
            Endpoint::Ipv4(ip) => write!(f, "{ip}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = CnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(mac) = s.parse() {
            Ok(Endpoint::Mac(mac))
        } else if let Ok(ip) = s.parse() {
            Ok(Endpoint::Ipv4(ip))
        } else {
            Err(CnError::Invalid(format!(
                "{s} is neither a MAC nor an IPv4 address"
            )))
        }
    }
}

/// Which attachment point to use when a device reports several.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AttachmentSelection {
    /// The first one in the controller's report.
    #[default]
    First,
    /// The last one in the controller's report.
    Last,
}

impl AttachmentSelection {
    fn select(self, points: &[AttachmentPoint]) -> Option<AttachmentPoint> {
        match self {
            AttachmentSelection::First => points.first().copied(),
            AttachmentSelection::Last => points.last().copied(),
        }
    }
}

/// One switch along a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub switch: Dpid,
    /// Port on which traffic from the source arrives.
    pub ingress: u16,
    /// Port out which it is forwarded toward the destination.
    pub egress: u16,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}->{}]", self.switch, self.ingress, self.egress)
    }
}

/// The directed path from `src` to `dst`.
///
/// A path with no hops connects two endpoints sharing an attachment point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub src: AttachmentPoint,
    pub dst: AttachmentPoint,
    pub hops: Vec<Hop>,
}

impl Path {
    pub fn local(point: AttachmentPoint) -> Self {
        Path {
            src: point,
            dst: point,
            hops: Vec::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.hops.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.hops.is_empty() {
            return write!(f, "local at {}", self.src);
        }
        let hops: Vec<String> =
            self.hops.iter().map(|h| h.to_string()).collect();
        write!(f, "{}", hops.join(" "))
    }
}

// Fold the controller's (switch, port) list into hops.  Each switch appears
// twice in a row: once with the ingress port, once with the egress port.
fn hops_from_route(route: &[NodePort]) -> Result<Vec<Hop>, String> {
    if route.len() % 2 != 0 {
        return Err(format!(
            "route has an odd number ({}) of switch ports",
            route.len()
        ));
    }
    route
        .chunks_exact(2)
        .map(|pair| {
            let (ingress, egress) = (pair[0], pair[1]);
            if ingress.switch != egress.switch {
                return Err(format!(
                    "route enters {} but leaves {}",
                    ingress.switch, egress.switch
                ));
            }
            Ok(Hop {
                switch: ingress.switch,
                ingress: ingress.port,
                egress: egress.port,
            })
        })
        .collect()
}

/// Queries the controller for host locations and paths.
pub struct Topology {
    controller: Arc<dyn Controller>,
    selection: AttachmentSelection,
    timeout: Duration,
    log: Logger,
}

impl Topology {
    pub fn new(
        controller: Arc<dyn Controller>,
        selection: AttachmentSelection,
        timeout: Duration,
        log: &Logger,
    ) -> Self {
        Topology {
            controller,
            selection,
            timeout,
            log: log.new(o!("unit" => "topology")),
        }
    }

    /// The controller's device inventory.
    pub async fn devices(&self) -> CnResult<Vec<Device>> {
        bounded(self.timeout, self.controller.devices())
            .await
            .map_err(|e| CnError::ControllerUnreachable {
                cause: e.to_string(),
            })
    }

    /// Find where the host with address `endpoint` attaches to the network.
    pub async fn resolve_attachment_point(
        &self,
        endpoint: &Endpoint,
    ) -> CnResult<AttachmentPoint> {
        let not_found = |cause: Option<String>| CnError::EndpointNotFound {
            identifier: endpoint.to_string(),
            cause,
        };

        let devices = bounded(self.timeout, self.controller.devices())
            .await
            .map_err(|e| not_found(Some(e.to_string())))?;

        let point = devices
            .iter()
            .filter(|d| endpoint.matches(d))
            .find_map(|d| self.selection.select(&d.attachment_points))
            .ok_or_else(|| not_found(None))?;

        debug!(self.log, "resolved attachment point";
            "endpoint" => %endpoint,
            "point" => %point);
        Ok(point)
    }

    /// Ask the controller for the path from `src` to `dst`.
    pub async fn compute_route(
        &self,
        src: AttachmentPoint,
        dst: AttachmentPoint,
    ) -> CnResult<Path> {
        if src == dst {
            debug!(self.log, "endpoints share an attachment point";
                "point" => %src);
            return Ok(Path::local(src));
        }

        let no_route = |cause: Option<String>| CnError::NoRouteAvailable {
            src: src.to_string(),
            dst: dst.to_string(),
            cause,
        };

        let route = bounded(self.timeout, self.controller.route(src, dst))
            .await
            .map_err(|e| no_route(Some(e.to_string())))?;
        if route.is_empty() {
            return Err(no_route(None));
        }
        let hops = hops_from_route(&route).map_err(|e| no_route(Some(e)))?;

        debug!(self.log, "computed route";
            "src" => %src,
            "dst" => %dst,
            "hops" => hops.len());
        Ok(Path { src, dst, hops })
    }
}

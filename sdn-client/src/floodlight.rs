// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Controller implementation for Floodlight's REST API.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use common::network::Dpid;
use common::network::MacAddr;
use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use slog::trace;
use slog::Logger;

use crate::AttachmentPoint;
use crate::ClientError;
use crate::ClientResult;
use crate::Controller;
use crate::Device;
use crate::FlowSpec;
use crate::NodePort;

const DEVICE_API: &str = "/wm/device/";
const FLOW_API: &str = "/wm/staticflowpusher/json";

const ETH_TYPE_IPV4: &str = "0x0800";

/// A client for a Floodlight controller.
#[derive(Clone, Debug)]
pub struct Floodlight {
    base_url: String,
    http: reqwest::Client,
    log: Logger,
}

impl Floodlight {
    /// Create a client for the controller at `base_url`, e.g.
    /// `http://10.20.12.65:8080`.  Every request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        log: Logger,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Floodlight {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            log,
        })
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        trace!(self.log, "client request";
            "method" => %method,
            "uri" => %url,
        );
        let result = async {
            let rsp = req.send().await?;
            let status = rsp.status();
            let text = rsp.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        }
        .await;
        trace!(self.log, "client response"; "result" => ?result);

        Ok(result?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> ClientResult<T> {
        let (status, text) =
            self.request::<()>(Method::GET, path, None).await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn status_error(status: StatusCode, body: &str) -> ClientError {
    let message = match serde_json::from_str::<StatusBody>(body) {
        Ok(StatusBody { status: Some(s) }) => s,
        _ => body.trim().to_string(),
    };
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Controller for Floodlight {
    async fn devices(&self) -> ClientResult<Vec<Device>> {
        let listing: DeviceListing = self.get_json(DEVICE_API).await?;
        Ok(listing.into_devices())
    }

    async fn route(
        &self,
        src: AttachmentPoint,
        dst: AttachmentPoint,
    ) -> ClientResult<Vec<NodePort>> {
        let path = format!(
            "/wm/topology/route/{}/{}/{}/{}/json",
            src.switch, src.port, dst.switch, dst.port
        );
        let tuples: Vec<WireNodePort> = self.get_json(&path).await?;
        tuples.into_iter().map(NodePort::try_from).collect()
    }

    async fn push_flow(&self, flow: &FlowSpec) -> ClientResult<()> {
        let entry = StaticFlowEntry::from(flow);
        let (status, text) =
            self.request(Method::POST, FLOW_API, Some(&entry)).await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        // Older releases of the static flow pusher report rejected entries
        // with a 200 and an error string in the body.
        if let Ok(StatusBody { status: Some(s) }) =
            serde_json::from_str::<StatusBody>(&text)
        {
            if s.starts_with("Error") {
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    message: s,
                });
            }
        }
        Ok(())
    }

    async fn delete_flow(&self, name: &str) -> ClientResult<()> {
        let body = DeleteEntry { name };
        let (status, text) =
            self.request(Method::DELETE, FLOW_API, Some(&body)).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(status, &text))
        }
    }

    async fn flow_names(&self, switch: Dpid) -> ClientResult<Vec<String>> {
        let path = format!("/wm/staticflowpusher/list/{switch}/json");
        let listing: BTreeMap<String, FlowListing> =
            self.get_json(&path).await?;
        Ok(listing.into_values().flat_map(FlowListing::into_names).collect())
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: Option<String>,
}

// The device manager has returned both a bare list and an object wrapping
// the list, depending on the release.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceListing {
    Bare(Vec<WireDevice>),
    Envelope { devices: Vec<WireDevice> },
}

impl DeviceListing {
    fn into_devices(self) -> Vec<Device> {
        let devices = match self {
            DeviceListing::Bare(d) => d,
            DeviceListing::Envelope { devices } => devices,
        };
        devices.into_iter().map(Device::from).collect()
    }
}

#[derive(Debug, Deserialize)]
struct WireDevice {
    #[serde(default)]
    mac: Vec<String>,
    #[serde(default)]
    ipv4: Vec<String>,
    #[serde(default, rename = "attachmentPoint")]
    attachment_point: Vec<WireAttachmentPoint>,
}

#[derive(Debug, Deserialize)]
struct WireAttachmentPoint {
    #[serde(rename = "switch", alias = "switchDPID")]
    switch: String,
    port: WirePort,
}

// Ports show up as plain numbers, as strings ("1", "local"), or as objects
// carrying the number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePort {
    Number(i64),
    Text(String),
    Object {
        #[serde(alias = "shortPortNumber")]
        #[serde(rename = "portNumber")]
        number: i64,
    },
}

impl WirePort {
    // Returns `None` for switch-internal ports, which are reported as
    // negative numbers or symbolic names.
    fn number(&self) -> Option<u16> {
        let n = match self {
            WirePort::Number(n) => *n,
            WirePort::Text(s) => s.trim().parse::<i64>().ok()?,
            WirePort::Object { number } => *number,
        };
        u16::try_from(n).ok()
    }
}

impl From<WireDevice> for Device {
    fn from(d: WireDevice) -> Self {
        let macs = d.mac.iter().filter_map(|m| m.parse::<MacAddr>().ok());
        let ipv4 = d.ipv4.iter().filter_map(|a| a.parse::<Ipv4Addr>().ok());
        let attachment_points = d.attachment_point.iter().filter_map(|ap| {
            let switch = ap.switch.parse::<Dpid>().ok()?;
            let port = ap.port.number()?;
            Some(AttachmentPoint::new(switch, port))
        });
        Device {
            macs: macs.collect(),
            ipv4: ipv4.collect(),
            attachment_points: attachment_points.collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireNodePort {
    switch: String,
    port: WirePort,
}

impl TryFrom<WireNodePort> for NodePort {
    type Error = ClientError;

    fn try_from(np: WireNodePort) -> ClientResult<Self> {
        let switch = np.switch.parse::<Dpid>().map_err(|e| {
            ClientError::Decode(format!("bad switch {:?}: {e}", np.switch))
        })?;
        let port = np.port.number().ok_or_else(|| {
            ClientError::Decode(format!("bad port {:?} on {switch}", np.port))
        })?;
        Ok(AttachmentPoint::new(switch, port))
    }
}

#[derive(Debug, Serialize)]
struct StaticFlowEntry {
    switch: String,
    name: String,
    priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_port: Option<String>,
    eth_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    eth_src: Option<String>,
    ipv4_dst: String,
    ip_proto: String,
    tp_dst: String,
    active: &'static str,
    actions: String,
}

impl From<&FlowSpec> for StaticFlowEntry {
    fn from(f: &FlowSpec) -> Self {
        let m = &f.matches;
        StaticFlowEntry {
            switch: f.switch.to_string(),
            name: f.name.clone(),
            priority: f.priority.to_string(),
            in_port: m.in_port.map(|p| p.to_string()),
            eth_type: ETH_TYPE_IPV4,
            eth_src: m.eth_src.map(|mac| mac.to_string()),
            ipv4_dst: m.ipv4_dst.to_string(),
            ip_proto: format!("0x{:02x}", m.ip_proto),
            tp_dst: m.tp_dst.to_string(),
            active: "true",
            actions: format!("output={}", f.output),
        }
    }
}

// Flows of a switch, keyed by flow name.  Newer releases wrap each flow in
// its own single-entry object inside a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlowListing {
    List(Vec<BTreeMap<String, serde_json::Value>>),
    Map(BTreeMap<String, serde_json::Value>),
}

impl FlowListing {
    fn into_names(self) -> Vec<String> {
        match self {
            FlowListing::List(l) => {
                l.into_iter().flat_map(|m| m.into_keys()).collect()
            }
            FlowListing::Map(m) => m.into_keys().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeleteEntry<'a> {
    name: &'a str,
}

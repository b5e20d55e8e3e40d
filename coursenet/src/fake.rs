// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! An in-memory controller for exercising the provisioning pipeline.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use common::network::Dpid;
use common::network::MacAddr;
use parking_lot::Mutex;
use sdn_client::AttachmentPoint;
use sdn_client::ClientError;
use sdn_client::ClientResult;
use sdn_client::Controller;
use sdn_client::Device;
use sdn_client::Dialect;
use sdn_client::FlowSpec;
use sdn_client::NodePort;

#[derive(Default)]
struct FakeState {
    devices: Vec<Device>,
    routes: BTreeMap<(AttachmentPoint, AttachmentPoint), Vec<NodePort>>,
    flows: BTreeMap<String, FlowSpec>,

    device_calls: usize,
    route_calls: usize,
    pushes: usize,
    deletes: usize,

    devices_error: Option<ClientError>,
    route_error: Option<ClientError>,
    // Fail the push with this index, counting from zero.
    push_error: Option<(usize, ClientError)>,
    // Never answer the push with this index.
    push_hang: Option<usize>,
    // Accept pushes without programming anything.
    drop_pushes: bool,
    delete_errors: BTreeSet<String>,
    // Hold deletes until healed.
    delete_hang: bool,
}

pub(crate) struct FakeController {
    dialect: Dialect,
    state: Mutex<FakeState>,
}

pub(crate) fn ap(switch: u64, port: u16) -> AttachmentPoint {
    AttachmentPoint::new(Dpid::new(switch), port)
}

impl FakeController {
    pub fn new() -> Self {
        FakeController {
            dialect: Dialect::PerHop,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        FakeController {
            dialect,
            ..FakeController::new()
        }
    }

    pub fn add_device(
        &self,
        mac: Option<&str>,
        ipv4: Option<Ipv4Addr>,
        attachment_points: Vec<AttachmentPoint>,
    ) {
        let macs: Vec<MacAddr> =
            mac.into_iter().filter_map(|m| m.parse().ok()).collect();
        self.state.lock().devices.push(Device {
            macs,
            ipv4: ipv4.into_iter().collect(),
            attachment_points,
        });
    }

    /// Register a route, given as the switches traversed with their
    /// (ingress, egress) ports.
    pub fn add_route(
        &self,
        src: AttachmentPoint,
        dst: AttachmentPoint,
        hops: &[(u64, u16, u16)],
    ) {
        let nps = hops
            .iter()
            .flat_map(|(sw, i, e)| [ap(*sw, *i), ap(*sw, *e)])
            .collect();
        self.state.lock().routes.insert((src, dst), nps);
    }

    pub fn add_raw_route(
        &self,
        src: AttachmentPoint,
        dst: AttachmentPoint,
        route: Vec<NodePort>,
    ) {
        self.state.lock().routes.insert((src, dst), route);
    }

    pub fn fail_devices(&self, err: ClientError) {
        self.state.lock().devices_error = Some(err);
    }

    pub fn fail_route(&self, err: ClientError) {
        self.state.lock().route_error = Some(err);
    }

    pub fn fail_push(&self, index: usize, err: ClientError) {
        self.state.lock().push_error = Some((index, err));
    }

    pub fn hang_push(&self, index: usize) {
        self.state.lock().push_hang = Some(index);
    }

    pub fn drop_pushes(&self) {
        self.state.lock().drop_pushes = true;
    }

    pub fn fail_delete(&self, name: &str) {
        self.state.lock().delete_errors.insert(name.to_string());
    }

    pub fn hang_deletes(&self) {
        self.state.lock().delete_hang = true;
    }

    fn deletes_held(&self) -> bool {
        self.state.lock().delete_hang
    }

    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.devices_error = None;
        state.route_error = None;
        state.push_error = None;
        state.push_hang = None;
        state.drop_pushes = false;
        state.delete_errors.clear();
        state.delete_hang = false;
    }

    /// Names of the flows currently programmed, in name order.
    pub fn installed(&self) -> Vec<String> {
        self.state.lock().flows.keys().cloned().collect()
    }

    pub fn flow(&self, name: &str) -> Option<FlowSpec> {
        self.state.lock().flows.get(name).cloned()
    }

    pub fn device_calls(&self) -> usize {
        self.state.lock().device_calls
    }

    pub fn route_calls(&self) -> usize {
        self.state.lock().route_calls
    }

    pub fn pushes(&self) -> usize {
        self.state.lock().pushes
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().deletes
    }
}

#[async_trait]
impl Controller for FakeController {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn devices(&self) -> ClientResult<Vec<Device>> {
        let mut state = self.state.lock();
        state.device_calls += 1;
        match &state.devices_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.devices.clone()),
        }
    }

    async fn route(
        &self,
        src: AttachmentPoint,
        dst: AttachmentPoint,
    ) -> ClientResult<Vec<NodePort>> {
        let mut state = self.state.lock();
        state.route_calls += 1;
        match &state.route_error {
            Some(e) => Err(e.clone()),
            None => {
                Ok(state.routes.get(&(src, dst)).cloned().unwrap_or_default())
            }
        }
    }

    async fn push_flow(&self, flow: &FlowSpec) -> ClientResult<()> {
        let hang = {
            let mut state = self.state.lock();
            let index = state.pushes;
            state.pushes += 1;
            if let Some((i, e)) = &state.push_error {
                if *i == index {
                    return Err(e.clone());
                }
            }
            if !state.drop_pushes {
                state.flows.insert(flow.name.clone(), flow.clone());
            }
            state.push_hang == Some(index)
        };
        // A hung request has reached the controller; only the reply is lost.
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn push_path(&self, flows: &[FlowSpec]) -> ClientResult<()> {
        if self.dialect != Dialect::Path {
            return Err(ClientError::Unsupported("path".into()));
        }
        let hang = {
            let mut state = self.state.lock();
            let index = state.pushes;
            state.pushes += 1;
            if let Some((i, e)) = &state.push_error {
                if *i == index {
                    return Err(e.clone());
                }
            }
            if !state.drop_pushes {
                for flow in flows {
                    state.flows.insert(flow.name.clone(), flow.clone());
                }
            }
            state.push_hang == Some(index)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn delete_flow(&self, name: &str) -> ClientResult<()> {
        while self.deletes_held() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut state = self.state.lock();
        state.deletes += 1;
        if state.delete_errors.contains(name) {
            return Err(ClientError::Status {
                status: 500,
                message: format!("cannot delete {name}"),
            });
        }
        state.flows.remove(name);
        Ok(())
    }

    async fn flow_names(&self, switch: Dpid) -> ClientResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .flows
            .values()
            .filter(|f| f.switch == switch)
            .map(|f| f.name.clone())
            .collect())
    }
}

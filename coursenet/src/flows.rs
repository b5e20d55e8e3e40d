// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Flow rule installation and withdrawal.
//!
//! A connection is realized as one flow rule per hop of its path, each
//! forwarding the student's traffic for the service out the hop's egress
//! port.  Installation is all-or-nothing: if any rule cannot be installed,
//! the rules already pushed for the attempt are deleted before the failure
//! is reported.  This holds even if the install future is dropped part way
//! through; the [`Rollback`] guard then performs the cleanup on a spawned
//! task.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use common::network::Dpid;
use common::network::MacAddr;
use sdn_client::ClientError;
use sdn_client::Controller;
use sdn_client::Dialect;
use sdn_client::FlowMatch;
use sdn_client::FlowSpec;
use serde::Serialize;
use slog::debug;
use slog::error;
use slog::o;
use slog::warn;
use slog::Logger;

use crate::bounded;
use crate::catalog::Protocol;
use crate::topology::Path;
use crate::types::CnError;

/// Everything needed to derive the flow rules of a connection.
#[derive(Clone, Debug)]
pub struct FlowDraft {
    pub handler: String,
    pub eth_src: MacAddr,
    pub ipv4_dst: Ipv4Addr,
    pub protocol: Protocol,
    pub port: u16,
    pub path: Path,
}

/// The rules programmed for one connection, in path order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InstalledFlowSet {
    pub flows: Vec<FlowSpec>,
}

impl InstalledFlowSet {
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flows.iter().map(|f| f.name.as_str())
    }
}

/// A failed installation.
///
/// `stranded` holds the rules which could not be rolled back and so may
/// still be programmed on the controller.  It is empty unless `error` is an
/// [`CnError::Unwind`].
#[derive(Debug)]
pub struct InstallFailure {
    pub error: CnError,
    pub stranded: InstalledFlowSet,
}

/// The name of the rule for hop `index` of connection `handler`.
pub fn flow_name(handler: &str, index: usize) -> String {
    format!("{handler}.{index}")
}

/// Translate a draft into one rule per hop.
pub fn flow_specs(draft: &FlowDraft, priority: u16) -> Vec<FlowSpec> {
    draft
        .path
        .hops
        .iter()
        .enumerate()
        .map(|(index, hop)| FlowSpec {
            name: flow_name(&draft.handler, index),
            switch: hop.switch,
            priority,
            matches: FlowMatch {
                in_port: Some(hop.ingress),
                eth_src: Some(draft.eth_src),
                ipv4_dst: draft.ipv4_dst,
                ip_proto: draft.protocol.ip_proto(),
                tp_dst: draft.port,
            },
            output: hop.egress,
        })
        .collect()
}

// Delete `flows` in reverse order, returning those that could not be
// deleted along with the reason.
async fn delete_flows(
    controller: &dyn Controller,
    timeout: Duration,
    log: &Logger,
    flows: &[FlowSpec],
) -> Vec<(FlowSpec, ClientError)> {
    let mut failed = Vec::new();
    for flow in flows.iter().rev() {
        match bounded(timeout, controller.delete_flow(&flow.name)).await {
            Ok(()) => debug!(log, "deleted flow"; "flow" => &flow.name),
            Err(e) => {
                debug!(log, "failed to delete flow";
                    "flow" => &flow.name,
                    "error" => %e);
                failed.push((flow.clone(), e));
            }
        }
    }
    failed.reverse();
    failed
}

/// Tracks the rules pushed during one install attempt.  If dropped while
/// still armed, deletes them in the background.
struct Rollback {
    controller: Arc<dyn Controller>,
    timeout: Duration,
    log: Logger,
    pushed: Vec<FlowSpec>,
    armed: bool,
}

impl Rollback {
    fn new(
        controller: Arc<dyn Controller>,
        timeout: Duration,
        log: &Logger,
    ) -> Self {
        Rollback {
            controller,
            timeout,
            log: log.clone(),
            pushed: Vec::new(),
            armed: true,
        }
    }

    // Record a rule before the request to install it is sent: once sent, a
    // rule may be programmed even if no reply ever arrives.
    fn track(&mut self, flow: &FlowSpec) {
        self.pushed.push(flow.clone());
    }

    fn commit(mut self) -> InstalledFlowSet {
        self.armed = false;
        InstalledFlowSet {
            flows: std::mem::take(&mut self.pushed),
        }
    }

    // The attempt failed without programming anything.
    fn abandon(mut self, error: CnError) -> InstallFailure {
        self.armed = false;
        InstallFailure {
            error,
            stranded: InstalledFlowSet::default(),
        }
    }

    // Rules leave `pushed` only once deleted, and the guard stays armed
    // until every delete has been tried.  If the unwind is itself dropped,
    // `Drop` finishes it.
    async fn unwind(mut self, initial: CnError) -> InstallFailure {
        warn!(self.log, "rolling back install";
            "error" => %initial,
            "flows" => self.pushed.len());

        let mut failed = Vec::new();
        for index in (0..self.pushed.len()).rev() {
            let name = self.pushed[index].name.clone();
            match bounded(self.timeout, self.controller.delete_flow(&name))
                .await
            {
                Ok(()) => {
                    debug!(self.log, "deleted flow"; "flow" => &name);
                    self.pushed.remove(index);
                }
                Err(e) => {
                    debug!(self.log, "failed to delete flow";
                        "flow" => &name,
                        "error" => %e);
                    failed.push((name, e));
                }
            }
        }
        self.armed = false;
        let stranded = InstalledFlowSet {
            flows: std::mem::take(&mut self.pushed),
        };

        // Deletes ran in reverse, so the first failing hop is last.
        let Some((flow_id, cause)) = failed.pop() else {
            return InstallFailure {
                error: initial,
                stranded,
            };
        };
        let unwind = CnError::WithdrawalFailed {
            flow_id,
            cause: cause.to_string(),
        };
        error!(self.log, "rollback failed";
            "error" => %initial,
            "unwind" => %unwind,
            "stranded" => stranded.len());
        InstallFailure {
            error: CnError::Unwind {
                initial: Box::new(initial),
                unwind: Box::new(unwind),
            },
            stranded,
        }
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed || self.pushed.is_empty() {
            return;
        }
        let flows = std::mem::take(&mut self.pushed);
        let names: Vec<String> = flows.iter().map(|f| f.name.clone()).collect();
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            error!(self.log, "install cancelled outside a runtime";
                "stranded" => ?names);
            return;
        };

        warn!(self.log, "install cancelled, rolling back"; "flows" => ?names);
        let controller = self.controller.clone();
        let timeout = self.timeout;
        let log = self.log.clone();
        rt.spawn(async move {
            let failed =
                delete_flows(&*controller, timeout, &log, &flows).await;
            if !failed.is_empty() {
                let names: Vec<&str> =
                    failed.iter().map(|(f, _)| f.name.as_str()).collect();
                error!(log, "rollback of cancelled install failed";
                    "stranded" => ?names);
            }
        });
    }
}

/// Programs and removes the rules realizing connections.
pub struct FlowEngine {
    controller: Arc<dyn Controller>,
    priority: u16,
    timeout: Duration,
    verify: bool,
    log: Logger,
}

impl FlowEngine {
    pub fn new(
        controller: Arc<dyn Controller>,
        priority: u16,
        timeout: Duration,
        verify: bool,
        log: &Logger,
    ) -> Self {
        FlowEngine {
            controller,
            priority,
            timeout,
            verify,
            log: log.new(o!("unit" => "flows")),
        }
    }

    /// Install the rules for `draft`.
    ///
    /// On success every rule is programmed.  On failure none of them are,
    /// except for those listed in [`InstallFailure::stranded`].
    pub async fn install(
        &self,
        draft: &FlowDraft,
    ) -> Result<InstalledFlowSet, InstallFailure> {
        let log = self.log.new(o!("handler" => draft.handler.clone()));
        let specs = flow_specs(draft, self.priority);
        if specs.is_empty() {
            debug!(log, "local path, no flows to install");
            return Ok(InstalledFlowSet::default());
        }

        let mut rollback =
            Rollback::new(self.controller.clone(), self.timeout, &log);
        match self.controller.dialect() {
            Dialect::PerHop => {
                for (hop, spec) in specs.iter().enumerate() {
                    rollback.track(spec);
                    if let Err(e) =
                        bounded(self.timeout, self.controller.push_flow(spec))
                            .await
                    {
                        let initial = CnError::InstallationFailed {
                            hop,
                            cause: e.to_string(),
                        };
                        return Err(rollback.unwind(initial).await);
                    }
                    debug!(log, "installed flow";
                        "hop" => hop,
                        "flow" => &spec.name,
                        "switch" => %spec.switch);
                }
            }
            Dialect::Path => {
                for spec in &specs {
                    rollback.track(spec);
                }
                match bounded(self.timeout, self.controller.push_path(&specs))
                    .await
                {
                    Ok(()) => {
                        debug!(log, "installed path"; "flows" => specs.len())
                    }
                    // The controller may still apply the path after we stop
                    // waiting for it.
                    Err(ClientError::Timeout) => {
                        let initial = CnError::InstallationFailed {
                            hop: 0,
                            cause: ClientError::Timeout.to_string(),
                        };
                        return Err(rollback.unwind(initial).await);
                    }
                    Err(e) => {
                        return Err(rollback.abandon(
                            CnError::InstallationFailed {
                                hop: 0,
                                cause: e.to_string(),
                            },
                        ));
                    }
                }
            }
        }

        if self.verify {
            if let Err(initial) = self.verify(&specs).await {
                return Err(rollback.unwind(initial).await);
            }
        }
        Ok(rollback.commit())
    }

    // Confirm each rule is present on its switch.
    async fn verify(&self, specs: &[FlowSpec]) -> Result<(), CnError> {
        let switches: BTreeSet<Dpid> = specs.iter().map(|s| s.switch).collect();
        for switch in switches {
            let first_hop = specs
                .iter()
                .position(|s| s.switch == switch)
                .unwrap_or_default();
            let present: BTreeSet<String> =
                bounded(self.timeout, self.controller.flow_names(switch))
                    .await
                    .map_err(|e| CnError::InstallationFailed {
                        hop: first_hop,
                        cause: format!("verification failed: {e}"),
                    })?
                    .into_iter()
                    .collect();
            if let Some((hop, missing)) = specs
                .iter()
                .enumerate()
                .find(|(_, s)| s.switch == switch && !present.contains(&s.name))
            {
                return Err(CnError::InstallationFailed {
                    hop,
                    cause: format!(
                        "flow {} not present on {switch} after install",
                        missing.name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Delete every rule in `set`.  Rules already absent are not an error.
    /// Every rule is attempted; the first failure is reported.
    pub async fn withdraw(
        &self,
        set: &InstalledFlowSet,
    ) -> Result<(), CnError> {
        let failed =
            delete_flows(&*self.controller, self.timeout, &self.log, &set.flows)
                .await;
        match failed.into_iter().next() {
            None => Ok(()),
            Some((flow, cause)) => Err(CnError::WithdrawalFailed {
                flow_id: flow.name,
                cause: cause.to_string(),
            }),
        }
    }
}

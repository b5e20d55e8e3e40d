// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! The record of live connections.
//!
//! The registry sequences the provisioning of a connection: catalog lookup,
//! authorization, endpoint resolution, path computation and flow
//! installation.  A connection's handler is reserved before any controller
//! request is made, so concurrent attempts to create the same connection
//! cannot both reach the controller.  A reserved connection is invisible to
//! [`Registry::get`] and [`Registry::list`] until it is fully installed.
//!
//! Authorization is checked only when a connection is created.  Changes to
//! the catalog afterwards, such as a course closing or a student leaving it,
//! do not affect connections that already exist; they must be removed
//! explicitly.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;
use sdn_client::Controller;
use serde::Serialize;
use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::Logger;

use crate::authz::authorize;
use crate::authz::Authorization;
use crate::catalog::CatalogStore;
use crate::catalog::Service;
use crate::config::Config;
use crate::flows::FlowDraft;
use crate::flows::FlowEngine;
use crate::flows::InstallFailure;
use crate::flows::InstalledFlowSet;
use crate::topology::Endpoint;
use crate::topology::Path;
use crate::topology::Topology;
use crate::types::CnError;
use crate::types::CnResult;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Being provisioned.
    Pending,
    /// Every flow rule is installed.
    Active,
    /// Some flow rules could not be removed.  Removing the connection again
    /// retries the withdrawal.
    Failed,
    /// Withdrawn and no longer registered.
    TornDown,
}

/// Access granted to a student for one service on one server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub handler: String,
    pub student: String,
    pub server: String,
    pub service: Service,
    /// The course that granted access when the connection was created.
    pub course: String,
    pub path: Path,
    pub flows: InstalledFlowSet,
    pub state: ConnectionState,
    pub created: DateTime<Utc>,
}

/// The handler naming the connection of `student` to `service` on `server`.
pub fn handler(student: &str, server: &str, service: &str) -> String {
    format!("{student}-{server}-{service}")
}

enum Slot {
    Reserved,
    Live { conn: Connection, busy: bool },
}

type Slots = Mutex<BTreeMap<String, Slot>>;

// Holds a handler while its connection is provisioned.  Dropping the
// reservation without filling it releases the handler.
struct Reservation<'a> {
    slots: &'a Slots,
    handler: String,
    filled: bool,
}

impl Reservation<'_> {
    fn fill(mut self, conn: Connection) {
        self.filled = true;
        self.slots
            .lock()
            .insert(self.handler.clone(), Slot::Live { conn, busy: false });
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.filled {
            self.slots.lock().remove(&self.handler);
        }
    }
}

// Marks a connection busy while its flows are withdrawn.  If the teardown
// is abandoned the connection is left as it was.
struct Teardown<'a> {
    slots: &'a Slots,
    handler: String,
    done: bool,
}

impl Teardown<'_> {
    fn finish(mut self, rval: &CnResult<()>) {
        self.done = true;
        let mut slots = self.slots.lock();
        match rval {
            Ok(()) => {
                slots.remove(&self.handler);
            }
            Err(_) => {
                if let Some(Slot::Live { conn, busy }) =
                    slots.get_mut(&self.handler)
                {
                    conn.state = ConnectionState::Failed;
                    *busy = false;
                }
            }
        }
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(Slot::Live { busy, .. }) =
            self.slots.lock().get_mut(&self.handler)
        {
            *busy = false;
        }
    }
}

/// Outcome of [`Registry::cleanup`].
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub removed: Vec<String>,
    pub failed: Vec<(String, CnError)>,
}

/// The authoritative record of connections.
pub struct Registry {
    catalog: Arc<CatalogStore>,
    topology: Topology,
    engine: FlowEngine,
    slots: Slots,
    log: Logger,
}

impl Registry {
    pub fn new(
        catalog: Arc<CatalogStore>,
        topology: Topology,
        engine: FlowEngine,
        log: &Logger,
    ) -> Self {
        Registry {
            catalog,
            topology,
            engine,
            slots: Mutex::new(BTreeMap::new()),
            log: log.new(o!("unit" => "registry")),
        }
    }

    /// Build a registry provisioning through `controller` with the
    /// settings in `config`.
    pub fn from_config(
        config: &Config,
        controller: Arc<dyn Controller>,
        catalog: Arc<CatalogStore>,
        log: &Logger,
    ) -> Self {
        let topology = Topology::new(
            controller.clone(),
            config.attachment_selection,
            config.timeout(),
            log,
        );
        let engine = FlowEngine::new(
            controller,
            config.flow_priority,
            config.timeout(),
            config.verify_installs,
            log,
        );
        Registry::new(catalog, topology, engine, log)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn reserve(&self, handler: &str) -> CnResult<Reservation<'_>> {
        let mut slots = self.slots.lock();
        if slots.contains_key(handler) {
            return Err(CnError::DuplicateHandler(handler.to_string()));
        }
        slots.insert(handler.to_string(), Slot::Reserved);
        Ok(Reservation {
            slots: &self.slots,
            handler: handler.to_string(),
            filled: false,
        })
    }

    /// Grant `student` access to `service` on `server`.
    ///
    /// Either the returned connection is active with all of its flow rules
    /// installed, or nothing is registered and nothing is left installed.
    /// The one exception is a failed install whose rollback also failed:
    /// the leftover rules are then recorded in a `Failed` connection, which
    /// [`Registry::remove`] can clean up.
    pub async fn create(
        &self,
        student: &str,
        server: &str,
        service: &str,
    ) -> CnResult<Connection> {
        let catalog = self.catalog.snapshot();
        let stu = catalog
            .student(student)
            .ok_or_else(|| CnError::Missing(format!("student {student}")))?;
        let srv = catalog
            .server(server)
            .ok_or_else(|| CnError::Missing(format!("server {server}")))?;

        let decision = authorize(&catalog, student, server, service);
        debug!(self.log, "authorization decision";
            "student" => student,
            "server" => server,
            "service" => service,
            "decision" => ?decision);
        let (course, service) = match decision {
            Authorization::Granted { course, service } => (course, service),
            Authorization::Denied(reason) => {
                return Err(CnError::AuthorizationDenied {
                    student: student.to_string(),
                    server: server.to_string(),
                    service: service.to_string(),
                    reason,
                });
            }
        };

        let handler = handler(student, server, &service.name);
        let reservation = self.reserve(&handler)?;
        debug!(self.log, "reserved handler"; "handler" => &handler);

        let src = self
            .topology
            .resolve_attachment_point(&Endpoint::Mac(stu.mac))
            .await?;
        let dst = self
            .topology
            .resolve_attachment_point(&Endpoint::Ipv4(srv.address))
            .await?;
        let path = self.topology.compute_route(src, dst).await?;

        let draft = FlowDraft {
            handler: handler.clone(),
            eth_src: stu.mac,
            ipv4_dst: srv.address,
            protocol: service.protocol,
            port: service.port,
            path: path.clone(),
        };
        let mut conn = Connection {
            handler: handler.clone(),
            student: student.to_string(),
            server: server.to_string(),
            service,
            course,
            path,
            flows: InstalledFlowSet::default(),
            state: ConnectionState::Pending,
            created: Utc::now(),
        };

        match self.engine.install(&draft).await {
            Ok(flows) => {
                conn.flows = flows;
                conn.state = ConnectionState::Active;
                reservation.fill(conn.clone());
                info!(self.log, "connection created";
                    "handler" => &handler,
                    "course" => &conn.course,
                    "flows" => conn.flows.len());
                Ok(conn)
            }
            Err(InstallFailure { error, stranded }) => {
                if !stranded.is_empty() {
                    error!(self.log, "recording connection with stranded flows";
                        "handler" => &handler,
                        "flows" => ?stranded.names().collect::<Vec<_>>());
                    conn.flows = stranded;
                    conn.state = ConnectionState::Failed;
                    reservation.fill(conn);
                }
                Err(error)
            }
        }
    }

    /// The connection named `handler`.
    pub fn get(&self, handler: &str) -> CnResult<Connection> {
        match self.slots.lock().get(handler) {
            Some(Slot::Live { conn, .. }) => Ok(conn.clone()),
            _ => Err(CnError::ConnectionNotFound(handler.to_string())),
        }
    }

    /// Every registered connection, in handler order.
    pub fn list(&self) -> Vec<Connection> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Live { conn, .. } => Some(conn.clone()),
                Slot::Reserved => None,
            })
            .collect()
    }

    /// Withdraw the flow rules of connection `handler` and forget it.
    ///
    /// If the rules cannot all be withdrawn the connection stays registered
    /// in the `Failed` state and the call may be retried.
    pub async fn remove(&self, handler: &str) -> CnResult<Connection> {
        let (mut conn, teardown) = {
            let mut slots = self.slots.lock();
            match slots.get_mut(handler) {
                None => {
                    return Err(CnError::ConnectionNotFound(handler.to_string()))
                }
                Some(Slot::Reserved) | Some(Slot::Live { busy: true, .. }) => {
                    return Err(CnError::Busy(format!(
                        "connection {handler} is being provisioned or torn down"
                    )))
                }
                Some(Slot::Live { conn, busy }) => {
                    *busy = true;
                    let teardown = Teardown {
                        slots: &self.slots,
                        handler: handler.to_string(),
                        done: false,
                    };
                    (conn.clone(), teardown)
                }
            }
        };

        let rval = self.engine.withdraw(&conn.flows).await;
        teardown.finish(&rval);
        match rval {
            Ok(()) => {
                info!(self.log, "connection torn down"; "handler" => handler);
                conn.state = ConnectionState::TornDown;
                Ok(conn)
            }
            Err(e) => {
                error!(self.log, "teardown failed";
                    "handler" => handler,
                    "error" => %e);
                Err(e)
            }
        }
    }

    /// Remove every registered connection.
    pub async fn cleanup(&self) -> CleanupSummary {
        let handlers: Vec<String> =
            self.list().into_iter().map(|c| c.handler).collect();
        let mut summary = CleanupSummary::default();
        for handler in handlers {
            match self.remove(&handler).await {
                Ok(_) => summary.removed.push(handler),
                Err(e) => summary.failed.push((handler, e)),
            }
        }
        info!(self.log, "cleanup complete";
            "removed" => summary.removed.len(),
            "failed" => summary.failed.len());
        summary
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Enrollment-based network access provisioning.
//!
//! Given a catalog of students, courses and servers, this crate decides
//! whether a student may reach a service on a server and, if so, programs
//! the flow rules that allow the traffic along the path reported by an SDN
//! controller.  The pieces, leaves first:
//!
//! - [`catalog`]: the students, courses and servers, and a store handing
//!   out immutable snapshots of them.
//! - [`authz`]: the access policy, a pure function over a catalog snapshot.
//! - [`topology`]: attachment point resolution and path computation.
//! - [`flows`]: flow rule installation, verification and withdrawal.
//! - [`registry`]: the record of live connections, which sequences the
//!   steps above.

use std::future::Future;
use std::time::Duration;

use sdn_client::ClientError;
use sdn_client::ClientResult;

pub mod authz;
pub mod catalog;
pub mod config;
pub mod flows;
pub mod registry;
pub mod topology;
pub mod types;

#[cfg(test)]
mod fake;

pub use registry::Connection;
pub use registry::ConnectionState;
pub use registry::Registry;
pub use types::CnError;
pub use types::CnResult;

/// Run a controller request, giving up after `timeout`.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    request: F,
) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(rval) => rval,
        Err(_) => Err(ClientError::Timeout),
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Types and helpers shared by the coursenet crates.

pub mod logging;
pub mod network;

/// Port on which a Floodlight controller exposes its REST API by default.
pub const DEFAULT_CONTROLLER_PORT: u16 = 8080;

/// URL of a controller running on the local host.
pub fn default_controller_url() -> String {
    format!("http://127.0.0.1:{DEFAULT_CONTROLLER_PORT}")
}

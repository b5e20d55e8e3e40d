// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

use std::io::stdout;
use std::io::Write;

use anyhow::Context;
use colored::*;
use tabwriter::TabWriter;

use sdn_client::Device;

use crate::Ctx;

fn join<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

/// One row per attachment point; hosts the controller has not placed get a
/// single row.
pub(crate) fn devices<W: Write>(
    w: W,
    devices: &[Device],
) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "MAC".underline(),
        "IPv4".underline(),
        "Switch".underline(),
        "Port".underline(),
    )?;
    for d in devices {
        let macs = join(&d.macs);
        let ips = join(&d.ipv4);
        if d.attachment_points.is_empty() {
            writeln!(&mut tw, "{macs}\t{ips}\t-\t-")?;
        }
        for ap in &d.attachment_points {
            writeln!(&mut tw, "{macs}\t{ips}\t{}\t{}", ap.switch, ap.port)?;
        }
    }
    tw.flush()?;
    Ok(())
}

pub(crate) async fn devices_cmd(ctx: &Ctx) -> anyhow::Result<()> {
    let list = ctx
        .registry
        .topology()
        .devices()
        .await
        .context("failed to list devices")?;
    devices(stdout(), &list)
}

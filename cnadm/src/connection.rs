// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

use std::io::stdout;
use std::io::Write;

use anyhow::Context;
use colored::*;
use structopt::*;
use tabwriter::TabWriter;

use coursenet::Connection;

use crate::Ctx;

#[derive(Debug, StructOpt)]
#[structopt(about = "manage student connections")]
pub enum ConnectionCmd {
    #[structopt(about = "grant a student access to a service on a server")]
    Create {
        student: String,
        server: String,
        service: String,
    },
    #[structopt(about = "list connections", alias = "ls")]
    List,
    #[structopt(about = "show a connection with its path and flows")]
    Get { handler: String },
    #[structopt(about = "withdraw a connection", alias = "rm")]
    Remove { handler: String },
    #[structopt(about = "withdraw every connection")]
    Cleanup,
}

pub(crate) fn list<W: Write>(w: W, conns: &[Connection]) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        "Handler".underline(),
        "Student".underline(),
        "Server".underline(),
        "Service".underline(),
        "State".underline(),
        "Flows".underline(),
        "Created".underline(),
    )?;
    for c in conns {
        writeln!(
            &mut tw,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            c.handler,
            c.student,
            c.server,
            c.service.name,
            c.state,
            c.flows.len(),
            c.created.format("%Y-%m-%d %H:%M:%S"),
        )?;
    }
    tw.flush()?;
    Ok(())
}

pub(crate) fn detail<W: Write>(mut w: W, c: &Connection) -> anyhow::Result<()> {
    writeln!(w, "handler: {}", c.handler)?;
    writeln!(w, "student: {}", c.student)?;
    writeln!(w, "server:  {}", c.server)?;
    writeln!(w, "service: {}", c.service)?;
    writeln!(w, "course:  {}", c.course)?;
    writeln!(w, "state:   {}", c.state)?;
    writeln!(w, "created: {}", c.created.to_rfc3339())?;
    writeln!(w, "path:    {}", c.path)?;
    if c.flows.is_empty() {
        return Ok(());
    }

    writeln!(w)?;
    let mut tw = TabWriter::new(&mut w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "Flow".underline(),
        "Switch".underline(),
        "In port".underline(),
        "Out port".underline(),
    )?;
    for f in &c.flows.flows {
        writeln!(
            &mut tw,
            "{}\t{}\t{}\t{}",
            f.name,
            f.switch,
            f.matches.in_port.map_or("-".to_string(), |p| p.to_string()),
            f.output,
        )?;
    }
    tw.flush()?;
    Ok(())
}

pub(crate) async fn connection_cmd(
    ctx: &Ctx,
    cmd: ConnectionCmd,
) -> anyhow::Result<()> {
    match cmd {
        ConnectionCmd::Create { student, server, service } => {
            let conn = ctx
                .registry
                .create(&student, &server, &service)
                .await
                .context("failed to create connection")?;
            println!(
                "connection {} {} with {} flows",
                conn.handler,
                "created".green(),
                conn.flows.len()
            );
        }
        ConnectionCmd::List => list(stdout(), &ctx.registry.list())?,
        ConnectionCmd::Get { handler } => {
            let conn = ctx
                .registry
                .get(&handler)
                .context("failed to get connection")?;
            detail(stdout(), &conn)?;
        }
        ConnectionCmd::Remove { handler } => {
            ctx.registry
                .remove(&handler)
                .await
                .context("failed to remove connection")?;
            println!("connection {handler} {}", "removed".green());
        }
        ConnectionCmd::Cleanup => {
            let summary = ctx.registry.cleanup().await;
            println!("removed {} connections", summary.removed.len());
            for (handler, e) in &summary.failed {
                println!("{} {handler}: {e}", "failed".red());
            }
        }
    }
    Ok(())
}

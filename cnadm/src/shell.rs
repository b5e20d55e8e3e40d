// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! The interactive session.  Connections are held by the process, so
//! creating and removing them only makes sense here.

use std::io::stdout;
use std::io::Write;

use colored::*;
use slog::info;
use structopt::clap::AppSettings;
use structopt::*;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use crate::catalog;
use crate::catalog::CatalogCmd;
use crate::catalog::CourseCmd;
use crate::connection;
use crate::connection::ConnectionCmd;
use crate::devices;
use crate::Ctx;

#[derive(Debug, StructOpt)]
#[structopt(name = "cnadm", setting = AppSettings::NoBinaryName)]
enum ShellCmd {
    /// List the hosts known to the controller.
    Devices,
    Catalog(CatalogCmd),
    Course(CourseCmd),
    /// Check whether a student may reach a service on a server.
    Authorize {
        student: String,
        server: String,
        service: String,
    },
    #[structopt(visible_alias = "conn")]
    Connection(ConnectionCmd),
    /// Leave the shell.  Connections are not torn down.
    #[structopt(visible_alias = "quit")]
    Exit,
}

fn parse_line(line: &str) -> Option<Result<ShellCmd, structopt::clap::Error>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    Some(ShellCmd::from_iter_safe(words))
}

pub(crate) async fn run(ctx: &Ctx) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("cnadm> ");
        stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let cmd = match parse_line(&line) {
            None => continue,
            Some(Err(e)) => {
                println!("{}", e.message);
                continue;
            }
            Some(Ok(cmd)) => cmd,
        };
        let rval = match cmd {
            ShellCmd::Devices => devices::devices_cmd(ctx).await,
            ShellCmd::Catalog(c) => catalog::catalog_cmd(ctx, c),
            ShellCmd::Course(c) => catalog::course_cmd(ctx, c),
            ShellCmd::Authorize { student, server, service } => {
                catalog::authorize_cmd(ctx, &student, &server, &service)
            }
            ShellCmd::Connection(c) => {
                connection::connection_cmd(ctx, c).await
            }
            ShellCmd::Exit => break,
        };
        if let Err(e) = rval {
            eprintln!("{}: {e:#}", "error".red());
        }
    }

    let live = ctx.registry.list().len();
    if live > 0 {
        info!(ctx.log, "leaving shell with connections in place";
            "connections" => live);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ShellCmd {
        match parse_line(line) {
            Some(Ok(cmd)) => cmd,
            other => panic!("failed to parse {line:?}: {other:?}"),
        }
    }

    #[test]
    fn test_parse() {
        assert!(parse_line("   ").is_none());
        assert!(matches!(parse("exit"), ShellCmd::Exit));
        assert!(matches!(parse("quit"), ShellCmd::Exit));
        assert!(matches!(parse("devices"), ShellCmd::Devices));
        assert!(matches!(
            parse("catalog course C1"),
            ShellCmd::Catalog(CatalogCmd::Course { id }) if id == "C1"
        ));
        assert!(matches!(
            parse("connection create S1 SRV1 ssh"),
            ShellCmd::Connection(ConnectionCmd::Create { student, .. })
                if student == "S1"
        ));
        assert!(matches!(
            parse("conn rm S1-SRV1-ssh"),
            ShellCmd::Connection(ConnectionCmd::Remove { handler })
                if handler == "S1-SRV1-ssh"
        ));
        assert!(matches!(
            parse("catalog import roster.yaml"),
            ShellCmd::Catalog(CatalogCmd::Import { file })
                if file == "roster.yaml"
        ));
        assert!(matches!(
            parse("course enroll C1 S2"),
            ShellCmd::Course(CourseCmd::Enroll { course, student })
                if course == "C1" && student == "S2"
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_line("frobnicate"), Some(Err(_))));
        assert!(matches!(parse_line("connection create S1"), Some(Err(_))));
    }
}

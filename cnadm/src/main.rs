// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

use std::sync::Arc;

use anyhow::Context;
use slog::info;
use slog::Logger;
use structopt::*;

use coursenet::authz::AuthorizationResolver;
use coursenet::catalog::Catalog;
use coursenet::catalog::CatalogStore;
use coursenet::config::Config;
use coursenet::Registry;
use sdn_client::Floodlight;

mod catalog;
mod config;
mod connection;
mod devices;
mod shell;

/// Settings shared by every command.
#[derive(Debug, Default, StructOpt)]
pub(crate) struct Opt {
    #[structopt(long, help = "read settings from the named TOML file")]
    config: Option<String>,

    #[structopt(
        short,
        long,
        help = "base URL of the SDN controller's REST API"
    )]
    controller: Option<String>,

    #[structopt(
        long,
        help = "bound on each controller request, in milliseconds"
    )]
    controller_timeout: Option<u64>,

    #[structopt(
        long,
        help = "send log data to the named file rather than stdout"
    )]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: Option<common::logging::LogFormat>,

    #[structopt(long, help = "catalog document to load")]
    catalog: Option<String>,

    #[structopt(
        long,
        help = "attachment point to use for multi-homed hosts: first or last"
    )]
    attachment_selection: Option<coursenet::topology::AttachmentSelection>,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cnadm",
    about = "grants students access to lab servers through an SDN controller",
    version = "0.1.0"
)]
struct GlobalOpts {
    #[structopt(flatten)]
    opt: Opt,

    #[structopt(subcommand)]
    cmd: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    /// List the hosts known to the controller.
    Devices,
    Catalog(catalog::CatalogCmd),
    /// Check whether a student may reach a service on a server.
    Authorize {
        student: String,
        server: String,
        service: String,
    },
    /// Start an interactive session.  Connections live as long as it does.
    Shell,
}

/// Everything a command may need.
pub(crate) struct Ctx {
    pub log: Logger,
    pub catalog: Arc<CatalogStore>,
    pub resolver: AuthorizationResolver,
    pub registry: Registry,
}

impl Ctx {
    fn new(config: &Config, log: Logger) -> anyhow::Result<Ctx> {
        let catalog = match &config.catalog {
            Some(path) => Catalog::load(path, &log)
                .with_context(|| format!("failed to load catalog {path}"))?,
            None => Catalog::default(),
        };
        let catalog = Arc::new(CatalogStore::new(catalog));
        let controller = Floodlight::new(
            &config.controller_url,
            config.timeout(),
            log.clone(),
        )
        .context("failed to build controller client")?;

        let resolver = AuthorizationResolver::new(catalog.clone(), &log);
        let registry = Registry::from_config(
            config,
            Arc::new(controller),
            catalog.clone(),
            &log,
        );
        Ok(Ctx { log, catalog, resolver, registry })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = GlobalOpts::from_args();
    let config = config::build_config(&opts.opt)?;
    let log =
        common::logging::init("cnadm", &config.log_file, config.log_format)?;
    info!(log, "starting";
        "controller" => &config.controller_url,
        "catalog" => ?config.catalog);

    let ctx = Ctx::new(&config, log)?;
    match opts.cmd {
        Commands::Devices => devices::devices_cmd(&ctx).await,
        Commands::Catalog(c) => catalog::catalog_cmd(&ctx, c),
        Commands::Authorize { student, server, service } => {
            catalog::authorize_cmd(&ctx, &student, &server, &service)
        }
        Commands::Shell => shell::run(&ctx).await,
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Assembling the run-time config from a file and the command line.

use anyhow::Context;
use coursenet::config::Config;

use crate::Opt;

// Use the command-line arguments to update the run-time config.
fn update_from_cli(opts: &Opt, config: &mut Config) {
    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }

    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }

    if let Some(controller) = &opts.controller {
        config.controller_url = controller.trim_end_matches('/').to_string();
    }

    if let Some(timeout) = opts.controller_timeout {
        config.controller_timeout = timeout;
    }

    if let Some(catalog) = &opts.catalog {
        config.catalog = Some(catalog.to_string());
    }

    if let Some(selection) = opts.attachment_selection {
        config.attachment_selection = selection;
    }
}

/// Build the config: defaults, overridden by the config file if one is
/// named, overridden in turn by any command-line options.
pub(crate) fn build_config(opts: &Opt) -> anyhow::Result<Config> {
    let mut config = match &opts.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to read config {path}"))?,
        None => Config::default(),
    };
    update_from_cli(opts, &mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

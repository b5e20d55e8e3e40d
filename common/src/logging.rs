// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Root logger construction for the coursenet binaries.

use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use slog::o;
use slog::Drain;
use slog::Logger;

/// Output log info in unstructured text or json?
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "human" => Ok(LogFormat::Human),
            "j" | "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

fn async_root<D>(drain: D, name: &'static str) -> Logger
where
    D: Drain<Ok = (), Err = std::io::Error> + Send + 'static,
{
    let drain = slog_async::Async::new(drain.fuse())
        .chan_size(0x2000)
        .build()
        .fuse();
    Logger::root(drain, o!("component" => name))
}

/// Build the root logger for `name`.  If `log_file` is set, records are
/// appended to that file, otherwise they go to stdout.
pub fn init(
    name: &'static str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<Logger> {
    let log = match (log_file, log_format) {
        (Some(path), LogFormat::Json) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            let drain = slog_bunyan::with_name(name, file).build();
            async_root(drain, name)
        }
        (Some(path), LogFormat::Human) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            let decorator = slog_term::PlainDecorator::new(file);
            let drain = slog_term::FullFormat::new(decorator).build();
            async_root(drain, name)
        }
        (None, LogFormat::Json) => {
            let drain =
                slog_bunyan::with_name(name, std::io::stdout()).build();
            async_root(drain, name)
        }
        (None, LogFormat::Human) => {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build();
            async_root(drain, name)
        }
    };
    Ok(log)
}

/// A logger that writes through the test harness' captured stdout.
pub fn test_logger() -> Logger {
    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    Logger::root(drain, o!())
}

#[cfg(test)]
mod tests {
    use super::init;
    use super::LogFormat;
    use slog::info;

    fn log_to_file(format: LogFormat, tag: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "coursenet-log-{tag}-{}.log",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let file = Some(path.to_string_lossy().into_owned());

        let log = init("cnadm-test", &file, format).unwrap();
        info!(log, "logger ready"; "tag" => tag);
        // Dropping the last handle flushes the async drain.
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        contents
    }

    #[test]
    fn test_init_json_file() {
        let out = log_to_file(LogFormat::Json, "json");
        let line = out.lines().next().unwrap();
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(record["name"], "cnadm-test");
        assert_eq!(record["msg"], "logger ready");
        assert_eq!(record["component"], "cnadm-test");
    }

    #[test]
    fn test_init_human_file() {
        let out = log_to_file(LogFormat::Human, "human");
        assert!(out.contains("logger ready"));
        assert!(out.contains("component: cnadm-test"));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Human".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert_eq!("h".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

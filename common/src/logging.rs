// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Root logger construction shared by everything that embeds the snooper.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use slog::Drain;

/// How log records are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Unstructured text, one record per line.
    Human,
    /// Bunyan-style JSON, one object per line.
    #[default]
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

fn async_drain<W>(out: W, log_format: LogFormat) -> slog_async::Async
where
    W: Write + Send + 'static,
{
    match log_format {
        LogFormat::Human => {
            let decorator = slog_term::PlainDecorator::new(out);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            slog_async::Async::new(drain).build()
        }
        LogFormat::Json => {
            let drain = slog_bunyan::new(out).build().fuse();
            slog_async::Async::new(drain).build()
        }
    }
}

/// Build the root logger for the named component.  If `log_file` is set,
/// records are appended to that file, otherwise they go to stdout.
pub fn init(
    name: &str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let drain = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            async_drain(file, log_format)
        }
        None => async_drain(std::io::stdout(), log_format),
    };

    Ok(slog::Logger::root(
        drain.fuse(),
        slog::o!("component" => name.to_string()),
    ))
}

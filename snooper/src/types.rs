// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the snooper.

use std::convert;

use aal::AsicError;
use common::ports::PortNo;

pub type SnoopResult<T> = Result<T, SnoopError>;

#[derive(Debug, thiserror::Error)]
pub enum SnoopError {
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("ASIC error: {0:?}")]
    Switch(AsicError),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("Port {port} is outside the valid range 0-{port_max}")]
    InvalidPort { port: PortNo, port_max: PortNo },
    #[error("Table {0} is full")]
    TableFull(String),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Error: {0}")]
    Other(String),
}

impl convert::From<std::io::Error> for SnoopError {
    fn from(err: std::io::Error) -> Self {
        SnoopError::Io(err)
    }
}

impl convert::From<toml::de::Error> for SnoopError {
    fn from(err: toml::de::Error) -> Self {
        SnoopError::Config(err.to_string())
    }
}

impl convert::From<AsicError> for SnoopError {
    fn from(err: AsicError) -> Self {
        SnoopError::Switch(err)
    }
}

impl convert::From<anyhow::Error> for SnoopError {
    fn from(err: anyhow::Error) -> Self {
        SnoopError::Other(err.to_string())
    }
}

impl convert::From<String> for SnoopError {
    fn from(err: String) -> Self {
        SnoopError::Other(err)
    }
}

impl convert::From<&str> for SnoopError {
    fn from(err: &str) -> Self {
        SnoopError::Other(err.to_string())
    }
}

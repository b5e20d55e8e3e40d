// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! General types used throughout coursenet.

use std::convert;

use crate::authz::Denial;
use crate::catalog::CatalogError;

pub type CnResult<T> = Result<T, CnError>;

fn with_cause(cause: &Option<String>) -> String {
    match cause {
        Some(c) => format!(": {c}"),
        None => String::new(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CnError {
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("Resource is missing: {0}")]
    Missing(String),
    #[error("Resource is busy: {0}")]
    Busy(String),
    #[error(
        "student {student} may not reach {service} on {server}: {reason}"
    )]
    AuthorizationDenied {
        student: String,
        server: String,
        service: String,
        reason: Denial,
    },
    #[error("no attachment point found for {identifier}{}", with_cause(.cause))]
    EndpointNotFound {
        identifier: String,
        cause: Option<String>,
    },
    #[error("no route from {src} to {dst}{}", with_cause(.cause))]
    NoRouteAvailable {
        src: String,
        dst: String,
        cause: Option<String>,
    },
    #[error("controller unreachable: {cause}")]
    ControllerUnreachable { cause: String },
    #[error("failed to install flow for hop {hop}: {cause}")]
    InstallationFailed { hop: usize, cause: String },
    #[error("failed to withdraw flow {flow_id}: {cause}")]
    WithdrawalFailed { flow_id: String, cause: String },
    #[error("connection {0} already exists")]
    DuplicateHandler(String),
    #[error("connection {0} not found")]
    ConnectionNotFound(String),
    #[error("Unwind: initial: {initial}, unwind: {unwind}")]
    Unwind {
        initial: Box<CnError>,
        unwind: Box<CnError>,
    },
    #[error("Error: {0}")]
    Other(String),
}

impl convert::From<std::io::Error> for CnError {
    fn from(err: std::io::Error) -> Self {
        CnError::Io(err)
    }
}

impl convert::From<CatalogError> for CnError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Io(e) => CnError::Io(e),
            e @ CatalogError::Missing { .. } => CnError::Missing(e.to_string()),
            e => CnError::Invalid(e.to_string()),
        }
    }
}

impl convert::From<String> for CnError {
    fn from(err: String) -> Self {
        CnError::Other(err)
    }
}

impl convert::From<&str> for CnError {
    fn from(err: &str) -> Self {
        CnError::Other(err.to_string())
    }
}

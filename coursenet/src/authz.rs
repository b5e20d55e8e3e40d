// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Enrollment-based access policy.
//!
//! A student may reach a service on a server if some active course lists
//! both the student and the server, and the server offers the service.  The
//! policy is existential: which course matched is reported for display, but
//! never changes the outcome.

use std::sync::Arc;

use slog::debug;
use slog::o;
use slog::Logger;

use crate::catalog::Catalog;
use crate::catalog::CatalogStore;
use crate::catalog::CourseState;
use crate::catalog::Service;

/// Why a request was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("service not offered")]
    ServiceNotOffered,
    #[error("not enrolled in an active authorizing course")]
    NotEnrolled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    Granted {
        /// Id of the first course found granting access.
        course: String,
        /// The service as named in the catalog.
        service: Service,
    },
    Denied(Denial),
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted { .. })
    }
}

/// Evaluate the policy for (`student`, `server`, `service`) against
/// `catalog`.  Unknown students or servers are simply not enrolled.
pub fn authorize(
    catalog: &Catalog,
    student: &str,
    server: &str,
    service: &str,
) -> Authorization {
    let Some(service) = catalog.server(server).and_then(|s| s.service(service))
    else {
        return Authorization::Denied(Denial::ServiceNotOffered);
    };

    match catalog.courses.iter().find(|c| {
        c.state == CourseState::Active
            && c.has_student(student)
            && c.has_server(server)
    }) {
        Some(course) => Authorization::Granted {
            course: course.id.clone(),
            service: service.clone(),
        },
        None => Authorization::Denied(Denial::NotEnrolled),
    }
}

/// Evaluates the policy against the current catalog, logging each decision.
pub struct AuthorizationResolver {
    catalog: Arc<CatalogStore>,
    log: Logger,
}

impl AuthorizationResolver {
    pub fn new(catalog: Arc<CatalogStore>, log: &Logger) -> Self {
        AuthorizationResolver {
            catalog,
            log: log.new(o!("unit" => "authz")),
        }
    }

    pub fn authorize(
        &self,
        student: &str,
        server: &str,
        service: &str,
    ) -> Authorization {
        let rval =
            authorize(&self.catalog.snapshot(), student, server, service);
        debug!(self.log, "authorization decision";
            "student" => student,
            "server" => server,
            "service" => service,
            "decision" => ?rval);
        rval
    }
}

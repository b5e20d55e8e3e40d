// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! The catalog of students, courses and servers.
//!
//! A [`Catalog`] is plain data, loaded wholesale from a YAML document.  The
//! provisioning core never mutates it: it takes an `Arc<Catalog>` snapshot
//! from the [`CatalogStore`] at the start of each request.  Edits made by the
//! operator (enrolling a student, say) build a new catalog which replaces the
//! old one, so requests already in flight keep the snapshot they started
//! with.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use common::network::MacAddr;
use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use slog::warn;
use slog::Logger;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(String),
    #[error("duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("no such {kind}: {id}")]
    Missing { kind: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Lifecycle of a course.  Only an active course grants access.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CourseState {
    Planned,
    Active,
    Closed,
}

/// Transport protocol of a service.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// The IANA protocol number carried in the IPv4 header.
    pub fn ip_proto(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Protocol::from_str(&s).map_err(|_| {
            serde::de::Error::custom(format!("invalid protocol: {s}"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub mac: MacAddr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub address: Ipv4Addr,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Server {
    /// Look up a service by name, ignoring case.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub state: CourseState,
    /// Ids of the enrolled students.
    #[serde(default)]
    pub students: Vec<String>,
    /// Ids of the servers this course grants access to.
    #[serde(default)]
    pub servers: Vec<String>,
}

impl Course {
    pub fn has_student(&self, id: &str) -> bool {
        self.students.iter().any(|s| s == id)
    }

    pub fn has_server(&self, id: &str) -> bool {
        self.servers.iter().any(|s| s == id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub servers: Vec<Server>,
}

fn check_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> CatalogResult<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::Duplicate {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

impl Catalog {
    /// Parse and validate a catalog document.
    pub fn from_yaml(text: &str, log: &Logger) -> CatalogResult<Catalog> {
        let mut catalog: Catalog = serde_yaml::from_str(text)
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate(log)?;
        Ok(catalog)
    }

    /// Read a catalog document from `path`.
    pub fn load(
        path: impl AsRef<Path>,
        log: &Logger,
    ) -> CatalogResult<Catalog> {
        let text = std::fs::read_to_string(path)?;
        Catalog::from_yaml(&text, log)
    }

    pub fn to_yaml(&self) -> CatalogResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Write the catalog to `path` in the format accepted by [`Catalog::load`].
    pub fn export(&self, path: impl AsRef<Path>) -> CatalogResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Enforce the structural rules of a catalog.
    ///
    /// Duplicate ids, and duplicate service names on one server, are errors.
    /// Course references to unknown students or servers are dropped with a
    /// warning, as are repeated references.
    pub fn validate(&mut self, log: &Logger) -> CatalogResult<()> {
        check_unique("student", self.students.iter().map(|s| s.id.as_str()))?;
        check_unique("course", self.courses.iter().map(|c| c.id.as_str()))?;
        check_unique("server", self.servers.iter().map(|s| s.id.as_str()))?;

        for server in &self.servers {
            let mut names = BTreeSet::new();
            for service in &server.services {
                if !names.insert(service.name.to_ascii_lowercase()) {
                    return Err(CatalogError::Duplicate {
                        kind: "service",
                        id: format!("{}/{}", server.id, service.name),
                    });
                }
            }
        }

        let students: BTreeSet<String> =
            self.students.iter().map(|s| s.id.clone()).collect();
        let servers: BTreeSet<String> =
            self.servers.iter().map(|s| s.id.clone()).collect();
        for course in &mut self.courses {
            let mut seen = BTreeSet::new();
            course.students.retain(|id| {
                if !students.contains(id) {
                    warn!(log, "dropping unknown student from course";
                        "course" => &course.id, "student" => id);
                    false
                } else {
                    seen.insert(id.clone())
                }
            });
            let mut seen = BTreeSet::new();
            course.servers.retain(|id| {
                if !servers.contains(id) {
                    warn!(log, "dropping unknown server from course";
                        "course" => &course.id, "server" => id);
                    false
                } else {
                    seen.insert(id.clone())
                }
            });
        }
        Ok(())
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    fn course_mut(&mut self, id: &str) -> CatalogResult<&mut Course> {
        self.courses.iter_mut().find(|c| c.id == id).ok_or_else(|| {
            CatalogError::Missing {
                kind: "course",
                id: id.to_string(),
            }
        })
    }

    /// Courses the given student is enrolled in.
    pub fn courses_of<'a>(
        &'a self,
        student: &'a str,
    ) -> impl Iterator<Item = &'a Course> + 'a {
        self.courses.iter().filter(move |c| c.has_student(student))
    }

    /// Add a student to a course roster.
    pub fn enroll(&mut self, course: &str, student: &str) -> CatalogResult<()> {
        if self.student(student).is_none() {
            return Err(CatalogError::Missing {
                kind: "student",
                id: student.to_string(),
            });
        }
        let c = self.course_mut(course)?;
        if c.has_student(student) {
            return Err(CatalogError::Conflict(format!(
                "student {student} is already enrolled in {course}"
            )));
        }
        c.students.push(student.to_string());
        Ok(())
    }

    /// Remove a student from a course roster.
    pub fn unenroll(
        &mut self,
        course: &str,
        student: &str,
    ) -> CatalogResult<()> {
        let c = self.course_mut(course)?;
        let before = c.students.len();
        c.students.retain(|s| s != student);
        if c.students.len() == before {
            return Err(CatalogError::Conflict(format!(
                "student {student} is not enrolled in {course}"
            )));
        }
        Ok(())
    }

    pub fn set_state(
        &mut self,
        course: &str,
        state: CourseState,
    ) -> CatalogResult<()> {
        self.course_mut(course)?.state = state;
        Ok(())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.protocol, self.port)
    }
}

/// Shared handle on the current catalog.
#[derive(Debug, Default)]
pub struct CatalogStore {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogStore {
    pub fn new(catalog: Catalog) -> Self {
        CatalogStore {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The catalog as of now.  Later edits do not affect the returned value.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Apply an edit.  The edit works on a private copy which is published
    /// only if it succeeds.
    pub fn update<F, T>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut Catalog) -> CatalogResult<T>,
    {
        let mut current = self.current.write();
        let mut next = Catalog::clone(&current);
        let rval = f(&mut next)?;
        *current = Arc::new(next);
        Ok(rval)
    }

    pub fn replace(&self, catalog: Catalog) {
        *self.current.write() = Arc::new(catalog);
    }
}

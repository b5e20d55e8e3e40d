// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

use std::io::stdout;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use colored::*;
use structopt::*;
use slog::info;
use slog::Logger;
use tabwriter::TabWriter;

use coursenet::authz::Authorization;
use coursenet::catalog::Catalog;
use coursenet::catalog::CatalogStore;

use crate::Ctx;

#[derive(Debug, StructOpt)]
#[structopt(about = "inspect the catalog of students, courses and servers")]
pub enum CatalogCmd {
    #[structopt(about = "list students")]
    Students,
    #[structopt(about = "list courses")]
    Courses,
    #[structopt(about = "show a course with its roster and servers")]
    Course { id: String },
    #[structopt(about = "list servers and their services")]
    Servers,
    #[structopt(about = "write the catalog to a YAML file")]
    Export { file: String },
    #[structopt(about = "replace the catalog with a YAML file")]
    Import { file: String },
}

#[derive(Debug, StructOpt)]
#[structopt(about = "manage course rosters")]
pub enum CourseCmd {
    #[structopt(about = "add a student to a course")]
    Enroll { course: String, student: String },
    #[structopt(about = "remove a student from a course")]
    Unenroll { course: String, student: String },
}

pub(crate) fn students<W: Write>(
    w: W,
    catalog: &Catalog,
) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "ID".underline(),
        "Name".underline(),
        "MAC".underline(),
        "Courses".underline(),
    )?;
    for s in &catalog.students {
        let courses: Vec<&str> =
            catalog.courses_of(&s.id).map(|c| c.id.as_str()).collect();
        writeln!(
            &mut tw,
            "{}\t{}\t{}\t{}",
            s.id,
            s.name,
            s.mac,
            courses.join(",")
        )?;
    }
    tw.flush()?;
    Ok(())
}

pub(crate) fn courses<W: Write>(w: W, catalog: &Catalog) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}\t{}",
        "ID".underline(),
        "Name".underline(),
        "State".underline(),
        "Students".underline(),
        "Servers".underline(),
    )?;
    for c in &catalog.courses {
        writeln!(
            &mut tw,
            "{}\t{}\t{}\t{}\t{}",
            c.id,
            c.name,
            c.state,
            c.students.len(),
            c.servers.join(","),
        )?;
    }
    tw.flush()?;
    Ok(())
}

pub(crate) fn course<W: Write>(
    mut w: W,
    catalog: &Catalog,
    id: &str,
) -> anyhow::Result<()> {
    let Some(course) = catalog.course(id) else {
        anyhow::bail!("no such course: {id}");
    };
    writeln!(w, "{} {} ({})", course.id, course.name, course.state)?;

    writeln!(w)?;
    let mut tw = TabWriter::new(&mut w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}",
        "Student".underline(),
        "Name".underline(),
        "MAC".underline()
    )?;
    for student in course.students.iter().filter_map(|s| catalog.student(s)) {
        writeln!(&mut tw, "{}\t{}\t{}", student.id, student.name, student.mac)?;
    }
    tw.flush()?;
    drop(tw);

    writeln!(w)?;
    let mut tw = TabWriter::new(&mut w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}",
        "Server".underline(),
        "Address".underline(),
        "Services".underline()
    )?;
    for server in course.servers.iter().filter_map(|s| catalog.server(s)) {
        let services: Vec<String> =
            server.services.iter().map(|s| s.to_string()).collect();
        writeln!(
            &mut tw,
            "{}\t{}\t{}",
            server.id,
            server.address,
            services.join(", ")
        )?;
    }
    tw.flush()?;
    Ok(())
}

pub(crate) fn servers<W: Write>(w: W, catalog: &Catalog) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(w);
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}\t{}",
        "ID".underline(),
        "Address".underline(),
        "Service".underline(),
        "Protocol".underline(),
        "Port".underline(),
    )?;
    for server in &catalog.servers {
        if server.services.is_empty() {
            writeln!(&mut tw, "{}\t{}\t-\t-\t-", server.id, server.address)?;
        }
        for service in &server.services {
            writeln!(
                &mut tw,
                "{}\t{}\t{}\t{}\t{}",
                server.id,
                server.address,
                service.name,
                service.protocol,
                service.port,
            )?;
        }
    }
    tw.flush()?;
    Ok(())
}

/// Load `file` and make it the current catalog.  A file that fails to load
/// leaves the current catalog in place.  Existing connections are kept.
pub(crate) fn import(
    store: &CatalogStore,
    file: &str,
    log: &Logger,
) -> anyhow::Result<Arc<Catalog>> {
    let catalog = Catalog::load(file, log)
        .with_context(|| format!("failed to import catalog from {file}"))?;
    store.replace(catalog);
    let current = store.snapshot();
    info!(log, "catalog imported";
        "file" => file,
        "students" => current.students.len(),
        "courses" => current.courses.len(),
        "servers" => current.servers.len());
    Ok(current)
}

pub(crate) fn catalog_cmd(ctx: &Ctx, cmd: CatalogCmd) -> anyhow::Result<()> {
    let catalog = ctx.catalog.snapshot();
    match cmd {
        CatalogCmd::Students => students(stdout(), &catalog),
        CatalogCmd::Courses => courses(stdout(), &catalog),
        CatalogCmd::Course { id } => course(stdout(), &catalog, &id),
        CatalogCmd::Servers => servers(stdout(), &catalog),
        CatalogCmd::Export { file } => {
            catalog
                .export(&file)
                .with_context(|| {
                    format!("failed to export catalog to {file}")
                })?;
            println!("catalog written to {file}");
            Ok(())
        }
        CatalogCmd::Import { file } => {
            let current = import(&ctx.catalog, &file, &ctx.log)?;
            println!(
                "catalog {} from {file}: {} students, {} courses, {} servers",
                "imported".green(),
                current.students.len(),
                current.courses.len(),
                current.servers.len(),
            );
            Ok(())
        }
    }
}

pub(crate) fn course_cmd(ctx: &Ctx, cmd: CourseCmd) -> anyhow::Result<()> {
    match cmd {
        CourseCmd::Enroll { course, student } => {
            ctx.catalog
                .update(|c| c.enroll(&course, &student))
                .context("failed to enroll student")?;
            println!("{student} enrolled in {course}");
        }
        CourseCmd::Unenroll { course, student } => {
            ctx.catalog
                .update(|c| c.unenroll(&course, &student))
                .context("failed to unenroll student")?;
            println!("{student} removed from {course}");
        }
    }
    Ok(())
}

pub(crate) fn authorize_cmd(
    ctx: &Ctx,
    student: &str,
    server: &str,
    service: &str,
) -> anyhow::Result<()> {
    match ctx.resolver.authorize(student, server, service) {
        Authorization::Granted { course, service } => {
            println!("{} by course {course}: {service}", "granted".green())
        }
        Authorization::Denied(reason) => {
            println!("{}: {reason}", "denied".red())
        }
    }
    Ok(())
}

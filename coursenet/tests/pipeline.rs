// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Drive the provisioning pipeline against a mock controller and check the
//! exact requests it makes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use common::logging::test_logger;
use common::network::Dpid;
use coursenet::authz::Authorization;
use coursenet::authz::AuthorizationResolver;
use coursenet::authz::Denial;
use coursenet::catalog::Catalog;
use coursenet::catalog::CatalogStore;
use coursenet::catalog::CourseState;
use coursenet::config::Config;
use coursenet::CnError;
use coursenet::ConnectionState;
use coursenet::Registry;
use mockall::mock;
use mockall::predicate::eq;
use mockall::Sequence;
use sdn_client::AttachmentPoint;
use sdn_client::ClientResult;
use sdn_client::Controller;
use sdn_client::Device;
use sdn_client::Dialect;
use sdn_client::FlowSpec;
use sdn_client::NodePort;

mock! {
    pub Ctl {}

    #[async_trait]
    impl Controller for Ctl {
        fn dialect(&self) -> Dialect;
        async fn devices(&self) -> ClientResult<Vec<Device>>;
        async fn route(
            &self,
            src: AttachmentPoint,
            dst: AttachmentPoint,
        ) -> ClientResult<Vec<NodePort>>;
        async fn push_flow(&self, flow: &FlowSpec) -> ClientResult<()>;
        async fn push_path(&self, flows: &[FlowSpec]) -> ClientResult<()>;
        async fn delete_flow(&self, name: &str) -> ClientResult<()>;
        async fn flow_names(&self, switch: Dpid) -> ClientResult<Vec<String>>;
    }
}

const CATALOG: &str = r#"
students:
  - {id: S1, name: Ana Torres, mac: "aa:bb:cc:dd:ee:01"}
courses:
  - id: C1
    name: Networks
    state: ACTIVE
    students: [S1]
    servers: [SRV1]
servers:
  - id: SRV1
    address: 10.0.0.10
    services:
      - {name: ssh, protocol: TCP, port: 22}
"#;

fn store() -> Arc<CatalogStore> {
    Arc::new(CatalogStore::new(
        Catalog::from_yaml(CATALOG, &test_logger()).unwrap(),
    ))
}

fn ap(switch: u64, port: u16) -> AttachmentPoint {
    AttachmentPoint::new(Dpid::new(switch), port)
}

fn inventory() -> Vec<Device> {
    vec![
        Device {
            macs: vec!["aa:bb:cc:dd:ee:01".parse().unwrap()],
            ipv4: vec![Ipv4Addr::new(10, 0, 0, 1)],
            attachment_points: vec![ap(1, 3)],
        },
        Device {
            macs: vec!["aa:bb:cc:dd:ee:10".parse().unwrap()],
            ipv4: vec![Ipv4Addr::new(10, 0, 0, 10)],
            attachment_points: vec![ap(2, 5)],
        },
    ]
}

fn registry(ctl: MockCtl, store: Arc<CatalogStore>) -> Registry {
    Registry::from_config(
        &Config::default(),
        Arc::new(ctl),
        store,
        &test_logger(),
    )
}

#[tokio::test]
async fn test_concrete_scenario() {
    let store = store();
    let resolver = AuthorizationResolver::new(store.clone(), &test_logger());
    assert!(matches!(
        resolver.authorize("S1", "SRV1", "ssh"),
        Authorization::Granted { course, .. } if course == "C1"
    ));

    let mut ctl = MockCtl::new();
    let mut seq = Sequence::new();
    ctl.expect_dialect().return_const(Dialect::PerHop);
    ctl.expect_devices().times(2).returning(|| Ok(inventory()));
    ctl.expect_route()
        .with(eq(ap(1, 3)), eq(ap(2, 5)))
        .times(1)
        .returning(|_, _| Ok(vec![ap(1, 3), ap(1, 1), ap(2, 2), ap(2, 5)]));
    ctl.expect_push_flow()
        .withf(|f: &FlowSpec| {
            f.name == "S1-SRV1-ssh.0"
                && f.switch == Dpid::new(1)
                && f.matches.in_port == Some(3)
                && f.matches.ip_proto == 6
                && f.matches.tp_dst == 22
                && f.matches.ipv4_dst == Ipv4Addr::new(10, 0, 0, 10)
                && f.output == 1
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    ctl.expect_push_flow()
        .withf(|f: &FlowSpec| {
            f.name == "S1-SRV1-ssh.1"
                && f.switch == Dpid::new(2)
                && f.matches.in_port == Some(2)
                && f.output == 5
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    ctl.expect_flow_names()
        .with(eq(Dpid::new(1)))
        .returning(|_| Ok(vec!["S1-SRV1-ssh.0".to_string()]));
    ctl.expect_flow_names()
        .with(eq(Dpid::new(2)))
        .returning(|_| Ok(vec!["S1-SRV1-ssh.1".to_string()]));
    ctl.expect_delete_flow()
        .withf(|name: &str| name.starts_with("S1-SRV1-ssh."))
        .times(2)
        .returning(|_| Ok(()));

    let registry = registry(ctl, store);
    let conn = registry.create("S1", "SRV1", "ssh").await.unwrap();
    assert_eq!(conn.handler, "S1-SRV1-ssh");
    assert_eq!(conn.state, ConnectionState::Active);
    assert_eq!(conn.flows.len(), conn.path.hops.len());

    registry.remove("S1-SRV1-ssh").await.unwrap();
    assert!(matches!(
        registry.get("S1-SRV1-ssh"),
        Err(CnError::ConnectionNotFound(_))
    ));
}

#[tokio::test]
async fn test_planned_course_never_reaches_topology() {
    let store = store();
    store.update(|c| c.set_state("C1", CourseState::Planned)).unwrap();

    let resolver = AuthorizationResolver::new(store.clone(), &test_logger());
    assert_eq!(
        resolver.authorize("S1", "SRV1", "ssh"),
        Authorization::Denied(Denial::NotEnrolled)
    );

    let mut ctl = MockCtl::new();
    ctl.expect_devices().never();
    ctl.expect_route().never();
    ctl.expect_push_flow().never();

    let registry = registry(ctl, store);
    match registry.create("S1", "SRV1", "ssh").await {
        Err(e @ CnError::AuthorizationDenied { .. }) => assert_eq!(
            e.to_string(),
            "student S1 may not reach ssh on SRV1: \
            not enrolled in an active authorizing course"
        ),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_route_installs_nothing() {
    let mut ctl = MockCtl::new();
    ctl.expect_devices().returning(|| Ok(inventory()));
    ctl.expect_route().times(1).returning(|_, _| Ok(Vec::new()));
    ctl.expect_push_flow().never();
    ctl.expect_push_path().never();

    let registry = registry(ctl, store());
    assert!(matches!(
        registry.create("S1", "SRV1", "ssh").await,
        Err(CnError::NoRouteAvailable { cause: None, .. })
    ));
    assert!(registry.list().is_empty());
}

#[tokio::test]
async fn test_path_dialect_single_push() {
    let mut ctl = MockCtl::new();
    ctl.expect_dialect().return_const(Dialect::Path);
    ctl.expect_devices().returning(|| Ok(inventory()));
    ctl.expect_route()
        .returning(|_, _| Ok(vec![ap(1, 3), ap(1, 1), ap(2, 2), ap(2, 5)]));
    ctl.expect_push_flow().never();
    ctl.expect_push_path()
        .withf(|flows: &[FlowSpec]| flows.len() == 2)
        .times(1)
        .returning(|_| Ok(()));
    ctl.expect_flow_names().returning(|switch| {
        Ok(vec![if switch == Dpid::new(1) {
            "S1-SRV1-ssh.0".to_string()
        } else {
            "S1-SRV1-ssh.1".to_string()
        }])
    });

    let registry = registry(ctl, store());
    let conn = registry.create("S1", "SRV1", "ssh").await.unwrap();
    assert_eq!(conn.flows.len(), 2);
}

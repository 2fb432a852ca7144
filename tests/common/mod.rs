#![allow(dead_code)]

use fellowship::core::actor::Actor;
use fellowship::core::broker::DbBroker;
use fellowship::core::store::Store;
use fellowship::hierarchy::audit;
use fellowship::hierarchy::model::{Node, Role};
use fellowship::hierarchy::repo;
use fellowship::registry::member::{self, Contact, Gender, MaritalStatus, NewMember};
use fellowship::registry::structure;
use tempfile::TempDir;

pub fn actor() -> Actor {
    Actor::new("secretary@central").unwrap()
}

pub fn open_store() -> (TempDir, Store) {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&tmp.path().join(".fellowship")).unwrap();
    (tmp, store)
}

pub fn add_member(store: &Store, first: &str, last: &str) -> String {
    let new = NewMember {
        first_names: first.to_string(),
        last_names: last.to_string(),
        birth_date: "1988-06-15".to_string(),
        gender: Gender::Female,
        marital_status: MaritalStatus::Married,
        contact: Contact::default(),
    };
    member::create_member(store, new, &actor()).unwrap().id
}

pub fn enroll(store: &Store, first: &str, role: Role, ancestor: &str) -> Node {
    let member_id = add_member(store, first, "Test");
    structure::enroll(store, &member_id, role, Some(ancestor), &actor()).unwrap()
}

pub fn node(store: &Store, id: &str) -> Node {
    DbBroker::new(store)
        .with_read(|conn| repo::require_node(conn, id))
        .unwrap()
}

pub fn maybe_node(store: &Store, id: &str) -> Option<Node> {
    DbBroker::new(store)
        .with_read(|conn| repo::get_node(conn, id))
        .unwrap()
}

pub fn all_nodes(store: &Store) -> Vec<Node> {
    DbBroker::new(store)
        .with_read(|conn| repo::list_nodes(conn, None, None))
        .unwrap()
}

/// Every hierarchy invariant must hold after every transition.
pub fn assert_consistent(store: &Store) {
    let report = audit::audit_store(store).unwrap();
    assert!(
        report.is_clean(),
        "audit violations: {:#?}",
        report.violations
    );
}

/// Church Ch1 with two pastors, one copastor and supervisor under each.
/// Only S1 has a zone; P1 leads FG1, which holds disciples D and D2.
pub struct Tree {
    pub ch1: Node,
    pub pa1: Node,
    pub pa2: Node,
    pub c1: Node,
    pub c2: Node,
    pub s1: Node,
    pub s2: Node,
    pub z1: Node,
    pub p1: Node,
    pub fg1: Node,
    pub d: Node,
    pub d2: Node,
}

impl Tree {
    pub fn build(store: &Store) -> Tree {
        let a = actor();
        let ch1 = structure::create_church(store, "Iglesia Central", Some("CH-01"), &a).unwrap();
        let pa1 = enroll(store, "Pablo", Role::Pastor, &ch1.id);
        let pa2 = enroll(store, "Pedro", Role::Pastor, &ch1.id);
        let c1 = enroll(store, "Carla", Role::Copastor, &pa1.id);
        let c2 = enroll(store, "Cesar", Role::Copastor, &pa2.id);
        let s1 = enroll(store, "Sara", Role::Supervisor, &c1.id);
        let s2 = enroll(store, "Simon", Role::Supervisor, &c2.id);
        let z1 = structure::create_zone(store, &s1.id, "Zona Norte", &a).unwrap();
        let p1 = enroll(store, "Priscila", Role::Preacher, &s1.id);
        let fg1 =
            structure::create_family_group(store, &z1.id, Some(&p1.id), "Los Olivos", "FG-001", &a)
                .unwrap();
        let d = enroll(store, "Dora", Role::Disciple, &fg1.id);
        let d2 = enroll(store, "Dario", Role::Disciple, &fg1.id);
        // creations bumped parents; reload so versions are current
        Tree {
            ch1: node(store, &ch1.id),
            pa1: node(store, &pa1.id),
            pa2: node(store, &pa2.id),
            c1: node(store, &c1.id),
            c2: node(store, &c2.id),
            s1: node(store, &s1.id),
            s2: node(store, &s2.id),
            z1: node(store, &z1.id),
            p1: node(store, &p1.id),
            fg1: node(store, &fg1.id),
            d: node(store, &d.id),
            d2: node(store, &d2.id),
        }
    }
}

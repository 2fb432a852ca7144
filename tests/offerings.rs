mod common;

use common::{Tree, actor, assert_consistent, open_store};
use fellowship::core::broker::DbBroker;
use fellowship::core::error::{ConflictKind, FellowshipError, ValidationRule};
use fellowship::hierarchy::audit;
use fellowship::hierarchy::engine;
use fellowship::hierarchy::model::{InactivationCause, RecordStatus, Role};
use fellowship::registry::offering::{self, Contributor, NewOffering, OfferingKind};

fn tithe(contributor: Contributor) -> NewOffering {
    NewOffering {
        kind: OfferingKind::Tithe,
        amount_cents: 15_000,
        currency: "PEN".to_string(),
        received_on: "2026-03-01".to_string(),
        contributor,
        comments: None,
    }
}

#[test]
fn member_offering_is_attributed_to_the_member_and_church() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let recorded = offering::record_offering(
        &store,
        tithe(Contributor::Member {
            role: Role::Disciple,
            record_id: t.d.id.clone(),
        }),
        &actor(),
    )
    .unwrap();

    assert_eq!(recorded.contributor_member_id, t.d.member_id);
    assert_eq!(recorded.church_id.as_deref(), Some(t.ch1.id.as_str()));
    assert_eq!(recorded.status, RecordStatus::Active);

    let stored = DbBroker::new(&store)
        .with_read(|conn| offering::get_offering(conn, &recorded.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored, recorded);
}

#[test]
fn contributor_tag_must_match_the_record_level() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let err = offering::record_offering(
        &store,
        tithe(Contributor::Member {
            role: Role::Preacher,
            record_id: t.d.id.clone(),
        }),
        &actor(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::InvalidField {
            field: "contributor",
            ..
        })
    ));
}

#[test]
fn inactive_contributors_are_refused() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.fg1.id, InactivationCause::Restructuring, &actor()).unwrap();

    let err = offering::record_offering(
        &store,
        NewOffering {
            kind: OfferingKind::FamilyGroupService,
            ..tithe(Contributor::FamilyGroup {
                record_id: t.fg1.id.clone(),
            })
        },
        &actor(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::Conflict(ConflictKind::InactiveAncestor { .. })
    ));
}

#[test]
fn external_donors_need_a_name_and_carry_no_church() {
    let (_tmp, store) = open_store();

    let err = offering::record_offering(
        &store,
        tithe(Contributor::ExternalDonor {
            name: "  ".to_string(),
        }),
        &actor(),
    )
    .unwrap_err();
    assert!(err.is_client_error());

    let ok = offering::record_offering(
        &store,
        NewOffering {
            kind: OfferingKind::Special,
            ..tithe(Contributor::ExternalDonor {
                name: "Ferreteria San Jose".to_string(),
            })
        },
        &actor(),
    )
    .unwrap();
    assert_eq!(ok.church_id, None);
    assert_eq!(ok.contributor_member_id, None);
}

#[test]
fn amounts_and_currency_are_validated() {
    let (_tmp, store) = open_store();
    let donor = Contributor::ExternalDonor {
        name: "Anon".to_string(),
    };

    let zero = NewOffering {
        amount_cents: 0,
        ..tithe(donor.clone())
    };
    assert!(offering::record_offering(&store, zero, &actor()).is_err());

    let currency = NewOffering {
        currency: "soles".to_string(),
        ..tithe(donor.clone())
    };
    assert!(offering::record_offering(&store, currency, &actor()).is_err());

    let date = NewOffering {
        received_on: "2026-13-01".to_string(),
        ..tithe(donor)
    };
    assert!(offering::record_offering(&store, date, &actor()).is_err());
}

#[test]
fn member_history_survives_promotion() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let member_id = t.d.member_id.clone().unwrap();
    offering::record_offering(
        &store,
        tithe(Contributor::Member {
            role: Role::Disciple,
            record_id: t.d.id.clone(),
        }),
        &actor(),
    )
    .unwrap();

    let promotion = engine::promote(&store, &member_id, Role::Preacher, &t.s2.id, &actor()).unwrap();
    offering::record_offering(
        &store,
        tithe(Contributor::Member {
            role: Role::Preacher,
            record_id: promotion.record.id.clone(),
        }),
        &actor(),
    )
    .unwrap();

    let history = DbBroker::new(&store)
        .with_read(|conn| offering::list_for_member(conn, &member_id))
        .unwrap();
    assert_eq!(history.len(), 2);
    let tags: Vec<_> = history.iter().map(|o| o.contributor.tag()).collect();
    assert!(tags.contains(&"disciple") && tags.contains(&"preacher"));

    let report = audit::audit_store(&store).unwrap();
    assert_eq!(report.offerings_checked, 2);
    assert_consistent(&store);
}

#[test]
fn offerings_are_inactivated_once() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let recorded = offering::record_offering(
        &store,
        tithe(Contributor::Church {
            record_id: t.ch1.id.clone(),
        }),
        &actor(),
    )
    .unwrap();
    assert_eq!(recorded.church_id.as_deref(), Some(t.ch1.id.as_str()));

    let inactive = offering::inactivate_offering(&store, &recorded.id, &actor()).unwrap();
    assert_eq!(inactive.status, RecordStatus::Inactive);
    assert!(inactive.audit.updated_at.is_some());

    let err = offering::inactivate_offering(&store, &recorded.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::InactiveRecord { .. })
    ));

    let listed = DbBroker::new(&store)
        .with_read(|conn| offering::list_offerings(conn, Some(&t.ch1.id)))
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, RecordStatus::Inactive);
}

#[test]
fn contributor_is_checked_inside_the_audited_write() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let member_id = t.d.member_id.clone().unwrap();
    engine::promote(&store, &member_id, Role::Preacher, &t.s2.id, &actor()).unwrap();

    // the disciple record was replaced by the promotion
    let err = offering::record_offering(
        &store,
        tithe(Contributor::Member {
            role: Role::Disciple,
            record_id: t.d.id.clone(),
        }),
        &actor(),
    )
    .unwrap_err();
    assert!(matches!(err, FellowshipError::NotFound(_)), "{err:?}");

    let broker = DbBroker::new(&store);
    let events: Vec<_> = broker
        .read_events()
        .unwrap()
        .into_iter()
        .filter(|e| e.op == "offering.create")
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].status, fellowship::core::broker::STATUS_ERROR);
    assert!(broker
        .with_read(|conn| offering::list_offerings(conn, None))
        .unwrap()
        .is_empty());
}

//! Fellowship: a local-first membership hierarchy store for churches.
//!
//! A church is a tree: church, pastor, copastor, supervisor, zone, preacher,
//! family group, disciple. Every record stores a pointer to each of its
//! ancestors, not just its parent, and those pointers are kept consistent on
//! every promotion, reassignment and inactivation.
//!
//! # Architecture
//!
//! ## One database, one transaction per transition
//!
//! All state lives in `<store>/hierarchy.db`. A transition is validated and
//! planned against a read snapshot, then applied as a single `BEGIN
//! IMMEDIATE` transaction whose writes are each guarded by the row version
//! they were planned against. Readers never see a half-applied cascade.
//!
//! ## The Thin Waist
//!
//! All state mutations route through `DbBroker` for:
//! - Serialization (in-process lock)
//! - Audit logging (`broker.events.jsonl`)
//! - Plan tracking (the plan id is the event's intent ref)
//!
//! # Examples
//!
//! ```bash
//! fellowship init
//! fellowship --actor clerk member add --first-names Ana --last-names Quispe \
//!     --birth-date 1990-04-12 --gender female
//! fellowship --actor clerk promote --member ME_... --role preacher --ancestor SU_...
//! fellowship audit
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, pool, errors, config
//! - [`hierarchy`]: the consistency engine (ledger, validator, planner, executor)
//! - [`registry`]: members, structural records, offerings, search

mod cli;
pub mod core;
pub mod hierarchy;
pub mod registry;
mod subsystems;

use crate::cli::{
    AuditFormat, ChurchCommand, Cli, Command, ContactArgs, ContributorArg, FamilyGroupCommand,
    JournalCommand, MemberCommand, OfferingCommand, SearchBy, ZoneCommand,
};
use crate::core::actor::Actor;
use crate::core::broker::{self, DbBroker};
use crate::core::error::{FellowshipError, ValidationRule};
use crate::core::output;
use crate::core::store::{self, Store};
use crate::core::time;
use crate::hierarchy::model::{RecordStatus, Role};
use crate::hierarchy::{audit, engine, inactivation, journal};
use crate::registry::member::{self, Contact, NewMember};
use crate::registry::offering::{self, Contributor, NewOffering};
use crate::registry::search::{self, SearchFilter};
use crate::registry::structure;

use clap::Parser;
use serde::Serialize;

fn require_actor(actor: &Option<String>) -> Result<Actor, FellowshipError> {
    Actor::new(actor.as_deref().unwrap_or(""))
}

fn print_result<T: Serialize>(cmd: &str, result: &T) -> Result<(), FellowshipError> {
    let envelope = time::command_envelope(
        cmd,
        "ok",
        serde_json::json!({ "result": serde_json::to_value(result)? }),
    );
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

impl From<ContactArgs> for Contact {
    fn from(args: ContactArgs) -> Self {
        Contact {
            email: args.email,
            phone: args.phone,
            country: args.country,
            city: args.city,
            address: args.address,
        }
    }
}

fn search_filter(by: SearchBy, term: String, second: Option<String>) -> Result<SearchFilter, FellowshipError> {
    let need_second = |what: &str| {
        second.clone().ok_or_else(|| {
            FellowshipError::from(ValidationRule::InvalidField {
                field: "second",
                reason: format!("--by {} needs --second", what),
            })
        })
    };
    Ok(match by {
        SearchBy::FirstNames => SearchFilter::FirstNames { term },
        SearchBy::LastNames => SearchFilter::LastNames { term },
        SearchBy::FullName => SearchFilter::FullName {
            last: need_second("full-name")?,
            first: term,
        },
        SearchBy::Name => SearchFilter::Name { term },
        SearchBy::Code => SearchFilter::Code { code: term },
        SearchBy::BirthDate => SearchFilter::BirthDateRange {
            to: need_second("birth-date")?,
            from: term,
        },
        SearchBy::Status => SearchFilter::Status {
            status: term.parse::<RecordStatus>()?,
        },
    })
}

fn contributor_from_args(
    tag: ContributorArg,
    record: Option<String>,
    donor: Option<String>,
) -> Result<Contributor, FellowshipError> {
    let record_id = || {
        record.clone().ok_or_else(|| {
            FellowshipError::from(ValidationRule::InvalidField {
                field: "record",
                reason: "only an external donor contributor may omit --record".to_string(),
            })
        })
    };
    let member = |role: Role| -> Result<Contributor, FellowshipError> {
        Ok(Contributor::Member {
            role,
            record_id: record_id()?,
        })
    };
    match tag {
        ContributorArg::ExternalDonor => Ok(Contributor::ExternalDonor {
            name: donor.unwrap_or_default(),
        }),
        ContributorArg::Church => Ok(Contributor::Church {
            record_id: record_id()?,
        }),
        ContributorArg::FamilyGroup => Ok(Contributor::FamilyGroup {
            record_id: record_id()?,
        }),
        ContributorArg::Disciple => member(Role::Disciple),
        ContributorArg::Preacher => member(Role::Preacher),
        ContributorArg::Supervisor => member(Role::Supervisor),
        ContributorArg::Copastor => member(Role::Copastor),
        ContributorArg::Pastor => member(Role::Pastor),
    }
}

fn run_audit(store: &Store, format: AuditFormat) -> Result<(), FellowshipError> {
    use colored::Colorize;

    let report = audit::audit_store(store)?;
    if format == AuditFormat::Json {
        return print_result("audit", &report);
    }
    if report.is_clean() {
        println!(
            "{} {} records, {} offerings",
            "✓ audit clean:".green().bold(),
            report.records_checked,
            report.offerings_checked
        );
        return Ok(());
    }
    println!(
        "{} {} violation(s) in {} records",
        "✗ audit failed:".red().bold(),
        report.violations.len(),
        report.records_checked
    );
    for v in &report.violations {
        println!("  {} {}", v.kind.as_str().red(), output::compact_line(&v.detail, 120));
        println!("    {}", v.record_id.dimmed());
    }
    Ok(())
}

pub fn run() -> Result<(), FellowshipError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;
    let store = Store::open(&store::resolve_root(&current_dir))?;

    match cli.command {
        Command::Init => {
            print_result(
                "init",
                &serde_json::json!({
                    "root": store.root.display().to_string(),
                    "config": store.config,
                }),
            )?;
        }
        Command::Member(member_cli) => match member_cli.command {
            MemberCommand::Add {
                first_names,
                last_names,
                birth_date,
                gender,
                marital_status,
                contact,
            } => {
                let actor = require_actor(&cli.actor)?;
                let new = NewMember {
                    first_names,
                    last_names,
                    birth_date,
                    gender,
                    marital_status,
                    contact: contact.into(),
                };
                print_result("member.add", &member::create_member(&store, new, &actor)?)?;
            }
            MemberCommand::Get { id } => {
                let found =
                    DbBroker::new(&store).with_read(|conn| member::require_member(conn, &id))?;
                print_result("member.get", &found)?;
            }
            MemberCommand::List { limit } => {
                let members =
                    DbBroker::new(&store).with_read(|conn| member::list_members(conn, limit))?;
                print_result("member.list", &members)?;
            }
            MemberCommand::Update { id, contact } => {
                let actor = require_actor(&cli.actor)?;
                let updated = member::update_contact(&store, &id, contact.into(), &actor)?;
                print_result("member.update", &updated)?;
            }
        },
        Command::Church(church_cli) => match church_cli.command {
            ChurchCommand::Create { name, code } => {
                let actor = require_actor(&cli.actor)?;
                let church = structure::create_church(&store, &name, code.as_deref(), &actor)?;
                print_result("church.create", &church)?;
            }
        },
        Command::Enroll {
            member,
            role,
            ancestor,
        } => {
            let actor = require_actor(&cli.actor)?;
            let record = structure::enroll(&store, &member, role, ancestor.as_deref(), &actor)?;
            print_result("enroll", &record)?;
        }
        Command::Zone(zone_cli) => match zone_cli.command {
            ZoneCommand::Create { supervisor, name } => {
                let actor = require_actor(&cli.actor)?;
                print_result(
                    "zone.create",
                    &structure::create_zone(&store, &supervisor, &name, &actor)?,
                )?;
            }
        },
        Command::FamilyGroup(group_cli) => match group_cli.command {
            FamilyGroupCommand::Create {
                zone,
                preacher,
                name,
                code,
            } => {
                let actor = require_actor(&cli.actor)?;
                let group = structure::create_family_group(
                    &store,
                    &zone,
                    preacher.as_deref(),
                    &name,
                    &code,
                    &actor,
                )?;
                print_result("family_group.create", &group)?;
            }
        },
        Command::Promote {
            member,
            role,
            ancestor,
            dry_run,
        } => {
            let actor = require_actor(&cli.actor)?;
            if dry_run {
                let plan = engine::plan_promotion(&store, &member, role, Some(&ancestor), &actor)?;
                print_result("promote.plan", &plan)?;
            } else {
                print_result(
                    "promote",
                    &engine::promote(&store, &member, role, &ancestor, &actor)?,
                )?;
            }
        }
        Command::Reassign {
            record,
            ancestor,
            dry_run,
        } => {
            let actor = require_actor(&cli.actor)?;
            if dry_run {
                let plan = engine::plan_reassignment(&store, &record, &ancestor, &actor)?;
                print_result("reassign.plan", &plan)?;
            } else {
                print_result(
                    "reassign",
                    &engine::reassign_ancestor(&store, &record, &ancestor, &actor)?,
                )?;
            }
        }
        Command::Inactivate {
            record,
            cause,
            dry_run,
        } => {
            let actor = require_actor(&cli.actor)?;
            if dry_run {
                let plan = inactivation::plan(&store, &record, cause, &actor)?;
                print_result("inactivate.plan", &plan)?;
            } else {
                print_result(
                    "inactivate",
                    &engine::inactivate(&store, &record, cause, &actor)?,
                )?;
            }
        }
        Command::Role { member } => {
            print_result("role", &engine::resolve_role(&store, &member)?)?;
        }
        Command::Find {
            by,
            term,
            second,
            level,
        } => {
            let filter = search_filter(by, term, second)?;
            let hits = DbBroker::new(&store).with_read(|conn| search::find(conn, level, &filter))?;
            print_result("find", &hits)?;
        }
        Command::Offering(offering_cli) => match offering_cli.command {
            OfferingCommand::Add {
                kind,
                amount_cents,
                currency,
                received_on,
                contributor,
                record,
                donor,
                comments,
            } => {
                let actor = require_actor(&cli.actor)?;
                let new = NewOffering {
                    kind,
                    amount_cents,
                    currency,
                    received_on,
                    contributor: contributor_from_args(contributor, record, donor)?,
                    comments,
                };
                print_result("offering.add", &offering::record_offering(&store, new, &actor)?)?;
            }
            OfferingCommand::List { record, member } => {
                let offerings = DbBroker::new(&store).with_read(|conn| match &member {
                    Some(member_id) => offering::list_for_member(conn, member_id),
                    None => offering::list_offerings(conn, record.as_deref()),
                })?;
                print_result("offering.list", &offerings)?;
            }
            OfferingCommand::Inactivate { id } => {
                let actor = require_actor(&cli.actor)?;
                print_result(
                    "offering.inactivate",
                    &offering::inactivate_offering(&store, &id, &actor)?,
                )?;
            }
        },
        Command::Audit { format } => run_audit(&store, format)?,
        Command::Journal(journal_cli) => match journal_cli.command {
            JournalCommand::List { root, limit } => {
                let entries = DbBroker::new(&store)
                    .with_read(|conn| journal::list(conn, root.as_deref(), limit))?;
                print_result("journal.list", &entries)?;
            }
            JournalCommand::Verify => {
                let report = journal::verify(&store)?;
                if !report.interrupted.is_empty() {
                    let ops: Vec<String> = report
                        .interrupted
                        .iter()
                        .map(|i| format!("{} {}", i.op, i.plan_id.as_deref().unwrap_or("-")))
                        .collect();
                    eprintln!(
                        "interrupted operations: {}",
                        output::preview_messages(&ops, 5, 80)
                    );
                }
                print_result("journal.verify", &report)?;
            }
        },
        Command::Schema => {
            let schema = serde_json::json!({
                "name": "fellowship",
                "version": env!("CARGO_PKG_VERSION"),
                "subsystems": [
                    hierarchy::schema(),
                    registry::schema(),
                    broker::schema(),
                ]
            });
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}

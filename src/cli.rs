//! CLI struct definitions for the fellowship command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::hierarchy::model::{InactivationCause, Level, Role};
use crate::registry::member::{Gender, MaritalStatus};
use crate::registry::offering::OfferingKind;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[clap(
    name = "fellowship",
    version = env!("CARGO_PKG_VERSION"),
    about = "Church membership hierarchy: promotions, reassignments and inactivations with consistent ancestor chains"
)]
pub(crate) struct Cli {
    /// Identity recorded as created_by / updated_by. Required by every mutating command.
    #[clap(long, global = true)]
    pub actor: Option<String>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the store (hierarchy.db and audit log) if missing
    Init,
    /// Member identity records
    Member(MemberCli),
    /// Church records
    Church(ChurchCli),
    /// Place a member with no active role directly at a role
    Enroll {
        #[clap(long)]
        member: String,
        #[clap(long, value_enum)]
        role: Role,
        /// Immediate ancestor (church for pastors, pastor for copastors, ...)
        #[clap(long)]
        ancestor: Option<String>,
    },
    /// Zones under supervisors
    Zone(ZoneCli),
    /// Family groups under zones
    FamilyGroup(FamilyGroupCli),
    /// Promote a member exactly one level
    Promote {
        #[clap(long)]
        member: String,
        #[clap(long, value_enum)]
        role: Role,
        #[clap(long)]
        ancestor: String,
        /// Print the plan without executing it
        #[clap(long)]
        dry_run: bool,
    },
    /// Move a record under a new ancestor, carrying its subtree
    Reassign {
        #[clap(long)]
        record: String,
        #[clap(long)]
        ancestor: String,
        #[clap(long)]
        dry_run: bool,
    },
    /// Mark a record inactive and orphan its direct children
    Inactivate {
        #[clap(long)]
        record: String,
        #[clap(long, value_enum, default_value_t = InactivationCause::Other)]
        cause: InactivationCause,
        #[clap(long)]
        dry_run: bool,
    },
    /// Show a member's active role and legal transitions
    Role {
        #[clap(long)]
        member: String,
    },
    /// Search records
    Find {
        #[clap(long, value_enum)]
        by: SearchBy,
        #[clap(long)]
        term: String,
        /// Second term: last names for full-name, end date for birth-date
        #[clap(long)]
        second: Option<String>,
        #[clap(long, value_enum)]
        level: Option<Level>,
    },
    /// Offering income
    Offering(OfferingCli),
    /// Check every hierarchy invariant across the store
    Audit {
        #[clap(long, value_enum, default_value_t = AuditFormat::Text)]
        format: AuditFormat,
    },
    /// Committed cascade plans
    Journal(JournalCli),
    /// Print the command schema as JSON
    Schema,
}

/// Search dimension for `find`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SearchBy {
    FirstNames,
    LastNames,
    /// First names in --term, last names in --second
    FullName,
    /// Structural name (church, zone, family group)
    Name,
    Code,
    /// Start date in --term, end date in --second
    BirthDate,
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AuditFormat {
    Text,
    Json,
}

/// Contributor tag of an offering.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub(crate) enum ContributorArg {
    Disciple,
    Preacher,
    Supervisor,
    Copastor,
    Pastor,
    Church,
    FamilyGroup,
    ExternalDonor,
}

#[derive(clap::Args, Debug)]
pub(crate) struct MemberCli {
    #[clap(subcommand)]
    pub command: MemberCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MemberCommand {
    Add {
        #[clap(long)]
        first_names: String,
        #[clap(long)]
        last_names: String,
        /// YYYY-MM-DD
        #[clap(long)]
        birth_date: String,
        #[clap(long, value_enum)]
        gender: Gender,
        #[clap(long, value_enum, default_value_t = MaritalStatus::Single)]
        marital_status: MaritalStatus,
        #[clap(flatten)]
        contact: ContactArgs,
    },
    Get {
        #[clap(long)]
        id: String,
    },
    List {
        #[clap(long, default_value_t = 100)]
        limit: usize,
    },
    /// Update contact fields; omitted fields are kept
    Update {
        #[clap(long)]
        id: String,
        #[clap(flatten)]
        contact: ContactArgs,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ContactArgs {
    #[clap(long)]
    pub email: Option<String>,
    #[clap(long)]
    pub phone: Option<String>,
    #[clap(long)]
    pub country: Option<String>,
    #[clap(long)]
    pub city: Option<String>,
    #[clap(long)]
    pub address: Option<String>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ChurchCli {
    #[clap(subcommand)]
    pub command: ChurchCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ChurchCommand {
    Create {
        #[clap(long)]
        name: String,
        #[clap(long)]
        code: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ZoneCli {
    #[clap(subcommand)]
    pub command: ZoneCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ZoneCommand {
    Create {
        #[clap(long)]
        supervisor: String,
        #[clap(long)]
        name: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct FamilyGroupCli {
    #[clap(subcommand)]
    pub command: FamilyGroupCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum FamilyGroupCommand {
    Create {
        #[clap(long)]
        zone: String,
        #[clap(long)]
        preacher: Option<String>,
        #[clap(long)]
        name: String,
        #[clap(long)]
        code: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct OfferingCli {
    #[clap(subcommand)]
    pub command: OfferingCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum OfferingCommand {
    Add {
        #[clap(long, value_enum)]
        kind: OfferingKind,
        #[clap(long)]
        amount_cents: i64,
        #[clap(long, default_value = "PEN")]
        currency: String,
        /// YYYY-MM-DD
        #[clap(long)]
        received_on: String,
        #[clap(long, value_enum)]
        contributor: ContributorArg,
        /// Record the contributor tag names (omit for external donors)
        #[clap(long)]
        record: Option<String>,
        /// Donor name for external donors
        #[clap(long)]
        donor: Option<String>,
        #[clap(long)]
        comments: Option<String>,
    },
    List {
        #[clap(long)]
        record: Option<String>,
        #[clap(long)]
        member: Option<String>,
    },
    Inactivate {
        #[clap(long)]
        id: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct JournalCli {
    #[clap(subcommand)]
    pub command: JournalCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum JournalCommand {
    List {
        #[clap(long)]
        root: Option<String>,
        #[clap(long, default_value_t = 50)]
        limit: usize,
    },
    /// Resolve interrupted cascades in the audit log against the journal
    Verify,
}

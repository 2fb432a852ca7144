//! Centralized database schema definitions.
//!
//! All hierarchy state lives in one SQLite database so that a cascade can be
//! committed as a single transaction:
//! 1. `members`: personal identity, independent of any role.
//! 2. `hierarchy_nodes`: every level of the tree, one row per record.
//! 3. `offerings`: attributed income.
//! 4. `cascade_journal`: one row per committed transition plan.

pub const HIERARCHY_DB_NAME: &str = "hierarchy.db";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";
pub const HIERARCHY_SCHEMA_VERSION: u32 = 1;

pub const HIERARCHY_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

pub const HIERARCHY_DB_SCHEMA_MEMBERS: &str = "
    CREATE TABLE IF NOT EXISTS members (
        id TEXT PRIMARY KEY,
        first_names TEXT NOT NULL,
        last_names TEXT NOT NULL,
        birth_date TEXT NOT NULL,
        gender TEXT NOT NULL,
        marital_status TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        country TEXT,
        city TEXT,
        address TEXT,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL,
        updated_at TEXT,
        updated_by TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_members_email ON members(email) WHERE email IS NOT NULL;
";

// Ancestor columns carry no foreign keys: they are denormalized pointers kept
// consistent by the cascade executor, and deleted records may still be named
// by inactive history rows.
pub const HIERARCHY_DB_SCHEMA_NODES: &str = "
    CREATE TABLE IF NOT EXISTS hierarchy_nodes (
        id TEXT PRIMARY KEY,
        level TEXT NOT NULL,
        member_id TEXT REFERENCES members(id),
        name TEXT,
        code TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        inactivation_cause TEXT,
        church_id TEXT,
        pastor_id TEXT,
        copastor_id TEXT,
        supervisor_id TEXT,
        zone_id TEXT,
        preacher_id TEXT,
        family_group_id TEXT,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL,
        updated_at TEXT,
        updated_by TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_nodes_level ON hierarchy_nodes(level, status);
    CREATE INDEX IF NOT EXISTS idx_nodes_church ON hierarchy_nodes(church_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_pastor ON hierarchy_nodes(pastor_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_copastor ON hierarchy_nodes(copastor_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_supervisor ON hierarchy_nodes(supervisor_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_zone ON hierarchy_nodes(zone_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_preacher ON hierarchy_nodes(preacher_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_family_group ON hierarchy_nodes(family_group_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_single_active_role
        ON hierarchy_nodes(member_id)
        WHERE status = 'active' AND member_id IS NOT NULL;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_one_group_per_preacher
        ON hierarchy_nodes(preacher_id)
        WHERE level = 'family_group' AND status = 'active' AND preacher_id IS NOT NULL;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_one_zone_per_supervisor
        ON hierarchy_nodes(supervisor_id)
        WHERE level = 'zone' AND status = 'active' AND supervisor_id IS NOT NULL;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_family_group_code
        ON hierarchy_nodes(code)
        WHERE level = 'family_group' AND code IS NOT NULL;
";

pub const HIERARCHY_DB_SCHEMA_OFFERINGS: &str = "
    CREATE TABLE IF NOT EXISTS offerings (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        currency TEXT NOT NULL,
        received_on TEXT NOT NULL,
        contributor_type TEXT NOT NULL,
        contributor_record_id TEXT,
        contributor_member_id TEXT REFERENCES members(id),
        donor_name TEXT,
        church_id TEXT,
        comments TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL,
        updated_at TEXT,
        updated_by TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_offerings_record ON offerings(contributor_record_id);
    CREATE INDEX IF NOT EXISTS idx_offerings_member ON offerings(contributor_member_id);
";

pub const HIERARCHY_DB_SCHEMA_JOURNAL: &str = "
    CREATE TABLE IF NOT EXISTS cascade_journal (
        plan_id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        root_id TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        actor TEXT NOT NULL,
        write_count INTEGER NOT NULL,
        updated_ids TEXT NOT NULL, -- JSON array
        orphaned_ids TEXT NOT NULL, -- JSON array
        committed_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_journal_root ON cascade_journal(root_id);
";

/// Column list shared by every `hierarchy_nodes` SELECT.
pub const NODE_COLUMNS: &str = "id, level, member_id, name, code, status, inactivation_cause, \
     church_id, pastor_id, copastor_id, supervisor_id, zone_id, preacher_id, family_group_id, \
     version, created_at, created_by, updated_at, updated_by";

pub const MEMBER_COLUMNS: &str = "id, first_names, last_names, birth_date, gender, marital_status, \
     email, phone, country, city, address, created_at, created_by, updated_at, updated_by";

pub const OFFERING_COLUMNS: &str = "id, kind, amount_cents, currency, received_on, contributor_type, \
     contributor_record_id, contributor_member_id, donor_name, church_id, comments, status, \
     created_at, created_by, updated_at, updated_by";

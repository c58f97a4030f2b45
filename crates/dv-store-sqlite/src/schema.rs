//! SQL schema for the vault SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// No UPDATE or DELETE is ever issued against any of these tables.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS hubs (
    hash_key      TEXT PRIMARY KEY,
    entity_type   TEXT NOT NULL,
    business_key  TEXT NOT NULL,   -- normalised natural key
    source_system TEXT NOT NULL,
    load_ts       TEXT NOT NULL,   -- fixed-width RFC 3339, sorts as text
    record_source TEXT NOT NULL,
    batch_id      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS links (
    hash_key      TEXT PRIMARY KEY,
    link_type     TEXT NOT NULL,
    load_ts       TEXT NOT NULL,
    record_source TEXT NOT NULL,
    batch_id      TEXT NOT NULL
);

-- Foreign hub hash keys of each link, in declaration order. The referenced
-- hub need not exist: the raw vault records dangling references as-is.
CREATE TABLE IF NOT EXISTS link_participants (
    link_hash_key TEXT    NOT NULL REFERENCES links(hash_key),
    position      INTEGER NOT NULL,
    role          TEXT    NOT NULL,
    entity_type   TEXT    NOT NULL,
    hub_hash_key  TEXT    NOT NULL,
    PRIMARY KEY (link_hash_key, position)
);

-- seq is the insertion order; it breaks ties between equal load_ts values.
CREATE TABLE IF NOT EXISTS satellites (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    satellite       TEXT NOT NULL,
    parent_kind     TEXT NOT NULL,   -- 'hub' | 'link'
    parent_type     TEXT NOT NULL,
    parent_hash_key TEXT NOT NULL,
    load_ts         TEXT NOT NULL,
    hash_diff       TEXT NOT NULL,
    attributes      TEXT NOT NULL,   -- JSON object, keys sorted
    record_source   TEXT NOT NULL,
    batch_id        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS batches (
    batch_id      TEXT PRIMARY KEY,
    source_system TEXT NOT NULL,
    table_name    TEXT NOT NULL,
    record_source TEXT NOT NULL,
    load_ts       TEXT NOT NULL,
    started_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS batch_outcomes (
    batch_id    TEXT PRIMARY KEY REFERENCES batches(batch_id),
    status      TEXT NOT NULL,       -- 'completed' | 'aborted'
    finished_at TEXT NOT NULL,
    report_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS hubs_entity_idx          ON hubs(entity_type);
CREATE INDEX IF NOT EXISTS link_participants_hub_idx ON link_participants(hub_hash_key);
CREATE INDEX IF NOT EXISTS satellites_parent_idx
    ON satellites(satellite, parent_hash_key, load_ts, seq);

PRAGMA user_version = 1;
";

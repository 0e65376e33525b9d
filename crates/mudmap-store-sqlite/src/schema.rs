//! SQL schema for the mudmap SQLite store.
//!
//! Local and remote replicas share this schema. It is executed once at
//! connection startup; `PRAGMA user_version` records the version so a newer
//! database is refused rather than misread.

/// Version written by [`SCHEMA`].
pub const SCHEMA_VERSION: i64 = 1;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Timestamps are RFC 3339 UTC strings with microsecond precision, so string
/// comparison orders them chronologically.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS entities (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    entity_type       TEXT NOT NULL,   -- 'Room' | 'NPC'
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    sync_status       TEXT NOT NULL DEFAULT 'dirty',
    remote_updated_at TEXT,
    UNIQUE (name, entity_type)
);

-- One row per room entity; the entity name is the room number.
CREATE TABLE IF NOT EXISTS rooms (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id         INTEGER NOT NULL UNIQUE REFERENCES entities(id),
    room_number       INTEGER NOT NULL UNIQUE,
    full_name         TEXT,            -- NULL for placeholder rooms
    zone              TEXT,
    terrain           TEXT,
    outside           INTEGER NOT NULL DEFAULT 0,
    coord_x           INTEGER,
    coord_y           INTEGER,
    coord_z           INTEGER,
    details           TEXT,            -- opaque JSON
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    sync_status       TEXT NOT NULL DEFAULT 'dirty',
    remote_updated_at TEXT
);

-- Directed edges. to_room_id stays NULL until the target room exists.
CREATE TABLE IF NOT EXISTS room_exits (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    from_room_id      INTEGER NOT NULL REFERENCES rooms(id),
    direction         TEXT NOT NULL,
    to_room_id        INTEGER REFERENCES rooms(id),
    to_room_number    INTEGER NOT NULL,
    details           TEXT NOT NULL DEFAULT '{}',
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    sync_status       TEXT NOT NULL DEFAULT 'dirty',
    remote_updated_at TEXT,
    UNIQUE (from_room_id, to_room_number)
);

CREATE TABLE IF NOT EXISTS npcs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id         INTEGER NOT NULL UNIQUE REFERENCES entities(id),
    current_room_id   INTEGER REFERENCES rooms(id),
    npc_type          TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    sync_status       TEXT NOT NULL DEFAULT 'dirty',
    remote_updated_at TEXT
);

-- Append-only.
CREATE TABLE IF NOT EXISTS observations (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id         INTEGER NOT NULL REFERENCES entities(id),
    observation_text  TEXT NOT NULL,
    observation_type  TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    sync_status       TEXT NOT NULL DEFAULT 'dirty',
    remote_updated_at TEXT,
    UNIQUE (entity_id, observation_text)
);

CREATE TABLE IF NOT EXISTS relations (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    from_entity_id    INTEGER NOT NULL REFERENCES entities(id),
    to_entity_id      INTEGER NOT NULL REFERENCES entities(id),
    relation_type     TEXT NOT NULL,
    metadata          TEXT,            -- JSON
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    sync_status       TEXT NOT NULL DEFAULT 'dirty',
    remote_updated_at TEXT,
    UNIQUE (from_entity_id, to_entity_id, relation_type)
);

CREATE INDEX IF NOT EXISTS rooms_zone_idx           ON rooms(zone);
CREATE INDEX IF NOT EXISTS room_exits_to_number_idx ON room_exits(to_room_number);
CREATE INDEX IF NOT EXISTS npcs_room_idx            ON npcs(current_room_id);

CREATE INDEX IF NOT EXISTS entities_sync_idx     ON entities(sync_status, updated_at);
CREATE INDEX IF NOT EXISTS rooms_sync_idx        ON rooms(sync_status, updated_at);
CREATE INDEX IF NOT EXISTS room_exits_sync_idx   ON room_exits(sync_status, updated_at);
CREATE INDEX IF NOT EXISTS npcs_sync_idx         ON npcs(sync_status, updated_at);
CREATE INDEX IF NOT EXISTS observations_sync_idx ON observations(sync_status, updated_at);
CREATE INDEX IF NOT EXISTS relations_sync_idx    ON relations(sync_status, updated_at);

PRAGMA user_version = 1;
";

//! SQL schema for the deviation store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

-- The aggregate root. Rows are never deleted; CLOSED and DEVIATION_DROPPED
-- are terminal statuses.
CREATE TABLE IF NOT EXISTS deviations (
    id                       INTEGER PRIMARY KEY,
    deviation_number         TEXT    NOT NULL UNIQUE,
    deviation_type           TEXT    NOT NULL,   -- PRODUCT | MATERIAL | EQUIPMENT | DOCUMENT
    severity                 TEXT    NOT NULL,   -- MINOR | MAJOR | CRITICAL
    status                   TEXT    NOT NULL,
    version                  INTEGER NOT NULL DEFAULT 0,
    date_of_occurrence       TEXT    NOT NULL,   -- YYYY-MM-DD
    identified_at            TEXT    NOT NULL,   -- RFC 3339 UTC
    justification_for_delay  TEXT,
    description              TEXT    NOT NULL,
    standard_procedure       TEXT,
    risk_assessment          TEXT,
    remarks                  TEXT,
    review_comment           TEXT,
    root_cause               TEXT,
    immediate_actions        TEXT,
    remediation_action_taken TEXT,
    impact_on_batches        INTEGER NOT NULL DEFAULT 0,
    product_id               INTEGER,
    material_id              INTEGER,
    equipment_id             INTEGER,
    batch_id                 INTEGER,
    document_id              INTEGER,
    material_lot_number      TEXT,
    cft_required             INTEGER NOT NULL DEFAULT 0,
    cft_department_id        INTEGER,
    created_at               TEXT    NOT NULL,
    status_changed_at        TEXT    NOT NULL
);

-- One row per status change. Strictly append-only.
CREATE TABLE IF NOT EXISTS deviation_history (
    history_id   INTEGER PRIMARY KEY,
    deviation_id INTEGER NOT NULL REFERENCES deviations(id),
    from_status  TEXT    NOT NULL,
    to_status    TEXT    NOT NULL,
    transition   TEXT    NOT NULL,
    remark       TEXT,
    actor_id     INTEGER,
    recorded_at  TEXT    NOT NULL
);

-- The approval ledger. Strictly append-only; a pending record is settled by
-- a later row that names it in `resolves`, at most once.
CREATE TABLE IF NOT EXISTS approvals (
    approval_id   INTEGER PRIMARY KEY,
    deviation_id  INTEGER NOT NULL REFERENCES deviations(id),
    approval_date TEXT    NOT NULL,
    status        TEXT    NOT NULL,   -- approved | rejected | pending
    approver_id   INTEGER NOT NULL,
    approver_role TEXT    NOT NULL,
    approver_name TEXT    NOT NULL,
    comments      TEXT,
    resolves      INTEGER REFERENCES approvals(approval_id),
    recorded_at   TEXT    NOT NULL,
    previous_hash TEXT,
    entry_hash    TEXT    NOT NULL,
    UNIQUE (resolves)
);

CREATE TABLE IF NOT EXISTS assessments (
    assessment_id             INTEGER PRIMARY KEY,
    deviation_id              INTEGER NOT NULL REFERENCES deviations(id),
    assessment_date           TEXT    NOT NULL,
    assessment_type           TEXT    NOT NULL,
    result                    TEXT    NOT NULL,
    score                     REAL    NOT NULL,
    severity                  TEXT,
    probability_of_recurrence INTEGER,
    is_repeated               INTEGER NOT NULL DEFAULT 0,
    historical_recurrences    INTEGER,
    market_action_required    INTEGER NOT NULL DEFAULT 0,
    expected_closure_date     TEXT,
    comments                  TEXT,
    file_attachment_id        INTEGER,
    recorded_at               TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS cft_assignments (
    assignment_id     INTEGER PRIMARY KEY,
    deviation_id      INTEGER NOT NULL REFERENCES deviations(id),
    department_id     INTEGER NOT NULL,
    cft_department_id INTEGER NOT NULL,
    reviewer_id       INTEGER NOT NULL,
    assigned_by       INTEGER NOT NULL,
    assigned_at       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS investigations (
    investigation_id INTEGER PRIMARY KEY,
    deviation_id     INTEGER NOT NULL REFERENCES deviations(id),
    summary          TEXT    NOT NULL,
    opened_at        TEXT    NOT NULL
);

CREATE TRIGGER IF NOT EXISTS approvals_no_update BEFORE UPDATE ON approvals
BEGIN SELECT RAISE(ABORT, 'approvals are append-only'); END;

CREATE TRIGGER IF NOT EXISTS approvals_no_delete BEFORE DELETE ON approvals
BEGIN SELECT RAISE(ABORT, 'approvals are append-only'); END;

CREATE TRIGGER IF NOT EXISTS history_no_update BEFORE UPDATE ON deviation_history
BEGIN SELECT RAISE(ABORT, 'history is append-only'); END;

CREATE TRIGGER IF NOT EXISTS history_no_delete BEFORE DELETE ON deviation_history
BEGIN SELECT RAISE(ABORT, 'history is append-only'); END;

CREATE INDEX IF NOT EXISTS deviations_status_idx     ON deviations(status);
CREATE INDEX IF NOT EXISTS deviations_occurrence_idx ON deviations(date_of_occurrence);
CREATE INDEX IF NOT EXISTS history_deviation_idx     ON deviation_history(deviation_id);
CREATE INDEX IF NOT EXISTS approvals_deviation_idx   ON approvals(deviation_id);
CREATE INDEX IF NOT EXISTS assessments_deviation_idx ON assessments(deviation_id);
CREATE INDEX IF NOT EXISTS cft_deviation_idx         ON cft_assignments(deviation_id);

PRAGMA user_version = 1;
";

//! SQL schema for the Lectern SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS identities (
    email         TEXT PRIMARY KEY,
    role          TEXT NOT NULL,   -- 'user' | 'instructor' | 'admin'
    name          TEXT,
    photo_url     TEXT,
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subjects (
    subject_id       TEXT PRIMARY KEY,
    instructor_email TEXT NOT NULL,
    title            TEXT NOT NULL,
    price            REAL NOT NULL CHECK (price >= 0),
    available_seats  INTEGER NOT NULL CHECK (available_seats >= 0),
    enrolled_count   INTEGER NOT NULL CHECK (enrolled_count >= 0),
    status           TEXT NOT NULL,   -- 'pending' | 'approved'
    feedback         TEXT,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS selections (
    selection_id   TEXT PRIMARY KEY,
    student_email  TEXT NOT NULL,
    subject_id     TEXT NOT NULL REFERENCES subjects(subject_id),
    price_snapshot REAL NOT NULL,
    created_at     TEXT NOT NULL
);

-- Payments are strictly append-only.
-- The triggers below reject any UPDATE or DELETE.
CREATE TABLE IF NOT EXISTS payments (
    payment_id         TEXT PRIMARY KEY,
    email              TEXT NOT NULL,
    subject_id         TEXT NOT NULL REFERENCES subjects(subject_id),
    selection_id       TEXT NOT NULL,
    amount             INTEGER NOT NULL CHECK (amount >= 0),
    reservation_handle TEXT NOT NULL,
    recorded_at        TEXT NOT NULL,
    UNIQUE (reservation_handle),
    UNIQUE (selection_id)
);

CREATE TRIGGER IF NOT EXISTS payments_no_update
BEFORE UPDATE ON payments
BEGIN
    SELECT RAISE(ABORT, 'payments are append-only');
END;

CREATE TRIGGER IF NOT EXISTS payments_no_delete
BEFORE DELETE ON payments
BEGIN
    SELECT RAISE(ABORT, 'payments are append-only');
END;

CREATE INDEX IF NOT EXISTS subjects_status_idx     ON subjects(status);
CREATE INDEX IF NOT EXISTS selections_student_idx  ON selections(student_email);
CREATE INDEX IF NOT EXISTS payments_email_idx      ON payments(email);

PRAGMA user_version = 1;
";

//! SQL schema for the certification survey store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS specs (
    spec_version TEXT PRIMARY KEY,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sections (
    spec_version TEXT NOT NULL REFERENCES specs(spec_version),
    name         TEXT NOT NULL,
    title        TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (spec_version, name)
);

CREATE TABLE IF NOT EXISTS questions (
    spec_version        TEXT NOT NULL REFERENCES specs(spec_version),
    number              TEXT NOT NULL,
    section_name        TEXT NOT NULL,
    question_text       TEXT NOT NULL,
    question_type       TEXT NOT NULL,   -- YES_NO | YES_NO_EVIDENCE | YES_NO_NA | SUBQUESTIONS
    correct_answer      TEXT NOT NULL,   -- minimum valid children for SUBQUESTIONS
    evidence_prompt     TEXT,            -- not-applicable prompt for YES_NO_NA
    evidence_validation TEXT,
    spec_reference      TEXT,
    subquestion_of      TEXT,
    PRIMARY KEY (spec_version, number),
    FOREIGN KEY (spec_version, section_name) REFERENCES sections(spec_version, name)
);

-- At most one response per user and spec version.
CREATE TABLE IF NOT EXISTS survey_responses (
    response_id  TEXT PRIMARY KEY,
    username     TEXT NOT NULL,
    spec_version TEXT NOT NULL REFERENCES specs(spec_version),
    submitted    INTEGER NOT NULL DEFAULT 0,
    approved     INTEGER NOT NULL DEFAULT 0,
    rejected     INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (username, spec_version),
    CHECK  (NOT (approved AND rejected))
);

-- One row per answered question. Sub-question groups store a NULL answer;
-- their children are rows of their own.
CREATE TABLE IF NOT EXISTS answers (
    response_id TEXT NOT NULL REFERENCES survey_responses(response_id),
    number      TEXT NOT NULL,
    answer      TEXT,
    evidence    TEXT,
    PRIMARY KEY (response_id, number)
);

CREATE INDEX IF NOT EXISTS questions_parent_idx ON questions(spec_version, subquestion_of);
CREATE INDEX IF NOT EXISTS responses_user_idx   ON survey_responses(username);

PRAGMA user_version = 1;
";

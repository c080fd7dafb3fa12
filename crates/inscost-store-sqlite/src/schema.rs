//! SQL schema for the inscost SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Dimensions: one row per natural key, enforced by UNIQUE.
-- Rows are only ever inserted.
CREATE TABLE IF NOT EXISTS dim_age (
    age_id     INTEGER PRIMARY KEY,
    age_group  TEXT NOT NULL UNIQUE   -- '18-25' | '26-35' | '36-50' | '50+'
);

CREATE TABLE IF NOT EXISTS dim_sex (
    sex_id  INTEGER PRIMARY KEY,
    sex     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS dim_smoker (
    smoker_id  INTEGER PRIMARY KEY,
    status     TEXT NOT NULL UNIQUE   -- 'yes' | 'no'
);

CREATE TABLE IF NOT EXISTS dim_region (
    region_id  INTEGER PRIMARY KEY,
    region     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS dim_children (
    children_id  INTEGER PRIMARY KEY,
    child_count  INTEGER NOT NULL UNIQUE CHECK (child_count >= 0)
);

-- Facts are strictly append-only, one row per source record.
CREATE TABLE IF NOT EXISTS fact_insurance (
    age_id       INTEGER NOT NULL REFERENCES dim_age(age_id),
    sex_id       INTEGER NOT NULL REFERENCES dim_sex(sex_id),
    bmi          REAL    NOT NULL,
    children_id  INTEGER NOT NULL REFERENCES dim_children(children_id),
    smoker_id    INTEGER NOT NULL REFERENCES dim_smoker(smoker_id),
    region_id    INTEGER NOT NULL REFERENCES dim_region(region_id),
    charges      REAL    NOT NULL
);

CREATE INDEX IF NOT EXISTS fact_age_idx      ON fact_insurance(age_id);
CREATE INDEX IF NOT EXISTS fact_sex_idx      ON fact_insurance(sex_id);
CREATE INDEX IF NOT EXISTS fact_children_idx ON fact_insurance(children_id);
CREATE INDEX IF NOT EXISTS fact_smoker_idx   ON fact_insurance(smoker_id);
CREATE INDEX IF NOT EXISTS fact_region_idx   ON fact_insurance(region_id);

-- Read model for reporting; never written to.
CREATE VIEW IF NOT EXISTS insurance_flat AS
SELECT a.age_group    AS age,
       s.sex          AS sex,
       f.bmi          AS bmi,
       c.child_count  AS children,
       sm.status      AS smoker,
       f.charges      AS charges,
       r.region       AS region
FROM fact_insurance f
JOIN dim_age      a  ON f.age_id      = a.age_id
JOIN dim_sex      s  ON f.sex_id      = s.sex_id
JOIN dim_children c  ON f.children_id = c.children_id
JOIN dim_smoker   sm ON f.smoker_id   = sm.smoker_id
JOIN dim_region   r  ON f.region_id   = r.region_id;

-- One row per pipeline run, committed or aborted.
CREATE TABLE IF NOT EXISTS etl_runs (
    run_id            TEXT PRIMARY KEY,
    started_at        TEXT NOT NULL,   -- ISO 8601 UTC
    finished_at       TEXT NOT NULL,
    source            TEXT NOT NULL,
    source_sha256     TEXT NOT NULL,
    records_read      INTEGER NOT NULL,
    records_rejected  INTEGER NOT NULL,
    facts_loaded      INTEGER NOT NULL,
    outcome           TEXT NOT NULL,   -- 'committed' | 'aborted'
    error             TEXT
);

CREATE INDEX IF NOT EXISTS etl_runs_started_idx ON etl_runs(started_at);

PRAGMA user_version = 1;
";

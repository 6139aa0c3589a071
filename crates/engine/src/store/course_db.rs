use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE courses (
    course_id       TEXT PRIMARY KEY,
    path            TEXT NOT NULL,
    short_name      TEXT NULL,
    title           TEXT NULL,
    commit_hash     TEXT NULL,
    sync_errors     TEXT NULL,
    sync_warnings   TEXT NULL
);

CREATE TABLE questions (
    course_id       TEXT NOT NULL,
    qid             TEXT NOT NULL,
    uuid            TEXT NULL,
    title           TEXT NULL,
    topic           TEXT NULL,
    tags            TEXT NOT NULL DEFAULT '[]',
    sync_errors     TEXT NULL,
    sync_warnings   TEXT NULL,
    deleted_at      TEXT NULL,
    PRIMARY KEY (course_id, qid)
);

CREATE TABLE course_instances (
    course_id       TEXT NOT NULL,
    short_name      TEXT NOT NULL,
    uuid            TEXT NULL,
    long_name       TEXT NULL,
    sync_errors     TEXT NULL,
    sync_warnings   TEXT NULL,
    deleted_at      TEXT NULL,
    PRIMARY KEY (course_id, short_name)
);

CREATE TABLE assessments (
    course_id       TEXT NOT NULL,
    course_instance TEXT NOT NULL,
    tid             TEXT NOT NULL,
    uuid            TEXT NULL,
    title           TEXT NULL,
    type            TEXT NULL,
    set_name        TEXT NULL,
    number          TEXT NULL,
    sync_errors     TEXT NULL,
    sync_warnings   TEXT NULL,
    deleted_at      TEXT NULL,
    PRIMARY KEY (course_id, course_instance, tid)
);

CREATE TABLE assessment_questions (
    course_id       TEXT NOT NULL,
    course_instance TEXT NOT NULL,
    tid             TEXT NOT NULL,
    qid             TEXT NOT NULL,
    number          INTEGER NOT NULL,
    deleted_at      TEXT NULL,
    PRIMARY KEY (course_id, course_instance, tid, qid)
);

CREATE INDEX assessment_questions_qid_idx
    ON assessment_questions (course_id, qid);

CREATE TABLE course_tags (
    course_id       TEXT NOT NULL,
    kind            TEXT NOT NULL CHECK (kind IN ('tag', 'topic')),
    name            TEXT NOT NULL,
    color           TEXT NULL,
    description     TEXT NULL,
    deleted_at      TEXT NULL,
    PRIMARY KEY (course_id, kind, name)
);
"#;

const MIGRATION_V2_SQL: &str = r#"
CREATE TABLE job_sequences (
    job_id          TEXT PRIMARY KEY,
    course_id       TEXT NOT NULL,
    description     TEXT NOT NULL,
    user_uid        TEXT NOT NULL,
    authn_user_uid  TEXT NOT NULL,
    status          TEXT NOT NULL CHECK (status IN ('running', 'success', 'error')),
    data            TEXT NOT NULL,
    log             TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    finished_at     TEXT NULL
);

CREATE INDEX job_sequences_course_idx
    ON job_sequences (course_id, created_at);
"#;

pub(crate) const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL), (2, MIGRATION_V2_SQL)];

// ── Snapshot rows ───────────────────────────────────────────────────

/// Course-level metadata from `infoCourse.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRow {
    pub short_name: Option<String>,
    pub title: Option<String>,
    pub sync_errors: Vec<String>,
    pub sync_warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Tag,
    Topic,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Topic => "topic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub kind: TagKind,
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRow {
    pub qid: String,
    pub uuid: Option<String>,
    pub title: Option<String>,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub sync_errors: Vec<String>,
    pub sync_warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInstanceRow {
    pub short_name: String,
    pub uuid: Option<String>,
    pub long_name: Option<String>,
    pub sync_errors: Vec<String>,
    pub sync_warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRow {
    pub course_instance: String,
    pub tid: String,
    pub uuid: Option<String>,
    pub title: Option<String>,
    pub assessment_type: Option<String>,
    pub set_name: Option<String>,
    pub number: Option<String>,
    pub sync_errors: Vec<String>,
    pub sync_warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentQuestionRow {
    pub course_instance: String,
    pub tid: String,
    pub qid: String,
    /// 1-based position within the assessment.
    pub number: i64,
}

/// Everything a sync pass believes should be live for one course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseSnapshot {
    pub course: CourseRow,
    pub tags: Vec<TagRow>,
    pub questions: Vec<QuestionRow>,
    pub course_instances: Vec<CourseInstanceRow>,
    pub assessments: Vec<AssessmentRow>,
    pub assessment_questions: Vec<AssessmentQuestionRow>,
}

// ── Store ───────────────────────────────────────────────────────────

/// Relational store that course content is synced into.
#[derive(Debug)]
pub struct CourseStore {
    conn: Mutex<Connection>,
}

impl CourseStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create course store parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open course store at `{}`", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("failed to configure sqlite pragmas for course store")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory course store")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("failed to enable sqlite foreign keys")?;
        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("course store lock poisoned"))
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn()?;
        current_schema_version(&conn)
    }

    /// Reconcile the store with `snapshot`: upsert every row present, soft-delete
    /// every live row that is absent. Returns the number of rows changed, which
    /// is zero when the store already matches.
    pub fn apply_snapshot(
        &self,
        course_id: &str,
        course_path: &Path,
        snapshot: &CourseSnapshot,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to start sync transaction")?;
        let mut changes = 0;

        changes += upsert_course(&tx, course_id, course_path, &snapshot.course)?;

        for tag in &snapshot.tags {
            changes += upsert_tag(&tx, course_id, tag)?;
        }
        let keep = snapshot.tags.iter().map(|t| vec![t.kind.as_str().to_string(), t.name.clone()]);
        changes += soft_delete_missing(&tx, &TAGS, course_id, keep.collect())?;

        for question in &snapshot.questions {
            changes += upsert_question(&tx, course_id, question)?;
        }
        let keep = snapshot.questions.iter().map(|q| vec![q.qid.clone()]);
        changes += soft_delete_missing(&tx, &QUESTIONS, course_id, keep.collect())?;

        for instance in &snapshot.course_instances {
            changes += upsert_course_instance(&tx, course_id, instance)?;
        }
        let keep = snapshot.course_instances.iter().map(|ci| vec![ci.short_name.clone()]);
        changes += soft_delete_missing(&tx, &COURSE_INSTANCES, course_id, keep.collect())?;

        for assessment in &snapshot.assessments {
            changes += upsert_assessment(&tx, course_id, assessment)?;
        }
        let keep =
            snapshot.assessments.iter().map(|a| vec![a.course_instance.clone(), a.tid.clone()]);
        changes += soft_delete_missing(&tx, &ASSESSMENTS, course_id, keep.collect())?;

        for link in &snapshot.assessment_questions {
            changes += upsert_assessment_question(&tx, course_id, link)?;
        }
        let keep = snapshot
            .assessment_questions
            .iter()
            .map(|l| vec![l.course_instance.clone(), l.tid.clone(), l.qid.clone()]);
        changes += soft_delete_missing(&tx, &ASSESSMENT_QUESTIONS, course_id, keep.collect())?;

        tx.commit().context("failed to commit sync transaction")?;
        Ok(changes)
    }

    /// Record the working-copy revision the store now reflects.
    pub fn update_commit_hash(&self, course_id: &str, commit_hash: Option<&str>) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE courses SET commit_hash = ?2 WHERE course_id = ?1",
                params![course_id, commit_hash],
            )
            .with_context(|| format!("failed to update commit hash for course {course_id}"))?;
        Ok(())
    }

    pub fn commit_hash(&self, course_id: &str) -> Result<Option<String>> {
        let hash: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT commit_hash FROM courses WHERE course_id = ?1",
                [course_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read course commit hash")?;
        Ok(hash.flatten())
    }

    /// Question ids currently live (not soft-deleted).
    pub fn live_question_ids(&self, course_id: &str) -> Result<Vec<String>> {
        self.string_column(
            "SELECT qid FROM questions WHERE course_id = ?1 AND deleted_at IS NULL ORDER BY qid",
            course_id,
        )
    }

    /// Question ids that were soft-deleted.
    pub fn deleted_question_ids(&self, course_id: &str) -> Result<Vec<String>> {
        self.string_column(
            "SELECT qid FROM questions WHERE course_id = ?1 AND deleted_at IS NOT NULL ORDER BY qid",
            course_id,
        )
    }

    /// Live question row, if any.
    pub fn question(&self, course_id: &str, qid: &str) -> Result<Option<QuestionRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT qid, uuid, title, topic, tags, sync_errors, sync_warnings
             FROM questions WHERE course_id = ?1 AND qid = ?2 AND deleted_at IS NULL",
            params![course_id, qid],
            |row| {
                Ok(QuestionRow {
                    qid: row.get(0)?,
                    uuid: row.get(1)?,
                    title: row.get(2)?,
                    topic: row.get(3)?,
                    tags: decode_list(row.get::<_, Option<String>>(4)?),
                    sync_errors: decode_list(row.get::<_, Option<String>>(5)?),
                    sync_warnings: decode_list(row.get::<_, Option<String>>(6)?),
                })
            },
        )
        .optional()
        .context("failed to read question")
    }

    pub(crate) fn string_column(&self, sql: &str, course_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).context("failed to prepare store query")?;
        let rows = stmt
            .query_map([course_id], |row| row.get::<_, String>(0))
            .context("failed to run store query")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read store rows")
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply course store migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}

// ── Reconciliation helpers ──────────────────────────────────────────

/// `None` for an empty list so unchanged rows compare equal as NULL.
fn encode_list(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        serde_json::to_string(items).ok()
    }
}

pub(crate) fn decode_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|text| serde_json::from_str(&text).ok()).unwrap_or_default()
}

fn upsert_course(tx: &Transaction<'_>, course_id: &str, path: &Path, row: &CourseRow) -> Result<usize> {
    tx.execute(
        "INSERT INTO courses (course_id, path, short_name, title, sync_errors, sync_warnings)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (course_id) DO UPDATE SET
            path = excluded.path,
            short_name = excluded.short_name,
            title = excluded.title,
            sync_errors = excluded.sync_errors,
            sync_warnings = excluded.sync_warnings
         WHERE courses.path IS NOT excluded.path
            OR courses.short_name IS NOT excluded.short_name
            OR courses.title IS NOT excluded.title
            OR courses.sync_errors IS NOT excluded.sync_errors
            OR courses.sync_warnings IS NOT excluded.sync_warnings",
        params![
            course_id,
            path.display().to_string(),
            row.short_name,
            row.title,
            encode_list(&row.sync_errors),
            encode_list(&row.sync_warnings),
        ],
    )
    .context("failed to upsert course")
}

fn upsert_tag(tx: &Transaction<'_>, course_id: &str, row: &TagRow) -> Result<usize> {
    tx.execute(
        "INSERT INTO course_tags (course_id, kind, name, color, description, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL)
         ON CONFLICT (course_id, kind, name) DO UPDATE SET
            color = excluded.color,
            description = excluded.description,
            deleted_at = NULL
         WHERE course_tags.color IS NOT excluded.color
            OR course_tags.description IS NOT excluded.description
            OR course_tags.deleted_at IS NOT NULL",
        params![course_id, row.kind.as_str(), row.name, row.color, row.description],
    )
    .with_context(|| format!("failed to upsert {} `{}`", row.kind.as_str(), row.name))
}

fn upsert_question(tx: &Transaction<'_>, course_id: &str, row: &QuestionRow) -> Result<usize> {
    let tags = serde_json::to_string(&row.tags).context("failed to encode question tags")?;
    tx.execute(
        "INSERT INTO questions
            (course_id, qid, uuid, title, topic, tags, sync_errors, sync_warnings, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)
         ON CONFLICT (course_id, qid) DO UPDATE SET
            uuid = excluded.uuid,
            title = excluded.title,
            topic = excluded.topic,
            tags = excluded.tags,
            sync_errors = excluded.sync_errors,
            sync_warnings = excluded.sync_warnings,
            deleted_at = NULL
         WHERE questions.uuid IS NOT excluded.uuid
            OR questions.title IS NOT excluded.title
            OR questions.topic IS NOT excluded.topic
            OR questions.tags IS NOT excluded.tags
            OR questions.sync_errors IS NOT excluded.sync_errors
            OR questions.sync_warnings IS NOT excluded.sync_warnings
            OR questions.deleted_at IS NOT NULL",
        params![
            course_id,
            row.qid,
            row.uuid,
            row.title,
            row.topic,
            tags,
            encode_list(&row.sync_errors),
            encode_list(&row.sync_warnings),
        ],
    )
    .with_context(|| format!("failed to upsert question `{}`", row.qid))
}

fn upsert_course_instance(
    tx: &Transaction<'_>,
    course_id: &str,
    row: &CourseInstanceRow,
) -> Result<usize> {
    tx.execute(
        "INSERT INTO course_instances
            (course_id, short_name, uuid, long_name, sync_errors, sync_warnings, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
         ON CONFLICT (course_id, short_name) DO UPDATE SET
            uuid = excluded.uuid,
            long_name = excluded.long_name,
            sync_errors = excluded.sync_errors,
            sync_warnings = excluded.sync_warnings,
            deleted_at = NULL
         WHERE course_instances.uuid IS NOT excluded.uuid
            OR course_instances.long_name IS NOT excluded.long_name
            OR course_instances.sync_errors IS NOT excluded.sync_errors
            OR course_instances.sync_warnings IS NOT excluded.sync_warnings
            OR course_instances.deleted_at IS NOT NULL",
        params![
            course_id,
            row.short_name,
            row.uuid,
            row.long_name,
            encode_list(&row.sync_errors),
            encode_list(&row.sync_warnings),
        ],
    )
    .with_context(|| format!("failed to upsert course instance `{}`", row.short_name))
}

fn upsert_assessment(tx: &Transaction<'_>, course_id: &str, row: &AssessmentRow) -> Result<usize> {
    tx.execute(
        "INSERT INTO assessments
            (course_id, course_instance, tid, uuid, title, type, set_name, number,
             sync_errors, sync_warnings, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)
         ON CONFLICT (course_id, course_instance, tid) DO UPDATE SET
            uuid = excluded.uuid,
            title = excluded.title,
            type = excluded.type,
            set_name = excluded.set_name,
            number = excluded.number,
            sync_errors = excluded.sync_errors,
            sync_warnings = excluded.sync_warnings,
            deleted_at = NULL
         WHERE assessments.uuid IS NOT excluded.uuid
            OR assessments.title IS NOT excluded.title
            OR assessments.type IS NOT excluded.type
            OR assessments.set_name IS NOT excluded.set_name
            OR assessments.number IS NOT excluded.number
            OR assessments.sync_errors IS NOT excluded.sync_errors
            OR assessments.sync_warnings IS NOT excluded.sync_warnings
            OR assessments.deleted_at IS NOT NULL",
        params![
            course_id,
            row.course_instance,
            row.tid,
            row.uuid,
            row.title,
            row.assessment_type,
            row.set_name,
            row.number,
            encode_list(&row.sync_errors),
            encode_list(&row.sync_warnings),
        ],
    )
    .with_context(|| format!("failed to upsert assessment `{}/{}`", row.course_instance, row.tid))
}

fn upsert_assessment_question(
    tx: &Transaction<'_>,
    course_id: &str,
    row: &AssessmentQuestionRow,
) -> Result<usize> {
    tx.execute(
        "INSERT INTO assessment_questions (course_id, course_instance, tid, qid, number, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL)
         ON CONFLICT (course_id, course_instance, tid, qid) DO UPDATE SET
            number = excluded.number,
            deleted_at = NULL
         WHERE assessment_questions.number IS NOT excluded.number
            OR assessment_questions.deleted_at IS NOT NULL",
        params![course_id, row.course_instance, row.tid, row.qid, row.number],
    )
    .with_context(|| format!("failed to link question `{}` to `{}`", row.qid, row.tid))
}

struct TableKeys {
    table: &'static str,
    keys: &'static [&'static str],
}

const TAGS: TableKeys = TableKeys { table: "course_tags", keys: &["kind", "name"] };
const QUESTIONS: TableKeys = TableKeys { table: "questions", keys: &["qid"] };
const COURSE_INSTANCES: TableKeys = TableKeys { table: "course_instances", keys: &["short_name"] };
const ASSESSMENTS: TableKeys =
    TableKeys { table: "assessments", keys: &["course_instance", "tid"] };
const ASSESSMENT_QUESTIONS: TableKeys =
    TableKeys { table: "assessment_questions", keys: &["course_instance", "tid", "qid"] };

/// Mark every live row whose key is not in `keep` as deleted.
fn soft_delete_missing(
    tx: &Transaction<'_>,
    spec: &TableKeys,
    course_id: &str,
    keep: HashSet<Vec<String>>,
) -> Result<usize> {
    let select = format!(
        "SELECT {} FROM {} WHERE course_id = ?1 AND deleted_at IS NULL",
        spec.keys.join(", "),
        spec.table
    );
    let live: Vec<Vec<String>> = {
        let mut stmt = tx.prepare(&select)?;
        let rows = stmt.query_map([course_id], |row| {
            (0..spec.keys.len()).map(|i| row.get::<_, String>(i)).collect()
        })?;
        rows.collect::<rusqlite::Result<_>>()
            .with_context(|| format!("failed to list live rows in {}", spec.table))?
    };

    let predicate: Vec<String> =
        spec.keys.iter().enumerate().map(|(i, key)| format!("{key} = ?{}", i + 2)).collect();
    let update = format!(
        "UPDATE {} SET deleted_at = datetime('now') WHERE course_id = ?1 AND {}",
        spec.table,
        predicate.join(" AND ")
    );

    let mut changes = 0;
    for key in live.into_iter().filter(|key| !keep.contains(key)) {
        let values = std::iter::once(course_id.to_string()).chain(key);
        changes += tx
            .execute(&update, params_from_iter(values))
            .with_context(|| format!("failed to soft-delete row in {}", spec.table))?;
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rusqlite::Connection;
    use tempfile::TempDir;

    use super::*;

    const EXPECTED_TABLES: &[&str] = &[
        "schema_migrations",
        "courses",
        "questions",
        "course_instances",
        "assessments",
        "assessment_questions",
        "course_tags",
        "job_sequences",
    ];

    fn question(qid: &str, title: &str) -> QuestionRow {
        QuestionRow {
            qid: qid.to_string(),
            uuid: Some(format!("{qid}-uuid")),
            title: Some(title.to_string()),
            topic: Some("Algebra".to_string()),
            tags: vec!["v3".to_string()],
            ..QuestionRow::default()
        }
    }

    fn snapshot(questions: Vec<QuestionRow>) -> CourseSnapshot {
        CourseSnapshot {
            course: CourseRow { short_name: Some("CS 101".into()), ..CourseRow::default() },
            tags: vec![TagRow {
                kind: TagKind::Topic,
                name: "Algebra".into(),
                color: Some("blue1".into()),
                description: None,
            }],
            questions,
            ..CourseSnapshot::default()
        }
    }

    #[test]
    fn open_creates_schema_and_records_latest_migration() {
        let tmp = TempDir::new().unwrap();
        let store = CourseStore::open(tmp.path().join("nested").join("courses.db"))
            .expect("course store should open");

        let conn = store.conn().unwrap();
        for table in EXPECTED_TABLES {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("table existence query should succeed");
            assert_eq!(exists, 1, "expected `{table}` table to exist");
        }
        drop(conn);

        assert_eq!(store.schema_version().unwrap(), 2);
    }

    #[test]
    fn existing_v1_schema_is_migrated_to_v2() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("courses.db");
        seed_v1_schema(&db_path);

        let store = CourseStore::open(&db_path).expect("store should upgrade from v1 to v2");
        assert_eq!(store.schema_version().unwrap(), 2);

        let migration_rows: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(migration_rows, 2);
    }

    #[test]
    fn applying_same_snapshot_twice_changes_nothing() {
        let store = CourseStore::open_in_memory().unwrap();
        let snap = snapshot(vec![question("q1", "First"), question("q2", "Second")]);

        let first = store.apply_snapshot("c1", Path::new("/courses/cs101"), &snap).unwrap();
        assert!(first > 0);

        let second = store.apply_snapshot("c1", Path::new("/courses/cs101"), &snap).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn missing_rows_are_soft_deleted_not_removed() {
        let store = CourseStore::open_in_memory().unwrap();
        let path = PathBuf::from("/courses/cs101");
        store
            .apply_snapshot("c1", &path, &snapshot(vec![question("q1", "First"), question("q2", "Second")]))
            .unwrap();

        let changes =
            store.apply_snapshot("c1", &path, &snapshot(vec![question("q1", "First")])).unwrap();
        assert_eq!(changes, 1);
        assert_eq!(store.live_question_ids("c1").unwrap(), vec!["q1"]);
        assert_eq!(store.deleted_question_ids("c1").unwrap(), vec!["q2"]);
    }

    #[test]
    fn reappearing_row_is_revived() {
        let store = CourseStore::open_in_memory().unwrap();
        let path = PathBuf::from("/courses/cs101");
        store.apply_snapshot("c1", &path, &snapshot(vec![question("q1", "First")])).unwrap();
        store.apply_snapshot("c1", &path, &snapshot(Vec::new())).unwrap();
        assert!(store.question("c1", "q1").unwrap().is_none());

        store.apply_snapshot("c1", &path, &snapshot(vec![question("q1", "First")])).unwrap();
        let revived = store.question("c1", "q1").unwrap().expect("question should be live");
        assert_eq!(revived.title.as_deref(), Some("First"));
        assert_eq!(revived.tags, vec!["v3"]);
    }

    #[test]
    fn updates_are_counted_once() {
        let store = CourseStore::open_in_memory().unwrap();
        let path = PathBuf::from("/courses/cs101");
        store.apply_snapshot("c1", &path, &snapshot(vec![question("q1", "First")])).unwrap();

        let changes =
            store.apply_snapshot("c1", &path, &snapshot(vec![question("q1", "Renamed")])).unwrap();
        assert_eq!(changes, 1);
        assert_eq!(store.question("c1", "q1").unwrap().unwrap().title.as_deref(), Some("Renamed"));
    }

    #[test]
    fn courses_do_not_see_each_others_rows() {
        let store = CourseStore::open_in_memory().unwrap();
        store
            .apply_snapshot("c1", Path::new("/courses/a"), &snapshot(vec![question("q1", "A")]))
            .unwrap();
        store.apply_snapshot("c2", Path::new("/courses/b"), &snapshot(Vec::new())).unwrap();
        assert_eq!(store.live_question_ids("c1").unwrap(), vec!["q1"]);
        assert!(store.live_question_ids("c2").unwrap().is_empty());
    }

    #[test]
    fn commit_hash_is_tracked_per_course() {
        let store = CourseStore::open_in_memory().unwrap();
        store.apply_snapshot("c1", Path::new("/courses/a"), &snapshot(Vec::new())).unwrap();
        assert_eq!(store.commit_hash("c1").unwrap(), None);

        store.update_commit_hash("c1", Some("abc123")).unwrap();
        assert_eq!(store.commit_hash("c1").unwrap().as_deref(), Some("abc123"));
        assert_eq!(store.commit_hash("missing").unwrap(), None);
    }

    fn seed_v1_schema(path: &Path) {
        let conn = Connection::open(path).expect("v1 seed db should open");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT NOT NULL
            );
            ",
        )
        .expect("schema_migrations should be created");
        conn.execute_batch(MIGRATION_V1_SQL).expect("v1 schema should be applied");
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (1, datetime('now'))",
            [],
        )
        .expect("v1 migration row should be inserted");
    }
}

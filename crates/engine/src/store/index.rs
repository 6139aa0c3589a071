// Read-side queries editors use to pick names and find references.

use anyhow::{Context, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::course_db::CourseStore;

/// An assessment within a course instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentRef {
    pub course_instance: String,
    pub tid: String,
}

/// What editors may ask of the synced store. Only live rows are reported.
///
/// Names come back as last synced; editors treat them as a hint and still
/// check the filesystem before writing.
pub trait CourseIndex: Send + Sync {
    /// Titles of every question in the course.
    fn question_titles(&self, course_id: &str) -> Result<Vec<String>>;

    /// Long names of every course instance in the course.
    fn course_instance_long_names(&self, course_id: &str) -> Result<Vec<String>>;

    /// Titles of every assessment in one course instance.
    fn assessment_titles(&self, course_id: &str, course_instance: &str) -> Result<Vec<String>>;

    /// Assessments whose zones reference `qid`.
    fn assessments_with_question(&self, course_id: &str, qid: &str) -> Result<Vec<AssessmentRef>>;
}

impl CourseIndex for CourseStore {
    fn question_titles(&self, course_id: &str) -> Result<Vec<String>> {
        self.string_column(
            "SELECT title FROM questions
             WHERE course_id = ?1 AND deleted_at IS NULL AND title IS NOT NULL
             ORDER BY qid",
            course_id,
        )
    }

    fn course_instance_long_names(&self, course_id: &str) -> Result<Vec<String>> {
        self.string_column(
            "SELECT long_name FROM course_instances
             WHERE course_id = ?1 AND deleted_at IS NULL AND long_name IS NOT NULL
             ORDER BY short_name",
            course_id,
        )
    }

    fn assessment_titles(&self, course_id: &str, course_instance: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT title FROM assessments
                 WHERE course_id = ?1 AND course_instance = ?2
                   AND deleted_at IS NULL AND title IS NOT NULL
                 ORDER BY tid",
            )
            .context("failed to prepare assessment title query")?;
        let rows = stmt
            .query_map(params![course_id, course_instance], |row| row.get::<_, String>(0))
            .context("failed to query assessment titles")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read assessment titles")
    }

    fn assessments_with_question(&self, course_id: &str, qid: &str) -> Result<Vec<AssessmentRef>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT aq.course_instance, aq.tid
                 FROM assessment_questions aq
                 JOIN assessments a
                   ON a.course_id = aq.course_id
                  AND a.course_instance = aq.course_instance
                  AND a.tid = aq.tid
                 WHERE aq.course_id = ?1 AND aq.qid = ?2
                   AND aq.deleted_at IS NULL AND a.deleted_at IS NULL
                 ORDER BY aq.course_instance, aq.tid",
            )
            .context("failed to prepare assessment reference query")?;
        let rows = stmt
            .query_map(params![course_id, qid], |row| {
                Ok(AssessmentRef { course_instance: row.get(0)?, tid: row.get(1)? })
            })
            .context("failed to query assessment references")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read assessment references")
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::store::course_db::{
        AssessmentQuestionRow, AssessmentRow, CourseInstanceRow, CourseSnapshot, QuestionRow,
    };

    fn seeded() -> CourseStore {
        let store = CourseStore::open_in_memory().unwrap();
        let snapshot = CourseSnapshot {
            questions: vec![
                QuestionRow { qid: "q1".into(), title: Some("Add".into()), ..Default::default() },
                QuestionRow { qid: "q2".into(), title: None, ..Default::default() },
            ],
            course_instances: vec![CourseInstanceRow {
                short_name: "Fa19".into(),
                long_name: Some("Fall 2019".into()),
                ..Default::default()
            }],
            assessments: vec![
                AssessmentRow {
                    course_instance: "Fa19".into(),
                    tid: "hw1".into(),
                    title: Some("Homework 1".into()),
                    ..Default::default()
                },
                AssessmentRow {
                    course_instance: "Fa19".into(),
                    tid: "exam1".into(),
                    title: Some("Exam 1".into()),
                    ..Default::default()
                },
            ],
            assessment_questions: vec![AssessmentQuestionRow {
                course_instance: "Fa19".into(),
                tid: "hw1".into(),
                qid: "q1".into(),
                number: 1,
            }],
            ..Default::default()
        };
        store.apply_snapshot("c1", Path::new("/courses/cs101"), &snapshot).unwrap();
        store
    }

    #[test]
    fn titles_skip_missing_values() {
        let store = seeded();
        assert_eq!(store.question_titles("c1").unwrap(), vec!["Add"]);
        assert_eq!(store.course_instance_long_names("c1").unwrap(), vec!["Fall 2019"]);
        assert_eq!(store.assessment_titles("c1", "Fa19").unwrap(), vec!["Exam 1", "Homework 1"]);
        assert!(store.assessment_titles("c1", "Sp20").unwrap().is_empty());
    }

    #[test]
    fn finds_assessments_referencing_question() {
        let store = seeded();
        assert_eq!(
            store.assessments_with_question("c1", "q1").unwrap(),
            vec![AssessmentRef { course_instance: "Fa19".into(), tid: "hw1".into() }]
        );
        assert!(store.assessments_with_question("c1", "q2").unwrap().is_empty());
    }

    #[test]
    fn deleted_rows_are_hidden() {
        let store = seeded();
        store
            .apply_snapshot("c1", Path::new("/courses/cs101"), &CourseSnapshot::default())
            .unwrap();
        assert!(store.question_titles("c1").unwrap().is_empty());
        assert!(store.assessments_with_question("c1", "q1").unwrap().is_empty());
    }
}

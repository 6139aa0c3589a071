// Load course content from the working copy into a store snapshot.
//
// Loading never fails because of bad content: malformed or invalid info files
// become per-item errors and warnings that travel with the snapshot. Only
// I/O problems outside of the content itself abort a load.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::course::{
    ASSESSMENTS_DIR, ASSESSMENT_INFO_FILE, COURSE_INFO_FILE, COURSE_INSTANCES_DIR,
    COURSE_INSTANCE_INFO_FILE, QUESTIONS_DIR, QUESTION_INFO_FILE,
};
use crate::store::{
    AssessmentQuestionRow, AssessmentRow, CourseInstanceRow, CourseRow, CourseSnapshot,
    QuestionRow, TagKind, TagRow,
};

/// An error or warning attached to one info file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentIssue {
    /// Course-relative path of the offending file.
    pub path: String,
    pub message: String,
}

/// Result of reading a course directory.
#[derive(Debug, Clone, Default)]
pub struct LoadedCourse {
    pub snapshot: CourseSnapshot,
    pub errors: Vec<ContentIssue>,
    pub warnings: Vec<ContentIssue>,
}

impl LoadedCourse {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("uuid pattern should compile")
    })
}

fn salvage_uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""uuid":\s*"([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})""#)
            .expect("uuid salvage pattern should compile")
    })
}

// ── Info file shapes ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagJson {
    name: String,
    color: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CourseJson {
    name: Option<String>,
    title: Option<String>,
    topics: Vec<TagJson>,
    tags: Vec<TagJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuestionJson {
    uuid: Option<String>,
    title: Option<String>,
    topic: Option<String>,
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CourseInstanceJson {
    uuid: Option<String>,
    long_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AlternativeJson {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ZoneQuestionJson {
    id: Option<String>,
    alternatives: Vec<AlternativeJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ZoneJson {
    questions: Vec<ZoneQuestionJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssessmentJson {
    uuid: Option<String>,
    title: Option<String>,
    #[serde(rename = "type")]
    assessment_type: Option<String>,
    set: Option<String>,
    number: Option<String>,
    zones: Vec<ZoneJson>,
}

impl AssessmentJson {
    /// Question ids in zone order, alternatives flattened in place.
    fn question_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for zone in &self.zones {
            for question in &zone.questions {
                if let Some(id) = &question.id {
                    ids.push(id.clone());
                }
                ids.extend(question.alternatives.iter().filter_map(|alt| alt.id.clone()));
            }
        }
        ids
    }
}

trait HasUuid {
    fn uuid(&self) -> Option<&str>;
}

impl HasUuid for QuestionJson {
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

impl HasUuid for CourseInstanceJson {
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

impl HasUuid for AssessmentJson {
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

/// One parsed info file with everything found wrong with it.
#[derive(Debug)]
struct InfoFile<T> {
    path: String,
    data: Option<T>,
    uuid: Option<String>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl<T> InfoFile<T> {
    fn error(path: String, message: impl Into<String>) -> Self {
        Self { path, data: None, uuid: None, errors: vec![message.into()], warnings: Vec::new() }
    }
}

// ── Reading ─────────────────────────────────────────────────────────

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

/// Parse `contents` as an info file that must carry a v4 UUID.
fn parse_info<T: DeserializeOwned + HasUuid>(path: String, contents: &str) -> InfoFile<T> {
    match serde_json::from_str::<T>(contents) {
        Ok(data) => {
            let mut info = InfoFile { path, data: None, uuid: None, errors: Vec::new(), warnings: Vec::new() };
            match data.uuid() {
                None => info.errors.push("UUID is missing".to_string()),
                Some(uuid) if !uuid_pattern().is_match(uuid) => {
                    info.errors.push(format!("UUID \"{uuid}\" is not a valid v4 UUID"));
                }
                Some(uuid) => info.uuid = Some(uuid.to_lowercase()),
            }
            info.data = Some(data);
            info
        }
        Err(error) => {
            let mut info = InfoFile::error(path, format!("Error parsing JSON: {error}"));
            let found: Vec<&str> = salvage_uuid_pattern()
                .captures_iter(contents)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                .collect();
            match found.as_slice() {
                [] => info.errors.push("UUID not found in file".to_string()),
                [uuid] => info.uuid = Some(uuid.to_lowercase()),
                _ => info.errors.push("More than one UUID found in file".to_string()),
            }
            info
        }
    }
}

/// Read the info file at `path`, or `None` when it does not exist.
fn read_info<T: DeserializeOwned + HasUuid>(root: &Path, path: &Path) -> Result<Option<InfoFile<T>>> {
    let display = relative_display(root, path);
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(parse_info(display, &contents))),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) if error.kind() == io::ErrorKind::InvalidData => {
            Ok(Some(InfoFile::error(display, format!("Error reading JSON file: {error}"))))
        }
        Err(error) => Err(error).with_context(|| format!("failed to read `{}`", path.display())),
    }
}

/// Walk `dir` and load every `info_file` found, keyed by the slash-separated
/// directory path relative to `dir`. A directory without an info file is
/// descended into; if nothing is found below it, it becomes an error entry.
fn load_directory<T: DeserializeOwned + HasUuid>(
    root: &Path,
    dir: &Path,
    info_file: &str,
) -> Result<BTreeMap<String, InfoFile<T>>> {
    let mut found = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(found);
    }
    walk(root, dir, PathBuf::new(), info_file, &mut found)?;
    Ok(found)
}

fn walk<T: DeserializeOwned + HasUuid>(
    root: &Path,
    base: &Path,
    relative: PathBuf,
    info_file: &str,
    found: &mut BTreeMap<String, InfoFile<T>>,
) -> Result<()> {
    let dir = base.join(&relative);
    let mut entries: Vec<_> = fs::read_dir(&dir)
        .with_context(|| format!("failed to list `{}`", dir.display()))?
        .collect::<io::Result<_>>()
        .with_context(|| format!("failed to list `{}`", dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let child_dir = entry.path();
        if !child_dir.is_dir() {
            continue;
        }
        let child_relative = relative.join(entry.file_name());
        let key = child_relative.to_string_lossy().replace('\\', "/");
        let info_path = child_dir.join(info_file);

        if let Some(info) = read_info::<T>(root, &info_path)? {
            found.insert(key, info);
            continue;
        }

        let before = found.len();
        walk(root, base, child_relative, info_file, found)?;
        if found.len() == before {
            let display = relative_display(root, &info_path);
            found.insert(
                key,
                InfoFile::error(
                    display.clone(),
                    format!(
                        "Missing JSON file: {display}. Either create the file or delete the {} directory.",
                        relative_display(root, &child_dir)
                    ),
                ),
            );
        }
    }
    Ok(())
}

/// Clear UUIDs shared by several items, warning on each of them.
fn check_duplicate_uuids<T>(infos: &mut BTreeMap<String, InfoFile<T>>, what: &str) {
    let mut by_uuid: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (id, info) in infos.iter() {
        if let Some(uuid) = &info.uuid {
            by_uuid.entry(uuid.clone()).or_default().push(id.clone());
        }
    }

    for (uuid, ids) in by_uuid.into_iter().filter(|(_, ids)| ids.len() > 1) {
        for id in &ids {
            let others: Vec<&str> =
                ids.iter().filter(|other| *other != id).map(String::as_str).collect();
            if let Some(info) = infos.get_mut(id) {
                info.warnings
                    .push(format!("UUID \"{uuid}\" is used in other {what}: {}", others.join(", ")));
                info.uuid = None;
            }
        }
    }
}

fn collect_issues<T>(info: &InfoFile<T>, loaded: &mut LoadedCourse) {
    loaded.errors.extend(
        info.errors.iter().map(|message| ContentIssue { path: info.path.clone(), message: message.clone() }),
    );
    loaded.warnings.extend(
        info.warnings.iter().map(|message| ContentIssue { path: info.path.clone(), message: message.clone() }),
    );
}

// ── Course ──────────────────────────────────────────────────────────

/// Read everything under `root` into a snapshot plus its diagnostics.
pub fn load_course(root: &Path) -> Result<LoadedCourse> {
    let mut loaded = LoadedCourse::default();

    let (course_row, topics, tags) = load_course_info(root, &mut loaded)?;
    loaded.snapshot.course = course_row;

    let mut questions = load_directory::<QuestionJson>(root, &root.join(QUESTIONS_DIR), QUESTION_INFO_FILE)?;
    for (qid, info) in questions.iter_mut() {
        if qid.starts_with('@') {
            info.errors.push("Question IDs are not allowed to begin with '@'".to_string());
        }
        if let Some(data) = &info.data {
            if let Some(topic) = data.topic.as_deref().filter(|topic| !topics.contains(*topic)) {
                info.warnings.push(format!("Topic \"{topic}\" is not defined in {COURSE_INFO_FILE}"));
            }
            let unknown: Vec<&str> =
                data.tags.iter().map(String::as_str).filter(|tag| !tags.contains(*tag)).collect();
            if !unknown.is_empty() {
                info.warnings.push(format!(
                    "The following tags are not defined in {COURSE_INFO_FILE}: {}",
                    unknown.join(", ")
                ));
            }
        }
    }
    check_duplicate_uuids(&mut questions, "questions");
    let known_qids: HashSet<String> = questions.keys().cloned().collect();

    for (qid, info) in &questions {
        collect_issues(info, &mut loaded);
        let data = info.data.as_ref();
        loaded.snapshot.questions.push(QuestionRow {
            qid: qid.clone(),
            uuid: info.uuid.clone(),
            title: data.and_then(|d| d.title.clone()),
            topic: data.and_then(|d| d.topic.clone()),
            tags: data.map(|d| d.tags.clone()).unwrap_or_default(),
            sync_errors: info.errors.clone(),
            sync_warnings: info.warnings.clone(),
        });
    }

    let mut instances = load_directory::<CourseInstanceJson>(
        root,
        &root.join(COURSE_INSTANCES_DIR),
        COURSE_INSTANCE_INFO_FILE,
    )?;
    check_duplicate_uuids(&mut instances, "course instances");

    for (short_name, info) in &instances {
        collect_issues(info, &mut loaded);
        loaded.snapshot.course_instances.push(CourseInstanceRow {
            short_name: short_name.clone(),
            uuid: info.uuid.clone(),
            long_name: info.data.as_ref().and_then(|d| d.long_name.clone()),
            sync_errors: info.errors.clone(),
            sync_warnings: info.warnings.clone(),
        });

        let assessments_dir = root.join(COURSE_INSTANCES_DIR).join(short_name).join(ASSESSMENTS_DIR);
        load_assessments(root, short_name, &assessments_dir, &known_qids, &mut loaded)?;
    }

    Ok(loaded)
}

fn load_course_info(
    root: &Path,
    loaded: &mut LoadedCourse,
) -> Result<(CourseRow, HashSet<String>, HashSet<String>)> {
    let path = root.join(COURSE_INFO_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let message = format!("Missing JSON file: {COURSE_INFO_FILE}");
            loaded.errors.push(ContentIssue { path: COURSE_INFO_FILE.to_string(), message: message.clone() });
            let row = CourseRow { sync_errors: vec![message], ..CourseRow::default() };
            return Ok((row, HashSet::new(), HashSet::new()));
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read `{}`", path.display()));
        }
    };

    let info: CourseJson = match serde_json::from_str(&contents) {
        Ok(info) => info,
        Err(error) => {
            let message = format!("Error parsing JSON: {error}");
            loaded.errors.push(ContentIssue { path: COURSE_INFO_FILE.to_string(), message: message.clone() });
            let row = CourseRow { sync_errors: vec![message], ..CourseRow::default() };
            return Ok((row, HashSet::new(), HashSet::new()));
        }
    };

    let mut topics = HashSet::new();
    let mut tags = HashSet::new();
    for (kind, entries, names) in
        [(TagKind::Topic, &info.topics, &mut topics), (TagKind::Tag, &info.tags, &mut tags)]
    {
        for entry in entries.iter().filter(|entry| !entry.name.is_empty()) {
            if !names.insert(entry.name.clone()) {
                continue;
            }
            loaded.snapshot.tags.push(TagRow {
                kind,
                name: entry.name.clone(),
                color: entry.color.clone(),
                description: entry.description.clone(),
            });
        }
    }

    Ok((CourseRow { short_name: info.name, title: info.title, ..CourseRow::default() }, topics, tags))
}

fn load_assessments(
    root: &Path,
    course_instance: &str,
    dir: &Path,
    known_qids: &HashSet<String>,
    loaded: &mut LoadedCourse,
) -> Result<()> {
    let mut assessments = load_directory::<AssessmentJson>(root, dir, ASSESSMENT_INFO_FILE)?;

    let mut links = Vec::new();
    for (tid, info) in assessments.iter_mut() {
        let Some(data) = &info.data else { continue };
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        let mut missing = BTreeSet::new();
        for qid in data.question_ids() {
            if !seen.insert(qid.clone()) {
                duplicates.insert(qid);
                continue;
            }
            if !known_qids.contains(&qid) {
                missing.insert(qid.clone());
            }
            links.push(AssessmentQuestionRow {
                course_instance: course_instance.to_string(),
                tid: tid.clone(),
                number: (seen.len()) as i64,
                qid,
            });
        }
        if !duplicates.is_empty() {
            info.errors.push(format!(
                "The following questions are used more than once: {}",
                duplicates.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        if !missing.is_empty() {
            info.errors.push(format!(
                "The following questions do not exist in this course: {}",
                missing.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
            links.retain(|link| link.tid != *tid || !missing.contains(&link.qid));
        }
    }
    check_duplicate_uuids(&mut assessments, "assessments in this course instance");

    for (tid, info) in &assessments {
        collect_issues(info, loaded);
        let data = info.data.as_ref();
        loaded.snapshot.assessments.push(AssessmentRow {
            course_instance: course_instance.to_string(),
            tid: tid.clone(),
            uuid: info.uuid.clone(),
            title: data.and_then(|d| d.title.clone()),
            assessment_type: data.and_then(|d| d.assessment_type.clone()),
            set_name: data.and_then(|d| d.set.clone()),
            number: data.and_then(|d| d.number.clone()),
            sync_errors: info.errors.clone(),
            sync_warnings: info.warnings.clone(),
        });
    }
    loaded.snapshot.assessment_questions.extend(links);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    const UUID_A: &str = "c5e5f7a4-5b2f-4c5e-8d3b-3f8b6a2f1a01";
    const UUID_B: &str = "c5e5f7a4-5b2f-4c5e-8d3b-3f8b6a2f1a02";

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn course() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            COURSE_INFO_FILE,
            &json!({
                "uuid": UUID_A,
                "name": "CS 101",
                "title": "Intro",
                "topics": [{"name": "Algebra", "color": "blue1"}],
                "tags": [{"name": "v3", "color": "gray1"}]
            })
            .to_string(),
        );
        tmp
    }

    fn messages(issues: &[ContentIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.message.as_str()).collect()
    }

    #[test]
    fn loads_nested_questions_by_relative_path() {
        let tmp = course();
        write(
            tmp.path(),
            "questions/algebra/addNumbers/info.json",
            &json!({"uuid": UUID_A, "title": "Add", "topic": "Algebra", "tags": ["v3"]}).to_string(),
        );
        write(tmp.path(), "questions/.DS_Store", "");

        let loaded = load_course(tmp.path()).unwrap();
        assert!(!loaded.has_errors(), "{:?}", loaded.errors);
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
        assert_eq!(loaded.snapshot.questions.len(), 1);
        assert_eq!(loaded.snapshot.questions[0].qid, "algebra/addNumbers");
        assert_eq!(loaded.snapshot.course.short_name.as_deref(), Some("CS 101"));
        assert_eq!(loaded.snapshot.tags.len(), 2);
    }

    #[test]
    fn invalid_json_salvages_uuid() {
        let tmp = course();
        write(tmp.path(), "questions/q1/info.json", &format!("{{\"uuid\": \"{UUID_A}\", \"title\": "));

        let loaded = load_course(tmp.path()).unwrap();
        assert!(loaded.has_errors());
        assert!(loaded.errors[0].message.starts_with("Error parsing JSON: "));
        assert_eq!(loaded.errors[0].path, "questions/q1/info.json");
        assert_eq!(loaded.snapshot.questions[0].uuid.as_deref(), Some(UUID_A));
    }

    #[test]
    fn invalid_json_without_uuid_reports_both_problems() {
        let tmp = course();
        write(tmp.path(), "questions/q1/info.json", "{ not json");

        let loaded = load_course(tmp.path()).unwrap();
        let messages = messages(&loaded.errors);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], "UUID not found in file");
    }

    #[test]
    fn missing_and_malformed_uuids_are_errors() {
        let tmp = course();
        write(tmp.path(), "questions/q1/info.json", &json!({"title": "No uuid"}).to_string());
        write(tmp.path(), "questions/q2/info.json", &json!({"uuid": "nope"}).to_string());

        let loaded = load_course(tmp.path()).unwrap();
        assert_eq!(
            messages(&loaded.errors),
            vec!["UUID is missing", "UUID \"nope\" is not a valid v4 UUID"]
        );
    }

    #[test]
    fn duplicate_uuids_warn_and_are_cleared() {
        let tmp = course();
        write(tmp.path(), "questions/q1/info.json", &json!({"uuid": UUID_B}).to_string());
        write(tmp.path(), "questions/q2/info.json", &json!({"uuid": UUID_B}).to_string());

        let loaded = load_course(tmp.path()).unwrap();
        assert!(!loaded.has_errors());
        assert_eq!(
            messages(&loaded.warnings),
            vec![
                format!("UUID \"{UUID_B}\" is used in other questions: q2"),
                format!("UUID \"{UUID_B}\" is used in other questions: q1"),
            ]
        );
        assert!(loaded.snapshot.questions.iter().all(|q| q.uuid.is_none()));
    }

    #[test]
    fn at_sign_qids_are_rejected() {
        let tmp = course();
        write(tmp.path(), "questions/@shared/info.json", &json!({"uuid": UUID_A}).to_string());

        let loaded = load_course(tmp.path()).unwrap();
        assert_eq!(messages(&loaded.errors), vec!["Question IDs are not allowed to begin with '@'"]);
    }

    #[test]
    fn empty_directory_is_missing_info_file() {
        let tmp = course();
        fs::create_dir_all(tmp.path().join("questions/empty")).unwrap();

        let loaded = load_course(tmp.path()).unwrap();
        assert!(loaded.errors[0].message.starts_with("Missing JSON file: questions/empty/info.json"));
    }

    #[test]
    fn assessments_link_questions_and_flag_missing_ones() {
        let tmp = course();
        write(tmp.path(), "questions/q1/info.json", &json!({"uuid": UUID_A}).to_string());
        write(
            tmp.path(),
            "courseInstances/Fa19/infoCourseInstance.json",
            &json!({"uuid": UUID_A, "longName": "Fall 2019"}).to_string(),
        );
        write(
            tmp.path(),
            "courseInstances/Fa19/assessments/hw1/infoAssessment.json",
            &json!({
                "uuid": UUID_B,
                "title": "Homework 1",
                "type": "Homework",
                "set": "Homework",
                "number": "1",
                "zones": [{"questions": [{"id": "q1"}, {"alternatives": [{"id": "ghost"}]}]}]
            })
            .to_string(),
        );

        let loaded = load_course(tmp.path()).unwrap();
        assert_eq!(
            messages(&loaded.errors),
            vec!["The following questions do not exist in this course: ghost"]
        );
        assert_eq!(loaded.snapshot.course_instances[0].long_name.as_deref(), Some("Fall 2019"));
        assert_eq!(loaded.snapshot.assessments[0].title.as_deref(), Some("Homework 1"));
        assert_eq!(loaded.snapshot.assessment_questions.len(), 1);
        assert_eq!(loaded.snapshot.assessment_questions[0].qid, "q1");
    }

    #[test]
    fn missing_course_info_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let loaded = load_course(tmp.path()).unwrap();
        assert_eq!(messages(&loaded.errors), vec!["Missing JSON file: infoCourse.json"]);
    }

    #[test]
    fn undefined_topics_and_tags_warn() {
        let tmp = course();
        write(
            tmp.path(),
            "questions/q1/info.json",
            &json!({"uuid": UUID_A, "topic": "Calculus", "tags": ["v3", "hard"]}).to_string(),
        );

        let loaded = load_course(tmp.path()).unwrap();
        assert_eq!(
            messages(&loaded.warnings),
            vec![
                "Topic \"Calculus\" is not defined in infoCourse.json",
                "The following tags are not defined in infoCourse.json: hard",
            ]
        );
    }
}

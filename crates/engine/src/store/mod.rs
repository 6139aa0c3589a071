// Persistence: the relational course store, its read-side index and job log.

pub mod course_db;
pub mod index;
pub mod jobs;

pub use course_db::{
    AssessmentQuestionRow, AssessmentRow, CourseInstanceRow, CourseRow, CourseSnapshot,
    CourseStore, QuestionRow, TagKind, TagRow,
};
pub use index::{AssessmentRef, CourseIndex};
pub use jobs::JobStore;

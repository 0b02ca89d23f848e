//! Core types for the shared marking state
//!
//! Plain data: rubric entries, per-question status, the exam currently being
//! graded, and the reasons a run can end.

use serde::{Deserialize, Serialize};

/// Number of rubric slots (and exam questions) in the reference setup
pub const DEFAULT_QUESTION_COUNT: usize = 5;

/// Student id that marks the end of the exam pile
pub const SENTINEL_STUDENT_ID: &str = "9999";

/// One line of the rubric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricEntry {
    /// Question number as written in the rubric file
    pub id: i32,
    /// Expected answer / grade letter
    pub grade: char,
}

impl RubricEntry {
    pub fn new(id: i32, grade: char) -> Self {
        Self { id, grade }
    }
}

/// Advance a grade character to the next printable ASCII character.
///
/// `'~'` wraps around to `'!'`; anything outside printable ASCII restarts at `'A'`.
pub fn next_grade(grade: char) -> char {
    match grade {
        '~' => '!',
        c if c.is_ascii_graphic() => (c as u8 + 1) as char,
        _ => 'A',
    }
}

/// Marking status of a single question on the current exam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    /// Nobody has claimed the question yet
    Unmarked,
    /// A TA claimed the question and is marking it
    InProgress,
    /// Marking finished
    Marked,
}

impl QuestionStatus {
    /// Position in the only allowed order `Unmarked -> InProgress -> Marked`
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unmarked => 0,
            Self::InProgress => 1,
            Self::Marked => 2,
        }
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmarked => write!(f, "unmarked"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Marked => write!(f, "marked"),
        }
    }
}

/// What persistence hands back for one exam file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRecord {
    pub student_id: String,
}

impl ExamRecord {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
        }
    }

    /// Whether this record is the end-of-pile marker
    pub fn is_sentinel(&self) -> bool {
        self.student_id == SENTINEL_STUDENT_ID
    }
}

/// The exam the whole pool is grading right now.
///
/// Replaced as a single value when the pool moves on, so `exam_index`,
/// `student_id` and `statuses` always describe the same exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamProgress {
    pub student_id: String,
    pub statuses: Vec<QuestionStatus>,
    pub exam_index: u32,
}

impl ExamProgress {
    /// Fresh progress with every question unmarked
    pub fn new(student_id: impl Into<String>, exam_index: u32, question_count: usize) -> Self {
        Self {
            student_id: student_id.into(),
            statuses: vec![QuestionStatus::Unmarked; question_count],
            exam_index,
        }
    }

    /// Placeholder used when no exam could be loaded at startup
    pub fn empty(exam_index: u32, question_count: usize) -> Self {
        Self::new(String::new(), exam_index, question_count)
    }

    /// Lowest-index question nobody has claimed yet
    pub fn first_unmarked(&self) -> Option<usize> {
        self.statuses
            .iter()
            .position(|s| *s == QuestionStatus::Unmarked)
    }

    pub fn all_marked(&self) -> bool {
        self.statuses.iter().all(|s| *s == QuestionStatus::Marked)
    }

    pub fn count(&self, status: QuestionStatus) -> usize {
        self.statuses.iter().filter(|s| **s == status).count()
    }
}

/// A question a worker has moved to `InProgress` and must later commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub exam_index: u32,
    /// Zero-based question slot
    pub question: usize,
    pub student_id: String,
}

impl Claim {
    /// One-based question number, as TAs talk about it
    pub fn question_number(&self) -> usize {
        self.question + 1
    }
}

/// Why the pool stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// No exam file after `last_exam_index`
    EndOfData { last_exam_index: u32 },
    /// The sentinel student was loaded at `exam_index`
    Sentinel { exam_index: u32 },
    /// The next exam could not be read
    LoadFailed { exam_index: u32, message: String },
    /// Not even the first exam was available
    NoInitialExam,
    /// A worker died; the rest were told to stop
    Aborted { message: String },
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfData { last_exam_index } => {
                write!(f, "no exam after index {}", last_exam_index)
            }
            Self::Sentinel { exam_index } => {
                write!(
                    f,
                    "student {} reached at exam {}",
                    SENTINEL_STUDENT_ID, exam_index
                )
            }
            Self::LoadFailed {
                exam_index,
                message,
            } => write!(f, "exam {} could not be loaded: {}", exam_index, message),
            Self::NoInitialExam => write!(f, "no initial exam"),
            Self::Aborted { message } => write!(f, "aborted: {}", message),
        }
    }
}

//! Text formats of the rubric and exam files
//!
//! Rubric: one `"<id>, <grade>"` entry per line. Exam: the first line is the
//! student id, anything after it is ignored.

use crate::state::{ExamRecord, RubricEntry};

/// Parse rubric text, keeping at most `limit` entries.
///
/// Lines that do not parse are skipped, so blank lines and comments are
/// harmless.
pub fn parse_rubric(text: &str, limit: usize) -> Vec<RubricEntry> {
    text.lines()
        .filter_map(parse_rubric_line)
        .take(limit)
        .collect()
}

/// Parse `"3, C"` (whitespace after the comma optional) into an entry
pub fn parse_rubric_line(line: &str) -> Option<RubricEntry> {
    let (id, rest) = line.split_once(',')?;
    let id = id.trim().parse::<i32>().ok()?;
    let grade = rest.trim_start().chars().next()?;
    Some(RubricEntry::new(id, grade))
}

/// Render entries in the canonical on-disk form
pub fn render_rubric(entries: &[RubricEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}, {}\n", e.id, e.grade))
        .collect()
}

/// File name of exam `index` (`exam_01.txt`, `exam_02.txt`, ...)
pub fn exam_file_name(index: u32) -> String {
    format!("exam_{:02}.txt", index)
}

/// Take the student id from the first line of an exam file.
///
/// `None` if the file has no first line or it is blank.
pub fn parse_exam(text: &str) -> Option<ExamRecord> {
    let first = text.lines().next()?;
    let student_id = first.trim_end_matches(['\r', '\n']);
    if student_id.trim().is_empty() {
        return None;
    }
    Some(ExamRecord::new(student_id))
}

//! Convert a raw enrollment export into a per-class roster workbook.
//!
//! Input columns (first sheet, header on row 1): serial, class, admission
//! number, exam id, name, gender, note. Output: one sheet per class with
//! `exam_id, name` columns.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_xlsxwriter::Workbook;
use thiserror::Error;

use crate::roster::{cell_text, Student};

const CLASS_COLUMN: u32 = 1;
const EXAM_ID_COLUMN: u32 = 3;
const NAME_COLUMN: u32 = 4;

/// Sheet used for students with no class value.
pub const UNASSIGNED_CLASS: &str = "Unassigned";

/// Cell texts that mark a repeated header row.
const HEADER_LABELS: [&str; 8] = ["班级", "考号", "新生姓名", "姓名", "class", "exam_id", "exam id", "name"];

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Input file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Failed to read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },
    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

/// Students grouped by class, classes in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassGroups {
    pub classes: Vec<(String, Vec<Student>)>,
    pub skipped_rows: usize,
}

impl ClassGroups {
    fn push(&mut self, class: String, student: Student) {
        match self.classes.iter_mut().find(|(c, _)| *c == class) {
            Some((_, students)) => students.push(student),
            None => self.classes.push((class, vec![student])),
        }
    }

    pub fn student_count(&self) -> usize {
        self.classes.iter().map(|(_, s)| s.len()).sum()
    }
}

/// Sheet name for a raw class cell: integers become `Class<N>`.
pub fn class_label(cell: Option<&Data>) -> String {
    let text = cell.map(cell_text).unwrap_or_default();
    if text.is_empty() {
        return UNASSIGNED_CLASS.to_string();
    }
    match text.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 => format!("Class{}", n as i64),
        _ => format!("Class{}", text),
    }
}

fn is_header(text: &str) -> bool {
    HEADER_LABELS.iter().any(|h| h.eq_ignore_ascii_case(text))
}

/// Group the rows of a raw export by class.
pub fn group_by_class(range: &Range<Data>) -> ClassGroups {
    let mut groups = ClassGroups::default();
    let Some((last_row, _)) = range.end() else {
        return groups;
    };

    for row in 1..=last_row {
        let exam_id = range.get_value((row, EXAM_ID_COLUMN)).map(cell_text).unwrap_or_default();
        let name = range.get_value((row, NAME_COLUMN)).map(cell_text).unwrap_or_default();
        if exam_id.is_empty() || name.is_empty() {
            groups.skipped_rows += 1;
            continue;
        }
        let class_cell = range.get_value((row, CLASS_COLUMN));
        let class_text = class_cell.map(cell_text).unwrap_or_default();
        if is_header(&exam_id) || is_header(&name) || is_header(&class_text) {
            continue;
        }
        groups.push(class_label(class_cell), Student::new(exam_id, name));
    }

    groups
}

/// Read the first sheet of `input` and group it by class.
pub fn read_enrollment(input: &Path) -> Result<ClassGroups, ConvertError> {
    if !input.exists() {
        return Err(ConvertError::MissingFile(input.to_path_buf()));
    }
    let read_err = |message: String| ConvertError::Read {
        path: input.to_path_buf(),
        message,
    };
    let mut workbook = open_workbook_auto(input).map_err(|e| read_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| read_err("workbook has no sheets".to_string()))?
        .map_err(|e| read_err(e.to_string()))?;

    let groups = group_by_class(&range);
    log::info!(
        "Read {} students in {} classes from {}",
        groups.student_count(),
        groups.classes.len(),
        input.display()
    );
    Ok(groups)
}

/// Write one sheet per class with an `exam_id, name` header.
pub fn write_roster(groups: &ClassGroups, output: &Path) -> Result<(), ConvertError> {
    let write_err = |source| ConvertError::Write {
        path: output.to_path_buf(),
        source,
    };
    let mut workbook = Workbook::new();

    for (class, students) in &groups.classes {
        let sheet = workbook.add_worksheet();
        sheet.set_name(class).map_err(write_err)?;
        sheet.write_string(0, 0, "exam_id").map_err(write_err)?;
        sheet.write_string(0, 1, "name").map_err(write_err)?;
        for (i, student) in students.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &student.exam_id).map_err(write_err)?;
            sheet.write_string(row, 1, &student.name).map_err(write_err)?;
        }
        sheet.set_column_width(0, 15).map_err(write_err)?;
        sheet.set_column_width(1, 12).map_err(write_err)?;
        log::debug!("Sheet '{}': {} students", class, students.len());
    }

    workbook.save(output).map_err(write_err)?;
    Ok(())
}

/// Convert `input` into `output`, returning the groups written.
pub fn convert(input: &Path, output: &Path) -> Result<ClassGroups, ConvertError> {
    let groups = read_enrollment(input)?;
    write_roster(&groups, output)?;
    Ok(groups)
}

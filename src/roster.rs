//! Roster spreadsheets: one sheet per class, exam id in column A, name in
//! column B, header row ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use serde::Serialize;
use thiserror::Error;

/// One student as listed on a class sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Student {
    pub exam_id: String,
    pub name: String,
}

impl Student {
    pub fn new(exam_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            exam_id: exam_id.into(),
            name: name.into(),
        }
    }

    /// Last two characters of the exam id, used as a compact seat number.
    pub fn short_id(&self) -> &str {
        let mut chars = self.exam_id.char_indices().rev();
        match (chars.next(), chars.next()) {
            (Some(_), Some((idx, _))) => &self.exam_id[idx..],
            _ => &self.exam_id,
        }
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.exam_id)
    }
}

/// All students of one sheet, in sheet row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRoster {
    pub class_label: String,
    pub students: Vec<Student>,
    /// Data rows skipped because the id or name cell was empty.
    pub skipped_rows: usize,
}

impl ClassRoster {
    /// Students sorted by exam id, the order decks are laid out in.
    pub fn sorted_by_exam_id(&self) -> Vec<Student> {
        let mut students = self.students.clone();
        students.sort_by(|a, b| a.exam_id.cmp(&b.exam_id));
        students
    }
}

/// Which sheet of a workbook to load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelector {
    #[default]
    First,
    Index(usize),
    Name(String),
}

impl SheetSelector {
    /// Parse user input: a number selects by index, anything else by name.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return SheetSelector::First;
        }
        match input.parse::<usize>() {
            Ok(index) => SheetSelector::Index(index),
            Err(_) => SheetSelector::Name(input.to_string()),
        }
    }
}

/// Result of loading a single sheet.
#[derive(Debug, Clone)]
pub struct LoadedSheet {
    pub roster: ClassRoster,
    /// True when the selector didn't match and the first sheet was used.
    pub fell_back: bool,
}

/// Errors that can occur while reading roster workbooks.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Roster file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Failed to read roster '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("Roster '{}' contains no sheets", .0.display())]
    EmptyWorkbook(PathBuf),
}

type Workbook = Sheets<std::io::BufReader<std::fs::File>>;

fn open(path: &Path) -> Result<Workbook, RosterError> {
    if !path.exists() {
        return Err(RosterError::MissingFile(path.to_path_buf()));
    }
    open_workbook_auto(path).map_err(|e| RosterError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read_range(workbook: &mut Workbook, path: &Path, sheet: &str) -> Result<Range<Data>, RosterError> {
    workbook.worksheet_range(sheet).map_err(|e| RosterError::Parse {
        path: path.to_path_buf(),
        message: format!("sheet '{}': {}", sheet, e),
    })
}

/// Names of all sheets, in workbook order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>, RosterError> {
    Ok(open(path)?.sheet_names())
}

/// Load one sheet.
///
/// An out-of-range index or unknown name falls back to the first sheet; the
/// fallback is logged and reported through [`LoadedSheet::fell_back`].
pub fn load_sheet(path: &Path, selector: &SheetSelector) -> Result<LoadedSheet, RosterError> {
    let mut workbook = open(path)?;
    let names = workbook.sheet_names();
    let first = names
        .first()
        .cloned()
        .ok_or_else(|| RosterError::EmptyWorkbook(path.to_path_buf()))?;

    let chosen = match selector {
        SheetSelector::First => Some(first.clone()),
        SheetSelector::Index(index) => names.get(*index).cloned(),
        SheetSelector::Name(name) => names.iter().find(|n| *n == name).cloned(),
    };
    let fell_back = chosen.is_none();
    if fell_back {
        log::warn!("Invalid sheet selection {:?}, using the first sheet '{}'", selector, first);
    }
    let sheet = chosen.unwrap_or(first);

    let range = read_range(&mut workbook, path, &sheet)?;
    let roster = roster_from_range(&sheet, &range);
    log::info!("Loaded {} students from sheet '{}'", roster.students.len(), sheet);

    Ok(LoadedSheet { roster, fell_back })
}

/// Load every sheet, each tagged with its sheet name.
pub fn load_all(path: &Path) -> Result<Vec<ClassRoster>, RosterError> {
    let mut workbook = open(path)?;
    let names = workbook.sheet_names();
    if names.is_empty() {
        return Err(RosterError::EmptyWorkbook(path.to_path_buf()));
    }

    let mut classes = Vec::with_capacity(names.len());
    for sheet in names {
        let range = read_range(&mut workbook, path, &sheet)?;
        let roster = roster_from_range(&sheet, &range);
        log::debug!("Sheet '{}': {} students", sheet, roster.students.len());
        classes.push(roster);
    }

    let total: usize = classes.iter().map(|c| c.students.len()).sum();
    log::info!("Loaded {} students from {} sheet(s)", total, classes.len());
    Ok(classes)
}

/// Convert a worksheet range into a roster, reading columns A and B by
/// absolute position and skipping row 1.
pub fn roster_from_range(class_label: &str, range: &Range<Data>) -> ClassRoster {
    let mut students = Vec::new();
    let mut skipped_rows = 0;

    if let Some((last_row, _)) = range.end() {
        for row in 1..=last_row {
            let exam_id = range.get_value((row, 0)).map(cell_text).unwrap_or_default();
            let name = range.get_value((row, 1)).map(cell_text).unwrap_or_default();
            if exam_id.is_empty() || name.is_empty() {
                // Trailing formatting-only rows are not worth counting.
                if !(exam_id.is_empty() && name.is_empty()) {
                    skipped_rows += 1;
                }
                continue;
            }
            students.push(Student { exam_id, name });
        }
    }

    ClassRoster {
        class_label: class_label.to_string(),
        students,
        skipped_rows,
    }
}

/// Text of a cell, trimmed. Whole floats lose their `.0`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

//! Media filename matching.
//!
//! Captured photos and videos are named `<exam_id>_<name>.<ext>`. Files that
//! don't follow the convention are keyed by their bare stem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::roster::Student;

/// Extensions produced by the capture session.
pub const MEDIA_EXTENSIONS: [&str; 2] = ["png", "mp4"];

/// Length of the exam ids used to name headshot files.
pub const HEADSHOT_ID_LEN: usize = 9;

/// Key derived from a media file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaKey {
    /// `<exam_id>_<name>`
    Full { exam_id: String, name: String },
    /// Anything else; the whole stem is treated as a name.
    NameOnly(String),
}

impl MediaKey {
    /// The student name carried by the key.
    pub fn name(&self) -> &str {
        match self {
            MediaKey::Full { name, .. } => name,
            MediaKey::NameOnly(name) => name,
        }
    }

    /// The key as a roster student, if it carries an exam id.
    pub fn student(&self) -> Option<Student> {
        match self {
            MediaKey::Full { exam_id, name } => Some(Student::new(exam_id.clone(), name.clone())),
            MediaKey::NameOnly(_) => None,
        }
    }
}

/// A media file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub file_name: String,
    /// Lower-cased extension without the dot.
    pub extension: String,
    pub key: MediaKey,
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("Failed to read directory '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build the canonical media file name for a student.
pub fn build_media_name(exam_id: &str, name: &str, ext: &str) -> String {
    format!("{}_{}.{}", exam_id, name, ext)
}

/// Split a file name into stem and extension (without the dot).
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx + 1..]),
        _ => (file_name, ""),
    }
}

/// Parse a media file name into its key.
///
/// A leading run of ASCII digits followed by `_` and a non-empty remainder
/// yields [`MediaKey::Full`]; everything else falls back to
/// [`MediaKey::NameOnly`] with the stem.
pub fn parse_media_name(file_name: &str) -> MediaKey {
    let (stem, _) = split_extension(file_name);
    let digits = stem.bytes().take_while(|b| b.is_ascii_digit()).count();

    if digits > 0 && stem.as_bytes().get(digits) == Some(&b'_') {
        let name = stem[digits + 1..].trim();
        if !name.is_empty() {
            return MediaKey::Full {
                exam_id: stem[..digits].to_string(),
                name: name.to_string(),
            };
        }
    }

    MediaKey::NameOnly(stem.trim().to_string())
}

/// List files in `dir` (non-recursive) whose extension is one of `extensions`.
///
/// Extension comparison ignores case. Results are sorted by file name.
pub fn scan_media(dir: &Path, extensions: &[&str]) -> Result<Vec<MediaFile>, MatchError> {
    let entries = read_dir(dir)?;
    let mut files = Vec::new();

    for path in entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            log::debug!("Skipping non UTF-8 file name: {:?}", path);
            continue;
        };
        let (_, ext) = split_extension(file_name);
        let ext = ext.to_ascii_lowercase();
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            continue;
        }
        files.push(MediaFile {
            key: parse_media_name(file_name),
            file_name: file_name.to_string(),
            extension: ext,
            path: path.clone(),
        });
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}

/// Map of roster key to photo path for every `<exam_id>_<name>.png`.
pub fn photo_index(dir: &Path) -> Result<HashMap<Student, PathBuf>, MatchError> {
    let mut index = HashMap::new();
    for file in scan_media(dir, &["png"])? {
        match file.key.student() {
            Some(student) => {
                index.insert(student, file.path);
            }
            None => log::debug!("Unmatched photo name: {}", file.file_name),
        }
    }
    Ok(index)
}

/// Map of exam id to headshot path for every `<9 digits>.png` in `dir`.
pub fn scan_headshots(dir: &Path) -> Result<HashMap<String, PathBuf>, MatchError> {
    let mut index = HashMap::new();
    for file in scan_media(dir, &["png"])? {
        let (stem, _) = split_extension(&file.file_name);
        if stem.len() == HEADSHOT_ID_LEN && stem.bytes().all(|b| b.is_ascii_digit()) {
            index.insert(stem.to_string(), file.path);
        }
    }
    Ok(index)
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, MatchError> {
    if !dir.is_dir() {
        return Err(MatchError::MissingDirectory(dir.to_path_buf()));
    }
    let io_err = |source| MatchError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

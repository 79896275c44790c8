//! Rename captured media to `<exam_id>_<name>.<ext>` using the roster.
//!
//! Planning is pure; [`apply`] executes exactly the planned renames so a dry
//! run and an execute run over the same inputs agree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::matcher::{build_media_name, MediaFile};
use crate::roster::ClassRoster;

/// What to do with one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RenameAction {
    /// The file already has its canonical name.
    AlreadyCorrect,
    /// Rename to the given file name in the same directory.
    Rename { to: String },
    /// The name derived from the file isn't on any roster sheet.
    NotFound { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRename {
    pub from: PathBuf,
    pub file_name: String,
    pub action: RenameAction,
}

/// Result of applying one planned rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed { from: String, to: String },
    /// Target already existed; the file was left alone.
    Collision { from: String, to: String },
    Failed { from: String, error: String },
}

/// End-of-run tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameSummary {
    pub already_correct: usize,
    pub renamed: usize,
    pub not_found: usize,
    pub collisions: usize,
    pub failed: usize,
    pub total: usize,
}

/// Name → exam id across all sheets. Later sheets win on duplicate names.
pub fn name_index(classes: &[ClassRoster]) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for class in classes {
        for student in &class.students {
            if let Some(previous) = index.insert(student.name.clone(), student.exam_id.clone()) {
                if previous != student.exam_id {
                    log::warn!(
                        "Duplicate name '{}' ({} and {}), using {}",
                        student.name,
                        previous,
                        student.exam_id,
                        student.exam_id
                    );
                }
            }
        }
    }
    index
}

/// Decide the action for every file.
pub fn plan(files: &[MediaFile], names: &HashMap<String, String>) -> Vec<PlannedRename> {
    files
        .iter()
        .map(|file| {
            let name = file.key.name();
            let action = match names.get(name) {
                Some(exam_id) => {
                    let target = build_media_name(exam_id, name, &file.extension);
                    if target == file.file_name {
                        RenameAction::AlreadyCorrect
                    } else {
                        RenameAction::Rename { to: target }
                    }
                }
                None => RenameAction::NotFound {
                    name: name.to_string(),
                },
            };
            PlannedRename {
                from: file.path.clone(),
                file_name: file.file_name.clone(),
                action,
            }
        })
        .collect()
}

/// The `(old, new)` file name pairs a plan proposes.
pub fn proposed_pairs(plan: &[PlannedRename]) -> Vec<(String, String)> {
    plan.iter()
        .filter_map(|p| match &p.action {
            RenameAction::Rename { to } => Some((p.file_name.clone(), to.clone())),
            _ => None,
        })
        .collect()
}

/// Tally a plan without touching the filesystem.
pub fn summarize_plan(plan: &[PlannedRename]) -> RenameSummary {
    let mut summary = RenameSummary {
        total: plan.len(),
        ..Default::default()
    };
    for p in plan {
        match p.action {
            RenameAction::AlreadyCorrect => summary.already_correct += 1,
            RenameAction::Rename { .. } => summary.renamed += 1,
            RenameAction::NotFound { .. } => summary.not_found += 1,
        }
    }
    summary
}

/// Execute the planned renames. Existing targets are never overwritten.
pub fn apply(plan: &[PlannedRename]) -> (Vec<RenameOutcome>, RenameSummary) {
    let mut summary = summarize_plan(plan);
    summary.renamed = 0;
    let mut outcomes = Vec::new();

    for p in plan {
        let RenameAction::Rename { to } = &p.action else {
            continue;
        };
        let target = sibling(&p.from, to);
        if target.exists() {
            log::warn!("Target already exists, skipping: {}", to);
            summary.collisions += 1;
            outcomes.push(RenameOutcome::Collision {
                from: p.file_name.clone(),
                to: to.clone(),
            });
            continue;
        }
        match std::fs::rename(&p.from, &target) {
            Ok(()) => {
                log::info!("Renamed {} -> {}", p.file_name, to);
                summary.renamed += 1;
                outcomes.push(RenameOutcome::Renamed {
                    from: p.file_name.clone(),
                    to: to.clone(),
                });
            }
            Err(e) => {
                log::error!("Failed to rename {}: {}", p.file_name, e);
                summary.failed += 1;
                outcomes.push(RenameOutcome::Failed {
                    from: p.file_name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    (outcomes, summary)
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::parse_media_name;
    use crate::roster::Student;

    fn media(name: &str) -> MediaFile {
        let extension = name.rsplit('.').next().unwrap().to_string();
        MediaFile {
            path: PathBuf::from("/photos").join(name),
            file_name: name.into(),
            extension,
            key: parse_media_name(name),
        }
    }

    fn roster() -> Vec<ClassRoster> {
        vec![ClassRoster {
            class_label: "C".into(),
            students: vec![Student::new("1001", "Alice"), Student::new("1002", "Bob")],
            skipped_rows: 0,
        }]
    }

    #[test]
    fn test_plan_categories() {
        let files = vec![media("1001_Alice.png"), media("Bob.mp4"), media("9_Bob.png"), media("Eve.png")];
        let plan = plan(&files, &name_index(&roster()));

        assert_eq!(plan[0].action, RenameAction::AlreadyCorrect);
        assert_eq!(
            plan[1].action,
            RenameAction::Rename {
                to: "1002_Bob.mp4".into()
            }
        );
        assert_eq!(
            plan[2].action,
            RenameAction::Rename {
                to: "1002_Bob.png".into()
            }
        );
        assert_eq!(plan[3].action, RenameAction::NotFound { name: "Eve".into() });

        let summary = summarize_plan(&plan);
        assert_eq!(summary.already_correct, 1);
        assert_eq!(summary.renamed, 2);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.total, 4);
    }

    #[test]
    fn test_later_sheet_wins_on_duplicate_name() {
        let mut classes = roster();
        classes.push(ClassRoster {
            class_label: "D".into(),
            students: vec![Student::new("2002", "Bob")],
            skipped_rows: 0,
        });
        assert_eq!(name_index(&classes)["Bob"], "2002");
    }
}

//! Missing-photo check: which roster students have no `<exam_id>_<name>.png`.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::roster::{ClassRoster, Student};

/// File written next to the photos when anyone is missing.
pub const REPORT_FILE_NAME: &str = "missing_students.txt";

/// Per-class tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub total: usize,
    pub has_photo: usize,
    pub missing: usize,
}

impl ClassStats {
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.has_photo as f64 * 100.0 / self.total as f64
        }
    }
}

/// Outcome of comparing the roster against the photo set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MissingReport {
    /// Students with a photo, in roster order, with their class.
    pub has_photo: Vec<(String, Student)>,
    /// Students without a photo, in roster order, with their class.
    pub missing: Vec<(String, Student)>,
    /// Stats keyed by class label (sorted).
    pub classes: BTreeMap<String, ClassStats>,
}

impl MissingReport {
    pub fn total(&self) -> usize {
        self.has_photo.len() + self.missing.len()
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.has_photo.len() as f64 * 100.0 / self.total() as f64
        }
    }

    /// Missing students grouped by class, each group sorted by exam id.
    pub fn missing_by_class(&self) -> BTreeMap<&str, Vec<&Student>> {
        let mut groups: BTreeMap<&str, Vec<&Student>> = BTreeMap::new();
        for (class, student) in &self.missing {
            groups.entry(class.as_str()).or_default().push(student);
        }
        for students in groups.values_mut() {
            students.sort();
        }
        groups
    }

    /// Plain-text report for [`REPORT_FILE_NAME`].
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Students without a photo");
        let _ = writeln!(out, "{}\n", "=".repeat(40));
        for (class, students) in self.missing_by_class() {
            let _ = writeln!(out, "[{}]", class);
            for s in students {
                let _ = writeln!(out, "  {} {}", s.exam_id, s.name);
            }
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "\nSummary:");
        let _ = writeln!(out, "Total students: {}", self.total());
        let _ = writeln!(out, "With photo: {}", self.has_photo.len());
        let _ = writeln!(out, "Missing: {}", self.missing.len());
        let _ = writeln!(out, "Completion: {:.1}%", self.completion_rate());
        out
    }

    /// Write the text report into `dir`; returns the path written.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(REPORT_FILE_NAME);
        std::fs::write(&path, self.render_text())?;
        Ok(path)
    }
}

/// Partition every roster student into has-photo / missing.
///
/// Matching is an exact `(exam_id, name)` tuple comparison.
pub fn find_missing(classes: &[ClassRoster], photos: &HashSet<Student>) -> MissingReport {
    let mut report = MissingReport::default();

    for class in classes {
        let stats = report.classes.entry(class.class_label.clone()).or_default();
        for student in &class.students {
            stats.total += 1;
            let entry = (class.class_label.clone(), student.clone());
            if photos.contains(student) {
                stats.has_photo += 1;
                report.has_photo.push(entry);
            } else {
                stats.missing += 1;
                report.missing.push(entry);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(label: &str, students: &[(&str, &str)]) -> ClassRoster {
        ClassRoster {
            class_label: label.into(),
            students: students.iter().map(|(i, n)| Student::new(*i, *n)).collect(),
            skipped_rows: 0,
        }
    }

    #[test]
    fn test_find_missing_partitions_roster() {
        let classes = vec![
            class("Class1", &[("1", "A"), ("2", "B"), ("3", "C")]),
            class("Class2", &[("4", "D")]),
        ];
        let photos: HashSet<Student> = [Student::new("2", "B"), Student::new("4", "D"), Student::new("9", "Z")]
            .into_iter()
            .collect();

        let report = find_missing(&classes, &photos);
        assert_eq!(report.total(), 4);
        assert_eq!(report.has_photo.len(), 2);
        assert_eq!(report.missing.len(), 2);

        let missing: HashSet<_> = report.missing.iter().map(|(_, s)| s.clone()).collect();
        let has: HashSet<_> = report.has_photo.iter().map(|(_, s)| s.clone()).collect();
        assert!(missing.is_disjoint(&has));
        assert!(missing.contains(&Student::new("1", "A")));
        assert!(missing.contains(&Student::new("3", "C")));

        assert_eq!(
            report.classes["Class1"],
            ClassStats {
                total: 3,
                has_photo: 1,
                missing: 2
            }
        );
    }

    #[test]
    fn test_exact_tuple_match() {
        let classes = vec![class("C", &[("1", "Alice")])];
        let photos: HashSet<Student> = [Student::new("1", "alice")].into_iter().collect();
        assert_eq!(find_missing(&classes, &photos).missing.len(), 1);
    }

    #[test]
    fn test_render_text_groups_and_sorts() {
        let classes = vec![class("B", &[("2", "Y"), ("1", "X")]), class("A", &[("5", "Q")])];
        let report = find_missing(&classes, &HashSet::new());
        let text = report.render_text();
        let a = text.find("[A]").unwrap();
        let b = text.find("[B]").unwrap();
        assert!(a < b);
        assert!(text.find("1 X").unwrap() < text.find("2 Y").unwrap());
        assert!(text.contains("Completion: 0.0%"));
    }

    #[test]
    fn test_completion_rate_empty() {
        assert_eq!(MissingReport::default().completion_rate(), 0.0);
        assert_eq!(ClassStats::default().completion_rate(), 0.0);
    }
}

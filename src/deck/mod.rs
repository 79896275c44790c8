//! Per-class slide decks of student photos or headshots.

pub mod layout;
pub mod pptx;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use layout::{plan_deck, DeckLayout, DeckSpec, Placement};

use crate::roster::{ClassRoster, Student};

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write presentation: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// What was written for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckSummary {
    pub class_label: String,
    pub path: PathBuf,
    pub slides: usize,
    pub students: usize,
    pub with_image: usize,
}

impl DeckSummary {
    pub fn without_image(&self) -> usize {
        self.students - self.with_image
    }
}

/// Output file name for a class deck.
pub fn deck_file_name(class_label: &str, layout: DeckLayout) -> String {
    match layout {
        DeckLayout::Single => format!("{}_photos.pptx", class_label),
        DeckLayout::Grid { .. } => format!("{}_headshots.pptx", class_label),
    }
}

/// Pair each student with their image. Unreadable image headers fall back
/// to a default picture size.
pub fn placements<F>(students: &[Student], mut image_for: F) -> Vec<Placement>
where
    F: FnMut(&Student) -> Option<PathBuf>,
{
    students
        .iter()
        .map(|student| {
            let image = image_for(student);
            let pixels = image.as_deref().and_then(|path| match image::image_dimensions(path) {
                Ok(dims) => Some(dims),
                Err(e) => {
                    log::warn!("Can't read image size of {}: {}", path.display(), e);
                    None
                }
            });
            Placement {
                student: student.clone(),
                image,
                pixels,
            }
        })
        .collect()
}

/// Lay out and write the deck for one class.
///
/// Students are sorted by exam id; every student gets a slide (single
/// layout) or a cell (grid layout) whether or not an image was found.
pub fn build_class_deck<F>(
    class: &ClassRoster,
    image_for: F,
    layout: DeckLayout,
    out_dir: &Path,
) -> Result<DeckSummary, DeckError>
where
    F: FnMut(&Student) -> Option<PathBuf>,
{
    std::fs::create_dir_all(out_dir).map_err(|source| DeckError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let students = class.sorted_by_exam_id();
    let deck = plan_deck(&placements(&students, image_for), layout);
    let path = out_dir.join(deck_file_name(&class.class_label, layout));
    pptx::write_deck(&deck, &path)?;

    let summary = DeckSummary {
        class_label: class.class_label.clone(),
        path,
        slides: deck.slides.len(),
        students: deck.cell_count(),
        with_image: deck.with_image(),
    };
    log::info!(
        "Class {}: {} slide(s), {}/{} with image -> {}",
        summary.class_label,
        summary.slides,
        summary.with_image,
        summary.students,
        summary.path.display()
    );
    Ok(summary)
}

//! Slide geometry. Everything is in EMU (English Metric Units), the unit
//! PresentationML uses for positions and extents.

use std::path::PathBuf;

use crate::roster::Student;

pub const EMU_PER_INCH: i64 = 914_400;

/// Screen pixels per inch assumed when sizing pictures.
const PIXELS_PER_INCH: f64 = 96.0;

/// Fallback picture size when the image header can't be read.
const FALLBACK_PICTURE: (f64, f64) = (6.0, 4.5);

pub const CAPTION_RED: &str = "FF0000";
pub const PLACEHOLDER_FILL: &str = "F0F0F0";
pub const PLACEHOLDER_LINE: &str = "C8C8C8";

pub fn inches(value: f64) -> i64 {
    (value * EMU_PER_INCH as f64).round() as i64
}

/// Position and size of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, cx: i64, cy: i64) -> Self {
        Self { x, y, cx, cy }
    }
}

/// Slide dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideSize {
    pub cx: i64,
    pub cy: i64,
}

/// How students are arranged in a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckLayout {
    /// One student per 16:9 slide, full photo with a large caption.
    Single,
    /// `cols × rows` headshots per slide with short captions.
    Grid { cols: u32, rows: u32 },
}

impl DeckLayout {
    pub fn slide_size(&self) -> SlideSize {
        match *self {
            DeckLayout::Single => SlideSize {
                cx: inches(13.33),
                cy: inches(7.5),
            },
            DeckLayout::Grid { cols, rows } => {
                let height = 7.5;
                SlideSize {
                    cx: inches(height * cols as f64 / rows.max(1) as f64),
                    cy: inches(height),
                }
            }
        }
    }

    pub fn per_slide(&self) -> usize {
        match *self {
            DeckLayout::Single => 1,
            DeckLayout::Grid { cols, rows } => (cols * rows).max(1) as usize,
        }
    }
}

/// A text box with uniformly formatted, centered lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub rect: Rect,
    pub lines: Vec<String>,
    pub size_pt: u32,
}

/// What fills a student's picture slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    Picture { path: PathBuf, rect: Rect },
    /// Grey box standing in for a missing headshot.
    Placeholder { rect: Rect },
    /// No picture at all; the caption carries the slot.
    None,
}

/// One student's slot on a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub student: Student,
    pub visual: Visual,
    pub caption: Caption,
}

impl Cell {
    pub fn has_image(&self) -> bool {
        matches!(self.visual, Visual::Picture { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlideSpec {
    pub cells: Vec<Cell>,
}

/// A class deck ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSpec {
    pub size: SlideSize,
    pub slides: Vec<SlideSpec>,
}

impl DeckSpec {
    pub fn cell_count(&self) -> usize {
        self.slides.iter().map(|s| s.cells.len()).sum()
    }

    pub fn with_image(&self) -> usize {
        self.slides
            .iter()
            .flat_map(|s| &s.cells)
            .filter(|c| c.has_image())
            .count()
    }
}

/// A student plus the image found for them, if any.
#[derive(Debug, Clone)]
pub struct Placement {
    pub student: Student,
    pub image: Option<PathBuf>,
    /// Pixel size of `image`, when it could be read.
    pub pixels: Option<(u32, u32)>,
}

/// Picture extent fitted in `max` inches at 96 dpi, never upscaled.
pub fn fit_picture(pixels: Option<(u32, u32)>, max_w: f64, max_h: f64) -> (i64, i64) {
    match pixels {
        Some((w, h)) if w > 0 && h > 0 => {
            let width_ratio = max_w * PIXELS_PER_INCH / w as f64;
            let height_ratio = max_h * PIXELS_PER_INCH / h as f64;
            let scale = width_ratio.min(height_ratio).min(1.0);
            (
                inches(w as f64 * scale / PIXELS_PER_INCH),
                inches(h as f64 * scale / PIXELS_PER_INCH),
            )
        }
        _ => (inches(FALLBACK_PICTURE.0), inches(FALLBACK_PICTURE.1)),
    }
}

fn single_slide(placement: &Placement, size: SlideSize) -> SlideSpec {
    let student = &placement.student;
    let text_x = inches(1.0);
    let text_w = size.cx - inches(2.0);

    let cell = match &placement.image {
        Some(path) => {
            let (cx, cy) = fit_picture(placement.pixels, 8.0, 6.0);
            let top = inches(0.5);
            let picture = Rect::new((size.cx - cx) / 2, top, cx, cy);
            Cell {
                student: student.clone(),
                visual: Visual::Picture {
                    path: path.clone(),
                    rect: picture,
                },
                caption: Caption {
                    rect: Rect::new(text_x, top + cy + inches(0.1), text_w, inches(1.5)),
                    lines: vec![student.exam_id.clone(), student.name.clone()],
                    size_pt: 72,
                },
            }
        }
        None => Cell {
            student: student.clone(),
            visual: Visual::None,
            caption: Caption {
                rect: Rect::new(text_x, inches(2.3), text_w, inches(2.0)),
                lines: vec![
                    student.exam_id.clone(),
                    student.name.clone(),
                    "(no photo)".to_string(),
                ],
                size_pt: 72,
            },
        },
    };

    SlideSpec { cells: vec![cell] }
}

fn grid_slide(page: &[Placement], cols: u32, rows: u32, size: SlideSize) -> SlideSpec {
    let margin = inches(0.2) as f64;
    let cell_w = (size.cx as f64 - 2.0 * margin) / cols as f64;
    let cell_h = (size.cy as f64 - 2.0 * margin) / rows as f64;
    let img = (cell_w * 0.92).min(cell_h * 0.78);
    let text_h = cell_h * 0.20;

    let cells = page
        .iter()
        .take((cols * rows) as usize)
        .enumerate()
        .map(|(idx, placement)| {
            let row = idx as u32 / cols;
            let col = idx as u32 % cols;
            let center_x = margin + col as f64 * cell_w + cell_w / 2.0;
            let center_y = margin + row as f64 * cell_h + cell_h / 2.0;
            let img_left = center_x - img / 2.0;
            let img_top = center_y - img / 2.0 - text_h / 2.0;
            let picture = Rect::new(img_left as i64, img_top as i64, img as i64, img as i64);

            let visual = match &placement.image {
                Some(path) => Visual::Picture {
                    path: path.clone(),
                    rect: picture,
                },
                None => Visual::Placeholder { rect: picture },
            };
            let student = &placement.student;
            Cell {
                student: student.clone(),
                visual,
                caption: Caption {
                    rect: Rect::new(
                        (center_x - cell_w * 0.45) as i64,
                        (img_top + img) as i64 + inches(0.05),
                        (cell_w * 0.9) as i64,
                        text_h as i64,
                    ),
                    lines: vec![format!("{}{}", student.short_id(), student.name)],
                    size_pt: 18,
                },
            }
        })
        .collect();

    SlideSpec { cells }
}

/// Lay out every placement. Every student gets exactly one cell.
pub fn plan_deck(placements: &[Placement], layout: DeckLayout) -> DeckSpec {
    let size = layout.slide_size();
    let slides = match layout {
        DeckLayout::Single => placements.iter().map(|p| single_slide(p, size)).collect(),
        DeckLayout::Grid { cols, rows } => {
            let (cols, rows) = (cols.max(1), rows.max(1));
            placements
                .chunks(layout.per_slide())
                .map(|page| grid_slide(page, cols, rows, size))
                .collect()
        }
    };
    DeckSpec { size, slides }
}

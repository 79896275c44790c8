//! Headshot extraction: detect the most confident face in a photo and save
//! an expanded square crop around it.

pub mod crop;
pub mod yunet;

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

pub use crop::{crop_region, CropRegion, DEFAULT_SCALE};
pub use yunet::YuNetDetector;

pub const DEFAULT_OUTPUT_DIR: &str = "cuted";
pub const DEFAULT_PATTERN: &str = "*.png";

#[derive(Debug, Error)]
pub enum HeadshotError {
    #[error("No face detected in '{}'", .0.display())]
    NoFaceDetected(PathBuf),
    #[error("Face model not found at '{}'. Download face_detection_yunet_2023mar.onnx and set [headshot] model", .0.display())]
    ModelNotFound(PathBuf),
    #[error("Face model error: {0}")]
    Model(String),
    #[error("Failed to read or write image '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Input directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A face box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

pub trait FaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, HeadshotError>;
}

/// Highest-confidence detection.
pub fn best_detection(detections: &[Detection]) -> Option<Detection> {
    detections.iter().copied().max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Output file stem for a batch input: the id segment before the first `_`.
pub fn output_stem(stem: &str) -> &str {
    stem.split('_').next().unwrap_or(stem)
}

/// Compile a batch file-name pattern (`*`, `?`, `[...]`).
pub fn file_pattern(pattern: &str) -> Result<glob::Pattern, HeadshotError> {
    glob::Pattern::new(pattern).map_err(|source| HeadshotError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// One saved headshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub path: PathBuf,
    pub region: CropRegion,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadshotSummary {
    pub total: usize,
    pub extracted: Vec<Extracted>,
    /// File name and reason.
    pub failed: Vec<(String, String)>,
}

impl HeadshotSummary {
    pub fn success_count(&self) -> usize {
        self.extracted.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

pub struct HeadshotExtractor<D> {
    detector: D,
    output_dir: PathBuf,
    scale: f32,
}

impl<D: FaceDetector> HeadshotExtractor<D> {
    pub fn new(detector: D, output_dir: impl Into<PathBuf>, scale: f32) -> Self {
        Self {
            detector,
            output_dir: output_dir.into(),
            scale,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Crop the best face in `image_path` to `<output_dir>/<save_name>.<ext>`.
    ///
    /// `save_name` defaults to the source stem; the source extension is kept.
    pub fn extract(&self, image_path: &Path, save_name: Option<&str>) -> Result<Extracted, HeadshotError> {
        let image = image::open(image_path)
            .map_err(|source| HeadshotError::Image {
                path: image_path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        let detections = self.detector.detect(&image)?;
        let best = best_detection(&detections).ok_or_else(|| HeadshotError::NoFaceDetected(image_path.to_path_buf()))?;
        let region = crop_region(&best, image.width(), image.height(), self.scale);
        let headshot = image::imageops::crop_imm(&image, region.x, region.y, region.width, region.height).to_image();

        std::fs::create_dir_all(&self.output_dir).map_err(|source| HeadshotError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        let stem = save_name
            .map(str::to_string)
            .or_else(|| image_path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "headshot".to_string());
        let mut path = self.output_dir.join(stem);
        if let Some(ext) = image_path.extension() {
            path.set_extension(ext);
        }

        headshot.save(&path).map_err(|source| HeadshotError::Image {
            path: path.clone(),
            source,
        })?;
        log::info!("Extracted headshot {} (score {:.2})", path.display(), best.score);
        Ok(Extracted {
            path,
            region,
            score: best.score,
        })
    }

    /// Extract every file in `input_dir` matching `pattern`.
    ///
    /// Per-file failures are collected in the summary, not returned.
    pub fn batch(&self, input_dir: &Path, pattern: &str) -> Result<HeadshotSummary, HeadshotError> {
        let pattern = file_pattern(pattern)?;
        if !input_dir.is_dir() {
            return Err(HeadshotError::MissingDirectory(input_dir.to_path_buf()));
        }
        let entries = std::fs::read_dir(input_dir).map_err(|source| HeadshotError::Io {
            path: input_dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .map(|n| pattern.matches(&n.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let mut summary = HeadshotSummary {
            total: files.len(),
            ..Default::default()
        };
        for file in files {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            match self.extract(&file, Some(output_stem(&stem))) {
                Ok(extracted) => summary.extracted.push(extracted),
                Err(e) => {
                    log::warn!("{}", e);
                    summary.failed.push((file_name, e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

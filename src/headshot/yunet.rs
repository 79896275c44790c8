//! YuNet face detector on `tract-onnx`.
//!
//! The image is letterboxed (top-left aligned, zero padded) into the model's
//! fixed square input, run once, and the twelve stride outputs are decoded
//! back into source-image coordinates.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use super::{Detection, FaceDetector, HeadshotError};

pub const INPUT_SIZE: u32 = 640;
pub const STRIDES: [u32; 3] = [8, 16, 32];
pub const SCORE_THRESHOLD: f32 = 0.5;
pub const NMS_THRESHOLD: f32 = 0.3;

type Plan = TypedRunnableModel<TypedModel>;

/// Scale factor and size of the resized image inside the square input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    pub fn fit(image_w: u32, image_h: u32, input: u32) -> Self {
        let scale = (input as f32 / image_w.max(1) as f32).min(input as f32 / image_h.max(1) as f32);
        Self {
            scale,
            width: ((image_w as f32 * scale).round() as u32).clamp(1, input),
            height: ((image_h as f32 * scale).round() as u32).clamp(1, input),
        }
    }

    /// Map a detection in input space back to the source image.
    pub fn unmap(&self, d: Detection) -> Detection {
        Detection {
            x: d.x / self.scale,
            y: d.y / self.scale,
            width: d.width / self.scale,
            height: d.height / self.scale,
            score: d.score,
        }
    }
}

pub struct YuNetDetector {
    plan: Plan,
    score_threshold: f32,
}

impl std::fmt::Debug for YuNetDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YuNetDetector")
            .field("score_threshold", &self.score_threshold)
            .finish_non_exhaustive()
    }
}

impl YuNetDetector {
    /// Load and optimize the model at `path`.
    pub fn load(path: &Path, score_threshold: f32) -> Result<Self, HeadshotError> {
        if !path.is_file() {
            return Err(HeadshotError::ModelNotFound(path.to_path_buf()));
        }
        let size = INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| HeadshotError::Model(format!("{}: {}", path.display(), e)))?;
        log::debug!("Loaded face model {}", path.display());
        Ok(Self { plan, score_threshold })
    }

    fn input_tensor(&self, image: &RgbImage) -> (Tensor, Letterbox) {
        let lb = Letterbox::fit(image.width(), image.height(), INPUT_SIZE);
        let resized = imageops::resize(image, lb.width, lb.height, FilterType::Triangle);
        let size = INPUT_SIZE as usize;
        let tensor: Tensor = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            if x as u32 >= lb.width || y as u32 >= lb.height {
                return 0.0f32;
            }
            // Model expects BGR in 0-255.
            let px = resized.get_pixel(x as u32, y as u32);
            f32::from(px[2 - c])
        })
        .into();
        (tensor, lb)
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, HeadshotError> {
        let (tensor, lb) = self.input_tensor(image);
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| HeadshotError::Model(e.to_string()))?;
        if outputs.len() < 12 {
            return Err(HeadshotError::Model(format!(
                "expected 12 outputs, model produced {}",
                outputs.len()
            )));
        }

        let view = |i: usize| -> Result<Vec<f32>, HeadshotError> {
            outputs[i]
                .to_array_view::<f32>()
                .map(|a| a.iter().copied().collect())
                .map_err(|e| HeadshotError::Model(e.to_string()))
        };

        // Output order: cls_8/16/32, obj_8/16/32, bbox_8/16/32, kps_8/16/32.
        let mut candidates = Vec::new();
        for (i, stride) in STRIDES.iter().enumerate() {
            let cls = view(i)?;
            let obj = view(i + 3)?;
            let bbox = view(i + 6)?;
            candidates.extend(decode_stride(
                &cls,
                &obj,
                &bbox,
                *stride,
                INPUT_SIZE,
                self.score_threshold,
            ));
        }

        Ok(non_max_suppression(candidates, NMS_THRESHOLD)
            .into_iter()
            .map(|d| lb.unmap(d))
            .collect())
    }
}

/// Decode one stride's anchor-free outputs into input-space boxes.
pub fn decode_stride(
    cls: &[f32],
    obj: &[f32],
    bbox: &[f32],
    stride: u32,
    input: u32,
    threshold: f32,
) -> Vec<Detection> {
    let cols = (input / stride) as usize;
    let rows = cols;
    let s = stride as f32;
    let count = (rows * cols).min(cls.len()).min(obj.len()).min(bbox.len() / 4);

    (0..count)
        .filter_map(|i| {
            let score = (cls[i].clamp(0.0, 1.0) * obj[i].clamp(0.0, 1.0)).sqrt();
            if score < threshold {
                return None;
            }
            let (row, col) = ((i / cols) as f32, (i % cols) as f32);
            let b = &bbox[i * 4..i * 4 + 4];
            let cx = (col + b[0]) * s;
            let cy = (row + b[1]) * s;
            let w = b[2].exp() * s;
            let h = b[3].exp() * s;
            Some(Detection {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                width: w,
                height: h,
                score,
            })
        })
        .collect()
}

/// Greedy NMS: keep the best box, drop everything overlapping it by more
/// than `iou_threshold`, repeat.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Detection> = Vec::new();
    for d in detections {
        if kept.iter().all(|k| k.iou(&d) <= iou_threshold) {
            kept.push(d);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, score: f32) -> Detection {
        Detection {
            x,
            y,
            width: w,
            height: h,
            score,
        }
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(1280, 720, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.width, lb.height), (640, 360));
        let d = lb.unmap(det(10.0, 20.0, 30.0, 40.0, 0.9));
        assert_eq!((d.x, d.y, d.width, d.height), (20.0, 40.0, 60.0, 80.0));
    }

    #[test]
    fn test_letterbox_portrait_upscale() {
        let lb = Letterbox::fit(160, 320, 640);
        assert_eq!(lb.scale, 2.0);
        assert_eq!((lb.width, lb.height), (320, 640));
    }

    #[test]
    fn test_decode_single_anchor() {
        // Stride 32 on a 64px input: 2x2 grid. Anchor 3 is row 1, col 1.
        let cls = [0.0, 0.0, 0.0, 0.81];
        let obj = [0.0, 0.0, 0.0, 1.0];
        let mut bbox = [0.0f32; 16];
        bbox[12..16].copy_from_slice(&[0.5, 0.25, 0.0, 0.0]);

        let out = decode_stride(&cls, &obj, &bbox, 32, 64, 0.5);
        assert_eq!(out.len(), 1);
        let d = out[0];
        assert!((d.score - 0.9).abs() < 1e-6);
        // cx = 1.5 * 32 = 48, cy = 1.25 * 32 = 40, w = h = 32
        assert_eq!((d.x, d.y, d.width, d.height), (32.0, 24.0, 32.0, 32.0));
    }

    #[test]
    fn test_decode_threshold_filters() {
        let cls = [0.2, 0.3];
        let obj = [0.2, 0.9];
        let bbox = [0.0f32; 8];
        // sqrt(0.04)=0.2, sqrt(0.27)=0.52 over a 2x1 slice of a 16px grid
        let out = decode_stride(&cls, &obj, &bbox, 8, 16, 0.5);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let out = non_max_suppression(
            vec![
                det(0.0, 0.0, 100.0, 100.0, 0.7),
                det(5.0, 5.0, 100.0, 100.0, 0.9),
                det(300.0, 300.0, 50.0, 50.0, 0.6),
            ],
            0.3,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].score, 0.9);
        assert_eq!(out[1].score, 0.6);
    }

    #[test]
    fn test_missing_model_file() {
        let err = YuNetDetector::load(Path::new("/nonexistent/yunet.onnx"), 0.5).unwrap_err();
        assert!(matches!(err, HeadshotError::ModelNotFound(_)));
    }
}

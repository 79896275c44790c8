//! Square crop around a detected face.

use super::Detection;

pub const DEFAULT_SCALE: f32 = 1.8;

/// Pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Square of side `max(w, h) * scale` centred on the face, clamped to the
/// image.
///
/// The result is never empty and never leaves `[0, image_w] x [0, image_h]`,
/// even for boxes that lie partly or wholly outside the image.
pub fn crop_region(face: &Detection, image_w: u32, image_h: u32, scale: f32) -> CropRegion {
    let image_w = i64::from(image_w.max(1));
    let image_h = i64::from(image_h.max(1));

    let box_x = face.x as i64;
    let box_y = face.y as i64;
    let box_w = face.width.max(0.0) as i64;
    let box_h = face.height.max(0.0) as i64;

    let center_x = box_x.saturating_add(box_w / 2).clamp(0, image_w - 1);
    let center_y = box_y.saturating_add(box_h / 2).clamp(0, image_h - 1);
    let side = (box_w.max(box_h) as f32 * scale.max(0.0)) as i64;
    let half = side / 2;

    let x1 = (center_x - half).max(0);
    let y1 = (center_y - half).max(0);
    let x2 = (center_x + half).min(image_w).max(x1 + 1);
    let y2 = (center_y + half).min(image_h).max(y1 + 1);

    CropRegion {
        x: x1 as u32,
        y: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            x,
            y,
            width: w,
            height: h,
            score: 0.9,
        }
    }

    #[test]
    fn test_centered_square_expansion() {
        let r = crop_region(&face(400.0, 300.0, 100.0, 120.0), 1000, 1000, 1.8);
        // center (450, 360), side 216, half 108
        assert_eq!(
            r,
            CropRegion {
                x: 342,
                y: 252,
                width: 216,
                height: 216
            }
        );
    }

    #[test]
    fn test_clamped_at_top_left() {
        let r = crop_region(&face(0.0, 0.0, 100.0, 100.0), 640, 480, 1.8);
        assert_eq!((r.x, r.y), (0, 0));
        assert_eq!((r.width, r.height), (140, 140));
    }

    #[test]
    fn test_clamped_at_bottom_right() {
        let r = crop_region(&face(580.0, 420.0, 60.0, 60.0), 640, 480, 3.0);
        assert_eq!(r.right(), 640);
        assert_eq!(r.bottom(), 480);
    }

    #[test]
    fn test_region_always_inside_image_and_non_empty() {
        let faces = [
            face(-50.0, -50.0, 30.0, 30.0),
            face(10_000.0, 10_000.0, 10.0, 10.0),
            face(5.0, 5.0, 0.0, 0.0),
            face(0.0, 0.0, 5000.0, 5000.0),
            face(320.0, 240.0, 40.0, 80.0),
        ];
        for (w, h) in [(640, 480), (1, 1), (17, 300)] {
            for f in &faces {
                for scale in [0.0, 1.0, 1.8, 10.0] {
                    let r = crop_region(f, w, h, scale);
                    assert!(r.width > 0 && r.height > 0, "{:?} in {}x{}", r, w, h);
                    assert!(r.right() <= w && r.bottom() <= h, "{:?} in {}x{}", r, w, h);
                }
            }
        }
    }
}

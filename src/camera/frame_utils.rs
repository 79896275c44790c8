//! Frame transformation utilities.

use std::path::Path;

use image::imageops::FilterType;
use image::{ImageResult, RgbImage};

use super::types::{Frame, Resolution};

/// Rotate a frame by 180° in place (reverse pixel order).
pub fn rotate180(frame: &mut Frame) {
    let pixels = frame.data.len() / 3;
    for i in 0..pixels / 2 {
        let a = i * 3;
        let b = (pixels - 1 - i) * 3;
        for c in 0..3 {
            frame.data.swap(a + c, b + c);
        }
    }
}

/// View a frame as an `RgbImage`. `None` if the buffer length is wrong.
pub fn to_rgb_image(frame: &Frame) -> Option<RgbImage> {
    RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
}

/// Resize to `target`, stretching like the recorder's fixed output size.
pub fn resize(frame: &Frame, target: Resolution) -> Option<Frame> {
    if frame.resolution() == target {
        return Some(frame.clone());
    }
    let image = to_rgb_image(frame)?;
    let resized = image::imageops::resize(&image, target.width, target.height, FilterType::Triangle);
    Some(Frame {
        data: resized.into_raw(),
        width: target.width,
        height: target.height,
        timestamp: frame.timestamp,
    })
}

/// Save a frame as PNG.
pub fn save_png(frame: &Frame, path: &Path) -> ImageResult<()> {
    let image = to_rgb_image(frame).ok_or_else(|| {
        image::ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        ))
    })?;
    image.save_with_format(path, image::ImageFormat::Png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate180_2x1() {
        let mut frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1);
        rotate180(&mut frame);
        assert_eq!(frame.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_rotate180_3x2() {
        // Row 0: [A, B, C]
        // Row 1: [D, E, F]
        let mut frame = Frame::new(
            vec![
                1, 1, 1, 2, 2, 2, 3, 3, 3, //
                4, 4, 4, 5, 5, 5, 6, 6, 6,
            ],
            3,
            2,
        );
        rotate180(&mut frame);
        // Row 0: [F, E, D]
        // Row 1: [C, B, A]
        assert_eq!(
            frame.data,
            vec![
                6, 6, 6, 5, 5, 5, 4, 4, 4, //
                3, 3, 3, 2, 2, 2, 1, 1, 1,
            ]
        );
    }

    #[test]
    fn test_rotate180_twice_is_identity() {
        let data: Vec<u8> = (0..4 * 3 * 3).map(|v| v as u8).collect();
        let mut frame = Frame::new(data.clone(), 4, 3);
        rotate180(&mut frame);
        rotate180(&mut frame);
        assert_eq!(frame.data, data);
    }

    #[test]
    fn test_resize_to_target() {
        let frame = Frame::new(vec![200; 4 * 2 * 3], 4, 2);
        let out = resize(&frame, Resolution::new(8, 4)).unwrap();
        assert_eq!(out.data.len(), 8 * 4 * 3);
        assert_eq!(out.resolution(), Resolution::new(8, 4));
    }

    #[test]
    fn test_bad_buffer_rejected() {
        let frame = Frame::new(vec![0; 5], 4, 2);
        assert!(to_rgb_image(&frame).is_none());
        assert!(resize(&frame, Resolution::new(2, 2)).is_none());
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        save_png(&Frame::new(vec![10; 2 * 2 * 3], 2, 2), &path).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (2, 2));
    }
}

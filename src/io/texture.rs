//! Texture image I/O through the `image` crate.
//!
//! Textures are decoded to 8-bit RGB, or RGBA when the source has an alpha
//! channel, and stored as floating point values in `[0, 1]`. On save, values
//! are clamped and rounded back to 8 bits. The file format is chosen from the
//! extension.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::error::{Result, SeamError};
use crate::texture::Texture;

/// Load a texture from an image file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Texture> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| SeamError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let (width, height) = (img.width() as usize, img.height() as usize);
    let (channels, bytes) = if img.color().has_alpha() {
        (4, img.to_rgba8().into_raw())
    } else {
        (3, img.to_rgb8().into_raw())
    };

    let data = bytes.iter().map(|&b| f64::from(b) / 255.0).collect();
    Texture::from_raw(width, height, channels, data).map_err(|e| SeamError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Save a texture to an image file.
///
/// One-channel textures are written as greyscale. Alpha is dropped for
/// formats that cannot store it.
///
/// # Errors
///
/// Returns an error if the extension is not a known image format, the
/// channel count is not 1, 3 or 4, or encoding fails.
pub fn save<P: AsRef<Path>>(texture: &Texture, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(|_| SeamError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })?;

    let (w, h) = (texture.width() as u32, texture.height() as u32);
    let bytes: Vec<u8> = texture.as_slice().iter().map(|&v| to_byte(v)).collect();
    let save_error = |message: String| SeamError::SaveError {
        path: path.to_path_buf(),
        message,
    };
    let size_error = || save_error("buffer does not match image size".to_string());

    let img = match texture.channels() {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, bytes).ok_or_else(size_error)?),
        3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, bytes).ok_or_else(size_error)?),
        4 => {
            let rgba = RgbaImage::from_raw(w, h, bytes).ok_or_else(size_error)?;
            if format == ImageFormat::Jpeg {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
            } else {
                DynamicImage::ImageRgba8(rgba)
            }
        }
        n => {
            return Err(SeamError::invalid_param(
                "channels",
                n,
                "images are saved with 1, 3 or 4 channels",
            ))
        }
    };

    img.save_with_format(path, format)
        .map_err(|e| save_error(e.to_string()))
}

#[inline]
fn to_byte(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn gradient(channels: usize) -> Texture {
        Texture::from_fn(5, 3, channels, |x, y| {
            (0..channels)
                .map(|c| ((x + 2 * y + c) % 7) as f64 / 6.0)
                .collect()
        })
    }

    #[test]
    fn test_png_round_trip_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tex.png");
        let texture = gradient(3);
        save(&texture, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.shape(), (5, 3, 3));
        for (a, b) in loaded.as_slice().iter().zip(texture.as_slice()) {
            assert_relative_eq!(a, b, epsilon = 0.5 / 255.0 + 1e-12);
        }
    }

    #[test]
    fn test_alpha_preserved_in_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tex.png");
        save(&gradient(4), &path).unwrap();
        assert_eq!(load(&path).unwrap().channels(), 4);
    }

    #[test]
    fn test_alpha_dropped_in_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tex.jpg");
        save(&gradient(4), &path).unwrap();
        assert_eq!(load(&path).unwrap().channels(), 3);
    }

    #[test]
    fn test_greyscale_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mask = Texture::from_raw(2, 1, 1, vec![0.0, 1.0]).unwrap();
        save(&mask, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.channels(), 3);
        assert_eq!(loaded.texel(0), &[0.0, 0.0, 0.0]);
        assert_eq!(loaded.texel(1), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            save(&gradient(3), dir.path().join("tex.unknown")),
            Err(SeamError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            save(&gradient(2), dir.path().join("tex.png")),
            Err(SeamError::InvalidParameter { .. })
        ));
        assert!(matches!(
            load(dir.path().join("missing.png")),
            Err(SeamError::LoadError { .. })
        ));
    }
}

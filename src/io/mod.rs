//! Mesh and texture file I/O.
//!
//! # Supported Formats
//!
//! | Kind | Format | Extension | Load | Save | Notes |
//! |------|--------|-----------|------|------|-------|
//! | Mesh | Wavefront OBJ | `.obj` | ✓ | ✓ | Requires `vt`; saved with an `.mtl` companion |
//! | Texture | PNG | `.png` | ✓ | ✓ | Alpha preserved |
//! | Texture | JPEG | `.jpg`, `.jpeg` | ✓ | ✓ | Alpha dropped on save |
//! | Texture | BMP | `.bmp` | ✓ | ✓ | |
//! | Texture | TGA | `.tga` | ✓ | ✓ | |
//!
//! # Usage
//!
//! ```no_run
//! use texseam::io::{obj, texture};
//!
//! let mesh = obj::load("model.obj").unwrap();
//! let image = texture::load("model.png").unwrap();
//!
//! texture::save(&image, "model_copy.png").unwrap();
//! obj::save_with_material(&mesh, "model_copy.obj", "model_copy.png").unwrap();
//! ```

pub mod obj;
pub mod texture;

use std::path::Path;

/// Lower-case extension of a path, if it has one.
pub fn extension_of<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

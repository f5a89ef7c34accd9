//! Image loading module.
//! Decodes PNG, JPEG and other formats into frame buffers and float surfaces,
//! and writes surfaces back out as PNG.

use std::path::Path;

use lumen_core::frame::FrameBuffer;
use lumen_core::{LumenError, PixelFormat, Surface};

/// Load an image file and convert it to a FrameBuffer.
pub fn load_image(path: &Path) -> Result<FrameBuffer, LumenError> {
    let img = image::open(path).map_err(|e| {
        LumenError::asset(
            format!("failed to load image '{}': {}", path.display(), e),
            path,
        )
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut fb = FrameBuffer::new(width, height, PixelFormat::Rgba8);
    fb.data = rgba.into_raw();

    Ok(fb)
}

/// Load an image from raw bytes (e.g., from an embedded asset).
pub fn load_image_from_bytes(data: &[u8]) -> Result<FrameBuffer, LumenError> {
    let img = image::load_from_memory(data)
        .map_err(|e| LumenError::asset(format!("failed to decode image: {}", e), "<memory>"))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut fb = FrameBuffer::new(width, height, PixelFormat::Rgba8);
    fb.data = rgba.into_raw();

    Ok(fb)
}

/// Load an image file as a float surface.
pub fn load_surface(path: &Path) -> Result<Surface, LumenError> {
    load_image(path).map(|fb| Surface::from_frame_buffer(&fb))
}

/// Encode a surface as 8-bit RGBA. The format follows the file extension.
pub fn save_surface(surface: &Surface, path: &Path) -> Result<(), LumenError> {
    let fb = surface.to_frame_buffer();
    let img = image::RgbaImage::from_raw(fb.width, fb.height, fb.data)
        .ok_or_else(|| LumenError::Render("frame buffer has the wrong length".into()))?;
    img.save(path).map_err(|e| {
        LumenError::asset(
            format!("failed to write image '{}': {}", path.display(), e),
            path,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Color;

    #[test]
    fn test_load_image_missing_file() {
        let result = load_image(Path::new("/nonexistent/image.png"));
        assert!(result.is_err());
    }

    #[test]
    fn test_surface_png_round_trip() {
        let dir = std::env::temp_dir().join(format!("lumen-image-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("solid.png");
        let surface = Surface::solid(3, 2, &Color::RED);
        save_surface(&surface, &path).unwrap();

        let loaded = load_surface(&path).unwrap();
        assert_eq!(loaded.size(), (3, 2));
        assert_eq!(loaded.at(2, 1), [1.0, 0.0, 0.0, 1.0]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_bytes_rejects_garbage() {
        assert!(load_image_from_bytes(b"not an image").is_err());
    }
}

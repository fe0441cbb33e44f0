use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::path::Path;

const FALLBACK_COLORS: [[u8; 3]; 3] = [[20, 20, 60], [40, 10, 40], [10, 30, 50]];

/// Decode generated image bytes and cover-fit them to `width`x`height`
/// (scale to fill, centre crop).
pub fn fit_cover(bytes: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).context("Generated image could not be decoded")?;
    Ok(img.resize_to_fill(width, height, FilterType::Lanczos3).to_rgb8())
}

/// Solid-colour frame used when image generation fails. Colour cycles with `index`.
pub fn fallback_frame(index: usize, width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(FALLBACK_COLORS[index % FALLBACK_COLORS.len()]))
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to save image: {}", path.display()))
}

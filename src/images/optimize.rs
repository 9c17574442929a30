//! Image optimisation: flatten alpha, bound the width, re-encode.
//!
//! Output is JPEG for colour images and PNG for plain grayscale. Any image
//! with an alpha channel is alpha-blended onto an opaque white background
//! first, so transparent regions come out white rather than black.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::{debug, warn};

/// Decode, flatten, resize and re-encode an image.
///
/// Returns the new bytes and their file extension (`jpg` or `png`). When the
/// bytes cannot be decoded or re-encoded, the original bytes are returned
/// unchanged with the extension `png`.
pub fn optimize(data: &[u8], max_width: u32, quality: u8) -> (Vec<u8>, &'static str) {
    match try_optimize(data, max_width, quality) {
        Ok(out) => out,
        Err(e) => {
            warn!("Image optimisation failed, storing original bytes: {}", e);
            (data.to_vec(), "png")
        }
    }
}

fn try_optimize(
    data: &[u8],
    max_width: u32,
    quality: u8,
) -> Result<(Vec<u8>, &'static str), image::ImageError> {
    let img = image::load_from_memory(data)?;
    let (w, h) = (img.width(), img.height());

    let flattened = match img {
        DynamicImage::ImageLuma8(gray) => Flattened::Gray(gray),
        other if other.color().has_alpha() => Flattened::Rgb(flatten_onto_white(&other.to_rgba8())),
        other => Flattened::Rgb(other.to_rgb8()),
    };

    let resized = if w > max_width {
        let new_h = ((h as u64 * max_width as u64) / w as u64).max(1) as u32;
        debug!("Resizing image {}x{} → {}x{}", w, h, max_width, new_h);
        flattened.resize(max_width, new_h)
    } else {
        flattened
    };

    let mut buf = Vec::new();
    match resized {
        Flattened::Rgb(rgb) => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            DynamicImage::ImageRgb8(rgb).write_with_encoder(encoder)?;
            Ok((buf, "jpg"))
        }
        Flattened::Gray(gray) => {
            DynamicImage::ImageLuma8(gray).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            Ok((buf, "png"))
        }
    }
}

enum Flattened {
    Rgb(RgbImage),
    Gray(GrayImage),
}

impl Flattened {
    fn resize(self, w: u32, h: u32) -> Self {
        match self {
            Flattened::Rgb(img) => {
                Flattened::Rgb(image::imageops::resize(&img, w, h, FilterType::Lanczos3))
            }
            Flattened::Gray(img) => {
                Flattened::Gray(image::imageops::resize(&img, w, h, FilterType::Lanczos3))
            }
        }
    }
}

/// Alpha-blend every pixel onto opaque white.
fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

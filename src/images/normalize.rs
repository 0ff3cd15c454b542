use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use thiserror::Error;

/// Longest edge, in pixels, of any photo sent to the model or stored.
pub const MAX_EDGE: u32 = 1024;
pub const JPEG_QUALITY: u8 = 70;
pub const OUTPUT_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("image payload is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels")]
    Empty,
}

/// A re-encoded photo ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub mime_type: String,
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    #[cfg(test)]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn bytes(&self) -> Result<Vec<u8>, ImageDecodeError> {
        Ok(BASE64.decode(self.base64.as_bytes())?)
    }
}

/// Downscales so the longer edge is at most [`MAX_EDGE`] (never upscales)
/// and re-encodes as JPEG. Transparent pixels are flattened onto white.
pub fn normalize(raw: &[u8]) -> Result<NormalizedImage, ImageDecodeError> {
    let img = image::load_from_memory(raw)?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImageDecodeError::Empty);
    }

    let (tw, th) = bounded_dimensions(w, h, MAX_EDGE);
    let img = if (tw, th) == (w, h) {
        img
    } else {
        img.resize_exact(tw, th, FilterType::Triangle)
    };
    let rgb = flatten_alpha(&img);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;

    Ok(NormalizedImage {
        mime_type: OUTPUT_MIME.to_string(),
        base64: BASE64.encode(&out),
        width: tw,
        height: th,
    })
}

/// Accepts either bare base64 or a `data:<mime>;base64,` URL.
pub fn normalize_base64(payload: &str) -> Result<NormalizedImage, ImageDecodeError> {
    let payload = payload.trim();
    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(""),
        None => payload,
    };
    let raw = BASE64.decode(encoded.as_bytes())?;
    normalize(&raw)
}

pub(crate) fn bounded_dimensions(w: u32, h: u32, max_edge: u32) -> (u32, u32) {
    let longer = w.max(h);
    if longer <= max_edge {
        return (w, h);
    }
    let scale = max_edge as f64 / longer as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    if w >= h {
        (max_edge, scaled(h))
    } else {
        (scaled(w), max_edge)
    }
}

fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let alpha = u16::from(p[3]);
        let blend = |c: u8| (((u16::from(c) * alpha) + (255 * (255 - alpha))) / 255) as u8;
        image::Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

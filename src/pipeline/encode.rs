//! Image encoding: payload ↔ `DynamicImage`, base64 `ImageData` for vision
//! calls, and the raster encodings offered on export.

use crate::error::RecomposeError;
use crate::session::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use std::io::Cursor;
use tracing::debug;

/// Wrap a payload as base64 `ImageData` for a vision message, at high detail.
pub fn to_image_data(payload: &ImagePayload) -> ImageData {
    let b64 = STANDARD.encode(&payload.bytes);
    debug!("Encoded {} → {} bytes base64", payload.mime_type, b64.len());
    ImageData::new(b64, payload.mime_type.clone()).with_detail("high")
}

/// Media type of an encoded raster image, if recognised.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// Decode a payload into pixels.
pub fn decode(payload: &ImagePayload) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(&payload.bytes)
}

/// Pixel dimensions without a full decode where the format allows it.
pub fn dimensions(payload: &ImagePayload) -> Result<(u32, u32), RecomposeError> {
    image::ImageReader::new(Cursor::new(&payload.bytes))
        .with_guessed_format()
        .map_err(|e| RecomposeError::Export {
            detail: format!("could not read image header: {e}"),
        })?
        .into_dimensions()
        .map_err(|e| RecomposeError::Export {
            detail: format!("could not decode image: {e}"),
        })
}

/// Encode pixels as PNG. Used for rasterised document pages.
pub fn encode_png(img: &DynamicImage) -> Result<ImagePayload, RecomposeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| RecomposeError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(ImagePayload::new(buf, "image/png"))
}

/// Composite any alpha channel over a white background.
///
/// Transparent pixels come out white rather than whatever colour sits under
/// the alpha channel.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let a = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode pixels as baseline JPEG, flattening alpha onto white.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = flatten_onto_white(img);
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Re-encode a payload as PNG unless it already is one.
pub fn transcode_png(payload: &ImagePayload) -> Result<Vec<u8>, RecomposeError> {
    if sniff_image_mime(&payload.bytes) == Some("image/png") {
        return Ok(payload.bytes.clone());
    }
    let img = decode(payload).map_err(|e| RecomposeError::Export {
        detail: format!("could not decode image: {e}"),
    })?;
    encode_png(&img).map(|p| p.bytes)
}

/// Re-encode a payload as JPEG unless it already is one.
pub fn transcode_jpeg(payload: &ImagePayload, quality: u8) -> Result<Vec<u8>, RecomposeError> {
    if sniff_image_mime(&payload.bytes) == Some("image/jpeg") {
        return Ok(payload.bytes.clone());
    }
    let img = decode(payload).map_err(|e| RecomposeError::Export {
        detail: format!("could not decode image: {e}"),
    })?;
    encode_jpeg(&img, quality).map_err(|e| RecomposeError::Export {
        detail: format!("JPEG encoding failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn image_data_is_base64_with_high_detail() {
        let payload = encode_png(&red(10, 10)).unwrap();
        let data = to_image_data(&payload);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, payload.bytes);
    }

    #[test]
    fn dimensions_from_header() {
        let payload = encode_png(&red(32, 18)).unwrap();
        assert_eq!(dimensions(&payload).unwrap(), (32, 18));
    }

    #[test]
    fn corrupt_payload_is_export_error() {
        let payload = ImagePayload::new(vec![1, 2, 3, 4], "image/png");
        assert!(matches!(dimensions(&payload), Err(RecomposeError::Export { .. })));
        assert!(matches!(transcode_jpeg(&payload, 90), Err(RecomposeError::Export { .. })));
    }

    #[test]
    fn png_to_jpeg_and_back() {
        let png = encode_png(&red(8, 8)).unwrap();
        let jpeg = transcode_jpeg(&png, 90).unwrap();
        assert_eq!(sniff_image_mime(&jpeg), Some("image/jpeg"));
        let back = transcode_png(&ImagePayload::new(jpeg, "image/jpeg")).unwrap();
        assert_eq!(sniff_image_mime(&back), Some("image/png"));
    }

    #[test]
    fn png_passthrough_is_unchanged() {
        let png = encode_png(&red(4, 4)).unwrap();
        assert_eq!(transcode_png(&png).unwrap(), png.bytes);
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));
        let flat = flatten_onto_white(&clear);
        assert_eq!(*flat.get_pixel(3, 3), Rgb([255, 255, 255]));

        let half = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        assert_eq!(*flatten_onto_white(&half).get_pixel(0, 0), Rgb([127, 127, 127]));
        assert_eq!(*flatten_onto_white(&red(1, 1)).get_pixel(0, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn transparent_png_exports_as_white_jpeg() {
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0])));
        let png = encode_png(&clear).unwrap();
        let jpeg = transcode_jpeg(&png, 90).unwrap();
        let back = decode(&ImagePayload::new(jpeg, "image/jpeg")).unwrap().to_rgb8();
        let Rgb([r, g, b]) = *back.get_pixel(8, 8);
        assert!(r > 240 && g > 240 && b > 240, "got {r},{g},{b}");
    }
}

//! Single-page PDF packaging with lopdf.
//!
//! The page's MediaBox equals the image's pixel dimensions (one PDF unit per
//! pixel), and the image is drawn to fill it. The picture is stored as a
//! DCTDecode JPEG stream, which PDF readers decode natively, so no
//! recompression of the pixel data is needed at view time.

use crate::error::RecomposeError;
use crate::pipeline::encode;
use crate::pipeline::{Orientation, PackagedDocument};
use crate::session::ImagePayload;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

/// Wrap `image` in a one-page PDF of exactly `width` × `height` units.
pub fn package_image(
    image: &ImagePayload,
    width: u32,
    height: u32,
    jpeg_quality: u8,
) -> Result<PackagedDocument, RecomposeError> {
    if width == 0 || height == 0 {
        return Err(RecomposeError::Export {
            detail: format!("invalid page size {width}x{height}"),
        });
    }

    let pixels = encode::decode(image).map_err(|e| RecomposeError::Export {
        detail: format!("could not decode image: {e}"),
    })?;
    let jpeg = encode::encode_jpeg(&pixels, jpeg_quality).map_err(|e| RecomposeError::Export {
        detail: format!("JPEG encoding failed: {e}"),
    })?;

    let (w, h) = (i64::from(width), i64::from(height));
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(pixels.width()),
            "Height" => i64::from(pixels.height()),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    // Scale the unit square to the full page, then paint the image.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content.encode().map_err(|e| RecomposeError::Export {
        detail: format!("content stream encoding failed: {e}"),
    })?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| RecomposeError::Export {
        detail: format!("PDF write failed: {e}"),
    })?;

    let orientation = Orientation::for_dimensions(width, height);
    debug!("Packaged {}x{} {:?} PDF ({} bytes)", width, height, orientation, bytes.len());

    Ok(PackagedDocument {
        bytes,
        width,
        height,
        orientation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png(w: u32, h: u32) -> ImagePayload {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 120, 200])));
        encode::encode_png(&img).unwrap()
    }

    fn media_box(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        page.get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_i64().unwrap())
            .collect()
    }

    #[test]
    fn landscape_page_matches_pixels() {
        let doc = package_image(&png(1920, 1080), 1920, 1080, 85).unwrap();
        assert_eq!(doc.orientation, Orientation::Landscape);
        assert_eq!(media_box(&doc.bytes), vec![0, 0, 1920, 1080]);
    }

    #[test]
    fn portrait_page_matches_pixels() {
        let doc = package_image(&png(1080, 1920), 1080, 1920, 85).unwrap();
        assert_eq!(doc.orientation, Orientation::Portrait);
        assert_eq!(media_box(&doc.bytes), vec![0, 0, 1080, 1920]);
    }

    #[test]
    fn corrupt_image_is_export_error() {
        let bad = ImagePayload::new(b"not an image".to_vec(), "image/png");
        let err = package_image(&bad, 10, 10, 85).unwrap_err();
        assert!(matches!(err, RecomposeError::Export { .. }));
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(package_image(&png(2, 2), 0, 2, 85).is_err());
    }
}

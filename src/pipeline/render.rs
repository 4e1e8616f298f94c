//! PDF rasterisation: render the first page of a document via pdfium.
//!
//! pdfium is not safe to call from async contexts, so the whole render runs
//! on the blocking pool. Pages render at `render_scale` times their point size,
//! and `max_rendered_pixels` bounds the longest edge.

use crate::config::RecomposeConfig;
use crate::error::RecomposeError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rasterise page 1 of an in-memory PDF.
pub async fn render_first_page(
    document: Vec<u8>,
    config: &RecomposeConfig,
) -> Result<DynamicImage, RecomposeError> {
    let scale = config.render_scale;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let lib_path = config.resolved_pdfium_lib_path();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib_path.as_deref())?;
        render_first_page_blocking(&pdfium, &document, scale, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| RecomposeError::Internal(format!("Render task panicked: {e}")))?
}

/// Bind to an explicit pdfium library, or the system one.
///
/// `lib_path` may name the library file itself or the directory holding it.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, RecomposeError> {
    let bindings = match lib_path {
        Some(path) => {
            let file: PathBuf = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| RecomposeError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

fn render_first_page_blocking(
    pdfium: &Pdfium,
    bytes: &[u8],
    scale: f32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<DynamicImage, RecomposeError> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{e:?}");
            let detail = if err_str.to_ascii_lowercase().contains("password") {
                if password.is_some() {
                    "incorrect password".to_string()
                } else {
                    "document is encrypted".to_string()
                }
            } else {
                err_str
            };
            RecomposeError::Conversion { detail }
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages, rendering page 1", pages.len());

    if pages.len() == 0 {
        return Err(RecomposeError::Conversion {
            detail: "document has no pages".into(),
        });
    }

    let page = pages.get(0).map_err(|e| RecomposeError::Conversion {
        detail: format!("{e:?}"),
    })?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(pixel_cap(max_pixels))
        .set_maximum_height(pixel_cap(max_pixels));

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RecomposeError::Conversion {
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());
    Ok(image)
}

/// Edge limit in pdfium's signed pixel unit, saturating instead of wrapping.
fn pixel_cap(max_pixels: u32) -> i32 {
    i32::try_from(max_pixels).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_cap_saturates() {
        assert_eq!(pixel_cap(4096), 4096);
        assert_eq!(pixel_cap(i32::MAX as u32), i32::MAX);
        assert_eq!(pixel_cap(u32::MAX), i32::MAX);
    }
}

//! PDF rasterization collaborator: given a PDF path and DPI, yield page
//! images. This module defines the interface the orchestrator depends on
//! and, behind the `pdf` feature, one concrete implementation so the CLI is
//! runnable end to end.

use crate::error::Result;
use crate::types::PageImage;
use std::path::Path;

/// Renders each page of a PDF to an in-memory raster at the given DPI.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<PageImage>>;
}

#[cfg(feature = "pdf")]
pub use pdfium_backend::PdfiumRasterizer;

#[cfg(feature = "pdf")]
mod pdfium_backend {
    use super::*;
    use crate::error::ExamCutError;
    use pdfium_render::prelude::*;

    /// Renders pages with `pdfium-render`.
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        pub fn new() -> Result<Self> {
            let bindings = Pdfium::bind_to_system_library().or_else(|_| Pdfium::bind_to_statically_linked_library());
            let bindings = bindings.map_err(|e| ExamCutError::RasterizeFailed {
                message: "failed to load pdfium bindings".into(),
                source: Some(Box::new(e)),
            })?;
            Ok(Self { pdfium: Pdfium::new(bindings) })
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<PageImage>> {
            let document = self.pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| ExamCutError::RasterizeFailed {
                message: format!("failed to load PDF {}", pdf_path.display()),
                source: Some(Box::new(e)),
            })?;

            if document.pages().len() == 0 {
                return Err(ExamCutError::InvalidInput { message: "PDF has zero pages".into() });
            }

            let scale = dpi as f32 / 72.0;
            let mut pages = Vec::with_capacity(document.pages().len() as usize);
            for (index, page) in document.pages().iter().enumerate() {
                let config = PdfRenderConfig::new()
                    .set_target_width((page.width().value * scale) as i32)
                    .set_maximum_height((page.height().value * scale) as i32);
                let bitmap = page.render_with_config(&config).map_err(|e| ExamCutError::RasterizeFailed {
                    message: format!("failed to render page {index}"),
                    source: Some(Box::new(e)),
                })?;
                let image = bitmap.as_image();
                pages.push(PageImage::new(index as u32, image));
            }
            Ok(pages)
        }
    }
}

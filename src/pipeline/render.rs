//! Page compositing: rasterise every page and stack them into one image.
//!
//! The feedback model reads a résumé as a single picture, so the pages are
//! drawn top-to-bottom onto one white surface as wide as the widest page.
//! Narrower pages stay left-aligned; the white fill keeps the strip to their
//! right from coming out transparent.
//!
//! Rendering runs inside `spawn_blocking` because pdfium is CPU-bound and
//! not async-safe. Any page failure aborts the whole composite.
//!
//! ## Pixel cap
//!
//! A long document or an oversized page size multiplies out quickly: ten
//! A0 pages at scale 2.0 would need a 30 GiB RGBA surface. The layout is
//! checked against a total pixel budget ([`DEFAULT_MAX_PIXELS`] unless set
//! with [`PageCompositor::with_max_pixels`]) before anything is allocated.

use crate::error::ConversionError;
use crate::pipeline::engine::{EngineLoader, PageSource, RenderEngine, Viewport};
use crate::pipeline::input::Document;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::{debug, info};

/// Default viewport scale.
pub const DEFAULT_SCALE: f32 = 2.0;

/// Default cap on composite area: 100 Mpx, about 400 MB of RGBA.
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Where one page sits inside the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedPage {
    /// 0-based page index.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Top edge of the page in the composite.
    pub y_offset: u32,
}

/// All pages of a document stacked vertically on one bitmap.
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub image: RgbaImage,
    pub pages: Vec<RenderedPage>,
}

impl CompositeImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Surface size and page placements for a list of viewports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLayout {
    pub width: u32,
    pub height: u32,
    pub pages: Vec<RenderedPage>,
}

/// Place `viewports` top-to-bottom with no gap or overlap.
///
/// Width is the widest page, height the sum of all heights. Fails with
/// [`ConversionError::SurfaceTooLarge`] when the height does not fit in
/// `u32` or the area exceeds `max_pixels`.
pub fn stack_layout(
    viewports: &[Viewport],
    max_pixels: u64,
) -> Result<StackLayout, ConversionError> {
    let mut pages = Vec::with_capacity(viewports.len());
    let mut width = 0u64;
    let mut height = 0u64;

    for (index, vp) in viewports.iter().enumerate() {
        pages.push(RenderedPage {
            index,
            width: vp.width,
            height: vp.height,
            y_offset: height.min(u64::from(u32::MAX)) as u32,
        });
        width = width.max(u64::from(vp.width));
        height += u64::from(vp.height);
    }

    if height > u64::from(u32::MAX) || width.saturating_mul(height) > max_pixels {
        return Err(ConversionError::SurfaceTooLarge { width, height });
    }

    Ok(StackLayout {
        width: width as u32,
        height: height as u32,
        pages,
    })
}

/// Renders documents into composite images using a shared engine.
#[derive(Clone)]
pub struct PageCompositor {
    loader: Arc<EngineLoader>,
    max_pixels: u64,
}

impl PageCompositor {
    pub fn new(loader: Arc<EngineLoader>) -> Self {
        Self {
            loader,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// Cap the composite's area at `max_pixels` (width × height).
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    /// Render every page of `document` at `scale` and stack the results.
    pub async fn composite(
        &self,
        document: &Document,
        scale: f32,
    ) -> Result<CompositeImage, ConversionError> {
        let engine = self.loader.acquire().await?;
        let name = document.name.clone();
        let bytes = Arc::clone(&document.bytes);
        let max_pixels = self.max_pixels;

        let composite = tokio::task::spawn_blocking(move || {
            composite_blocking(engine.as_ref(), &name, &bytes, scale, max_pixels)
        })
        .await
        .map_err(|e| ConversionError::Internal(format!("Render task panicked: {e}")))??;

        info!(
            "Composited {} pages into {}x{} px",
            composite.pages.len(),
            composite.width(),
            composite.height()
        );
        Ok(composite)
    }
}

/// Blocking implementation of compositing.
pub fn composite_blocking(
    engine: &dyn RenderEngine,
    name: &str,
    bytes: &[u8],
    scale: f32,
    max_pixels: u64,
) -> Result<CompositeImage, ConversionError> {
    let mut output = None;

    engine.open_document(name, bytes, &mut |doc: &dyn PageSource| {
        let total = doc.page_count();
        if total == 0 {
            return Err(ConversionError::EmptyDocument {
                name: name.to_string(),
            });
        }
        debug!("PDF loaded: {} pages", total);

        let viewports = (0..total)
            .map(|i| doc.viewport(i, scale))
            .collect::<Result<Vec<_>, _>>()?;
        let layout = stack_layout(&viewports, max_pixels)?;

        let mut surface = RgbaImage::from_pixel(layout.width, layout.height, WHITE);
        for page in &layout.pages {
            doc.render_into(
                page.index,
                Viewport {
                    width: page.width,
                    height: page.height,
                },
                &mut surface,
                page.y_offset,
            )?;
        }

        output = Some(CompositeImage {
            image: surface,
            pages: layout.pages,
        });
        Ok(())
    })?;

    output.ok_or_else(|| ConversionError::Internal("engine did not open the document".into()))
}

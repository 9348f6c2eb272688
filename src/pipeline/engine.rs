//! The page-rendering engine and its one-time loader.
//!
//! [`RenderEngine`] is the narrow surface the compositor needs from a PDF
//! library: open a document, count its pages, size a page viewport at a
//! given scale, and draw a page into a shared surface. [`PdfiumEngine`] is
//! the production implementation.
//!
//! [`EngineLoader`] hands out one [`EngineHandle`] per process. The first
//! `acquire()` starts initialisation; callers that arrive while it is in
//! flight await the same [`Shared`] future instead of starting their own,
//! so binding runs once no matter how many runs start together. A failed
//! initialisation clears the pending slot and the next caller starts over.
//!
//! ## Why bind per document?
//!
//! `Pdfium` is not `Send`, so it cannot sit inside a handle shared across
//! Tokio tasks. The engine keeps only the resolved library path; each
//! document open binds again. The OS caches `dlopen`, so the repeat bind is
//! effectively free, and the loader has already proved the library loads.

use crate::config::EngineLocation;
use crate::error::{ConversionError, LoadError};
use futures::future::{BoxFuture, FutureExt, Shared};
use image::{imageops, RgbaImage};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Pixel size of one page at a given scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Size a page given in PDF points (1/72 in) at `scale` pixels per point.
    pub fn from_points(width_points: f32, height_points: f32, scale: f32) -> Self {
        Self {
            width: (width_points * scale).round().max(1.0) as u32,
            height: (height_points * scale).round().max(1.0) as u32,
        }
    }
}

/// An opened document, valid for the duration of
/// [`RenderEngine::open_document`]'s callback.
///
/// Page indices are 0-based.
pub trait PageSource {
    fn page_count(&self) -> usize;

    fn viewport(&self, index: usize, scale: f32) -> Result<Viewport, ConversionError>;

    /// Draw page `index` into `surface` with its top-left corner at
    /// `(0, y_offset)`, sized to `viewport`.
    fn render_into(
        &self,
        index: usize,
        viewport: Viewport,
        surface: &mut RgbaImage,
        y_offset: u32,
    ) -> Result<(), ConversionError>;
}

/// A PDF rendering backend.
///
/// Calls are blocking; the compositor runs them on the blocking pool.
pub trait RenderEngine: Send + Sync {
    /// Open `bytes` as a document named `name` and pass it to `f`.
    /// The document is closed when `f` returns.
    fn open_document(
        &self,
        name: &str,
        bytes: &[u8],
        f: &mut dyn FnMut(&dyn PageSource) -> Result<(), ConversionError>,
    ) -> Result<(), ConversionError>;
}

/// Shared, initialised engine.
pub type EngineHandle = Arc<dyn RenderEngine>;

// ── pdfium backend ───────────────────────────────────────────────────────

/// Platform file name of the pdfium shared library.
fn platform_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "pdfium.dll"
    } else if cfg!(target_os = "macos") {
        "libpdfium.dylib"
    } else {
        "libpdfium.so"
    }
}

/// [`RenderEngine`] backed by Google PDFium through `pdfium-render`.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    /// `None` means the system library search path.
    library: Option<PathBuf>,
}

impl PdfiumEngine {
    /// Resolve `location` and verify the library binds.
    pub fn bind(location: &EngineLocation) -> Result<Self, LoadError> {
        let library = match location {
            EngineLocation::System => None,
            EngineLocation::Directory(dir) => Some(dir.join(platform_library_name())),
        };
        let engine = Self { library };
        engine.pdfium()?;
        match &engine.library {
            Some(path) => info!("PDFium bound from {}", path.display()),
            None => info!("PDFium bound from system library"),
        }
        Ok(engine)
    }

    fn pdfium(&self) -> Result<Pdfium, LoadError> {
        let bindings = match &self.library {
            Some(path) => Pdfium::bind_to_library(path).map_err(|e| {
                LoadError::new(format!("cannot bind '{}': {e:?}", path.display()))
            })?,
            None => Pdfium::bind_to_system_library().map_err(|e| {
                LoadError::new(format!(
                    "PDFium library not found. Set PDFIUM_LIB_PATH or install PDFium: {e:?}"
                ))
            })?,
        };
        Ok(Pdfium::new(bindings))
    }
}

struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
}

impl PdfiumPages<'_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, ConversionError> {
        let total = self.page_count();
        let idx = u16::try_from(index)
            .map_err(|_| ConversionError::PageOutOfRange { page: index + 1, total })?;
        self.document
            .pages()
            .get(idx)
            .map_err(|_| ConversionError::PageOutOfRange { page: index + 1, total })
    }
}

impl PageSource for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn viewport(&self, index: usize, scale: f32) -> Result<Viewport, ConversionError> {
        let page = self.page(index)?;
        Ok(Viewport::from_points(
            page.width().value,
            page.height().value,
            scale,
        ))
    }

    fn render_into(
        &self,
        index: usize,
        viewport: Viewport,
        surface: &mut RgbaImage,
        y_offset: u32,
    ) -> Result<(), ConversionError> {
        let page = self.page(index)?;
        // Exact size on both axes: the next page starts at y_offset + height.
        let config = PdfRenderConfig::new()
            .set_target_size(viewport.width as i32, viewport.height as i32)
            .set_text_smoothing(true)
            .set_image_smoothing(true)
            .set_path_smoothing(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ConversionError::RenderFailed {
                page: index + 1,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image().to_rgba8();
        debug!(
            page = index + 1,
            width = image.width(),
            height = image.height(),
            y_offset,
            "Rendered page"
        );
        imageops::overlay(surface, &image, 0, i64::from(y_offset));
        Ok(())
    }
}

impl RenderEngine for PdfiumEngine {
    fn open_document(
        &self,
        name: &str,
        bytes: &[u8],
        f: &mut dyn FnMut(&dyn PageSource) -> Result<(), ConversionError>,
    ) -> Result<(), ConversionError> {
        let pdfium = self.pdfium()?;
        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            let detail = format!("{e:?}");
            let lower = detail.to_lowercase();
            if lower.contains("password") || lower.contains("encrypt") {
                ConversionError::PasswordRequired {
                    name: name.to_string(),
                }
            } else {
                ConversionError::OpenFailed {
                    name: name.to_string(),
                    detail,
                }
            }
        })?;
        // Named so it drops before `pdfium`, which the document borrows.
        let pages = PdfiumPages { document };
        f(&pages)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────

type InitFuture = BoxFuture<'static, Result<EngineHandle, LoadError>>;
type Initializer = dyn Fn() -> InitFuture + Send + Sync;

#[derive(Default)]
struct LoaderState {
    handle: Option<EngineHandle>,
    pending: Option<(u64, Shared<InitFuture>)>,
    generation: u64,
}

/// Lazily initialises the rendering engine once and shares it.
///
/// Construct one per process and inject it into
/// [`crate::pipeline::render::PageCompositor`].
pub struct EngineLoader {
    init: Box<Initializer>,
    state: Mutex<LoaderState>,
}

impl EngineLoader {
    /// Loader that binds pdfium from `location` on the blocking pool.
    pub fn pdfium(location: EngineLocation) -> Self {
        Self::with_initializer(move || {
            let location = location.clone();
            async move {
                tokio::task::spawn_blocking(move || PdfiumEngine::bind(&location))
                    .await
                    .map_err(|e| LoadError::new(format!("engine init task failed: {e}")))?
                    .map(|engine| Arc::new(engine) as EngineHandle)
            }
            .boxed()
        })
    }

    /// Loader with a custom initialisation routine.
    pub fn with_initializer<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<EngineHandle, LoadError>> + Send + 'static,
    {
        Self {
            init: Box::new(move || init().boxed()),
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// Loader that is already initialised with `handle`.
    pub fn ready(handle: EngineHandle) -> Self {
        let loader = Self::with_initializer(|| async {
            Err(LoadError::new("ready loader has no initializer"))
        });
        loader.lock().handle = Some(handle);
        loader
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        // The guarded state is always left consistent, so a poisoned lock is
        // still safe to use.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a handle is cached.
    pub fn is_loaded(&self) -> bool {
        self.lock().handle.is_some()
    }

    /// Return the engine, initialising it on first use.
    pub async fn acquire(&self) -> Result<EngineHandle, LoadError> {
        let (generation, pending) = {
            let mut state = self.lock();
            if let Some(handle) = &state.handle {
                return Ok(Arc::clone(handle));
            }
            match &state.pending {
                Some((generation, pending)) => (*generation, pending.clone()),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let pending = (self.init)().shared();
                    state.pending = Some((generation, pending.clone()));
                    debug!(generation, "Starting engine initialisation");
                    (generation, pending)
                }
            }
        };

        let result = pending.await;

        let mut state = self.lock();
        let current = matches!(&state.pending, Some((g, _)) if *g == generation);
        match &result {
            Ok(handle) => {
                if state.handle.is_none() {
                    state.handle = Some(Arc::clone(handle));
                }
                if current {
                    state.pending = None;
                }
            }
            Err(e) => {
                if current {
                    warn!("Engine initialisation failed: {e}");
                    state.pending = None;
                }
            }
        }
        result
    }
}

use std::env;
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use docview_core::{
    DocumentHandle, DocumentSource, FrameCache, LoadError, RenderError, RenderRequest,
    RenderedFrame, ViewerConfig,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{info, instrument, warn};

use crate::locator::{fetch_document, Fetcher};

const LIBRARY_PATH_ENV: &str = "DOCVIEW_PDFIUM_LIBRARY_PATH";

pub struct PdfiumSource {
    pdfium: Arc<Pdfium>,
    fetcher: Arc<Fetcher>,
    cache_capacity: usize,
}

impl PdfiumSource {
    pub fn new(config: &ViewerConfig) -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
            fetcher: Arc::new(Fetcher::new(config.fetch_timeout)),
            cache_capacity: config.cache_capacity,
        })
    }
}

#[async_trait]
impl DocumentSource for PdfiumSource {
    #[instrument(skip(self))]
    async fn open(&self, locator: &str) -> Result<Arc<dyn DocumentHandle>, LoadError> {
        let bytes = fetch_document(Arc::clone(&self.fetcher), locator).await?;
        let pdfium = Arc::clone(&self.pdfium);
        let cache_capacity = self.cache_capacity;

        let document = tokio::task::spawn_blocking(move || {
            PdfiumDocument::load(pdfium, bytes, cache_capacity)
        })
        .await
        .map_err(|err| LoadError::new(locator, err))?
        .map_err(|err| LoadError::new(locator, err))?;

        info!(pages = document.page_count(), "document opened");
        Ok(Arc::new(document))
    }
}

pub struct PdfiumDocument {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    // Declared before `_pdfium` so the document is dropped first.
    document: Mutex<PdfDocument<'static>>,
    page_count: u32,
    cache: FrameCache,
    _pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn load(pdfium: Arc<Pdfium>, bytes: Vec<u8>, cache_capacity: usize) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .context("failed to parse document")?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. Both end
        // up in the same `DocumentInner`, where `document` is declared (and so
        // dropped) before `_pdfium`, keeping the bindings alive for as long as
        // the document exists.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let page_count = u32::try_from(document.pages().len()).unwrap_or_default();

        Ok(Self {
            inner: Arc::new(DocumentInner {
                document: Mutex::new(document),
                page_count,
                cache: FrameCache::new(cache_capacity),
                _pdfium: pdfium,
            }),
        })
    }
}

#[async_trait]
impl DocumentHandle for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.inner.page_count
    }

    #[instrument(skip(self))]
    async fn render_page(&self, request: RenderRequest) -> Result<RenderedFrame, RenderError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.render(&request))
            .await
            .map_err(|err| RenderError::new(request, err))?
            .map_err(|err| RenderError::new(request, err))
    }
}

impl DocumentInner {
    fn render(&self, request: &RenderRequest) -> Result<RenderedFrame> {
        if let Some(frame) = self.cache.get(request) {
            return Ok(frame);
        }

        let frame = {
            let document = self.document.lock();
            let page_index: PdfPageIndex = request
                .page
                .checked_sub(1)
                .and_then(|index| index.try_into().ok())
                .ok_or_else(|| anyhow!("page {} is out of supported range", request.page))?;
            let page = document
                .pages()
                .get(page_index)
                .with_context(|| format!("page {} out of range", request.page))?;

            let target_width = i32::try_from(request.target_width()).unwrap_or(i32::MAX);
            let config = PdfRenderConfig::new()
                .set_target_width(target_width)
                .rotate(render_rotation(request.visual_rotation()), false);
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page))?;
            let image: image::RgbaImage = bitmap.as_image().to_rgba8();
            RenderedFrame {
                width: image.width(),
                height: image.height(),
                pixels: image.into_raw(),
            }
        };

        self.cache.insert(request, &frame);
        Ok(frame)
    }
}

fn render_rotation(degrees: u32) -> PdfPageRenderRotation {
    match degrees % 360 {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = env::var_os(LIBRARY_PATH_ENV)?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from {}={:?}: {}",
                LIBRARY_PATH_ENV, path, err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}

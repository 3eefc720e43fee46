//! Inline and fullscreen viewport hosts.
//!
//! Each host owns its own [`ViewportState`] and surfaces; the two never share
//! or synchronise state, only the underlying document handle.

use std::sync::Arc;

use tracing::{debug, info};

use crate::surface::{RenderSurface, RenderTicket, RequestId, SurfaceView};
use crate::validator::PageInput;
use crate::viewport::ViewportState;
use crate::{
    DocumentHandle, HandleLease, PageInputError, RenderRequest, RenderedFrame, ZoomLevel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Inline,
    Fullscreen,
}

#[derive(Debug, Default)]
pub enum DocumentSlot {
    #[default]
    Opening,
    Ready(HandleLease),
    Failed,
}

impl DocumentSlot {
    pub fn handle(&self) -> Option<Arc<dyn DocumentHandle>> {
        match self {
            DocumentSlot::Ready(lease) => Some(lease.handle()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DocumentSlot::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DocumentSlot::Failed)
    }
}

/// The always-mounted viewer: one page at a time with page field, zoom menu
/// and rotation.
#[derive(Debug, Default)]
pub struct InlineHost {
    state: ViewportState,
    input: PageInput,
    surface: RenderSurface,
    document: DocumentSlot,
}

impl InlineHost {
    pub fn new(state: ViewportState) -> Self {
        let mut input = PageInput::default();
        input.sync_to(state.current_page());
        Self {
            state,
            input,
            surface: RenderSurface::new(),
            document: DocumentSlot::Opening,
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn page_input(&self) -> &PageInput {
        &self.input
    }

    pub fn document(&self) -> &DocumentSlot {
        &self.document
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn document_loaded(&mut self, lease: HandleLease) {
        let total = lease.page_count();
        info!(total, "inline host loaded document");
        self.state.set_total_pages(total);
        self.input.sync_to(self.state.current_page());
        self.document = DocumentSlot::Ready(lease);
    }

    pub fn document_failed(&mut self) {
        self.document = DocumentSlot::Failed;
    }

    /// Forgets the document and all frames, keeping page, scale and rotation.
    pub fn remount(&mut self) {
        self.document = DocumentSlot::Opening;
        self.surface = RenderSurface::new();
        let width = self.state.measured_width();
        self.state = ViewportState::restore(&self.state.persisted(), self.state.scale());
        if let Some(width) = width {
            self.state.set_measured_width(width);
        }
    }

    pub fn previous_page(&mut self) -> bool {
        let changed = self.state.previous_page();
        if changed {
            self.input.sync_to(self.state.current_page());
        }
        changed
    }

    pub fn next_page(&mut self) -> bool {
        let changed = self.state.next_page();
        if changed {
            self.input.sync_to(self.state.current_page());
        }
        changed
    }

    pub fn edit_page_input(&mut self, edit: impl FnOnce(&mut PageInput)) {
        edit(&mut self.input);
    }

    pub fn submit_page_input(&mut self) -> Result<bool, PageInputError> {
        let page = self.input.submit(self.state.total_pages())?;
        Ok(self.state.go_to_page(page))
    }

    pub fn set_scale(&mut self, scale: ZoomLevel) -> bool {
        self.state.set_scale(scale)
    }

    pub fn rotate(&mut self) {
        self.state.rotate();
    }

    pub fn resize(&mut self, width: f32) -> bool {
        self.state.set_measured_width(width)
    }

    /// Ticket for the live request, if one has to be rendered.
    pub fn render_ticket(&mut self) -> Option<RenderTicket> {
        if !self.document.is_ready() || self.state.total_pages() == Some(0) {
            return None;
        }
        self.surface.sync(self.state.render_request())
    }

    pub fn complete(&mut self, id: RequestId, frame: RenderedFrame) -> bool {
        let Some(request) = self.surface.complete(id, frame) else {
            return false;
        };
        match ZoomLevel::from_factor(request.scale) {
            Some(scale) => self.state.commit_render(scale),
            None => debug!(scale = request.scale, "committed frame has no menu scale"),
        }
        true
    }

    pub fn fail(&mut self, id: RequestId) -> Option<RenderRequest> {
        self.surface.fail(id)
    }

    pub fn view(&self) -> SurfaceView<'_> {
        if !self.document.is_ready() {
            return SurfaceView::Loading;
        }
        if self.state.total_pages() == Some(0) {
            return SurfaceView::Empty;
        }
        self.surface
            .view(self.state.render_request(), self.state.is_transitioning())
    }
}

/// The overlay viewer: every page in a column, sized to the overlay width.
///
/// `current_page` is the scroll position within the column. The host starts
/// at page 1 on every mount and is dropped when the overlay closes.
#[derive(Debug, Default)]
pub struct FullscreenHost {
    state: ViewportState,
    document: DocumentSlot,
    pages: Vec<RenderSurface>,
}

impl FullscreenHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn document(&self) -> &DocumentSlot {
        &self.document
    }

    pub fn document_loaded(&mut self, lease: HandleLease) {
        let total = lease.page_count();
        info!(total, "fullscreen host loaded document");
        self.state.set_total_pages(total);
        self.pages = (0..total).map(|_| RenderSurface::new()).collect();
        self.document = DocumentSlot::Ready(lease);
    }

    pub fn document_failed(&mut self) {
        self.document = DocumentSlot::Failed;
    }

    pub fn previous_page(&mut self) -> bool {
        self.state.previous_page()
    }

    pub fn next_page(&mut self) -> bool {
        self.state.next_page()
    }

    pub fn resize(&mut self, width: f32) -> bool {
        self.state.set_measured_width(width)
    }

    /// Request for page `page` (1-based) of the column.
    pub fn page_request(&self, page: u32) -> RenderRequest {
        column_request(page, self.state.render_width())
    }

    /// Tickets for every page whose live request is not committed or pending,
    /// paired with the page's slot index.
    pub fn render_tickets(&mut self) -> Vec<(usize, RenderTicket)> {
        if !self.document.is_ready() {
            return Vec::new();
        }
        let width = self.state.render_width();
        self.pages
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, surface)| {
                let request = column_request(slot as u32 + 1, width);
                surface.sync(request).map(|ticket| (slot, ticket))
            })
            .collect()
    }

    pub fn complete(&mut self, slot: usize, id: RequestId, frame: RenderedFrame) -> bool {
        match self.pages.get_mut(slot) {
            Some(surface) => surface.complete(id, frame).is_some(),
            None => false,
        }
    }

    pub fn fail(&mut self, slot: usize, id: RequestId) -> Option<RenderRequest> {
        self.pages.get_mut(slot).and_then(|surface| surface.fail(id))
    }

    pub fn page_view(&self, page: u32) -> SurfaceView<'_> {
        if !self.document.is_ready() {
            return SurfaceView::Loading;
        }
        if self.pages.is_empty() {
            return SurfaceView::Empty;
        }
        let slot = page.saturating_sub(1) as usize;
        match self.pages.get(slot) {
            Some(surface) => surface.view(self.page_request(page), true),
            None => SurfaceView::Loading,
        }
    }

    /// Views for every page in column order.
    pub fn column(&self) -> Vec<SurfaceView<'_>> {
        (1..=self.pages.len() as u32)
            .map(|page| self.page_view(page))
            .collect()
    }

    pub fn view(&self) -> SurfaceView<'_> {
        self.page_view(self.state.current_page())
    }
}

fn column_request(page: u32, width: f32) -> RenderRequest {
    RenderRequest {
        page,
        width,
        scale: ZoomLevel::Actual.factor(),
        rotation: 0,
    }
}

use tracing::debug;

use crate::{PersistedViewportState, RenderRequest, ZoomLevel};

/// Width used for render requests before the container has been measured.
pub const FALLBACK_WIDTH: f32 = 1.0;

/// Page position, zoom, rotation and render status of a single host.
///
/// Every mutator returns whether the state actually changed so callers can
/// skip redraws and render requests for disabled actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    current_page: u32,
    total_pages: Option<u32>,
    scale: ZoomLevel,
    rotation: u32,
    rendered_scale: Option<ZoomLevel>,
    measured_width: Option<f32>,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(ZoomLevel::default())
    }
}

impl ViewportState {
    pub fn new(scale: ZoomLevel) -> Self {
        Self {
            current_page: 1,
            total_pages: None,
            scale,
            rotation: 0,
            rendered_scale: None,
            measured_width: None,
        }
    }

    /// Rebuilds a viewport from persisted values. Unknown scales fall back to
    /// `default_scale`; the page is clamped once the page count arrives.
    pub fn restore(persisted: &PersistedViewportState, default_scale: ZoomLevel) -> Self {
        let scale = ZoomLevel::from_factor(persisted.scale).unwrap_or(default_scale);
        Self {
            current_page: persisted.current_page.max(1),
            rotation: persisted.rotation,
            ..Self::new(scale)
        }
    }

    pub fn persisted(&self) -> PersistedViewportState {
        PersistedViewportState {
            current_page: self.current_page,
            scale: self.scale.factor(),
            rotation: self.rotation,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Page count for display; `x` until the document has loaded.
    pub fn total_label(&self) -> String {
        self.total_pages
            .map(|total| total.to_string())
            .unwrap_or_else(|| "x".to_owned())
    }

    pub fn scale(&self) -> ZoomLevel {
        self.scale
    }

    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    pub fn visual_rotation(&self) -> u32 {
        self.rotation % 360
    }

    pub fn rendered_scale(&self) -> Option<ZoomLevel> {
        self.rendered_scale
    }

    pub fn measured_width(&self) -> Option<f32> {
        self.measured_width
    }

    pub fn render_width(&self) -> f32 {
        self.measured_width.unwrap_or(FALLBACK_WIDTH)
    }

    /// True until a frame for the current scale has been committed.
    pub fn is_transitioning(&self) -> bool {
        self.rendered_scale != Some(self.scale)
    }

    pub fn can_go_previous(&self) -> bool {
        self.current_page > 1
    }

    /// An unknown page count cannot prove the next page exists.
    pub fn can_go_next(&self) -> bool {
        matches!(self.total_pages, Some(total) if self.current_page < total)
    }

    pub fn render_request(&self) -> RenderRequest {
        RenderRequest {
            page: self.current_page,
            width: self.render_width(),
            scale: self.scale.factor(),
            rotation: self.rotation,
        }
    }

    pub fn set_total_pages(&mut self, total: u32) {
        self.total_pages = Some(total);
        let clamped = self.current_page.clamp(1, total.max(1));
        if clamped != self.current_page {
            debug!(
                from = self.current_page,
                to = clamped,
                total,
                "clamping page into loaded document"
            );
            self.current_page = clamped;
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.can_go_previous() {
            return false;
        }
        self.current_page = self.current_page.saturating_sub(1).max(1);
        true
    }

    pub fn next_page(&mut self) -> bool {
        let Some(total) = self.total_pages else {
            return false;
        };
        if self.current_page >= total {
            return false;
        }
        self.current_page = (self.current_page + 1).min(total);
        true
    }

    /// Commits a page that already passed validation.
    pub fn go_to_page(&mut self, page: u32) -> bool {
        let page = match self.total_pages {
            Some(total) => page.clamp(1, total.max(1)),
            None => page.max(1),
        };
        if page == self.current_page {
            return false;
        }
        self.current_page = page;
        true
    }

    /// Leaves `rendered_scale` alone, so the view becomes transitioning.
    pub fn set_scale(&mut self, scale: ZoomLevel) -> bool {
        if scale == self.scale {
            return false;
        }
        self.scale = scale;
        true
    }

    pub fn rotate(&mut self) {
        self.rotation = self.rotation.saturating_add(90);
    }

    pub fn commit_render(&mut self, scale: ZoomLevel) {
        self.rendered_scale = Some(scale);
    }

    pub fn set_measured_width(&mut self, width: f32) -> bool {
        if !width.is_finite() || width <= 0.0 {
            return false;
        }
        if self.measured_width == Some(width) {
            return false;
        }
        self.measured_width = Some(width);
        true
    }
}

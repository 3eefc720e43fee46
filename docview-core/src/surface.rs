//! Two-slot render buffer.
//!
//! A surface holds the last committed frame and at most one pending request.
//! Each request is tagged with an id from a monotonically increasing counter;
//! a completion is only accepted when its id matches the pending ticket, so
//! superseded renders are dropped on arrival instead of being cancelled.

use std::sync::Arc;

use tracing::debug;

use crate::{RenderRequest, RenderedFrame};

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTicket {
    pub id: RequestId,
    pub request: RenderRequest,
}

#[derive(Debug, Clone)]
struct CommittedFrame {
    request: RenderRequest,
    frame: Arc<RenderedFrame>,
}

/// What a surface shows at this instant.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceView<'a> {
    /// The document handle has not resolved yet.
    Loading,
    /// The document loaded but has no pages to draw.
    Empty,
    /// The previous frame stays on screen while `pending` renders hidden.
    Transition {
        visible: &'a RenderedFrame,
        pending: RenderRequest,
    },
    Ready(&'a RenderedFrame),
    /// Nothing to show for the live request yet; a placeholder is drawn.
    Rendering(RenderRequest),
    Failed(RenderRequest),
}

impl<'a> SurfaceView<'a> {
    pub fn frame(&self) -> Option<&'a RenderedFrame> {
        match self {
            SurfaceView::Transition { visible, .. } => Some(*visible),
            SurfaceView::Ready(frame) => Some(*frame),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, SurfaceView::Loading | SurfaceView::Rendering(_))
    }
}

#[derive(Debug, Default)]
pub struct RenderSurface {
    last_id: RequestId,
    committed: Option<CommittedFrame>,
    pending: Option<RenderTicket>,
    failed: Option<RenderRequest>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&RenderTicket> {
        self.pending.as_ref()
    }

    pub fn committed_request(&self) -> Option<RenderRequest> {
        self.committed.as_ref().map(|c| c.request)
    }

    pub fn committed_frame(&self) -> Option<&RenderedFrame> {
        self.committed.as_ref().map(|c| c.frame.as_ref())
    }

    /// Reconciles the surface with the live request. Returns a ticket when a
    /// new render has to be started.
    pub fn sync(&mut self, request: RenderRequest) -> Option<RenderTicket> {
        if self.failed == Some(request) {
            return None;
        }
        self.failed = None;

        if self.committed_request() == Some(request) {
            if let Some(superseded) = self.pending.take() {
                debug!(id = superseded.id, "live request already committed");
            }
            return None;
        }
        if matches!(self.pending, Some(ticket) if ticket.request == request) {
            return None;
        }

        self.last_id += 1;
        let ticket = RenderTicket {
            id: self.last_id,
            request,
        };
        self.pending = Some(ticket);
        Some(ticket)
    }

    /// Accepts a frame for the pending ticket and returns the request it was
    /// rendered for. Frames for any other id are stale and dropped.
    pub fn complete(&mut self, id: RequestId, frame: RenderedFrame) -> Option<RenderRequest> {
        match self.pending {
            Some(ticket) if ticket.id == id => {
                self.pending = None;
                self.committed = Some(CommittedFrame {
                    request: ticket.request,
                    frame: Arc::new(frame),
                });
                Some(ticket.request)
            }
            _ => {
                debug!(
                    id,
                    pending = self.pending.map(|t| t.id),
                    "discarding stale frame"
                );
                None
            }
        }
    }

    /// Marks the pending ticket as failed. Failed requests are not retried
    /// until the live request changes.
    pub fn fail(&mut self, id: RequestId) -> Option<RenderRequest> {
        match self.pending {
            Some(ticket) if ticket.id == id => {
                self.pending = None;
                self.failed = Some(ticket.request);
                Some(ticket.request)
            }
            _ => {
                debug!(id, "discarding stale render failure");
                None
            }
        }
    }

    /// `hold_previous` keeps the committed frame on screen while the live
    /// request differs from it.
    pub fn view(&self, live: RenderRequest, hold_previous: bool) -> SurfaceView<'_> {
        if self.failed == Some(live) {
            return SurfaceView::Failed(live);
        }
        match &self.committed {
            Some(committed) if committed.request == live => {
                SurfaceView::Ready(committed.frame.as_ref())
            }
            Some(committed) if hold_previous => SurfaceView::Transition {
                visible: committed.frame.as_ref(),
                pending: live,
            },
            _ => SurfaceView::Rendering(live),
        }
    }
}

//! Asynchronous side of the viewer.
//!
//! The [`Viewer`](crate::Viewer) never awaits anything itself. It hands out
//! [`Effect`]s, the [`Dispatcher`] runs each one as a fire-and-forget tokio
//! task, and the outcome comes back as a [`Completion`] on a channel drained
//! by the event loop.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::host::HostKind;
use crate::surface::{RenderTicket, RequestId};
use crate::{DocumentHandle, DocumentSource, LoadError, RenderError, RenderedFrame};

/// Identifies the surface a render belongs to: a host mount and, for the
/// fullscreen column, the page slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    pub host: HostKind,
    pub generation: u64,
    pub slot: usize,
}

pub enum Effect {
    Open {
        host: HostKind,
        generation: u64,
        locator: String,
    },
    Render {
        target: RenderTarget,
        ticket: RenderTicket,
        handle: Arc<dyn DocumentHandle>,
    },
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Open {
                host,
                generation,
                locator,
            } => f
                .debug_struct("Open")
                .field("host", host)
                .field("generation", generation)
                .field("locator", locator)
                .finish(),
            Effect::Render { target, ticket, .. } => f
                .debug_struct("Render")
                .field("target", target)
                .field("ticket", ticket)
                .finish(),
        }
    }
}

pub enum Completion {
    Opened {
        host: HostKind,
        generation: u64,
        result: Result<Arc<dyn DocumentHandle>, LoadError>,
    },
    Rendered {
        target: RenderTarget,
        id: RequestId,
        result: Result<RenderedFrame, RenderError>,
    },
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Opened {
                host,
                generation,
                result,
            } => f
                .debug_struct("Opened")
                .field("host", host)
                .field("generation", generation)
                .field("ok", &result.is_ok())
                .finish(),
            Completion::Rendered { target, id, result } => f
                .debug_struct("Rendered")
                .field("target", target)
                .field("id", id)
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

pub struct Dispatcher {
    source: Arc<dyn DocumentSource>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn DocumentSource>) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source,
                completions: tx,
            },
            rx,
        )
    }

    /// Spawns every effect. Must be called from within a tokio runtime.
    pub fn dispatch(&self, effects: impl IntoIterator<Item = Effect>) {
        for effect in effects {
            self.spawn(effect);
        }
    }

    fn spawn(&self, effect: Effect) {
        debug!(?effect, "dispatching effect");
        let completions = self.completions.clone();
        match effect {
            Effect::Open {
                host,
                generation,
                locator,
            } => {
                let source = Arc::clone(&self.source);
                tokio::spawn(async move {
                    let result = open_document(source.as_ref(), &locator).await;
                    if completions
                        .send(Completion::Opened {
                            host,
                            generation,
                            result,
                        })
                        .is_err()
                    {
                        debug!(?host, "viewer gone before document opened");
                    }
                });
            }
            Effect::Render {
                target,
                ticket,
                handle,
            } => {
                tokio::spawn(async move {
                    let result = handle.render_page(ticket.request).await;
                    if let Err(err) = &result {
                        warn!(?err, page = ticket.request.page, "page render failed");
                    }
                    if completions
                        .send(Completion::Rendered {
                            target,
                            id: ticket.id,
                            result,
                        })
                        .is_err()
                    {
                        debug!(?target, "viewer gone before frame arrived");
                    }
                });
            }
        }
    }
}

#[instrument(skip(source))]
async fn open_document(
    source: &dyn DocumentSource,
    locator: &str,
) -> Result<Arc<dyn DocumentHandle>, LoadError> {
    let result = source.open(locator).await;
    if let Err(err) = &result {
        warn!(?err, "document failed to open");
    }
    result
}

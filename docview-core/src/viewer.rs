use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dispatch::{Completion, Effect, RenderTarget};
use crate::host::{FullscreenHost, HostKind, InlineHost};
use crate::registry::{HandleLease, HandleRegistry};
use crate::surface::SurfaceView;
use crate::validator::PageInput;
use crate::viewport::ViewportState;
use crate::{document_id_for_locator, DocumentHandle, DocumentId, StateStore, ViewerConfig, ZoomLevel};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PreviousPage,
    NextPage,
    SetPageInput { text: String },
    PushPageInput { c: char },
    PopPageInput,
    SubmitPageInput,
    SetScale { zoom: ZoomLevel },
    Rotate,
    Resize { host: HostKind, width: f32 },
    OpenFullscreen,
    CloseFullscreen,
    DismissNotification,
    Reload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    DocumentOpened(HostKind),
    DocumentFailed(HostKind),
    FullscreenOpened,
    FullscreenClosed,
    RedrawNeeded(HostKind),
}

/// A dismissible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn load_failed() -> Self {
        Self {
            title: "Error loading document".to_owned(),
            description: "Please try again later".to_owned(),
        }
    }
}

struct Mount<H> {
    generation: u64,
    host: H,
}

/// Inline host plus the lazily mounted fullscreen overlay for one locator.
///
/// Commands go to the overlay while it is open and to the inline host
/// otherwise. Every mutation returns the [`Effect`]s needed to bring the
/// affected host's surfaces up to date.
pub struct Viewer {
    locator: String,
    document_id: DocumentId,
    default_scale: ZoomLevel,
    registry: Arc<HandleRegistry>,
    store: Option<Arc<dyn StateStore>>,
    next_generation: u64,
    inline: Mount<InlineHost>,
    fullscreen: Option<Mount<FullscreenHost>>,
    notifications: VecDeque<Notification>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Viewer {
    pub fn new(
        locator: impl Into<String>,
        config: &ViewerConfig,
        store: Option<Arc<dyn StateStore>>,
    ) -> Self {
        let locator = locator.into();
        let document_id = document_id_for_locator(&locator);
        let default_scale = config.default_scale;
        let store = store.filter(|_| config.remember_position);

        let state = match store.as_ref().map(|s| s.load(document_id)) {
            Some(Ok(Some(persisted))) => ViewportState::restore(&persisted, default_scale),
            Some(Err(err)) => {
                warn!(?err, %locator, "failed to restore viewport state");
                ViewportState::new(default_scale)
            }
            _ => ViewportState::new(default_scale),
        };

        Self {
            locator,
            document_id,
            default_scale,
            registry: HandleRegistry::new(),
            store,
            next_generation: 1,
            inline: Mount {
                generation: 0,
                host: InlineHost::new(state),
            },
            fullscreen: None,
            notifications: VecDeque::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn inline(&self) -> &InlineHost {
        &self.inline.host
    }

    pub fn fullscreen(&self) -> Option<&FullscreenHost> {
        self.fullscreen.as_ref().map(|mount| &mount.host)
    }

    pub fn focused(&self) -> HostKind {
        if self.fullscreen.is_some() {
            HostKind::Fullscreen
        } else {
            HostKind::Inline
        }
    }

    pub fn focused_view(&self) -> SurfaceView<'_> {
        match &self.fullscreen {
            Some(mount) => mount.host.view(),
            None => self.inline.host.view(),
        }
    }

    pub fn page_input(&self) -> &PageInput {
        self.inline.host.page_input()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    /// Mounts the inline host. Call once after construction.
    pub fn mount(&mut self) -> Vec<Effect> {
        let generation = self.bump_generation();
        self.inline.generation = generation;
        info!(locator = %self.locator, generation, "mounting inline host");
        match self.registry.acquire(&self.locator) {
            Some(lease) => {
                self.inline.host.document_loaded(lease);
                self.inline_effects()
            }
            None => vec![self.open_effect(HostKind::Inline, generation)],
        }
    }

    pub fn apply(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::OpenFullscreen => self.open_fullscreen(),
            Command::CloseFullscreen => {
                self.close_fullscreen();
                Vec::new()
            }
            Command::DismissNotification => {
                if self.notifications.pop_front().is_some() {
                    self.redraw(self.focused());
                }
                Vec::new()
            }
            Command::Reload => self.reload(),
            Command::Resize { host, width } => self.resize(host, width),
            command if self.fullscreen.is_some() => self.apply_fullscreen(command),
            command => self.apply_inline(command),
        }
    }

    fn apply_inline(&mut self, command: Command) -> Vec<Effect> {
        let host = &mut self.inline.host;
        let changed = match command {
            Command::PreviousPage => host.previous_page(),
            Command::NextPage => host.next_page(),
            Command::SetPageInput { text } => {
                host.edit_page_input(|input| input.set_text(text));
                true
            }
            Command::PushPageInput { c } => {
                host.edit_page_input(|input| input.push(c));
                true
            }
            Command::PopPageInput => {
                host.edit_page_input(PageInput::pop);
                true
            }
            Command::SubmitPageInput => {
                // The field error is shown either way, so always redraw.
                if let Err(err) = host.submit_page_input() {
                    debug!(%err, "page field rejected");
                }
                true
            }
            Command::SetScale { zoom } => host.set_scale(zoom),
            Command::Rotate => {
                host.rotate();
                true
            }
            _ => false,
        };
        if changed {
            self.redraw(HostKind::Inline);
        }
        self.inline_effects()
    }

    fn apply_fullscreen(&mut self, command: Command) -> Vec<Effect> {
        let Some(mount) = self.fullscreen.as_mut() else {
            return Vec::new();
        };
        let changed = match command {
            Command::PreviousPage => mount.host.previous_page(),
            Command::NextPage => mount.host.next_page(),
            other => {
                debug!(?other, "command not available in fullscreen");
                false
            }
        };
        if changed {
            self.redraw(HostKind::Fullscreen);
        }
        self.fullscreen_effects()
    }

    fn resize(&mut self, host: HostKind, width: f32) -> Vec<Effect> {
        match host {
            HostKind::Inline => {
                if self.inline.host.resize(width) {
                    self.redraw(HostKind::Inline);
                }
                self.inline_effects()
            }
            HostKind::Fullscreen => {
                let resized = match self.fullscreen.as_mut() {
                    Some(mount) => mount.host.resize(width),
                    None => return Vec::new(),
                };
                if resized {
                    self.redraw(HostKind::Fullscreen);
                }
                self.fullscreen_effects()
            }
        }
    }

    fn open_fullscreen(&mut self) -> Vec<Effect> {
        if self.fullscreen.is_some() {
            return Vec::new();
        }
        let generation = self.bump_generation();
        info!(generation, "opening fullscreen overlay");
        self.fullscreen = Some(Mount {
            generation,
            host: FullscreenHost::new(),
        });
        self.push_event(ViewerEvent::FullscreenOpened);
        self.redraw(HostKind::Fullscreen);

        match self.registry.acquire(&self.locator) {
            Some(lease) => {
                if let Some(mount) = self.fullscreen.as_mut() {
                    mount.host.document_loaded(lease);
                }
                self.fullscreen_effects()
            }
            None => vec![self.open_effect(HostKind::Fullscreen, generation)],
        }
    }

    fn close_fullscreen(&mut self) {
        if self.fullscreen.take().is_some() {
            info!("closed fullscreen overlay");
            self.push_event(ViewerEvent::FullscreenClosed);
            self.redraw(HostKind::Inline);
        }
    }

    /// Drops the inline handle and frames and opens the locator again.
    fn reload(&mut self) -> Vec<Effect> {
        if !self.inline.host.document().is_failed() {
            return Vec::new();
        }
        self.inline.host.remount();
        self.redraw(HostKind::Inline);
        self.mount()
    }

    pub fn complete(&mut self, completion: Completion) -> Vec<Effect> {
        match completion {
            Completion::Opened {
                host,
                generation,
                result,
            } => self.complete_open(host, generation, result),
            Completion::Rendered { target, id, result } => {
                if !self.is_live(target.host, target.generation) {
                    debug!(?target, id, "frame for unmounted host");
                    return Vec::new();
                }
                match result {
                    Ok(frame) => {
                        let committed = match target.host {
                            HostKind::Inline => self.inline.host.complete(id, frame),
                            HostKind::Fullscreen => self
                                .fullscreen
                                .as_mut()
                                .map(|m| m.host.complete(target.slot, id, frame))
                                .unwrap_or(false),
                        };
                        if committed {
                            self.redraw(target.host);
                        }
                    }
                    Err(err) => {
                        let failed = match target.host {
                            HostKind::Inline => self.inline.host.fail(id),
                            HostKind::Fullscreen => self
                                .fullscreen
                                .as_mut()
                                .and_then(|m| m.host.fail(target.slot, id)),
                        };
                        if failed.is_some() {
                            warn!(?err, ?target, "render failed");
                            self.notify(Notification::load_failed());
                            self.redraw(target.host);
                        }
                    }
                }
                Vec::new()
            }
        }
    }

    fn complete_open(
        &mut self,
        host: HostKind,
        generation: u64,
        result: Result<Arc<dyn DocumentHandle>, crate::LoadError>,
    ) -> Vec<Effect> {
        if !self.is_live(host, generation) {
            debug!(?host, generation, "document opened for unmounted host");
            return Vec::new();
        }
        match result {
            Ok(handle) => {
                let lease = self.registry.insert(&self.locator, handle);
                self.push_event(ViewerEvent::DocumentOpened(host));
                self.redraw(host);
                self.attach(host, lease)
            }
            Err(err) => {
                warn!(?err, ?host, "document failed to load");
                match host {
                    HostKind::Inline => self.inline.host.document_failed(),
                    HostKind::Fullscreen => {
                        if let Some(mount) = self.fullscreen.as_mut() {
                            mount.host.document_failed();
                        }
                    }
                }
                self.notify(Notification::load_failed());
                self.push_event(ViewerEvent::DocumentFailed(host));
                self.redraw(host);
                Vec::new()
            }
        }
    }

    fn attach(&mut self, host: HostKind, lease: HandleLease) -> Vec<Effect> {
        match host {
            HostKind::Inline => {
                self.inline.host.document_loaded(lease);
                self.inline_effects()
            }
            HostKind::Fullscreen => {
                if let Some(mount) = self.fullscreen.as_mut() {
                    mount.host.document_loaded(lease);
                }
                self.fullscreen_effects()
            }
        }
    }

    /// Saves the inline position. The overlay is never persisted.
    pub fn persist(&self) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(self.document_id, &self.inline.host.state().persisted())?;
        }
        Ok(())
    }

    fn inline_effects(&mut self) -> Vec<Effect> {
        let Some(handle) = self.inline.host.document().handle() else {
            return Vec::new();
        };
        let target = RenderTarget {
            host: HostKind::Inline,
            generation: self.inline.generation,
            slot: 0,
        };
        self.inline
            .host
            .render_ticket()
            .map(|ticket| Effect::Render {
                target,
                ticket,
                handle,
            })
            .into_iter()
            .collect()
    }

    fn fullscreen_effects(&mut self) -> Vec<Effect> {
        let Some(mount) = self.fullscreen.as_mut() else {
            return Vec::new();
        };
        let Some(handle) = mount.host.document().handle() else {
            return Vec::new();
        };
        let generation = mount.generation;
        mount
            .host
            .render_tickets()
            .into_iter()
            .map(|(slot, ticket)| Effect::Render {
                target: RenderTarget {
                    host: HostKind::Fullscreen,
                    generation,
                    slot,
                },
                ticket,
                handle: Arc::clone(&handle),
            })
            .collect()
    }

    fn open_effect(&self, host: HostKind, generation: u64) -> Effect {
        Effect::Open {
            host,
            generation,
            locator: self.locator.clone(),
        }
    }

    fn is_live(&self, host: HostKind, generation: u64) -> bool {
        match host {
            HostKind::Inline => self.inline.generation == generation,
            HostKind::Fullscreen => self
                .fullscreen
                .as_ref()
                .is_some_and(|mount| mount.generation == generation),
        }
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn notify(&mut self, notification: Notification) {
        if self.notifications.back() != Some(&notification) {
            self.notifications.push_back(notification);
        }
    }

    fn redraw(&self, host: HostKind) {
        self.push_event(ViewerEvent::RedrawNeeded(host));
    }

    fn push_event(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }

    pub fn default_scale(&self) -> ZoomLevel {
        self.default_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{frame_for, FakeHandle};
    use crate::{LoadError, MemoryStateStore, RenderRequest};

    fn viewer() -> Viewer {
        Viewer::new("doc.pdf", &ViewerConfig::default(), None)
    }

    /// Resolves the open effect with a fake handle and returns the render effects.
    fn open(viewer: &mut Viewer, effects: Vec<Effect>, pages: u32) -> Vec<Effect> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                Effect::Open {
                    host, generation, ..
                } => out.extend(viewer.complete(Completion::Opened {
                    host,
                    generation,
                    result: Ok(FakeHandle::new(pages)),
                })),
                other => out.push(other),
            }
        }
        out
    }

    fn render_all(viewer: &mut Viewer, effects: Vec<Effect>) {
        for effect in effects {
            if let Effect::Render { target, ticket, .. } = effect {
                viewer.complete(Completion::Rendered {
                    target,
                    id: ticket.id,
                    result: Ok(frame_for(&ticket.request)),
                });
            }
        }
    }

    fn render_requests(effects: &[Effect]) -> Vec<RenderRequest> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Render { ticket, .. } => Some(ticket.request),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn zoom_scenario_keeps_old_frame_until_commit() {
        let mut viewer = viewer();
        let effects = viewer.mount();
        assert!(matches!(effects.as_slice(), [Effect::Open { .. }]));
        assert_eq!(viewer.focused_view(), SurfaceView::Loading);

        let effects = open(&mut viewer, effects, 10);
        render_all(&mut viewer, effects);
        assert_eq!(viewer.inline().state().total_pages(), Some(10));
        assert!(!viewer.inline().state().is_transitioning());

        let effects = viewer.apply(Command::SetScale {
            zoom: ZoomLevel::Double,
        });
        assert_eq!(render_requests(&effects)[0].scale, 2.0);
        assert!(viewer.inline().state().is_transitioning());
        match viewer.focused_view() {
            SurfaceView::Transition { visible, .. } => assert_eq!(visible.width, 1),
            other => panic!("unexpected view: {:?}", other),
        }

        render_all(&mut viewer, effects);
        assert_eq!(
            viewer.inline().state().rendered_scale(),
            Some(ZoomLevel::Double)
        );
        assert!(!viewer.inline().state().is_transitioning());
        assert!(matches!(viewer.focused_view(), SurfaceView::Ready(_)));
    }

    #[test]
    fn superseded_zoom_frame_is_discarded() {
        let mut viewer = viewer();
        let effects = viewer.mount();
        let effects = open(&mut viewer, effects, 10);
        render_all(&mut viewer, effects);

        let stale = viewer.apply(Command::SetScale {
            zoom: ZoomLevel::OneAndHalf,
        });
        let live = viewer.apply(Command::SetScale {
            zoom: ZoomLevel::Double,
        });
        render_all(&mut viewer, stale);
        assert_eq!(
            viewer.inline().state().rendered_scale(),
            Some(ZoomLevel::Actual)
        );
        render_all(&mut viewer, live);
        assert_eq!(
            viewer.inline().state().rendered_scale(),
            Some(ZoomLevel::Double)
        );
    }

    #[test]
    fn fullscreen_starts_at_first_page_and_resets_on_reopen() {
        let mut viewer = viewer();
        let effects = viewer.mount();
        let effects = open(&mut viewer, effects, 10);
        render_all(&mut viewer, effects);
        viewer.apply(Command::SetPageInput {
            text: "6".to_owned(),
        });
        viewer.apply(Command::SubmitPageInput);
        assert_eq!(viewer.inline().state().current_page(), 6);

        // The inline handle is leased, so the overlay does not reopen the locator.
        let effects = viewer.apply(Command::OpenFullscreen);
        assert_eq!(effects.len(), 10);
        assert_eq!(viewer.registry().lease_count("doc.pdf"), 2);
        let fullscreen = viewer.fullscreen().unwrap();
        assert_eq!(fullscreen.state().current_page(), 1);

        viewer.apply(Command::NextPage);
        viewer.apply(Command::NextPage);
        assert_eq!(viewer.fullscreen().unwrap().state().current_page(), 3);
        assert_eq!(viewer.inline().state().current_page(), 6);

        viewer.apply(Command::CloseFullscreen);
        assert!(viewer.fullscreen().is_none());
        assert_eq!(viewer.registry().lease_count("doc.pdf"), 1);
        render_all(&mut viewer, effects);

        viewer.apply(Command::OpenFullscreen);
        assert_eq!(viewer.fullscreen().unwrap().state().current_page(), 1);
        assert_eq!(viewer.inline().state().current_page(), 6);
    }

    #[test]
    fn fullscreen_ignores_zoom_and_rotate() {
        let mut viewer = viewer();
        let effects = viewer.mount();
        open(&mut viewer, effects, 3);
        viewer.apply(Command::OpenFullscreen);
        assert!(viewer
            .apply(Command::SetScale {
                zoom: ZoomLevel::Half
            })
            .is_empty());
        viewer.apply(Command::Rotate);
        assert_eq!(viewer.inline().state().scale(), ZoomLevel::Actual);
        assert_eq!(viewer.inline().state().rotation(), 0);
    }

    #[test]
    fn open_for_closed_overlay_is_discarded() {
        let mut viewer = viewer();
        let effects = viewer.apply(Command::OpenFullscreen);
        let (host, generation) = match effects.as_slice() {
            [Effect::Open {
                host, generation, ..
            }] => (*host, *generation),
            other => panic!("unexpected effects: {:?}", other),
        };
        viewer.apply(Command::CloseFullscreen);

        let effects = viewer.complete(Completion::Opened {
            host,
            generation,
            result: Ok(FakeHandle::new(3)),
        });
        assert!(effects.is_empty());
        assert_eq!(viewer.registry().lease_count("doc.pdf"), 0);
    }

    #[test]
    fn load_failure_notifies_and_keeps_placeholder() {
        let mut viewer = viewer();
        let generation = match viewer.mount().as_slice() {
            [Effect::Open { generation, .. }] => *generation,
            other => panic!("unexpected effects: {:?}", other),
        };
        viewer.complete(Completion::Opened {
            host: HostKind::Inline,
            generation,
            result: Err(LoadError::new("doc.pdf", anyhow::anyhow!("404"))),
        });

        assert!(viewer.inline().document().is_failed());
        assert_eq!(viewer.focused_view(), SurfaceView::Loading);
        assert_eq!(
            viewer.notifications().next(),
            Some(&Notification::load_failed())
        );
        assert!(viewer
            .events()
            .lock()
            .contains(&ViewerEvent::DocumentFailed(HostKind::Inline)));
        assert!(viewer.apply(Command::NextPage).is_empty());

        viewer.apply(Command::DismissNotification);
        assert!(viewer.notifications().next().is_none());

        let effects = viewer.apply(Command::Reload);
        assert!(matches!(effects.as_slice(), [Effect::Open { .. }]));
    }

    #[test]
    fn render_failure_only_fails_that_page() {
        let mut viewer = viewer();
        let effects = viewer.mount();
        open(&mut viewer, effects, 2);
        let effects = viewer.apply(Command::OpenFullscreen);
        for effect in effects {
            if let Effect::Render { target, ticket, .. } = effect {
                let result = if ticket.request.page == 2 {
                    Err(crate::RenderError::new(
                        ticket.request,
                        anyhow::anyhow!("corrupt page"),
                    ))
                } else {
                    Ok(frame_for(&ticket.request))
                };
                viewer.complete(Completion::Rendered {
                    target,
                    id: ticket.id,
                    result,
                });
            }
        }
        let column = viewer.fullscreen().unwrap().column();
        assert!(matches!(column[0], SurfaceView::Ready(_)));
        assert!(matches!(column[1], SurfaceView::Failed(_)));
        assert_eq!(viewer.notifications().count(), 1);
    }

    #[test]
    fn inline_position_is_persisted_and_restored() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let config = ViewerConfig::default();
        let mut viewer = Viewer::new("doc.pdf", &config, Some(Arc::clone(&store)));
        let effects = viewer.mount();
        open(&mut viewer, effects, 8);
        viewer.apply(Command::NextPage);
        viewer.apply(Command::Rotate);
        viewer.apply(Command::SetScale {
            zoom: ZoomLevel::ThreeQuarters,
        });
        viewer.persist().unwrap();

        let restored = Viewer::new("doc.pdf", &config, Some(store));
        let state = restored.inline().state();
        assert_eq!(state.current_page(), 2);
        assert_eq!(state.rotation(), 90);
        assert_eq!(state.scale(), ZoomLevel::ThreeQuarters);
        assert_eq!(restored.page_input().text(), "2");
    }
}

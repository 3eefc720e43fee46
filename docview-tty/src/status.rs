use docview_core::{HostKind, Notification, SurfaceView, Viewer, ZoomLevel};

use crate::{EventMapper, InputMode};

/// Everything the status line shows, captured from a [`Viewer`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub host: HostKind,
    pub page: u32,
    pub total: String,
    /// Only the inline host has a zoom menu.
    pub zoom: Option<ZoomLevel>,
    pub rotation: u32,
    pub activity: Option<&'static str>,
    pub field_error: Option<String>,
    pub prompt: Option<String>,
    pub notification: Option<Notification>,
}

impl StatusInfo {
    pub fn from_viewer(viewer: &Viewer, mode: InputMode) -> Self {
        let (host, state) = match viewer.fullscreen() {
            Some(fullscreen) => (HostKind::Fullscreen, fullscreen.state()),
            None => (HostKind::Inline, viewer.inline().state()),
        };
        let inline = host == HostKind::Inline;
        let input = viewer.page_input();

        let prompt = match mode {
            InputMode::PageInput if inline => Some(format!("go to page: {}_", input.text())),
            InputMode::ZoomMenu if inline => Some(EventMapper::zoom_menu_prompt()),
            _ => None,
        };

        Self {
            host,
            page: state.current_page(),
            total: state.total_label(),
            zoom: inline.then(|| state.scale()),
            rotation: if inline { state.visual_rotation() } else { 0 },
            activity: activity(&viewer.focused_view()),
            field_error: input
                .error()
                .filter(|_| inline)
                .map(|err| err.to_string()),
            prompt,
            notification: viewer.notifications().next().cloned(),
        }
    }
}

fn activity(view: &SurfaceView<'_>) -> Option<&'static str> {
    match view {
        SurfaceView::Loading => Some("loading"),
        SurfaceView::Transition { .. } | SurfaceView::Rendering(_) => Some("rendering"),
        SurfaceView::Failed(_) => Some("failed"),
        SurfaceView::Empty | SurfaceView::Ready(_) => None,
    }
}

pub fn format_status(info: &StatusInfo) -> String {
    let mut parts = Vec::new();
    if info.host == HostKind::Fullscreen {
        parts.push("fullscreen".to_owned());
    }
    parts.push(format!("page {} / {}", info.page, info.total));
    if let Some(zoom) = info.zoom {
        parts.push(zoom.to_string());
    }
    if info.rotation != 0 {
        parts.push(format!("{}°", info.rotation));
    }
    if let Some(activity) = info.activity {
        parts.push(activity.to_owned());
    }
    if let Some(err) = &info.field_error {
        parts.push(format!("! {}", err));
    }
    if let Some(prompt) = &info.prompt {
        parts.push(prompt.clone());
    }
    if let Some(notification) = &info.notification {
        parts.push(format!(
            "{}: {} (Esc to dismiss)",
            notification.title, notification.description
        ));
    }
    parts.join(" | ")
}

/// Text drawn in place of a frame while none can be shown.
pub fn placeholder_text(view: &SurfaceView<'_>) -> Option<String> {
    match view {
        SurfaceView::Loading => Some("Loading document...".to_owned()),
        SurfaceView::Empty => Some("Document has no pages".to_owned()),
        SurfaceView::Rendering(request) => Some(format!("Rendering page {}...", request.page)),
        SurfaceView::Failed(request) => Some(format!("Could not render page {}", request.page)),
        SurfaceView::Transition { .. } | SurfaceView::Ready(_) => None,
    }
}

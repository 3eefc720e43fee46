use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod registry;
pub mod surface;
pub mod validator;
pub mod viewer;
pub mod viewport;

pub use cache::FrameCache;
pub use config::ViewerConfig;
pub use dispatch::{Completion, Dispatcher, Effect, RenderTarget};
pub use error::{ConfigError, LoadError, PageInputError, RenderError};
pub use host::{DocumentSlot, FullscreenHost, HostKind, InlineHost};
pub use registry::{HandleLease, HandleRegistry};
pub use surface::{RenderSurface, RenderTicket, RequestId, SurfaceView};
pub use validator::{validate_page_input, PageInput};
pub use viewer::{Command, Notification, Viewer, ViewerEvent};
pub use viewport::ViewportState;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f6d2b8e-5c41-5e0a-9d7b-1a2c4e6f8b90").expect("valid namespace UUID")
});

/// Stable id for a locator. Local paths are canonicalised first so that
/// `./a.pdf` and `/home/me/a.pdf` share persisted state.
pub fn document_id_for_locator(locator: &str) -> DocumentId {
    let resolved = Path::new(locator)
        .canonicalize()
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| locator.to_owned());
    Uuid::new_v5(&DOCUMENT_NAMESPACE, resolved.as_bytes())
}

/// The zoom menu. Scale is only ever set to one of these.
///
/// Serialised as a whole percentage (`150`), which is also how the
/// configuration file and the command line spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ZoomLevel {
    Half,
    ThreeQuarters,
    #[default]
    Actual,
    OneAndHalf,
    Double,
}

impl ZoomLevel {
    pub const ALL: [ZoomLevel; 5] = [
        ZoomLevel::Half,
        ZoomLevel::ThreeQuarters,
        ZoomLevel::Actual,
        ZoomLevel::OneAndHalf,
        ZoomLevel::Double,
    ];

    pub fn factor(self) -> f32 {
        match self {
            ZoomLevel::Half => 0.5,
            ZoomLevel::ThreeQuarters => 0.75,
            ZoomLevel::Actual => 1.0,
            ZoomLevel::OneAndHalf => 1.5,
            ZoomLevel::Double => 2.0,
        }
    }

    pub fn percent(self) -> u32 {
        match self {
            ZoomLevel::Half => 50,
            ZoomLevel::ThreeQuarters => 75,
            ZoomLevel::Actual => 100,
            ZoomLevel::OneAndHalf => 150,
            ZoomLevel::Double => 200,
        }
    }

    pub fn from_percent(percent: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.percent() == percent)
    }

    pub fn from_factor(factor: f32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| (level.factor() - factor).abs() < f32::EPSILON)
    }

    /// Next entry of the menu, saturating at the largest level.
    pub fn step_up(self) -> Self {
        let idx = Self::ALL.iter().position(|l| *l == self).unwrap_or(2);
        Self::ALL[(idx + 1).min(Self::ALL.len() - 1)]
    }

    pub fn step_down(self) -> Self {
        let idx = Self::ALL.iter().position(|l| *l == self).unwrap_or(2);
        Self::ALL[idx.saturating_sub(1)]
    }
}

impl TryFrom<u32> for ZoomLevel {
    type Error = ConfigError;

    fn try_from(percent: u32) -> Result<Self, Self::Error> {
        Self::from_percent(percent).ok_or(ConfigError::UnsupportedScale { percent })
    }
}

impl From<ZoomLevel> for u32 {
    fn from(level: ZoomLevel) -> Self {
        level.percent()
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// The tuple a frame is requested (and later matched) for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 1-based page number.
    pub page: u32,
    /// Container width in pixels; the page is drawn `width * scale` wide.
    pub width: f32,
    pub scale: f32,
    /// Accumulated rotation in degrees; only `rotation % 360` is visible.
    pub rotation: u32,
}

impl RenderRequest {
    pub fn visual_rotation(&self) -> u32 {
        self.rotation % 360
    }

    pub fn target_width(&self) -> u32 {
        let px = (self.width * self.scale).round();
        if !px.is_finite() || px < 1.0 {
            1
        } else {
            px as u32
        }
    }
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page: 1,
            width: 1.0,
            scale: 1.0,
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[async_trait::async_trait]
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> u32;
    async fn render_page(&self, request: RenderRequest) -> Result<RenderedFrame, RenderError>;
}

#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn open(&self, locator: &str) -> Result<Arc<dyn DocumentHandle>, LoadError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedViewportState {
    pub current_page: u32,
    pub scale: f32,
    pub rotation: u32,
}

impl Default for PersistedViewportState {
    fn default() -> Self {
        Self {
            current_page: 1,
            scale: 1.0,
            rotation: 0,
        }
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self, id: DocumentId) -> Result<Option<PersistedViewportState>>;
    fn save(&self, id: DocumentId, state: &PersistedViewportState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, id: DocumentId) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, id: DocumentId) -> Result<Option<PersistedViewportState>> {
        let path = self.state_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, id: DocumentId, state: &PersistedViewportState) -> Result<()> {
        let path = self.state_path(id);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, PersistedViewportState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: DocumentId) -> Result<Option<PersistedViewportState>> {
        Ok(self.inner.lock().get(&id).cloned())
    }

    fn save(&self, id: DocumentId, state: &PersistedViewportState) -> Result<()> {
        self.inner.lock().insert(id, state.clone());
        Ok(())
    }
}

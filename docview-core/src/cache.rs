use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::{RenderRequest, RenderedFrame};

pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Rasterised pages kept by a document handle, so that flipping back to a
/// page or returning to a zoom level does not rasterise again.
///
/// When full, the frames furthest from the most recently stored page are
/// evicted first.
pub struct FrameCache {
    capacity: usize,
    frames: Mutex<HashMap<FrameKey, RenderedFrame>>,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            frames: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, request: &RenderRequest) -> Option<RenderedFrame> {
        self.frames.lock().get(&FrameKey::new(request)).cloned()
    }

    pub fn insert(&self, request: &RenderRequest, frame: &RenderedFrame) {
        let mut frames = self.frames.lock();
        frames.insert(FrameKey::new(request), frame.clone());

        if frames.len() > self.capacity {
            let mut keys: Vec<_> = frames.keys().copied().collect();
            keys.sort_by_key(|k| k.distance(request.page));
            for stale in keys.into_iter().skip(self.capacity) {
                trace!(page = stale.page, "evicting cached frame");
                frames.remove(&stale);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Two requests share a frame when they produce the same bitmap: same page,
/// same pixel width and the same visible rotation.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct FrameKey {
    page: u32,
    target_width: u32,
    scale_milli: u32,
    rotation: u32,
}

impl FrameKey {
    fn new(request: &RenderRequest) -> Self {
        Self {
            page: request.page,
            target_width: request.target_width(),
            scale_milli: quantize_scale(request.scale),
            rotation: request.visual_rotation(),
        }
    }

    fn distance(&self, reference_page: u32) -> u32 {
        self.page.abs_diff(reference_page)
    }
}

fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

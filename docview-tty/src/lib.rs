use std::io::Write;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{Clear, ClearType, WindowSize},
};
use docview_core::{Command, HostKind, RenderedFrame, ZoomLevel};
use png::{BitDepth, ColorType, Encoder};
use tracing::debug;

mod status;

pub use status::{format_status, placeholder_text, StatusInfo};

pub struct KittyRenderer<W: Write> {
    writer: W,
    next_image_id: u32,
    placement_id: u32,
}

/// Placement of a frame in cells. A frame larger than its area is cropped to
/// the `crop_width x crop_height` window whose top-left pixel is
/// `(origin_x, origin_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
    pub origin_x: u32,
    pub origin_y: u32,
    pub crop_width: Option<u32>,
    pub crop_height: Option<u32>,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
            origin_x: 0,
            origin_y: 0,
            crop_width: None,
            crop_height: None,
        }
    }
}

/// Scroll position inside a frame larger than the screen, as a fraction of
/// the hidden extent on each axis: `0.0` shows the top/left edge, `1.0` the
/// bottom/right edge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pan {
    pub x: f32,
    pub y: f32,
}

impl Pan {
    pub const STEP: f32 = 0.1;

    pub fn adjusted(self, delta_x: f32, delta_y: f32) -> Self {
        Self {
            x: (self.x + delta_x).clamp(0.0, 1.0),
            y: (self.y + delta_y).clamp(0.0, 1.0),
        }
    }
}

/// Pan state of the focused host. Snaps back to the top-left corner whenever
/// the focused host or its current page changes.
#[derive(Debug, Default)]
pub struct Scroll {
    anchor: Option<(HostKind, u32)>,
    pan: Pan,
}

impl Scroll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pan for `page` of `host`.
    pub fn follow(&mut self, host: HostKind, page: u32) -> Pan {
        if self.anchor != Some((host, page)) {
            self.anchor = Some((host, page));
            self.pan = Pan::default();
        }
        self.pan
    }

    /// Moves the pan for `page` of `host`, returning whether it changed.
    pub fn adjust(&mut self, host: HostKind, page: u32, delta_x: f32, delta_y: f32) -> bool {
        let current = self.follow(host, page);
        self.pan = current.adjusted(delta_x, delta_y);
        self.pan != current
    }
}

/// A frame positioned at cell `(column, row)` of the content area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub column: u32,
    pub row: u32,
    pub params: DrawParams,
}

/// Terminal size in cells and pixels. The bottom row is kept for the status
/// line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    pub columns: u32,
    pub rows: u32,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl CellGeometry {
    /// Cell size used when the terminal does not report pixel dimensions.
    const FALLBACK_CELL: (f32, f32) = (8.0, 16.0);

    pub fn from_window(window: &WindowSize) -> Self {
        let columns = u32::from(window.columns).max(1);
        let rows = u32::from(window.rows).max(1);
        let (cell_width, cell_height) = if window.width == 0 || window.height == 0 {
            Self::FALLBACK_CELL
        } else {
            (
                f32::from(window.width) / columns as f32,
                f32::from(window.height) / rows as f32,
            )
        };
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    pub fn content_rows(&self) -> u32 {
        self.rows.saturating_sub(1).max(1)
    }

    /// Pixel width of the area a page is laid out in.
    pub fn content_width(&self) -> f32 {
        self.columns as f32 * self.cell_width
    }

    /// Draws `frame` at its natural pixel size. Whatever overflows the
    /// content area is cropped, with `pan` choosing the visible window.
    pub fn fit(&self, frame: &RenderedFrame, pan: Pan) -> DrawParams {
        self.fit_rows(frame, pan, self.content_rows())
    }

    fn fit_rows(&self, frame: &RenderedFrame, pan: Pan, max_rows: u32) -> DrawParams {
        let natural_cols = (frame.width as f32 / self.cell_width).ceil().max(1.0) as u32;
        let natural_rows = (frame.height as f32 / self.cell_height).ceil().max(1.0) as u32;

        let mut params = DrawParams::clamped(natural_cols, natural_rows);
        if natural_cols > self.columns {
            let window = ((self.columns as f32 * self.cell_width) as u32).min(frame.width);
            params.columns = self.columns;
            params.origin_x = viewport_origin(frame.width, window, pan.x);
            params.crop_width = Some(window);
        }
        if natural_rows > max_rows {
            let window = ((max_rows as f32 * self.cell_height) as u32).min(frame.height);
            params.rows = max_rows.max(1);
            params.origin_y = viewport_origin(frame.height, window, pan.y);
            params.crop_height = Some(window);
        }
        params
    }

    /// Lays out consecutive column frames top to bottom, starting with the
    /// frame of the current page. Only the first frame is panned vertically;
    /// the ones below it start at their top edge. Layout stops at the first
    /// page without a frame or when the content area is full.
    pub fn stack<'a, I>(&self, frames: I, pan: Pan) -> Vec<Placement>
    where
        I: IntoIterator<Item = Option<&'a RenderedFrame>>,
    {
        let content_rows = self.content_rows();
        let mut placements = Vec::new();
        let mut row = 0;
        for (index, frame) in frames.into_iter().enumerate() {
            let Some(frame) = frame else {
                break;
            };
            if row >= content_rows {
                break;
            }
            let pan = if index == 0 { pan } else { Pan { y: 0.0, ..pan } };
            let params = self.fit_rows(frame, pan, content_rows - row);
            placements.push(Placement {
                column: self.start_column(&params),
                row,
                params,
            });
            row += params.rows;
        }
        placements
    }

    /// Column that centres `params` horizontally.
    pub fn start_column(&self, params: &DrawParams) -> u32 {
        self.columns.saturating_sub(params.columns) / 2
    }
}

/// Offset of a `viewport`-sized window into `total` pixels at `fraction` of
/// the hidden extent.
fn viewport_origin(total: u32, viewport: u32, fraction: f32) -> u32 {
    if viewport >= total || total == 0 {
        return 0;
    }
    let max_offset = total - viewport;
    let raw = (max_offset as f32 * fraction.clamp(0.0, 1.0)).round();
    raw.max(0.0).min(max_offset as f32) as u32
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits and places `frame` at the cursor. Each draw gets its own
    /// image id until the next [`clear_images`](Self::clear_images), so
    /// several frames can be on screen at once.
    pub fn draw(&mut self, frame: &RenderedFrame, params: DrawParams) -> Result<()> {
        let image_id = self.next_image_id;
        self.next_image_id += 1;

        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, frame.width, frame.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&frame.pixels)?;
        writer.finish()?;

        let mut crop = String::new();
        if params.origin_x > 0 {
            crop.push_str(&format!(",x={}", params.origin_x));
        }
        if params.origin_y > 0 {
            crop.push_str(&format!(",y={}", params.origin_y));
        }
        if let Some(width) = params.crop_width {
            crop.push_str(&format!(",w={}", width));
        }
        if let Some(height) = params.crop_height {
            crop.push_str(&format!(",h={}", height));
        }

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={}{},z=-1,m={}",
                    image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    frame.width,
                    frame.height,
                    crop,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every image placed by this renderer.
    pub fn clear_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        self.next_image_id = 1;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomStep {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    StepZoom(ZoomStep),
    /// Moves the visible window of an oversized frame by fractions of its
    /// hidden extent.
    Pan { delta_x: f32, delta_y: f32 },
    /// Leaves the page field without submitting; the field should show the
    /// current page again.
    CancelPageInput,
    /// Esc in normal mode: closes the overlay or dismisses a notification.
    Back,
    Resized,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    PageInput,
    ZoomMenu,
}

#[derive(Debug)]
pub struct EventMapper {
    mode: InputMode,
    host: HostKind,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self {
            mode: InputMode::Normal,
            host: HostKind::Inline,
        }
    }
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            debug!(from = ?self.mode, to = ?mode, "input mode changed");
        }
        self.mode = mode;
    }

    /// Host that receives the mapped commands. The page field and the zoom
    /// menu only exist on the inline host.
    pub fn set_host(&mut self, host: HostKind) {
        self.host = host;
        if host == HostKind::Fullscreen {
            self.set_mode(InputMode::Normal);
        }
    }

    fn pan(&self, delta_x: f32, delta_y: f32) -> UiEvent {
        UiEvent::Pan { delta_x, delta_y }
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Resize(..) => UiEvent::Resized,
            Event::Key(KeyEvent {
                kind: KeyEventKind::Release,
                ..
            }) => UiEvent::None,
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match self.mode {
                InputMode::Normal => self.map_key_normal(code, modifiers),
                InputMode::PageInput => self.map_key_page_input(code, modifiers),
                InputMode::ZoomMenu => self.map_key_zoom_menu(code),
            },
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        let inline = self.host == HostKind::Inline;
        match (code, modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Left, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(-Pan::STEP, 0.0)
            }
            (KeyCode::Right, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(Pan::STEP, 0.0)
            }
            (KeyCode::Up, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(0.0, -Pan::STEP)
            }
            (KeyCode::Down, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(0.0, Pan::STEP)
            }
            (KeyCode::Char('h'), KeyModifiers::NONE) => self.pan(-Pan::STEP, 0.0),
            (KeyCode::Char('l'), KeyModifiers::NONE) => self.pan(Pan::STEP, 0.0),
            (KeyCode::Char('K'), _) => self.pan(0.0, -Pan::STEP),
            (KeyCode::Char('J'), _) => self.pan(0.0, Pan::STEP),
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Char('n'), KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE)
            | (KeyCode::Down, _)
            | (KeyCode::Right, _)
            | (KeyCode::PageDown, _) => UiEvent::Command(Command::NextPage),
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Char('p'), KeyModifiers::NONE)
            | (KeyCode::Up, _)
            | (KeyCode::Left, _)
            | (KeyCode::PageUp, _) => UiEvent::Command(Command::PreviousPage),
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Char(':'), _) if inline => {
                self.set_mode(InputMode::PageInput);
                UiEvent::Command(Command::SetPageInput {
                    text: String::new(),
                })
            }
            (KeyCode::Char('z'), KeyModifiers::NONE) if inline => {
                self.set_mode(InputMode::ZoomMenu);
                UiEvent::None
            }
            (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => UiEvent::StepZoom(ZoomStep::In),
            (KeyCode::Char('-'), _) => UiEvent::StepZoom(ZoomStep::Out),
            (KeyCode::Char('r'), KeyModifiers::NONE) => UiEvent::Command(Command::Rotate),
            (KeyCode::Char('R'), _) => UiEvent::Command(Command::Reload),
            (KeyCode::Char('f'), KeyModifiers::NONE) => UiEvent::Command(Command::OpenFullscreen),
            (KeyCode::Esc, _) => UiEvent::Back,
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn map_key_page_input(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::CancelPageInput
            }
            (KeyCode::Enter, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::Command(Command::SubmitPageInput)
            }
            (KeyCode::Backspace, _) => UiEvent::Command(Command::PopPageInput),
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                UiEvent::Command(Command::PushPageInput { c })
            }
            _ => UiEvent::None,
        }
    }

    fn map_key_zoom_menu(&mut self, code: KeyCode) -> UiEvent {
        self.set_mode(InputMode::Normal);
        match code {
            KeyCode::Char(c) => c
                .to_digit(10)
                .and_then(|digit| (digit as usize).checked_sub(1))
                .and_then(|index| ZoomLevel::ALL.get(index).copied())
                .map(|zoom| UiEvent::Command(Command::SetScale { zoom }))
                .unwrap_or(UiEvent::None),
            _ => UiEvent::None,
        }
    }

    /// Prompt shown in the status line for the zoom menu.
    pub fn zoom_menu_prompt() -> String {
        let entries: Vec<String> = ZoomLevel::ALL
            .iter()
            .enumerate()
            .map(|(idx, level)| format!("{}:{}", idx + 1, level))
            .collect();
        format!("zoom {}", entries.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let frame = RenderedFrame {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&frame, DrawParams::clamped(10, 5)).unwrap();
        let output = renderer.writer;
        assert_eq!(&output[..3], b"\x1b_G");
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("c=10,r=5,s=1,v=1,z=-1"));
    }

    #[test]
    fn kitty_draw_includes_crop() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let frame = RenderedFrame {
            width: 2,
            height: 1,
            pixels: vec![0; 8],
        };
        let params = DrawParams {
            crop_width: Some(1),
            ..DrawParams::clamped(1, 1)
        };
        renderer.draw(&frame, params).unwrap();
        let text = String::from_utf8_lossy(&renderer.writer).into_owned();
        assert!(text.contains("s=2,v=1,w=1,z=-1"));
    }

    #[test]
    fn kitty_draw_offsets_crop_window() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let frame = RenderedFrame {
            width: 4,
            height: 4,
            pixels: vec![0; 64],
        };
        let params = DrawParams {
            origin_x: 2,
            origin_y: 3,
            crop_width: Some(2),
            crop_height: Some(1),
            ..DrawParams::clamped(1, 1)
        };
        renderer.draw(&frame, params).unwrap();
        let text = String::from_utf8_lossy(&renderer.writer).into_owned();
        assert!(text.contains("s=4,v=4,x=2,y=3,w=2,h=1,z=-1"));
    }

    #[test]
    fn each_draw_gets_its_own_image_until_cleared() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let frame = RenderedFrame {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        };
        renderer.draw(&frame, DrawParams::clamped(1, 1)).unwrap();
        renderer.draw(&frame, DrawParams::clamped(1, 1)).unwrap();
        let text = String::from_utf8_lossy(&renderer.writer).into_owned();
        assert!(text.contains("i=1,p=1"));
        assert!(text.contains("i=2,p=1"));

        renderer.clear_images().unwrap();
        renderer.writer.clear();
        renderer.draw(&frame, DrawParams::clamped(1, 1)).unwrap();
        let text = String::from_utf8_lossy(&renderer.writer).into_owned();
        assert!(text.contains("i=1,p=1"));
    }

    fn geometry() -> CellGeometry {
        CellGeometry::from_window(&WindowSize {
            rows: 41,
            columns: 100,
            width: 1000,
            height: 820,
        })
    }

    #[test]
    fn fit_keeps_small_frames_at_natural_size() {
        let geometry = geometry();
        assert_eq!(geometry.content_rows(), 40);
        assert_eq!(geometry.content_width(), 1000.0);

        let frame = RenderedFrame {
            width: 500,
            height: 300,
            pixels: Vec::new(),
        };
        let params = geometry.fit(&frame, Pan::default());
        assert_eq!(params, DrawParams::clamped(50, 15));
        assert_eq!(geometry.start_column(&params), 25);
    }

    #[test]
    fn fit_crops_frames_larger_than_the_screen() {
        let frame = RenderedFrame {
            width: 2000,
            height: 2600,
            pixels: Vec::new(),
        };
        let params = geometry().fit(&frame, Pan::default());
        assert_eq!(params.columns, 100);
        assert_eq!(params.rows, 40);
        assert_eq!((params.origin_x, params.origin_y), (0, 0));
        assert_eq!(params.crop_width, Some(1000));
        assert_eq!(params.crop_height, Some(800));
    }

    /// 100x41 cells of 8x16 pixels: an 800x640 content area.
    fn small_cells() -> CellGeometry {
        CellGeometry::from_window(&WindowSize {
            rows: 41,
            columns: 100,
            width: 800,
            height: 656,
        })
    }

    fn blank(width: u32, height: u32) -> RenderedFrame {
        RenderedFrame {
            width,
            height,
            pixels: Vec::new(),
        }
    }

    fn scroll_fully(scroll: &mut Scroll, delta_x: f32, delta_y: f32) -> Pan {
        for _ in 0..12 {
            scroll.adjust(HostKind::Inline, 1, delta_x, delta_y);
        }
        scroll.follow(HostKind::Inline, 1)
    }

    #[test]
    fn panning_reaches_bottom_of_tall_page() {
        let geometry = small_cells();
        let frame = blank(800, 1035);

        let top = geometry.fit(&frame, Pan::default());
        assert_eq!(top.crop_width, None);
        assert_eq!(top.crop_height, Some(640));
        assert_eq!(top.origin_y, 0);

        let mut scroll = Scroll::new();
        let pan = scroll_fully(&mut scroll, 0.0, Pan::STEP);
        assert_eq!(pan, Pan { x: 0.0, y: 1.0 });
        let bottom = geometry.fit(&frame, pan);
        assert_eq!(bottom.origin_y, 395);
        assert_eq!(bottom.origin_y + 640, frame.height);
    }

    #[test]
    fn panning_reaches_right_and_bottom_edges_when_zoomed() {
        let geometry = small_cells();
        let frame = blank(1600, 2070);

        let mut scroll = Scroll::new();
        let pan = scroll_fully(&mut scroll, Pan::STEP, Pan::STEP);
        let params = geometry.fit(&frame, pan);
        assert_eq!(params.crop_width, Some(800));
        assert_eq!(params.origin_x + 800, frame.width);
        assert_eq!(params.crop_height, Some(640));
        assert_eq!(params.origin_y + 640, frame.height);

        let halfway = geometry.fit(&frame, Pan { x: 0.5, y: 0.5 });
        assert_eq!((halfway.origin_x, halfway.origin_y), (400, 715));
    }

    #[test]
    fn scroll_resets_when_page_or_host_changes() {
        let mut scroll = Scroll::new();
        assert!(scroll.adjust(HostKind::Inline, 2, 0.0, Pan::STEP));
        assert!(scroll.adjust(HostKind::Inline, 2, 0.0, -1.0));
        assert_eq!(scroll.follow(HostKind::Inline, 2).y, 0.0);
        assert!(scroll.adjust(HostKind::Inline, 2, Pan::STEP, 0.0));
        assert_eq!(scroll.follow(HostKind::Inline, 2), Pan { x: Pan::STEP, y: 0.0 });

        assert_eq!(scroll.follow(HostKind::Inline, 3), Pan::default());
        scroll.adjust(HostKind::Inline, 3, 0.0, Pan::STEP);
        assert_eq!(scroll.follow(HostKind::Fullscreen, 3), Pan::default());

        // Already at the edge.
        assert!(!scroll.adjust(HostKind::Fullscreen, 3, -Pan::STEP, 0.0));
    }

    #[test]
    fn column_frames_stack_below_one_another() {
        let geometry = small_cells();
        let page = blank(800, 400);
        let placements = geometry.stack([Some(&page), Some(&page), Some(&page)], Pan::default());

        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].row, 0);
        assert_eq!(placements[0].params, DrawParams::clamped(100, 25));
        assert_eq!(placements[1].row, 25);
        assert_eq!(placements[1].params.rows, 15);
        assert_eq!(placements[1].params.origin_y, 0);
        assert_eq!(placements[1].params.crop_height, Some(240));
    }

    #[test]
    fn column_stops_at_first_unrendered_page() {
        let geometry = small_cells();
        let page = blank(800, 160);
        let placements = geometry.stack([Some(&page), None, Some(&page)], Pan::default());
        assert_eq!(placements.len(), 1);
        assert!(geometry.stack([None, Some(&page)], Pan::default()).is_empty());
    }

    #[test]
    fn column_pans_only_the_current_page() {
        let geometry = small_cells();
        let tall = blank(800, 1035);
        let short = blank(800, 160);
        let placements = geometry.stack([Some(&tall), Some(&short)], Pan { x: 0.0, y: 1.0 });
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].params.origin_y, 395);

        let placements = geometry.stack([Some(&short), Some(&tall)], Pan { x: 0.0, y: 1.0 });
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[1].row, 10);
        assert_eq!(placements[1].params.origin_y, 0);
        assert_eq!(placements[1].params.crop_height, Some(480));
    }

    #[test]
    fn missing_pixel_size_uses_fallback_cells() {
        let geometry = CellGeometry::from_window(&WindowSize {
            rows: 24,
            columns: 80,
            width: 0,
            height: 0,
        });
        assert_eq!(geometry.content_width(), 640.0);
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn event_mapper_maps_navigation_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Left)),
            UiEvent::Command(Command::PreviousPage)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('r'))),
            UiEvent::Command(Command::Rotate)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('f'))),
            UiEvent::Command(Command::OpenFullscreen)
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::Back);
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Quit
        );
    }

    #[test]
    fn event_mapper_page_field_collects_and_submits() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::SetPageInput {
                text: String::new()
            })
        );
        assert_eq!(mapper.mode(), InputMode::PageInput);

        // Navigation letters are field text while typing.
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::PushPageInput { c: 'j' })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::Command(Command::PopPageInput)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('7'))),
            UiEvent::Command(Command::PushPageInput { c: '7' })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(Command::SubmitPageInput)
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn event_mapper_escape_cancels_page_field() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char(':')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::CancelPageInput
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn event_mapper_zoom_menu_selects_by_position() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('z'))), UiEvent::None);
        assert_eq!(mapper.mode(), InputMode::ZoomMenu);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('4'))),
            UiEvent::Command(Command::SetScale {
                zoom: ZoomLevel::OneAndHalf
            })
        );
        assert_eq!(mapper.mode(), InputMode::Normal);

        mapper.map_event(key_event(KeyCode::Char('z')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('9'))), UiEvent::None);
        assert_eq!(mapper.mode(), InputMode::Normal);
        mapper.map_event(key_event(KeyCode::Char('z')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('0'))), UiEvent::None);
    }

    #[test]
    fn event_mapper_steps_zoom_and_reports_resize() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::StepZoom(ZoomStep::In)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('-'))),
            UiEvent::StepZoom(ZoomStep::Out)
        );
        assert_eq!(mapper.map_event(Event::Resize(120, 40)), UiEvent::Resized);
    }

    #[test]
    fn event_mapper_maps_pan_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('J'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Pan {
                delta_x: 0.0,
                delta_y: Pan::STEP
            }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('h'))),
            UiEvent::Pan {
                delta_x: -Pan::STEP,
                delta_y: 0.0
            }
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Up,
                KeyModifiers::CONTROL
            )),
            UiEvent::Pan {
                delta_x: 0.0,
                delta_y: -Pan::STEP
            }
        );
        // Plain arrows still navigate.
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Down)),
            UiEvent::Command(Command::NextPage)
        );
    }

    #[test]
    fn fullscreen_host_has_no_page_field_or_zoom_menu() {
        let mut mapper = EventMapper::new();
        mapper.set_host(HostKind::Fullscreen);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('g'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char(':'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('z'))), UiEvent::None);
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage)
        );

        mapper.set_host(HostKind::Inline);
        mapper.map_event(key_event(KeyCode::Char('z')));
        assert_eq!(mapper.mode(), InputMode::ZoomMenu);
        // Opening the overlay leaves any inline-only mode.
        mapper.set_host(HostKind::Fullscreen);
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn zoom_menu_prompt_lists_every_level() {
        insta::assert_snapshot!(
            EventMapper::zoom_menu_prompt(),
            @"zoom 1:50% 2:75% 3:100% 4:150% 5:200%"
        );
    }
}

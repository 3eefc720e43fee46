use std::fs;
use std::io;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use docview_core::{
    Command, Dispatcher, FileStateStore, HostKind, StateStore, Viewer, ViewerConfig, ViewerEvent,
    ZoomLevel,
};
use docview_render::PdfiumSource;
use docview_tty::{
    format_status, placeholder_text, CellGeometry, EventMapper, InputMode, KittyRenderer,
    Placement, Scroll, StatusInfo, UiEvent, ZoomStep,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "docview",
    version,
    about = "Page-at-a-time document viewer for kitty-compatible terminals"
)]
struct Args {
    /// Page to open on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<u32>,

    /// Zoom level in percent: 50, 75, 100, 150 or 200
    #[arg(short = 's', long = "scale", value_parser = parse_zoom)]
    scale: Option<ZoomLevel>,

    /// Configuration file [default: <config dir>/config.toml]
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path or http(s) URL of the document
    locator: String,
}

fn parse_zoom(raw: &str) -> Result<ZoomLevel, String> {
    let percent: u32 = raw
        .trim_end_matches('%')
        .parse()
        .map_err(|_| format!("`{}` is not a percentage", raw))?;
    ZoomLevel::try_from(percent).map_err(|err| err.to_string())
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "docview", "docview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config = ViewerConfig::load(&config_path)?;
    if let Some(scale) = args.scale {
        config.default_scale = scale;
    }

    let _log_guard = init_logging(&project_dirs, &config.log_level)?;
    info!(locator = %args.locator, ?config_path, "starting docview");

    let store: Option<Arc<dyn StateStore>> = if config.remember_position {
        let state_dir = project_dirs.data_local_dir().join("state");
        Some(Arc::new(FileStateStore::new(state_dir)?))
    } else {
        None
    };

    let source = PdfiumSource::new(&config).context("failed to initialise pdfium")?;
    let (dispatcher, mut completions) = Dispatcher::new(Arc::new(source));
    let mut viewer = Viewer::new(args.locator.clone(), &config, store);
    let mut geometry = CellGeometry::from_window(&terminal::window_size()?);

    viewer.apply(Command::Resize {
        host: HostKind::Inline,
        width: geometry.content_width(),
    });
    dispatcher.dispatch(viewer.mount());
    if let Some(zoom) = args.scale {
        // Overrides a persisted zoom as well.
        dispatcher.dispatch(viewer.apply(Command::SetScale { zoom }));
    }
    let mut pending_page = args.page;

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = KittyRenderer::new(stdout);
    let mut mapper = EventMapper::new();
    let mut scroll = Scroll::new();
    let mut dirty = true;

    loop {
        while let Ok(completion) = completions.try_recv() {
            dispatcher.dispatch(viewer.complete(completion));
        }

        let events = mem::take(&mut *viewer.events().lock());
        for viewer_event in events {
            match viewer_event {
                ViewerEvent::DocumentOpened(HostKind::Inline) => {
                    if let Some(page) = pending_page.take() {
                        viewer.apply(Command::SetPageInput {
                            text: page.to_string(),
                        });
                        dispatcher.dispatch(viewer.apply(Command::SubmitPageInput));
                    }
                }
                ViewerEvent::RedrawNeeded(host) if host == viewer.focused() => dirty = true,
                ViewerEvent::FullscreenOpened | ViewerEvent::FullscreenClosed => dirty = true,
                _ => {}
            }
        }

        if dirty {
            redraw(&mut renderer, &viewer, &geometry, &mut scroll, mapper.mode())?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(50))? {
            let mode_before = mapper.mode();
            mapper.set_host(viewer.focused());
            let ui_event = mapper.map_event(event::read()?);
            if mapper.mode() != mode_before {
                dirty = true;
            }
            match handle_event(ui_event, &mut viewer, &dispatcher, &mut geometry, &mut scroll)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    renderer.clear_images()?;
    renderer.clear_all()?;

    viewer.persist()?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

fn handle_event(
    ui_event: UiEvent,
    viewer: &mut Viewer,
    dispatcher: &Dispatcher,
    geometry: &mut CellGeometry,
    scroll: &mut Scroll,
) -> Result<LoopAction> {
    let effects = match ui_event {
        UiEvent::Pan { delta_x, delta_y } => {
            let host = viewer.focused();
            let page = focused_page(viewer);
            return Ok(if scroll.adjust(host, page, delta_x, delta_y) {
                LoopAction::ContinueRedraw
            } else {
                LoopAction::Continue
            });
        }
        UiEvent::Command(Command::OpenFullscreen) => {
            let mut effects = viewer.apply(Command::OpenFullscreen);
            effects.extend(viewer.apply(Command::Resize {
                host: HostKind::Fullscreen,
                width: geometry.content_width(),
            }));
            effects
        }
        UiEvent::Command(command) => viewer.apply(command),
        UiEvent::StepZoom(step) => {
            let current = viewer.inline().state().scale();
            let zoom = match step {
                ZoomStep::In => current.step_up(),
                ZoomStep::Out => current.step_down(),
            };
            viewer.apply(Command::SetScale { zoom })
        }
        UiEvent::CancelPageInput => {
            let page = viewer.inline().state().current_page();
            viewer.apply(Command::SetPageInput {
                text: page.to_string(),
            })
        }
        UiEvent::Back => {
            if viewer.fullscreen().is_some() {
                viewer.apply(Command::CloseFullscreen)
            } else {
                viewer.apply(Command::DismissNotification)
            }
        }
        UiEvent::Resized => {
            *geometry = CellGeometry::from_window(&terminal::window_size()?);
            let width = geometry.content_width();
            let mut effects = viewer.apply(Command::Resize {
                host: HostKind::Inline,
                width,
            });
            if viewer.fullscreen().is_some() {
                effects.extend(viewer.apply(Command::Resize {
                    host: HostKind::Fullscreen,
                    width,
                }));
            }
            effects
        }
        UiEvent::Quit => return Ok(LoopAction::Quit),
        UiEvent::None => return Ok(LoopAction::Continue),
    };
    dispatcher.dispatch(effects);
    Ok(LoopAction::ContinueRedraw)
}

fn focused_page(viewer: &Viewer) -> u32 {
    match viewer.fullscreen() {
        Some(fullscreen) => fullscreen.state().current_page(),
        None => viewer.inline().state().current_page(),
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &Viewer,
    geometry: &CellGeometry,
    scroll: &mut Scroll,
    mode: InputMode,
) -> Result<()> {
    renderer.begin_sync_update()?;
    renderer.clear_images()?;
    renderer.clear_all()?;

    let pan = scroll.follow(viewer.focused(), focused_page(viewer));
    let view = viewer.focused_view();
    let placements = match viewer.fullscreen() {
        Some(fullscreen) => {
            // The overlay shows the column from the current page downwards.
            let column = fullscreen.column();
            let start = fullscreen.state().current_page().saturating_sub(1) as usize;
            let frames: Vec<_> = column.iter().skip(start).map(|view| view.frame()).collect();
            geometry
                .stack(frames.iter().copied(), pan)
                .into_iter()
                .zip(frames.into_iter().flatten())
                .collect()
        }
        None => view
            .frame()
            .map(|frame| {
                let params = geometry.fit(frame, pan);
                let placement = Placement {
                    column: geometry.start_column(&params),
                    row: 0,
                    params,
                };
                vec![(placement, frame)]
            })
            .unwrap_or_default(),
    };

    if placements.is_empty() {
        if let Some(text) = placeholder_text(&view) {
            let col = geometry
                .columns
                .saturating_sub(text.chars().count() as u32)
                / 2;
            let row = geometry.content_rows() / 2;
            let mut writer = renderer.writer();
            crossterm::execute!(
                &mut writer,
                cursor::MoveTo(col as u16, row as u16),
                Print(text)
            )?;
        }
    }
    for (placement, frame) in placements {
        {
            let mut writer = renderer.writer();
            crossterm::execute!(
                &mut writer,
                cursor::MoveTo(placement.column as u16, placement.row as u16)
            )?;
        }
        renderer.draw(frame, placement.params)?;
    }

    let status = format_status(&StatusInfo::from_viewer(viewer, mode));
    draw_status_line(renderer, geometry, &status)?;
    renderer.end_sync_update()?;
    Ok(())
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    geometry: &CellGeometry,
    status: &str,
) -> Result<()> {
    let status_row = geometry.rows.saturating_sub(1);
    let visible: String = status.chars().take(geometry.columns as usize).collect();
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row as u16),
        Clear(ClearType::CurrentLine),
        SetAttribute(Attribute::Reverse),
        Print(visible),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, default_level: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "docview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal is in raw mode and owned by the viewer, so only the file
    // layer is installed.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

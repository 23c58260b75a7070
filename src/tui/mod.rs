//! Terminal shell
//!
//! A thin crossterm loop over the browser model: listing on the left,
//! preview on the right, one status line. The model does all the real
//! work; this module only maps keys to commands and state to rows. The
//! cursor doubles as the hover signal driving folder and file prefetch.

use std::io::Write;
use std::time::Duration;

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEventKind},
    execute, queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use humansize::{format_size, DECIMAL};

use crate::auth::signer::{presigned_get_url, SigningContext};
use crate::engine::{url, RequestEngine};
use crate::errors::{Result, S3ScopeError};
use crate::model::BrowserModel;
use crate::signals;

const FRAME: Duration = Duration::from_millis(50);
const PRESIGN_EXPIRY_SECS: u64 = 3600;

/// One selectable row in the listing pane.
enum Row {
    Bucket(String),
    Folder(String),
    File { key: String, size: i64 },
}

struct Ui {
    cursor: usize,
    scroll: usize,
    status: String,
}

pub fn run(model: &mut BrowserModel, engine: &RequestEngine) -> Result<()> {
    let mut stdout = std::io::stdout();
    terminal::enable_raw_mode().map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
    execute!(stdout, EnterAlternateScreen, Hide).map_err(|e| S3ScopeError::Terminal(e.to_string()))?;

    let result = event_loop(model, engine, &mut stdout);

    execute!(stdout, Show, LeaveAlternateScreen).ok();
    terminal::disable_raw_mode().ok();
    result
}

fn event_loop(
    model: &mut BrowserModel,
    engine: &RequestEngine,
    stdout: &mut std::io::Stdout,
) -> Result<()> {
    let mut ui = Ui {
        cursor: 0,
        scroll: 0,
        status: String::from("q quit · enter open · backspace up · r refresh · u presign · P profile"),
    };

    loop {
        if signals::was_interrupted() {
            return Ok(());
        }

        let mut dirty = model.process_events();

        if event::poll(FRAME).map_err(|e| S3ScopeError::Terminal(e.to_string()))? {
            match event::read().map_err(|e| S3ScopeError::Terminal(e.to_string()))? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match handle_key(key.code, model, engine, &mut ui) {
                        Action::Quit => return Ok(()),
                        Action::Redraw => dirty = true,
                        Action::None => {}
                    }
                }
                Event::Resize(_, _) => dirty = true,
                _ => {}
            }
        }

        if dirty {
            draw(model, &mut ui, stdout)?;
        }
    }
}

enum Action {
    None,
    Redraw,
    Quit,
}

fn handle_key(code: KeyCode, model: &mut BrowserModel, engine: &RequestEngine, ui: &mut Ui) -> Action {
    let rows = visible_rows(model);
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Up => {
            ui.cursor = ui.cursor.saturating_sub(1);
            hover(model, &rows, ui.cursor);
            Action::Redraw
        }
        KeyCode::Down => {
            if ui.cursor + 1 < rows.len() {
                ui.cursor += 1;
            }
            hover(model, &rows, ui.cursor);
            Action::Redraw
        }
        KeyCode::PageUp => {
            ui.cursor = ui.cursor.saturating_sub(20);
            Action::Redraw
        }
        KeyCode::PageDown => {
            ui.cursor = (ui.cursor + 20).min(rows.len().saturating_sub(1));
            Action::Redraw
        }
        KeyCode::Enter | KeyCode::Right => {
            match rows.get(ui.cursor) {
                Some(Row::Bucket(name)) => {
                    let name = name.clone();
                    model.navigate_into(&name, "");
                    ui.cursor = 0;
                    ui.scroll = 0;
                }
                Some(Row::Folder(prefix)) => {
                    let bucket = model.current_bucket().to_string();
                    let prefix = prefix.clone();
                    model.navigate_into(&bucket, &prefix);
                    ui.cursor = 0;
                    ui.scroll = 0;
                }
                Some(Row::File { key, .. }) => {
                    let bucket = model.current_bucket().to_string();
                    let key = key.clone();
                    model.select_file(&bucket, &key);
                }
                None => {}
            }
            Action::Redraw
        }
        KeyCode::Backspace | KeyCode::Left => {
            model.navigate_up();
            ui.cursor = 0;
            ui.scroll = 0;
            Action::Redraw
        }
        KeyCode::Char('r') => {
            model.refresh();
            ui.cursor = 0;
            ui.scroll = 0;
            Action::Redraw
        }
        KeyCode::Char('u') => {
            ui.status = presign_selection(model, engine)
                .unwrap_or_else(|| "no file selected".to_string());
            Action::Redraw
        }
        KeyCode::Char('P') => {
            let next = (model.selected_profile_index() + 1) % model.profiles().len().max(1);
            model.select_profile(next);
            ui.cursor = 0;
            ui.scroll = 0;
            Action::Redraw
        }
        _ => Action::None,
    }
}

/// The cursor is the hover signal: folders and previewable files under it
/// are prefetched at low priority.
fn hover(model: &mut BrowserModel, rows: &[Row], cursor: usize) {
    let bucket = model.current_bucket().to_string();
    match rows.get(cursor) {
        Some(Row::Folder(prefix)) => model.prefetch_folder(&bucket, &prefix.clone()),
        Some(Row::File { key, .. }) => model.prefetch_file_preview(&bucket, &key.clone()),
        _ => {}
    }
}

fn presign_selection(model: &BrowserModel, engine: &RequestEngine) -> Option<String> {
    let (bucket, key) = model.preview().selection()?;
    let profile = model.selected_profile()?;
    let region = engine
        .cached_region(bucket)
        .unwrap_or_else(|| profile.region.clone());
    let target = url::bucket_target(profile.endpoint_url.as_deref(), bucket, Some(key), &region);
    let ctx = SigningContext::new(profile, &region);
    Some(presigned_get_url(
        &ctx,
        &target.scheme,
        &target.host,
        &target.path,
        PRESIGN_EXPIRY_SECS,
    ))
}

fn visible_rows(model: &BrowserModel) -> Vec<Row> {
    if model.current_bucket().is_empty() {
        return model
            .buckets()
            .iter()
            .map(|b| Row::Bucket(b.name.clone()))
            .collect();
    }
    let Some(node) = model.current_node() else {
        return Vec::new();
    };
    node.objects
        .iter()
        .map(|o| {
            if o.is_folder {
                Row::Folder(o.key.clone())
            } else {
                Row::File {
                    key: o.key.clone(),
                    size: o.size,
                }
            }
        })
        .collect()
}

fn draw(model: &BrowserModel, ui: &mut Ui, stdout: &mut std::io::Stdout) -> Result<()> {
    let (width, height) = terminal::size().map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
    let width = width as usize;
    let list_height = (height as usize).saturating_sub(3);
    let list_width = (width / 2).min(60);

    let rows = visible_rows(model);
    if ui.cursor >= rows.len() {
        ui.cursor = rows.len().saturating_sub(1);
    }
    if ui.cursor < ui.scroll {
        ui.scroll = ui.cursor;
    }
    if ui.cursor >= ui.scroll + list_height {
        ui.scroll = ui.cursor + 1 - list_height;
    }

    queue!(stdout, Clear(ClearType::All), MoveTo(0, 0))
        .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;

    // Header: profile and location.
    let profile_name = model
        .selected_profile()
        .map(|p| p.name.as_str())
        .unwrap_or("(no profile)");
    let location = if model.current_bucket().is_empty() {
        "s3://".to_string()
    } else {
        format!("s3://{}/{}", model.current_bucket(), model.current_prefix())
    };
    queue!(
        stdout,
        SetAttribute(Attribute::Bold),
        Print(truncated(&format!("[{}] {}", profile_name, location), width)),
        SetAttribute(Attribute::Reset)
    )
    .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;

    // Listing pane.
    for (line, index) in (ui.scroll..rows.len().min(ui.scroll + list_height)).enumerate() {
        let marker = if index == ui.cursor { "> " } else { "  " };
        let text = match &rows[index] {
            Row::Bucket(name) => format!("{}{}/", marker, name),
            Row::Folder(prefix) => {
                let display = prefix.trim_end_matches('/');
                let display = display.rsplit('/').next().unwrap_or(display);
                format!("{}{}/", marker, display)
            }
            Row::File { key, size } => {
                let display = key.rsplit('/').next().unwrap_or(key);
                format!("{}{} ({})", marker, display, format_size(*size as u64, DECIMAL))
            }
        };
        queue!(
            stdout,
            MoveTo(0, (line + 1) as u16),
            Print(truncated(&text, list_width))
        )
        .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
    }
    if rows.is_empty() {
        let hint = if model.buckets_loading() {
            "loading…"
        } else if !model.buckets_error().is_empty() {
            model.buckets_error()
        } else if let Some(node) = model.current_node() {
            if node.loading {
                "loading…"
            } else if !node.error.is_empty() {
                node.error.as_str()
            } else {
                "(empty)"
            }
        } else {
            "(empty)"
        };
        queue!(stdout, MoveTo(2, 1), Print(truncated(hint, width.saturating_sub(2))))
            .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
    }

    // Preview pane.
    let preview_x = (list_width + 2) as u16;
    let preview_width = width.saturating_sub(list_width + 2);
    if preview_width > 8 {
        let preview = model.preview();
        if !preview.preview_error().is_empty() {
            queue!(stdout, MoveTo(preview_x, 1), Print(truncated(preview.preview_error(), preview_width)))
                .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
        } else if preview.preview_loading() {
            queue!(stdout, MoveTo(preview_x, 1), Print("loading preview…"))
                .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
        } else if let Some(streaming) = preview.streaming_preview() {
            let jsonl = crate::preview::jsonl::is_jsonl_key(streaming.key());
            for line in 0..list_height.min(streaming.line_count()) {
                let mut text = streaming.get_line(line);
                if jsonl && streaming.is_line_complete(line) {
                    if let Some(summary) = crate::preview::jsonl::summarize_line(&text) {
                        text = summary;
                    }
                }
                queue!(
                    stdout,
                    MoveTo(preview_x, (line + 1) as u16),
                    Print(truncated(&text, preview_width))
                )
                .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
            }
        } else {
            let content = preview.preview_content();
            let text = String::from_utf8_lossy(&content);
            for (line, chunk) in text.lines().take(list_height).enumerate() {
                queue!(
                    stdout,
                    MoveTo(preview_x, (line + 1) as u16),
                    Print(truncated(chunk, preview_width))
                )
                .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
            }
        }
    }

    // Status line.
    queue!(
        stdout,
        MoveTo(0, height.saturating_sub(1)),
        Print(truncated(&ui.status, width))
    )
    .map_err(|e| S3ScopeError::Terminal(e.to_string()))?;

    stdout.flush().map_err(|e| S3ScopeError::Terminal(e.to_string()))?;
    Ok(())
}

fn truncated(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        text.chars().take(width.saturating_sub(1)).collect::<String>() + "…"
    }
}

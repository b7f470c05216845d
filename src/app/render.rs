//! Frame rendering
//!
//! Three-row layout: location line, tree, command/status line, with an
//! optional modal popup over everything. Mangled display names carry
//! `[color]text[-]` markup, parsed into styled spans here.

use std::str::FromStr;

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Frame,
};

use super::state::{AppState, Focus};
use crate::tree::TreeNode;

/// Render a full frame
pub fn render(frame: &mut Frame, state: &AppState, root: &TreeNode, focus_index: usize) {
    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .split(frame.area());

    render_location(frame, state, rows[0]);
    render_tree(frame, state, root, focus_index, rows[1]);
    render_command(frame, state, rows[2]);

    if let Some(text) = &state.popup {
        render_popup(frame, text, frame.area());
    }
}

fn render_location(frame: &mut Frame, state: &AppState, area: Rect) {
    let focused = state.focus == Focus::Location;
    let text = if focused {
        state.location_input.clone()
    } else {
        state.root.display().to_string()
    };
    let style = if focused {
        Style::default().fg(Color::Black).bg(Color::Magenta)
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };
    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_tree(
    frame: &mut Frame,
    state: &AppState,
    root: &TreeNode,
    focus_index: usize,
    area: Rect,
) {
    let visible_height = area.height as usize;
    let entries = root.visible_entries();

    let items: Vec<ListItem> = entries
        .iter()
        .enumerate()
        .skip(state.viewport_top)
        .take(visible_height)
        .map(|(index, (node, depth))| {
            let mut base = Style::default();
            let (name, is_dir) = match &node.reference {
                Some(reference) => (reference.name.as_str(), reference.is_dir),
                None => ("", false),
            };
            if is_dir {
                base = base.add_modifier(Modifier::BOLD);
            }
            if index == focus_index {
                base = base.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }

            let mut spans = vec![Span::styled("  ".repeat(*depth), base)];
            spans.extend(markup_spans(name, base));
            ListItem::new(Line::from(spans))
        })
        .collect();

    frame.render_widget(List::new(items), area);
}

fn render_command(frame: &mut Frame, state: &AppState, area: Rect) {
    let (text, style) = if state.focus == Focus::Input {
        (
            format!(":{}", state.input),
            Style::default().fg(Color::Black).bg(Color::Magenta),
        )
    } else {
        (
            state.status.clone().unwrap_or_default(),
            Style::default(),
        )
    };
    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_popup(frame: &mut Frame, text: &str, area: Rect) {
    let popup_area = centered_rect(area, 80, 60);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL);
    frame.render_widget(Paragraph::new(text).block(block), popup_area);
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);
    let horizontal = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(vertical[1]);
    horizontal[1]
}

/// Parse `[color]text[-]` markup into styled spans.
///
/// An opening bracket naming a color styles the following text until the
/// `[-]` reset. Brackets that do not parse as a color are rendered
/// literally.
pub fn markup_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut style = base;
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        let (before, bracketed) = rest.split_at(open);
        current.push_str(before);
        let Some(close) = bracketed.find(']') else {
            current.push_str(bracketed);
            rest = "";
            break;
        };
        let token = &bracketed[1..close];
        if token == "-" {
            flush(&mut spans, &mut current, style);
            style = base;
        } else if let Ok(color) = Color::from_str(token) {
            flush(&mut spans, &mut current, style);
            style = base.fg(color);
        } else {
            current.push_str(&bracketed[..=close]);
        }
        rest = &bracketed[close + 1..];
    }
    current.push_str(rest);
    flush(&mut spans, &mut current, style);
    spans
}

fn flush(spans: &mut Vec<Span<'static>>, current: &mut String, style: Style) {
    if !current.is_empty() {
        spans.push(Span::styled(std::mem::take(current), style));
    }
}

// Help bar: key hints, or the filter prompt while typing a filter.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::ViewState;

const HINTS: &str = " ↑↓:Select | ←→:Page | Enter:Pick | /:Filter | s/t/r/$:Sort | p:Hide picked | R:Refresh | q:Quit";

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let line = if state.filter_mode {
        Line::from(vec![
            Span::styled(
                " Filter: ",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{}_", state.filter_text),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                "  (Enter: keep, Esc: clear)",
                Style::default().fg(Color::Gray),
            ),
        ])
    } else {
        Line::from(Span::styled(
            HINTS,
            Style::default().fg(Color::White).add_modifier(Modifier::DIM),
        ))
    };
    let paragraph = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

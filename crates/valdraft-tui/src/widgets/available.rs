// Candidate table: the current page of the draft view.
//
// Columns: marker, Name, Team, Agents, Rating, Salary, Status. The selected
// row is highlighted, picked rows are dimmed and struck through.

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use valdraft_app::view::ViewRow;

use crate::ViewState;

/// Render the candidate table into the given area.
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(build_title(state));

    if !state.view.is_loaded() {
        let paragraph = Paragraph::new("  Waiting for the draft server...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let rows = state.view.rows();
    if rows.is_empty() {
        let paragraph = Paragraph::new("  No players match.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let header = Row::new(vec![
        Cell::from(" "),
        Cell::from("Name"),
        Cell::from("Team"),
        Cell::from("Agents"),
        Cell::from("Rating"),
        Cell::from("Salary"),
        Cell::from("Status"),
    ])
    .style(
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let table_rows: Vec<Row> = rows.iter().map(build_row).collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Min(14),
        Constraint::Length(8),
        Constraint::Min(16),
        Constraint::Length(7),
        Constraint::Length(13),
        Constraint::Length(8),
    ];

    let table = Table::new(table_rows, widths).header(header).block(block);
    frame.render_widget(table, area);
}

fn build_row<'a>(row: &ViewRow<'a>) -> Row<'a> {
    let player = row.player;
    let style = if row.selected {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else if row.picked {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };

    Row::new(vec![
        Cell::from(if row.selected { ">" } else { "" }),
        Cell::from(player.name.as_str()),
        Cell::from(player.team.as_str()),
        Cell::from(player.agents.join(", ")),
        Cell::from(format!("{:.2}", player.rating)),
        Cell::from(format_salary(player.salary)),
        Cell::from(if row.picked { "Picked" } else { "" }),
    ])
    .style(style)
}

/// Whole dollars with thousands separators, e.g. `$7,200,000`.
pub fn format_salary(salary: f64) -> String {
    let whole = salary.max(0.0).round() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("${out}")
}

fn build_title(state: &ViewState) -> Line<'static> {
    let mut title = String::from("Candidates");
    if let Some(filter) = state.view.filter() {
        title.push_str(&format!(" \"{filter}\""));
    }
    if state.view.hides_picked() {
        title.push_str(" [hiding picked]");
    }
    title.push_str(&format!(" ({})", state.view.visible().len()));
    Line::from(title)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

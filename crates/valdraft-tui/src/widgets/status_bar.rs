// Status bar widget: connection status, user, draft progress, page.

use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use valdraft_app::view::{SortColumn, SortDirection, SortOrder};

use crate::{ConnectionStatus, ViewState};

/// Render the status bar into the given area.
///
/// Layout: [connection] [user] | Picked n/m | Page p/q | [sort]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = Vec::new();

    let (dot, color, label) = connection_indicator(state.connection);
    spans.push(Span::styled(format!(" {dot} "), Style::default().fg(color)));
    spans.push(Span::styled(
        format!("{label} {}", state.server_url),
        Style::default().fg(Color::White),
    ));

    let separator = || Span::styled(" | ", Style::default().fg(Color::Gray));

    if let Some(user) = state.view.user() {
        spans.push(separator());
        spans.push(Span::styled(user.to_string(), Style::default().fg(Color::Cyan)));
    }

    spans.push(separator());
    spans.push(Span::styled(
        format!(
            "Picked {}/{}",
            picked_count(state),
            state.view.candidates().len()
        ),
        Style::default().fg(Color::White),
    ));

    spans.push(separator());
    spans.push(Span::styled(
        format!("Page {}/{}", state.view.page() + 1, state.view.page_count()),
        Style::default().fg(Color::White),
    ));

    if let Some(order) = state.view.sort() {
        spans.push(separator());
        spans.push(Span::styled(
            sort_label(order),
            Style::default().fg(Color::White),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// Dot character, color and label for a connection state.
pub fn connection_indicator(status: ConnectionStatus) -> (&'static str, Color, &'static str) {
    match status {
        ConnectionStatus::Connecting => ("●", Color::Yellow, "Connecting"),
        ConnectionStatus::Connected => ("●", Color::Green, "Connected"),
        ConnectionStatus::Disconnected => ("●", Color::Red, "Disconnected"),
    }
}

/// Picked players that are on the candidate list.
fn picked_count(state: &ViewState) -> usize {
    state
        .view
        .candidates()
        .iter()
        .filter(|p| state.view.picked().contains(&p.key()))
        .count()
}

pub fn sort_label(order: SortOrder) -> String {
    let column = match order.column {
        SortColumn::Name => "Name",
        SortColumn::Team => "Team",
        SortColumn::Rating => "Rating",
        SortColumn::Salary => "Salary",
    };
    let arrow = match order.direction {
        SortDirection::Ascending => "▲",
        SortDirection::Descending => "▼",
    };
    format!("Sort: {column} {arrow}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::players;
    use crate::ClientEvent;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use valdraft_core::protocol::ServerMessage;

    fn rendered(state: &ViewState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 1)).unwrap();
        terminal
            .draw(|frame| render(frame, frame.area(), state))
            .unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn connection_indicator_colors() {
        assert_eq!(connection_indicator(ConnectionStatus::Connected).1, Color::Green);
        assert_eq!(connection_indicator(ConnectionStatus::Connecting).1, Color::Yellow);
        assert_eq!(connection_indicator(ConnectionStatus::Disconnected).1, Color::Red);
    }

    #[test]
    fn sort_label_shows_direction() {
        let order = SortOrder {
            column: SortColumn::Salary,
            direction: SortDirection::Descending,
        };
        assert_eq!(sort_label(order), "Sort: Salary ▼");
    }

    #[test]
    fn shows_user_progress_and_page() {
        let mut state = ViewState::new("ws://draft:9001", Some("sova_main".into()));
        state.apply_client_event(ClientEvent::Connected { epoch: 1 });
        state.apply_client_event(ClientEvent::Server {
            epoch: 1,
            message: ServerMessage::Welcome {
                players: players(),
                picked: vec!["derke".into(), "not-a-candidate".into()],
            },
        });

        let text = rendered(&state);
        assert!(text.contains("Connected ws://draft:9001"));
        assert!(text.contains("sova_main"));
        assert!(text.contains("Picked 1/4"));
        assert!(text.contains("Page 1/1"));
    }

    #[test]
    fn render_does_not_panic_with_defaults() {
        let text = rendered(&ViewState::default());
        assert!(text.contains("Connecting"));
    }
}

// Notice line: the draft view's last message, colored by kind.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use valdraft_app::view::NoticeKind;

use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let line = match state.view.notice() {
        Some(notice) => Line::from(vec![
            Span::styled(
                format!(" {} ", kind_label(notice.kind)),
                Style::default()
                    .fg(Color::Black)
                    .bg(kind_color(notice.kind))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(
                notice.message.clone(),
                Style::default().fg(kind_color(notice.kind)),
            ),
        ]),
        None => Line::default(),
    };
    frame.render_widget(Paragraph::new(line), area);
}

pub fn kind_color(kind: NoticeKind) -> Color {
    match kind {
        NoticeKind::Info => Color::Cyan,
        NoticeKind::Success => Color::Green,
        NoticeKind::Warning => Color::Yellow,
        NoticeKind::Error => Color::Red,
    }
}

fn kind_label(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Info => "INFO",
        NoticeKind::Success => "OK",
        NoticeKind::Warning => "WARN",
        NoticeKind::Error => "ERROR",
    }
}

// Screen layout.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                               |
// +--------------------------------------------------+
// | Candidate table (fill)                           |
// +--------------------------------------------------+
// | Notice (1 row)                                   |
// +--------------------------------------------------+
// | Help Bar (1 row)                                 |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Layout, Rect};

#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Connection, user, picked count, page.
    pub status_bar: Rect,
    pub main_panel: Rect,
    /// Last notice from the draft view.
    pub notice: Rect,
    /// Keyboard hints, or the filter prompt in filter mode.
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(3),    // candidate table
            Constraint::Length(1), // notice
            Constraint::Length(1), // help bar
        ])
        .split(area);

    AppLayout {
        status_bar: vertical[0],
        main_panel: vertical[1],
        notice: vertical[2],
        help_bar: vertical[3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_are_one_row_and_table_fills_the_rest() {
        let layout = build_layout(Rect::new(0, 0, 120, 40));
        assert_eq!(layout.status_bar.height, 1);
        assert_eq!(layout.notice.height, 1);
        assert_eq!(layout.help_bar.height, 1);
        assert_eq!(layout.main_panel.height, 37);
        assert_eq!(layout.main_panel.width, 120);
    }

    #[test]
    fn zones_are_stacked_in_order() {
        let layout = build_layout(Rect::new(0, 0, 80, 24));
        assert_eq!(layout.status_bar.y, 0);
        assert_eq!(layout.main_panel.y, 1);
        assert_eq!(layout.notice.y, layout.main_panel.y + layout.main_panel.height);
        assert_eq!(layout.help_bar.y, 23);
    }
}

// Keyboard input handling.
//
// Translates crossterm key events into local view changes (selection, pages,
// filter, sort) or protocol messages for the connection task.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use valdraft_app::view::{NoticeKind, SortColumn};
use valdraft_core::protocol::ClientMessage;

use super::ViewState;

/// What the UI loop should do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(ClientMessage),
    Quit,
}

/// Handle a keyboard event.
///
/// Returns `None` when the key was handled locally or ignored.
pub fn handle_key(key_event: KeyEvent, state: &mut ViewState) -> Option<Action> {
    // On Windows crossterm reports both press and release.
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL)
        && key_event.code == KeyCode::Char('c')
    {
        return Some(Action::Quit);
    }

    if state.filter_mode {
        handle_filter_mode(key_event, state);
        return None;
    }

    match key_event.code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.view.move_selection(-1);
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.view.move_selection(1);
            None
        }
        KeyCode::Left => {
            state.view.prev_page();
            None
        }
        KeyCode::Right => {
            state.view.next_page();
            None
        }
        KeyCode::Enter => confirm_pick(state),

        KeyCode::Char('/') => {
            state.filter_mode = true;
            state.filter_text = state.view.filter().unwrap_or_default().to_string();
            None
        }
        KeyCode::Esc => {
            state.filter_text.clear();
            state.view.set_filter("");
            state.view.clear_selection();
            state.view.clear_notice();
            None
        }

        KeyCode::Char('s') => sort(state, SortColumn::Name),
        KeyCode::Char('t') => sort(state, SortColumn::Team),
        KeyCode::Char('r') => sort(state, SortColumn::Rating),
        KeyCode::Char('$') => sort(state, SortColumn::Salary),

        KeyCode::Char('p') => {
            state.view.toggle_hide_picked();
            None
        }
        KeyCode::Char('R') => {
            if state.is_connected() {
                Some(Action::Send(ClientMessage::ListPicked))
            } else {
                state.view.set_notice(NoticeKind::Warning, "Not connected");
                None
            }
        }
        KeyCode::Char('q') => Some(Action::Quit),

        _ => None,
    }
}

fn sort(state: &mut ViewState, column: SortColumn) -> Option<Action> {
    state.view.sort_by(column);
    None
}

fn confirm_pick(state: &mut ViewState) -> Option<Action> {
    if !state.is_connected() {
        state
            .view
            .set_notice(NoticeKind::Warning, "Not connected, pick not sent");
        return None;
    }
    if state.view.pick_in_flight() {
        return None;
    }
    match state.view.begin_pick() {
        Some(player_name) => {
            state
                .view
                .set_notice(NoticeKind::Info, format!("Picking {player_name}..."));
            Some(Action::Send(ClientMessage::AttemptPick { player_name }))
        }
        None => {
            state
                .view
                .set_notice(NoticeKind::Info, "Select a player first");
            None
        }
    }
}

/// Typed characters edit the filter, which applies as you type. Enter keeps
/// it, Esc clears it.
fn handle_filter_mode(key_event: KeyEvent, state: &mut ViewState) {
    match key_event.code {
        KeyCode::Esc => {
            state.filter_mode = false;
            state.filter_text.clear();
        }
        KeyCode::Enter => {
            state.filter_mode = false;
        }
        KeyCode::Backspace => {
            state.filter_text.pop();
        }
        KeyCode::Char(c) => {
            state.filter_text.push(c);
        }
        _ => return,
    }
    state.view.set_filter(&state.filter_text);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

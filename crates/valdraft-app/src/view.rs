// Draft view controller: presentation state for one viewer of the draft.
//
// Holds the candidate list, a cached copy of the picked set, filter, sort and
// page, and at most one pending selection. The picked set here is only a
// cache: it is replaced by ledger snapshots and patched by pick events.
//
// Every load is tagged with a generation. `deactivate` bumps the generation,
// so results that were in flight when the viewer went away are dropped.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, info};

use valdraft_core::ledger::{PickError, PickRecord};
use valdraft_core::player::{normalize_name, PlayerRecord};
use valdraft_core::sync::PickEvent;

pub const DEFAULT_PAGE_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Name,
    Team,
    Rating,
    Salary,
}

impl SortColumn {
    /// Direction used when a column is first chosen. Numbers start with the
    /// highest values on top.
    fn initial_direction(self) -> SortDirection {
        match self {
            SortColumn::Name | SortColumn::Team => SortDirection::Ascending,
            SortColumn::Rating | SortColumn::Salary => SortDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// One-line message for the user about the last thing that happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Notice {
            kind,
            message: message.into(),
        }
    }
}

/// What the caller has to do after a pick result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickFollowUp {
    Nothing,
    /// The cached picked set is known to be stale; re-read it from the
    /// ledger and pass it to [`DraftView::replace_picked`].
    RefreshPicked,
}

/// A candidate as shown on the current page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRow<'a> {
    pub player: &'a PlayerRecord,
    pub picked: bool,
    pub selected: bool,
}

// ---------------------------------------------------------------------------
// DraftView
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DraftView {
    candidates: Vec<PlayerRecord>,
    picked: HashSet<String>,
    user: Option<String>,

    filter: Option<String>,
    sort: Option<SortOrder>,
    hide_picked: bool,
    page: usize,
    page_size: usize,

    /// Normalized name of the selected candidate.
    selected: Option<String>,
    /// Name handed out by `begin_pick` and not yet finished.
    in_flight: Option<String>,

    notice: Option<Notice>,
    needs_refresh: bool,

    generation: u64,
    active: bool,
    loaded: bool,
}

impl Default for DraftView {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl DraftView {
    pub fn new(page_size: usize) -> Self {
        DraftView {
            candidates: Vec::new(),
            picked: HashSet::new(),
            user: None,
            filter: None,
            sort: None,
            hide_picked: false,
            page: 0,
            page_size: page_size.max(1),
            selected: None,
            in_flight: None,
            notice: None,
            needs_refresh: false,
            generation: 0,
            active: true,
            loaded: false,
        }
    }

    // -- identity --------------------------------------------------------

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    // -- loading and cancellation ---------------------------------------

    /// Start a new load and return its generation. Results tagged with an
    /// older generation are ignored from now on.
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.active = true;
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The viewer went away. Anything still in flight is discarded when it
    /// arrives.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.generation += 1;
        self.in_flight = None;
        debug!(generation = self.generation, "draft view deactivated");
    }

    fn accepts(&self, generation: u64) -> bool {
        if !self.active || generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                active = self.active,
                "discarding stale load result"
            );
            return false;
        }
        true
    }

    /// Install candidates and the picked snapshot for load `generation`.
    /// Returns false if the result was stale and ignored.
    pub fn apply_roster(
        &mut self,
        generation: u64,
        candidates: Vec<PlayerRecord>,
        picked: HashSet<String>,
    ) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.candidates = candidates;
        self.loaded = true;
        self.install_picked(picked);
        self.clamp_page();
        true
    }

    /// Replace only the candidate list (e.g. after a roster refresh).
    pub fn replace_candidates(&mut self, generation: u64, candidates: Vec<PlayerRecord>) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.candidates = candidates;
        self.loaded = true;
        if let Some(key) = self.selected.clone() {
            if self.find(&key).is_none() {
                self.selected = None;
            }
        }
        self.clamp_page();
        true
    }

    /// Replace the cached picked set with an authoritative snapshot.
    pub fn replace_picked(&mut self, generation: u64, picked: HashSet<String>) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.install_picked(picked);
        self.clamp_page();
        true
    }

    fn install_picked(&mut self, picked: HashSet<String>) {
        self.picked = picked.iter().map(|k| normalize_name(k)).collect();
        self.needs_refresh = false;
        if let Some(key) = self.selected.clone() {
            if self.picked.contains(&key) && self.in_flight.is_none() {
                let name = self.display_name(&key);
                self.selected = None;
                self.notice = Some(Notice::new(
                    NoticeKind::Warning,
                    format!("{name} was picked by someone else"),
                ));
            }
        }
    }

    // -- live events -----------------------------------------------------

    /// Merge a pick event into the picked set. Returns true if it changed
    /// anything; repeats and echoes of our own picks change nothing.
    pub fn apply_event(&mut self, event: &PickEvent) -> bool {
        if !self.active || !event.is_insert() {
            return false;
        }
        let key = normalize_name(&event.new.name_key);
        if !self.picked.insert(key.clone()) {
            return false;
        }

        let ours = self.in_flight.as_deref().map(normalize_name).as_deref() == Some(key.as_str());
        if !ours && self.selected.as_deref() == Some(key.as_str()) {
            self.selected = None;
            let by = event
                .new
                .picked_by
                .as_deref()
                .map(|u| format!(" by {u}"))
                .unwrap_or_default();
            self.notice = Some(Notice::new(
                NoticeKind::Warning,
                format!("{} was just picked{by}", event.new.player_name),
            ));
        }
        self.clamp_page();
        true
    }

    // -- selection and picking --------------------------------------------

    /// Select a candidate by name, replacing any previous selection. Picked
    /// and unknown players cannot be selected, and the selection is locked
    /// while a pick is in flight.
    pub fn select(&mut self, name: &str) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        let key = normalize_name(name);
        if self.find(&key).is_none() || self.picked.contains(&key) {
            return false;
        }
        self.selected = Some(key);
        true
    }

    pub fn clear_selection(&mut self) {
        if self.in_flight.is_none() {
            self.selected = None;
        }
    }

    pub fn selected(&self) -> Option<&PlayerRecord> {
        self.selected.as_deref().and_then(|key| self.find(key))
    }

    pub fn pick_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start confirming the selection. Yields the player name to send to the
    /// ledger, or `None` when nothing is selected or a pick is already in
    /// flight.
    pub fn begin_pick(&mut self) -> Option<String> {
        if self.in_flight.is_some() || !self.active {
            return None;
        }
        let name = self.selected()?.name.clone();
        self.in_flight = Some(name.clone());
        Some(name)
    }

    /// Apply the ledger's answer to the pick started by `begin_pick`.
    pub fn finish_pick(&mut self, result: Result<PickRecord, PickError>) -> PickFollowUp {
        let Some(name) = self.in_flight.take() else {
            debug!("ignoring pick result with no pick in flight");
            return PickFollowUp::Nothing;
        };
        let key = normalize_name(&name);

        match result {
            Ok(record) => {
                info!(player = %record.player_name, "pick confirmed");
                self.picked.insert(normalize_name(&record.name_key));
                self.selected = None;
                self.notice = Some(Notice::new(
                    NoticeKind::Success,
                    format!("You picked {}", record.player_name),
                ));
                self.clamp_page();
                PickFollowUp::Nothing
            }
            Err(PickError::AlreadyPicked { .. }) => {
                self.picked.insert(key);
                self.selected = None;
                self.needs_refresh = true;
                self.notice = Some(Notice::new(
                    NoticeKind::Warning,
                    format!("{name} has already been picked"),
                ));
                self.clamp_page();
                PickFollowUp::RefreshPicked
            }
            Err(PickError::Transient { message }) => {
                self.notice = Some(Notice::new(
                    NoticeKind::Error,
                    format!("Could not pick {name}, try again ({message})"),
                ));
                PickFollowUp::Nothing
            }
            Err(PickError::Rejected { reason }) => {
                self.selected = None;
                self.notice = Some(Notice::new(
                    NoticeKind::Error,
                    format!("Pick rejected: {reason}"),
                ));
                PickFollowUp::Nothing
            }
        }
    }

    /// Whether the picked set is known to be stale.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    // -- filter, sort, pages ----------------------------------------------

    /// Case-insensitive substring filter on player names. Empty clears it.
    pub fn set_filter(&mut self, text: &str) {
        let text = text.trim().to_lowercase();
        self.filter = if text.is_empty() { None } else { Some(text) };
        self.page = 0;
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Sort by `column`; choosing the active column again flips direction.
    pub fn sort_by(&mut self, column: SortColumn) {
        self.sort = Some(match self.sort {
            Some(order) if order.column == column => SortOrder {
                column,
                direction: order.direction.flipped(),
            },
            _ => SortOrder {
                column,
                direction: column.initial_direction(),
            },
        });
        self.page = 0;
    }

    pub fn sort(&self) -> Option<SortOrder> {
        self.sort
    }

    pub fn toggle_hide_picked(&mut self) {
        self.hide_picked = !self.hide_picked;
        self.clamp_page();
    }

    pub fn hides_picked(&self) -> bool {
        self.hide_picked
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// At least 1, even with nothing to show.
    pub fn page_count(&self) -> usize {
        self.visible().len().div_ceil(self.page_size).max(1)
    }

    pub fn next_page(&mut self) -> bool {
        if self.page + 1 < self.page_count() {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    fn clamp_page(&mut self) {
        let last = self.page_count() - 1;
        if self.page > last {
            self.page = last;
        }
    }

    /// Move the selection `delta` selectable rows through the visible list,
    /// skipping picked players, and follow it to its page.
    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.in_flight.is_some() || delta == 0 {
            return false;
        }
        let visible = self.visible();
        let current = self
            .selected
            .as_deref()
            .and_then(|key| visible.iter().position(|p| p.key() == key));

        // Without a selection, start just outside the current page.
        let start = self.page * self.page_size;
        let mut pos: isize = match current {
            Some(i) => i as isize,
            None if delta > 0 => start as isize - 1,
            None => (start + self.page_size).min(visible.len()) as isize,
        };

        let step = delta.signum();
        let mut remaining = delta.abs();
        let mut target = None;
        loop {
            pos += step;
            if pos < 0 || pos as usize >= visible.len() {
                break;
            }
            if self.picked.contains(&visible[pos as usize].key()) {
                continue;
            }
            target = Some(pos as usize);
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }

        let Some(index) = target else {
            return false;
        };
        let key = visible[index].key();
        self.selected = Some(key);
        self.page = index / self.page_size;
        true
    }

    // -- reading ---------------------------------------------------------

    pub fn candidates(&self) -> &[PlayerRecord] {
        &self.candidates
    }

    pub fn picked(&self) -> &HashSet<String> {
        &self.picked
    }

    pub fn is_picked(&self, name: &str) -> bool {
        self.picked.contains(&normalize_name(name))
    }

    /// Filtered and sorted candidates across all pages.
    pub fn visible(&self) -> Vec<&PlayerRecord> {
        let mut players: Vec<&PlayerRecord> = self
            .candidates
            .iter()
            .filter(|p| match &self.filter {
                Some(text) => p.name.to_lowercase().contains(text.as_str()),
                None => true,
            })
            .filter(|p| !(self.hide_picked && self.picked.contains(&p.key())))
            .collect();

        if let Some(order) = self.sort {
            players.sort_by(|a, b| {
                let ord = compare(a, b, order.column);
                let ord = match order.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                };
                ord.then_with(|| a.key().cmp(&b.key()))
            });
        }
        players
    }

    /// Rows of the current page.
    pub fn rows(&self) -> Vec<ViewRow<'_>> {
        let selected = self.selected.as_deref();
        self.visible()
            .into_iter()
            .skip(self.page * self.page_size)
            .take(self.page_size)
            .map(|player| {
                let key = player.key();
                ViewRow {
                    player,
                    picked: self.picked.contains(&key),
                    selected: selected == Some(key.as_str()),
                }
            })
            .collect()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn set_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some(Notice::new(kind, message));
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    fn find(&self, key: &str) -> Option<&PlayerRecord> {
        self.candidates.iter().find(|p| p.key() == key)
    }

    fn display_name(&self, key: &str) -> String {
        self.find(key)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| key.to_string())
    }
}

fn compare(a: &PlayerRecord, b: &PlayerRecord, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Name => a.key().cmp(&b.key()),
        SortColumn::Team => a.team.to_lowercase().cmp(&b.team.to_lowercase()),
        SortColumn::Rating => a.rating.total_cmp(&b.rating),
        SortColumn::Salary => a.salary.total_cmp(&b.salary),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn player(name: &str, team: &str, rating: f64) -> PlayerRecord {
        PlayerRecord::new(name, team, vec!["jett".into()], rating, 100.0)
    }

    fn roster() -> Vec<PlayerRecord> {
        vec![
            player("TenZ", "SEN", 1.05),
            player("aspas", "LEV", 1.25),
            player("Derke", "FNC", 1.15),
            player("Less", "LOUD", 1.10),
            player("Boaster", "FNC", 0.90),
        ]
    }

    fn keys(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| normalize_name(n)).collect()
    }

    fn loaded(picked: &[&str]) -> DraftView {
        let mut view = DraftView::default();
        view.set_user(Some("me".into()));
        let generation = view.begin_load();
        assert!(view.apply_roster(generation, roster(), keys(picked)));
        view
    }

    fn record(name: &str, by: Option<&str>) -> PickRecord {
        PickRecord {
            id: 1,
            player_name: name.to_string(),
            name_key: normalize_name(name),
            picked_by: by.map(String::from),
            player_id: None,
            created_at: Utc::now(),
        }
    }

    fn names(view: &DraftView) -> Vec<String> {
        view.rows().iter().map(|r| r.player.name.clone()).collect()
    }

    #[test]
    fn rows_follow_candidate_order_without_sort() {
        let view = loaded(&[]);
        assert_eq!(names(&view), vec!["TenZ", "aspas", "Derke", "Less", "Boaster"]);
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let mut view = loaded(&[]);
        view.set_filter("AS");
        assert_eq!(names(&view), vec!["aspas", "Boaster"]);
        view.set_filter("  ");
        assert_eq!(view.filter(), None);
        assert_eq!(view.rows().len(), 5);
    }

    #[test]
    fn sorting_toggles_direction_on_same_column() {
        let mut view = loaded(&[]);
        view.sort_by(SortColumn::Rating);
        assert_eq!(names(&view)[0], "aspas");
        view.sort_by(SortColumn::Rating);
        assert_eq!(names(&view)[0], "Boaster");

        view.sort_by(SortColumn::Name);
        assert_eq!(names(&view), vec!["aspas", "Boaster", "Derke", "Less", "TenZ"]);
        view.sort_by(SortColumn::Name);
        assert_eq!(names(&view)[0], "TenZ");
    }

    #[test]
    fn team_sort_breaks_ties_by_name() {
        let mut view = loaded(&[]);
        view.sort_by(SortColumn::Team);
        assert_eq!(names(&view), vec!["Boaster", "Derke", "aspas", "Less", "TenZ"]);
    }

    #[test]
    fn pagination_splits_candidates() {
        let mut view = DraftView::new(2);
        let generation = view.begin_load();
        view.apply_roster(generation, roster(), HashSet::new());

        assert_eq!(view.page_count(), 3);
        assert_eq!(names(&view), vec!["TenZ", "aspas"]);
        assert!(view.next_page());
        assert!(view.next_page());
        assert_eq!(names(&view), vec!["Boaster"]);
        assert!(!view.next_page());
        assert!(view.prev_page());
        assert_eq!(view.page(), 1);
    }

    #[test]
    fn empty_view_has_one_page() {
        let view = DraftView::default();
        assert_eq!(view.page_count(), 1);
        assert!(view.rows().is_empty());
    }

    #[test]
    fn selecting_replaces_previous_selection() {
        let mut view = loaded(&[]);
        assert!(view.select("tenz"));
        assert!(view.select("Derke"));
        assert_eq!(view.selected().unwrap().name, "Derke");
        let selected: Vec<_> = view.rows().into_iter().filter(|r| r.selected).collect();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn picked_and_unknown_players_cannot_be_selected() {
        let mut view = loaded(&["aspas"]);
        assert!(!view.select("aspas"));
        assert!(!view.select("nobody"));
        assert!(view.selected().is_none());
    }

    #[test]
    fn begin_pick_hands_out_the_selection_once() {
        let mut view = loaded(&[]);
        assert_eq!(view.begin_pick(), None);
        view.select("Less");
        assert_eq!(view.begin_pick().as_deref(), Some("Less"));
        assert_eq!(view.begin_pick(), None);
        assert!(!view.select("TenZ"), "selection is locked while picking");
    }

    #[test]
    fn successful_pick_marks_player_immediately() {
        let mut view = loaded(&[]);
        view.select("Derke");
        view.begin_pick();

        let follow = view.finish_pick(Ok(record("Derke", Some("me"))));
        assert_eq!(follow, PickFollowUp::Nothing);
        assert!(view.is_picked("derke"));
        assert!(view.selected().is_none());
        assert_eq!(view.notice().unwrap().kind, NoticeKind::Success);
    }

    #[test]
    fn own_broadcast_after_success_is_a_no_op() {
        let mut view = loaded(&[]);
        view.select("Derke");
        view.begin_pick();
        let rec = record("Derke", Some("me"));
        view.finish_pick(Ok(rec.clone()));
        let notice = view.notice().cloned();

        assert!(!view.apply_event(&PickEvent::insert(rec)));
        assert_eq!(view.notice().cloned(), notice);
    }

    #[test]
    fn echo_arriving_before_result_keeps_selection_for_the_result() {
        let mut view = loaded(&[]);
        view.select("Derke");
        view.begin_pick();
        let rec = record("Derke", Some("me"));

        assert!(view.apply_event(&PickEvent::insert(rec.clone())));
        assert!(view.pick_in_flight());
        view.finish_pick(Ok(rec));
        assert_eq!(view.notice().unwrap().kind, NoticeKind::Success);
        assert!(view.selected().is_none());
    }

    #[test]
    fn already_picked_asks_for_refresh() {
        let mut view = loaded(&[]);
        view.select("aspas");
        view.begin_pick();

        let follow = view.finish_pick(Err(PickError::AlreadyPicked {
            player: "aspas".into(),
        }));
        assert_eq!(follow, PickFollowUp::RefreshPicked);
        assert!(view.needs_refresh());
        assert!(view.is_picked("aspas"));
        assert!(view.selected().is_none());
        assert_eq!(view.notice().unwrap().kind, NoticeKind::Warning);

        let generation = view.generation();
        assert!(view.replace_picked(generation, keys(&["aspas", "tenz"])));
        assert!(!view.needs_refresh());
        assert!(view.is_picked("TenZ"));
    }

    #[test]
    fn transient_failure_keeps_selection_for_retry() {
        let mut view = loaded(&[]);
        view.select("Less");
        view.begin_pick();

        view.finish_pick(Err(PickError::Transient {
            message: "database is locked".into(),
        }));
        assert_eq!(view.selected().unwrap().name, "Less");
        assert!(!view.is_picked("Less"));
        assert_eq!(view.notice().unwrap().kind, NoticeKind::Error);
        assert_eq!(view.begin_pick().as_deref(), Some("Less"));
    }

    #[test]
    fn rejected_pick_clears_selection() {
        let mut view = loaded(&[]);
        view.select("Less");
        view.begin_pick();
        view.finish_pick(Err(PickError::Rejected {
            reason: "Less is not on the candidate list".into(),
        }));
        assert!(view.selected().is_none());
        assert!(!view.is_picked("Less"));
    }

    #[test]
    fn foreign_pick_of_selection_clears_it_with_notice() {
        let mut view = loaded(&[]);
        view.select("TenZ");

        assert!(view.apply_event(&PickEvent::insert(record("TenZ", Some("rival")))));
        assert!(view.selected().is_none());
        let notice = view.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert!(notice.message.contains("rival"));
    }

    #[test]
    fn events_are_idempotent() {
        let mut view = loaded(&[]);
        let event = PickEvent::insert(record("Boaster", None));
        assert!(view.apply_event(&event));
        assert!(!view.apply_event(&event));
        assert_eq!(view.picked().len(), 1);
    }

    #[test]
    fn snapshot_that_takes_selection_clears_it() {
        let mut view = loaded(&[]);
        view.select("Less");
        let generation = view.generation();
        view.replace_picked(generation, keys(&["less"]));
        assert!(view.selected().is_none());
        assert!(view.notice().is_some());
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut view = DraftView::default();
        let old = view.begin_load();
        let new = view.begin_load();

        assert!(!view.apply_roster(old, roster(), HashSet::new()));
        assert!(!view.is_loaded());
        assert!(view.apply_roster(new, roster(), HashSet::new()));
        assert!(!view.replace_picked(old, keys(&["tenz"])));
        assert!(!view.is_picked("tenz"));
    }

    #[test]
    fn results_after_deactivate_are_discarded() {
        let mut view = DraftView::default();
        let generation = view.begin_load();
        view.deactivate();

        assert!(!view.apply_roster(generation, roster(), HashSet::new()));
        assert!(view.candidates().is_empty());
        assert!(!view.apply_event(&PickEvent::insert(record("x", None))));
    }

    #[test]
    fn pick_result_after_deactivate_is_ignored() {
        let mut view = loaded(&[]);
        view.select("Derke");
        view.begin_pick();
        view.deactivate();

        let follow = view.finish_pick(Err(PickError::AlreadyPicked {
            player: "Derke".into(),
        }));
        assert_eq!(follow, PickFollowUp::Nothing);
        assert!(!view.needs_refresh());
    }

    #[test]
    fn move_selection_skips_picked_and_follows_pages() {
        let mut view = DraftView::new(2);
        let generation = view.begin_load();
        view.apply_roster(generation, roster(), keys(&["aspas"]));

        assert!(view.move_selection(1));
        assert_eq!(view.selected().unwrap().name, "TenZ");
        assert!(view.move_selection(1));
        assert_eq!(view.selected().unwrap().name, "Derke");
        assert_eq!(view.page(), 1);
        assert!(view.move_selection(-1));
        assert_eq!(view.selected().unwrap().name, "TenZ");
        assert_eq!(view.page(), 0);
        assert!(!view.move_selection(-1));
    }

    #[test]
    fn hide_picked_removes_rows_and_clamps_page() {
        let mut view = DraftView::new(2);
        let generation = view.begin_load();
        view.apply_roster(generation, roster(), keys(&["derke", "less", "boaster"]));
        view.next_page();
        view.next_page();
        assert_eq!(view.page(), 2);

        view.toggle_hide_picked();
        assert_eq!(view.page_count(), 1);
        assert_eq!(view.page(), 0);
        assert_eq!(names(&view), vec!["TenZ", "aspas"]);
    }

    #[test]
    fn blank_user_is_treated_as_anonymous() {
        let mut view = DraftView::default();
        view.set_user(Some("   ".into()));
        assert_eq!(view.user(), None);
    }
}

// In-process draft session: one DraftView bound directly to a PickLedger and
// a live subscription. Used by embedders that share a process with the
// ledger; remote viewers get the same behavior through the server protocol.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use valdraft_core::ledger::{PickError, PickLedger, PickRecord, PickStore};
use valdraft_core::player::PlayerRecord;
use valdraft_core::sync::{Subscription, SubscriptionError};

use crate::view::{DraftView, NoticeKind, PickFollowUp};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Pick(#[from] PickError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("session is closed")]
    Closed,
}

pub struct DraftSession<S: PickStore> {
    ledger: Arc<PickLedger<S>>,
    view: DraftView,
    subscription: Option<Subscription>,
    /// Set on lag until a re-join succeeds.
    resync_pending: bool,
}

impl<S: PickStore> DraftSession<S> {
    /// Join the ledger (subscribe, then snapshot) and load `candidates`.
    pub fn open(
        ledger: Arc<PickLedger<S>>,
        candidates: Vec<PlayerRecord>,
        user: Option<String>,
    ) -> Result<Self, SessionError> {
        let mut view = DraftView::default();
        view.set_user(user);
        let generation = view.begin_load();

        let (picked, subscription) = ledger.join()?;
        view.apply_roster(generation, candidates, picked);
        info!(
            subscription = subscription.id(),
            user = ?view.user(),
            "draft session opened"
        );

        Ok(DraftSession {
            ledger,
            view,
            subscription: Some(subscription),
            resync_pending: false,
        })
    }

    pub fn view(&self) -> &DraftView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut DraftView {
        &mut self.view
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// A lag was seen and the picked set has not been re-read yet.
    pub fn needs_resync(&self) -> bool {
        self.resync_pending
    }

    pub fn select(&mut self, name: &str) -> bool {
        self.view.select(name)
    }

    /// Confirm the current selection against the ledger.
    ///
    /// `None` when there was nothing to confirm. On `AlreadyPicked` the
    /// picked set is re-read from the ledger before returning.
    pub fn confirm(&mut self) -> Option<Result<PickRecord, PickError>> {
        let name = self.view.begin_pick()?;
        let result = self.ledger.attempt_pick(&name, self.view.user());

        if self.view.finish_pick(result.clone()) == PickFollowUp::RefreshPicked {
            if let Err(e) = self.refresh() {
                warn!("picked set refresh after lost pick failed: {e}");
            }
        }
        Some(result)
    }

    /// Replace the cached picked set with the ledger's.
    pub fn refresh(&mut self) -> Result<(), SessionError> {
        let generation = self.view.generation();
        let picked = self.ledger.list_picked()?;
        self.view.replace_picked(generation, picked);
        Ok(())
    }

    /// Apply every queued event without waiting. Returns how many changed the
    /// view.
    ///
    /// A lagging subscription is replaced by a fresh join. If that join
    /// fails the error is returned, the session stays open and the next call
    /// tries again. A closed channel ends the session's subscription and is
    /// reported to the caller.
    pub fn pump(&mut self) -> Result<usize, SessionError> {
        let mut changed = 0;
        if self.resync_pending {
            self.resubscribe()?;
            changed += 1;
        }
        loop {
            let sub = self.subscription.as_mut().ok_or(SessionError::Closed)?;
            match sub.try_recv() {
                Ok(Some(event)) => {
                    if self.view.apply_event(&event) {
                        changed += 1;
                    }
                }
                Ok(None) => return Ok(changed),
                Err(SubscriptionError::Lagged { missed }) => {
                    warn!(missed, "draft session lagged, resubscribing");
                    self.resync_pending = true;
                    self.resubscribe()?;
                    changed += 1;
                }
                Err(SubscriptionError::Closed) => {
                    self.subscription = None;
                    self.view
                        .set_notice(NoticeKind::Error, "Live updates stopped");
                    return Err(SubscriptionError::Closed.into());
                }
            }
        }
    }

    /// Wait for the next event and apply it. Returns whether it changed the
    /// view.
    pub async fn next_event(&mut self) -> Result<bool, SessionError> {
        if self.resync_pending {
            self.resubscribe()?;
            return Ok(true);
        }
        let sub = self.subscription.as_mut().ok_or(SessionError::Closed)?;
        match sub.recv().await {
            Ok(event) => Ok(self.view.apply_event(&event)),
            Err(SubscriptionError::Lagged { missed }) => {
                warn!(missed, "draft session lagged, resubscribing");
                self.resync_pending = true;
                self.resubscribe()?;
                Ok(true)
            }
            Err(SubscriptionError::Closed) => {
                self.subscription = None;
                self.view
                    .set_notice(NoticeKind::Error, "Live updates stopped");
                Err(SubscriptionError::Closed.into())
            }
        }
    }

    /// Join the ledger again and replace the picked set.
    ///
    /// The current subscription is only released once the new join has
    /// succeeded, so a store failure here leaves the session open.
    pub fn resubscribe(&mut self) -> Result<(), SessionError> {
        if self.subscription.is_none() {
            return Err(SessionError::Closed);
        }
        let generation = self.view.generation();
        let (picked, subscription) = self.ledger.join()?;
        self.view.replace_picked(generation, picked);
        if let Some(old) = self.subscription.replace(subscription) {
            old.unsubscribe();
        }
        self.resync_pending = false;
        Ok(())
    }

    /// Release the subscription and deactivate the view.
    pub fn close(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
        self.view.deactivate();
        info!("draft session closed");
    }
}

impl<S: PickStore> Drop for DraftSession<S> {
    fn drop(&mut self) {
        if self.subscription.is_some() {
            self.close();
        }
    }
}

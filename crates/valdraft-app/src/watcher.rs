// Store watcher: tails the picks table and republishes rows on the local
// sync channel, so commits made by another process sharing the database
// reach this process's subscribers.
//
// Rows this process already announced are skipped. The watcher learns them
// from its own subscription to the channel; if that subscription lags, the
// missed rows may be announced twice, which receivers ignore.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use valdraft_core::ledger::{PickError, PickLedger, PickRecord, PickStore};
use valdraft_core::sync::{Subscription, SubscriptionError};

pub struct StoreWatcher<S: PickStore> {
    ledger: Arc<PickLedger<S>>,
    cursor: i64,
    local: Subscription,
    /// Ids already on the channel and not yet behind the cursor.
    announced: HashSet<i64>,
}

impl<S: PickStore + 'static> StoreWatcher<S> {
    /// Start tailing after the newest row currently stored. Older rows are
    /// already covered by every subscriber's join snapshot.
    pub fn new(ledger: Arc<PickLedger<S>>) -> Result<Self, PickError> {
        let cursor = ledger.latest_pick_id()?;
        Ok(Self::starting_at(ledger, cursor))
    }

    pub fn starting_at(ledger: Arc<PickLedger<S>>, cursor: i64) -> Self {
        let local = ledger.channel().subscribe();
        StoreWatcher {
            ledger,
            cursor,
            local,
            announced: HashSet::new(),
        }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Publish every row newer than the cursor that was not already
    /// announced locally. Returns how many were published.
    pub fn poll_once(&mut self) -> Result<usize, PickError> {
        self.drain_local();
        let rows = self.ledger.picks_after(self.cursor)?;
        Ok(self.publish(rows))
    }

    /// Record the ids of events already on the channel.
    fn drain_local(&mut self) {
        loop {
            match self.local.try_recv() {
                Ok(Some(event)) => {
                    self.announced.insert(event.new.id);
                }
                Ok(None) | Err(SubscriptionError::Closed) => break,
                Err(SubscriptionError::Lagged { missed }) => {
                    debug!(missed, "store watcher lost track of local picks");
                }
            }
        }
    }

    fn publish(&mut self, rows: Vec<PickRecord>) -> usize {
        let mut count = 0;
        for row in rows {
            self.cursor = self.cursor.max(row.id);
            if self.announced.contains(&row.id) {
                continue;
            }
            self.ledger.channel().publish(&row);
            count += 1;
        }
        let cursor = self.cursor;
        self.announced.retain(|&id| id > cursor);
        if count > 0 {
            debug!(count, cursor = self.cursor, "store watcher republished picks");
        }
        count
    }

    /// Poll every `interval` until the task is aborted. Reads run on a
    /// blocking thread; a failed read is logged and retried next tick.
    pub async fn run(mut self, interval: Duration) {
        info!(
            cursor = self.cursor,
            interval_ms = interval.as_millis() as u64,
            "store watcher started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.drain_local();

            let ledger = Arc::clone(&self.ledger);
            let cursor = self.cursor;
            let rows = match tokio::task::spawn_blocking(move || ledger.picks_after(cursor)).await {
                Ok(Ok(rows)) => rows,
                Ok(Err(e)) => {
                    warn!("store watcher poll failed: {e}");
                    continue;
                }
                Err(e) => {
                    warn!("store watcher poll task failed: {e}");
                    continue;
                }
            };
            self.publish(rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valdraft_core::db::Database;
    use valdraft_core::ledger::NewPick;
    use valdraft_core::sync::SyncChannel;

    fn ledger() -> Arc<PickLedger<Database>> {
        Arc::new(PickLedger::new(
            Database::open(":memory:").unwrap(),
            SyncChannel::new(16),
        ))
    }

    /// Insert straight into the store, the way another process would.
    fn foreign_pick(ledger: &PickLedger<Database>, name: &str) -> PickRecord {
        ledger
            .store()
            .insert_pick(&NewPick {
                player_name: name.into(),
                name_key: name.to_lowercase(),
                picked_by: Some("elsewhere".into()),
                player_id: None,
            })
            .unwrap()
    }

    #[test]
    fn starts_after_existing_rows() {
        let ledger = ledger();
        let first = foreign_pick(&ledger, "Leaf");

        let mut watcher = StoreWatcher::new(ledger.clone()).unwrap();
        assert_eq!(watcher.cursor(), first.id);
        assert_eq!(watcher.poll_once().unwrap(), 0);
    }

    #[test]
    fn foreign_commits_reach_local_subscribers() {
        let ledger = ledger();
        let mut watcher = StoreWatcher::new(ledger.clone()).unwrap();
        let mut sub = ledger.channel().subscribe();

        let a = foreign_pick(&ledger, "Leaf");
        let b = foreign_pick(&ledger, "Cryocells");

        assert_eq!(watcher.poll_once().unwrap(), 2);
        assert_eq!(watcher.cursor(), b.id);
        assert_eq!(sub.try_recv().unwrap().unwrap().new, a);
        assert_eq!(sub.try_recv().unwrap().unwrap().new, b);
        assert!(sub.try_recv().unwrap().is_none());

        // Nothing new, nothing published.
        assert_eq!(watcher.poll_once().unwrap(), 0);
    }

    #[test]
    fn local_commits_are_not_announced_twice() {
        let ledger = ledger();
        let mut watcher = StoreWatcher::new(ledger.clone()).unwrap();
        let mut sub = ledger.channel().subscribe();

        let local = ledger.attempt_pick("Boaster", Some("here")).unwrap();
        let foreign = foreign_pick(&ledger, "Leaf");

        assert_eq!(watcher.poll_once().unwrap(), 1);
        assert_eq!(watcher.cursor(), foreign.id);
        assert_eq!(sub.try_recv().unwrap().unwrap().new, local);
        assert_eq!(sub.try_recv().unwrap().unwrap().new, foreign);
        assert!(sub.try_recv().unwrap().is_none());

        // Its own republish is not mistaken for a new row either.
        assert_eq!(watcher.poll_once().unwrap(), 0);
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[test]
    fn lagged_local_feed_falls_back_to_republishing() {
        let ledger = Arc::new(PickLedger::new(
            Database::open(":memory:").unwrap(),
            SyncChannel::new(1),
        ));
        let mut watcher = StoreWatcher::new(ledger.clone()).unwrap();

        ledger.attempt_pick("Boaster", None).unwrap();
        ledger.attempt_pick("Derke", None).unwrap();

        // Boaster fell out of the watcher's buffer, so it goes out again.
        assert_eq!(watcher.poll_once().unwrap(), 1);
    }

    #[tokio::test]
    async fn run_polls_on_interval() {
        let ledger = ledger();
        let watcher = StoreWatcher::new(ledger.clone()).unwrap();
        let mut sub = ledger.channel().subscribe();
        let task = tokio::spawn(watcher.run(Duration::from_millis(20)));

        let row = foreign_pick(&ledger, "Leaf");
        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("watcher never published")
            .unwrap();
        assert_eq!(event.new, row);

        task.abort();
    }
}

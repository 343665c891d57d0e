//! Individual subscriber instances and their object-safe interface.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use types::{AgentId, SubscriberId, Timepoint};

use crate::config::{RecordKind, SubscriberConfig, SubscriberEntry, SubscriberError};
use crate::endpoint::Endpoint;
use crate::feed::RecordFeed;
use crate::record::Record;

/// Lifecycle flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubscriberFlag {
    /// Scheduled for destruction: flush the remaining records, then drop.
    Dying,
    /// Every record known so far has been converted and handed to the
    /// endpoint. Cleared when `update` stages new records.
    Flushed,
}

#[derive(Debug)]
struct SubscriberState<T> {
    /// The next timepoint to read; advances in `granularity` steps.
    cursor: Timepoint,
    /// Records pulled from the engine but not yet converted and sent.
    pending: BTreeMap<Timepoint, T>,
    /// Chunk-conversion state: set once the sentinel chunk has been
    /// produced, telling the conversion loop to stop.
    flush_ready: bool,
}

/// A typed subscriber: cursor discipline, pending buffer, and chunk
/// conversion for one record stream.
pub struct Subscriber<T: Record> {
    id: SubscriberId,
    config: SubscriberConfig,
    param: T::Param,
    endpoint: Arc<Endpoint>,
    state: Mutex<SubscriberState<T>>,
    flags: Mutex<BTreeSet<SubscriberFlag>>,
}

impl<T: Record> Subscriber<T> {
    pub fn new(
        id: SubscriberId,
        config: SubscriberConfig,
        param: T::Param,
        endpoint: Arc<Endpoint>,
    ) -> Self {
        // a fresh subscriber has nothing to flush
        let flags = BTreeSet::from([SubscriberFlag::Flushed]);

        Self {
            id,
            config,
            param,
            endpoint,
            state: Mutex::new(SubscriberState {
                cursor: Timepoint::ZERO,
                pending: BTreeMap::new(),
                flush_ready: false,
            }),
            flags: Mutex::new(flags),
        }
    }

    /// Produce the next chunk of at most `max_records`, or the sentinel once
    /// the pending buffer is exhausted, or `None` after the sentinel.
    fn convert_chunk(&self, max_records: usize) -> Option<Value> {
        let mut state = self.state.lock();

        if state.pending.is_empty() {
            if state.flush_ready {
                state.flush_ready = false;
                return None;
            }
            state.flush_ready = true;
            return Some(T::wrap_chunk(&self.param, &BTreeMap::new()));
        }

        let mut taken = BTreeMap::new();
        let keys: Vec<Timepoint> = state.pending.keys().take(max_records).copied().collect();
        for key in keys {
            if let Some(v) = state.pending.remove(&key) {
                taken.insert(key, v);
            }
        }
        Some(T::wrap_chunk(&self.param, &taken))
    }
}

/// Object-safe face of a subscriber, so price and agent-action subscribers
/// share one map.
pub trait AnySubscriber: Send + Sync {
    fn id(&self) -> SubscriberId;
    fn kind(&self) -> RecordKind;
    /// The agent selected by an `AGENT_ACTION` subscriber.
    fn agent_param(&self) -> Option<AgentId>;
    fn config(&self) -> &SubscriberConfig;
    fn endpoint(&self) -> &Arc<Endpoint>;
    fn pending_count(&self) -> usize;
    fn cursor(&self) -> Timepoint;

    /// Pull the records between the cursor and `now` into the pending
    /// buffer, advancing the cursor on the granularity grid.
    fn update(&self, feed: &dyn RecordFeed, now: Timepoint) -> Result<usize, SubscriberError>;

    /// Convert every pending record into chunks of at most `max_records`,
    /// followed by the sentinel chunk. Sets `Flushed` once the buffer is
    /// empty.
    fn convert_pending(&self, max_records: usize) -> Vec<Value>;

    fn has_flag(&self, flag: SubscriberFlag) -> bool;
    fn set_flag(&self, flag: SubscriberFlag, value: bool);
    fn describe(&self) -> SubscriberEntry;
}

impl<T: Record> AnySubscriber for Subscriber<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn kind(&self) -> RecordKind {
        T::KIND
    }

    fn agent_param(&self) -> Option<AgentId> {
        // the only parameterized stream is AGENT_ACTION
        (&self.param as &dyn std::any::Any)
            .downcast_ref::<AgentId>()
            .copied()
    }

    fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn cursor(&self) -> Timepoint {
        self.state.lock().cursor
    }

    fn update(&self, feed: &dyn RecordFeed, now: Timepoint) -> Result<usize, SubscriberError> {
        let mut state = self.state.lock();

        if state.cursor > now {
            return Err(SubscriberError::CursorAhead {
                cursor: state.cursor,
                now,
            });
        }

        let records = T::fetch(
            feed,
            &self.param,
            state.cursor,
            self.config.granularity,
            now,
        )?;
        let new_records = records.len();
        state.pending.extend(records);

        while state.cursor < now {
            state.cursor += self.config.granularity;
        }
        drop(state);

        if new_records > 0 {
            self.set_flag(SubscriberFlag::Flushed, false);
        }
        Ok(new_records)
    }

    fn convert_pending(&self, max_records: usize) -> Vec<Value> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.convert_chunk(max_records) {
            chunks.push(chunk);
        }
        if self.pending_count() == 0 {
            self.set_flag(SubscriberFlag::Flushed, true);
        }
        chunks
    }

    fn has_flag(&self, flag: SubscriberFlag) -> bool {
        self.flags.lock().contains(&flag)
    }

    fn set_flag(&self, flag: SubscriberFlag, value: bool) {
        let mut flags = self.flags.lock();
        if value {
            flags.insert(flag);
        } else {
            flags.remove(&flag);
        }
    }

    fn describe(&self) -> SubscriberEntry {
        SubscriberEntry {
            id: self.id,
            pending_records: self.pending_count(),
            endpoint: self.config.endpoint.to_string(),
            record_type: T::KIND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::feed::FeedError;
    use rust_decimal_macros::dec;
    use types::Price;

    /// A feed serving a fixed dense price sequence starting at t=0.
    struct FixedFeed {
        prices: Vec<Price>,
    }

    impl RecordFeed for FixedFeed {
        fn current_timepoint(&self) -> Timepoint {
            Timepoint(self.prices.len() as u64)
        }

        fn price_records(
            &self,
            from: Timepoint,
            granularity: u64,
            until: Timepoint,
        ) -> Result<Vec<(Timepoint, Price)>, FeedError> {
            let mut out = Vec::new();
            let mut tp = from;
            while tp < until {
                if let Some(p) = self.prices.get(tp.to_numeric() as usize) {
                    out.push((tp, *p));
                }
                tp += granularity;
            }
            Ok(out)
        }

        fn action_records(
            &self,
            _agent: AgentId,
            _from: Timepoint,
            _granularity: u64,
            _until: Timepoint,
        ) -> Result<Vec<(Timepoint, types::AgentAction)>, FeedError> {
            Err(FeedError::StreamMissing("no agents in this feed".into()))
        }
    }

    fn price_subscriber(granularity: u64) -> Subscriber<Price> {
        let config = SubscriberConfig {
            kind: RecordKind::Price,
            endpoint: EndpointConfig {
                remote_addr: "127.0.0.1".parse().unwrap(),
                remote_port: 9,
            },
            granularity,
            chunk_min_records: 0,
        };
        let endpoint = Arc::new(Endpoint::connect(config.endpoint.clone()).unwrap());
        Subscriber::new(SubscriberId(1), config, (), endpoint)
    }

    fn feed(n: usize) -> FixedFeed {
        FixedFeed {
            prices: (0..n).map(|i| dec!(1) + Price::from(i as i64)).collect(),
        }
    }

    #[test]
    fn test_update_pulls_on_grid() {
        // granularity 3 over 10 steps: floor(10/3) = 4 grid points below 10
        let sub = price_subscriber(3);
        let feed = feed(10);

        let n = sub.update(&feed, feed.current_timepoint()).unwrap();
        assert_eq!(n, 4); // t = 0, 3, 6, 9
        assert_eq!(sub.cursor(), Timepoint(12));
        assert!(!sub.has_flag(SubscriberFlag::Flushed));
    }

    #[test]
    fn test_update_is_incremental() {
        let sub = price_subscriber(1);
        let early = feed(4);
        sub.update(&early, early.current_timepoint()).unwrap();
        assert_eq!(sub.pending_count(), 4);

        let later = feed(6);
        let n = sub.update(&later, later.current_timepoint()).unwrap();
        assert_eq!(n, 2);
        assert_eq!(sub.pending_count(), 6);
    }

    #[test]
    fn test_cursor_ahead_fails_hard() {
        let sub = price_subscriber(1);
        let big = feed(8);
        sub.update(&big, big.current_timepoint()).unwrap();

        let small = feed(2);
        assert!(matches!(
            sub.update(&small, small.current_timepoint()),
            Err(SubscriberError::CursorAhead { .. })
        ));
    }

    #[test]
    fn test_convert_pending_chunks_and_sentinel() {
        let sub = price_subscriber(1);
        let feed = feed(5);
        sub.update(&feed, feed.current_timepoint()).unwrap();

        let chunks = sub.convert_pending(2);
        // 5 records in chunks of 2 -> 3 data chunks, then the sentinel
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3], serde_json::json!({"PRICE": {}}));
        assert_eq!(sub.pending_count(), 0);
        assert!(sub.has_flag(SubscriberFlag::Flushed));

        // a fresh conversion cycle emits its own sentinel again
        let again = sub.convert_pending(2);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0], serde_json::json!({"PRICE": {}}));
    }

    #[test]
    fn test_new_subscriber_starts_flushed() {
        let sub = price_subscriber(1);
        assert!(sub.has_flag(SubscriberFlag::Flushed));
        assert_eq!(sub.agent_param(), None);
    }
}

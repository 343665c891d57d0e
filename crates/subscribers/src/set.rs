//! The subscriber registry: endpoint sharing, engine-driven updates, inline
//! drains, and the background manager loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace};
use types::{AgentAction, AgentId, Price, SubscriberId, Timepoint};

use crate::config::{
    DeleteStatus, EndpointConfig, RecordKind, SubscriberEntry, SubscriberError, SubscriberSpec,
};
use crate::endpoint::Endpoint;
use crate::feed::RecordFeed;
use crate::subscriber::{AnySubscriber, Subscriber, SubscriberFlag};

/// Selects a subset of subscribers by the stream they observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    All,
    Price,
    Agent(AgentId),
}

impl StreamSelector {
    fn matches(&self, sub: &dyn AnySubscriber) -> bool {
        match self {
            StreamSelector::All => true,
            StreamSelector::Price => sub.kind() == RecordKind::Price,
            StreamSelector::Agent(id) => {
                sub.kind() == RecordKind::AgentAction && sub.agent_param() == Some(*id)
            }
        }
    }
}

/// Owns every live subscriber and the shared endpoint map.
///
/// Three parties use it: the engine (pushes fresh records between iteration
/// blocks and drains observers before destructive operations), the control
/// surface (add/del/list), and the manager thread (background convert+send).
pub struct SubscriberSet {
    subs: Mutex<BTreeMap<SubscriberId, Box<dyn AnySubscriber>>>,
    endpoints: Mutex<HashMap<EndpointConfig, Arc<Endpoint>>>,
    next_id: AtomicU64,

    /// Milliseconds between manager scans; a non-positive value makes the
    /// manager thread exit permanently.
    poll_interval_ms: AtomicI64,

    /// Upper bound on records per emitted chunk (datagram sizing).
    max_records_per_chunk: usize,

    shutdown: AtomicBool,
}

impl SubscriberSet {
    pub fn new(max_records_per_chunk: usize) -> Self {
        Self {
            subs: Mutex::new(BTreeMap::new()),
            endpoints: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            poll_interval_ms: AtomicI64::new(5000),
            max_records_per_chunk: max_records_per_chunk.max(1),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn set_poll_interval(&self, ms: i64) {
        self.poll_interval_ms.store(ms, Ordering::SeqCst);
    }

    /// Ask the manager thread to exit at its next scan.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Validate a spec, share or open its endpoint, and register the
    /// subscriber. Fails without touching the registry on bad config.
    pub fn add(&self, spec: SubscriberSpec) -> Result<SubscriberId, SubscriberError> {
        if spec.config.granularity == 0 {
            return Err(SubscriberError::Config(
                "granularity must be >= 1".to_string(),
            ));
        }
        match (spec.config.kind, spec.parameter) {
            (RecordKind::Price, Some(_)) => {
                return Err(SubscriberError::Config(
                    "PRICE subscribers take no parameter".to_string(),
                ));
            }
            (RecordKind::AgentAction, None) => {
                return Err(SubscriberError::Config(
                    "AGENT_ACTION subscribers require an agent id parameter".to_string(),
                ));
            }
            _ => {}
        }

        let endpoint = self.obtain_endpoint(&spec.config.endpoint)?;
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let sub: Box<dyn AnySubscriber> = match (spec.config.kind, spec.parameter) {
            (RecordKind::Price, _) => {
                Box::new(Subscriber::<Price>::new(id, spec.config, (), endpoint))
            }
            (RecordKind::AgentAction, Some(agent_id)) => Box::new(
                Subscriber::<AgentAction>::new(id, spec.config, agent_id, endpoint),
            ),
            (RecordKind::AgentAction, None) => unreachable!("rejected above"),
        };

        self.subs.lock().insert(id, sub);
        debug!(subscriber = %id, "added subscriber");
        Ok(id)
    }

    /// Delete one subscriber.
    ///
    /// With pending records it is only marked `Dying` (the manager flushes
    /// and destroys it); `sync` forces an inline flush and immediate
    /// destruction.
    pub fn del(&self, id: SubscriberId, sync: bool) -> DeleteStatus {
        let mut subs = self.subs.lock();
        let Some(sub) = subs.get(&id) else {
            return DeleteStatus::DoesNotExist;
        };

        if sync {
            self.flush_one(sub.as_ref());
        }

        if sub.pending_count() > 0 {
            sub.set_flag(SubscriberFlag::Dying, true);
            return DeleteStatus::Marked;
        }

        let removed = subs.remove(&id).expect("subscriber present under lock");
        let endpoint_config = removed.config().endpoint.clone();
        drop(removed);
        drop(subs);
        self.release_endpoint(&endpoint_config);
        debug!(subscriber = %id, "deleted subscriber");
        DeleteStatus::Deleted
    }

    /// Delete several subscribers, reporting the outcome per id.
    pub fn del_many(&self, ids: &[SubscriberId], sync: bool) -> Vec<(SubscriberId, DeleteStatus)> {
        ids.iter().map(|&id| (id, self.del(id, sync))).collect()
    }

    /// Describe every live subscriber.
    pub fn list(&self) -> Vec<SubscriberEntry> {
        self.subs.lock().values().map(|s| s.describe()).collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subs.lock().contains_key(&id)
    }

    // =========================================================================
    // Engine-driven data movement
    // =========================================================================

    /// Pull fresh records into every subscriber the selector matches.
    ///
    /// A subscriber that fails its update (cursor ahead of engine time,
    /// vanished stream) is logged and skipped this tick; the others proceed.
    /// Returns the total number of newly staged records.
    pub fn update_matching(
        &self,
        feed: &dyn RecordFeed,
        now: Timepoint,
        selector: StreamSelector,
    ) -> usize {
        let subs = self.subs.lock();
        let mut total = 0;
        for sub in subs.values().filter(|s| selector.matches(s.as_ref())) {
            match sub.update(feed, now) {
                Ok(n) => {
                    trace!(subscriber = %sub.id(), records = n, "subscriber updated");
                    total += n;
                }
                Err(e) => {
                    error!(subscriber = %sub.id(), error = %e, "subscriber update failed; skipping this tick");
                }
            }
        }
        total
    }

    /// Convert and emit every pending record of the matching subscribers on
    /// the calling thread: chunks, then the sentinel. Used by the engine's
    /// drain paths, where "everything emitted" must hold before returning.
    pub fn flush_matching(&self, selector: StreamSelector) {
        let subs = self.subs.lock();
        for sub in subs.values().filter(|s| selector.matches(s.as_ref())) {
            self.flush_one(sub.as_ref());
        }
    }

    /// Flush and destroy every subscriber observing the selected stream.
    /// The drain path for deleted agents: their observers cannot outlive
    /// the stream they read.
    pub fn retire_matching(&self, selector: StreamSelector) {
        let mut subs = self.subs.lock();
        let ids: Vec<SubscriberId> = subs
            .values()
            .filter(|s| selector.matches(s.as_ref()))
            .map(|s| s.id())
            .collect();

        for id in ids {
            if let Some(sub) = subs.get(&id) {
                self.flush_one(sub.as_ref());
            }
            if let Some(removed) = subs.remove(&id) {
                let endpoint_config = removed.config().endpoint.clone();
                drop(removed);
                self.release_endpoint(&endpoint_config);
                debug!(subscriber = %id, "retired subscriber");
            }
        }
    }

    fn flush_one(&self, sub: &dyn AnySubscriber) {
        for chunk in sub.convert_pending(self.max_records_per_chunk) {
            if let Err(e) = sub.endpoint().emit(&chunk) {
                error!(subscriber = %sub.id(), error = %e, "failed to emit chunk");
            }
        }
    }

    // =========================================================================
    // Manager thread
    // =========================================================================

    /// The background loop: periodically convert and send the pending
    /// records of every subscriber past its threshold (or Dying), destroy
    /// drained Dying subscribers, and sleep `poll_interval` between scans.
    ///
    /// Exits when [`SubscriberSet::shutdown`] is called or the poll interval
    /// is set to a non-positive value.
    pub fn run_manager(&self) {
        debug!("subscriber manager thread running");
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("subscriber manager shutting down");
                return;
            }

            {
                let mut subs = self.subs.lock();
                let mut drained: Vec<SubscriberId> = Vec::new();

                for (id, sub) in subs.iter() {
                    let dying = sub.has_flag(SubscriberFlag::Dying);
                    if dying || sub.pending_count() as u64 > sub.config().chunk_min_records {
                        self.flush_one(sub.as_ref());
                    }
                    if dying && sub.pending_count() == 0 {
                        drained.push(*id);
                    }
                }

                for id in drained {
                    if let Some(removed) = subs.remove(&id) {
                        let endpoint_config = removed.config().endpoint.clone();
                        drop(removed);
                        self.release_endpoint(&endpoint_config);
                        debug!(subscriber = %id, "destroyed dying subscriber");
                    }
                }
            }

            let interval = self.poll_interval_ms.load(Ordering::SeqCst);
            if interval <= 0 {
                debug!("non-positive poll interval; manager exiting");
                return;
            }
            std::thread::sleep(Duration::from_millis(interval as u64));
        }
    }

    // =========================================================================
    // Endpoint sharing
    // =========================================================================

    fn obtain_endpoint(&self, config: &EndpointConfig) -> Result<Arc<Endpoint>, SubscriberError> {
        let mut endpoints = self.endpoints.lock();
        if let Some(existing) = endpoints.get(config) {
            trace!(endpoint = %config, "sharing existing endpoint");
            return Ok(Arc::clone(existing));
        }

        let endpoint = Arc::new(
            Endpoint::connect(config.clone())
                .map_err(|e| SubscriberError::Endpoint(e.to_string()))?,
        );
        endpoints.insert(config.clone(), Arc::clone(&endpoint));
        debug!(endpoint = %config, "opened new endpoint");
        Ok(endpoint)
    }

    /// Drop the map entry once no subscriber references the endpoint.
    fn release_endpoint(&self, config: &EndpointConfig) {
        let mut endpoints = self.endpoints.lock();
        let orphaned = endpoints
            .get(config)
            .is_some_and(|e| Arc::strong_count(e) == 1);
        if orphaned {
            endpoints.remove(config);
            debug!(endpoint = %config, "closed endpoint");
        }
    }

    /// Strong count of the shared endpoint handle: number of live
    /// subscribers referencing it plus one for the map entry. `None` once
    /// the entry is gone. Test hook for the refcount invariant.
    pub fn endpoint_refcount(&self, config: &EndpointConfig) -> Option<usize> {
        self.endpoints
            .lock()
            .get(config)
            .map(|e| Arc::strong_count(e))
    }
}

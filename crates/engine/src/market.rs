//! The market engine: state, main loop, and the external API facade.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use agents::{Agent, AgentError, InfoView};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;
use subscribers::{FeedError, RecordFeed, StreamSelector, SubscriberSet};
use timeseries::{MarkMode, Ts, TsError};
use tracing::{debug, error, trace, warn};
use types::{
    AgentAction, AgentId, INITIAL_PRICE, Infoset, MAX_INTERNAL_FORCE, Price, Timepoint,
};

use crate::error::MarketError;
use crate::ops::{Op, OpQueue, OpReply, QueuedOp};
use crate::perf::PerfMap;
use crate::record::{AgentDescriptor, AgentFlag, AgentRecord};

/// Iteration block size used when `start` runs on an unconfigured market.
pub const DEFAULT_ITER_BLOCK: u64 = 100;

/// Poll period of [`Market::wait_for_pause`].
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Engine life-cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Paused,
    Running,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketConfig {
    /// Steps executed contiguously under the state lock; also the
    /// granularity at which external callers can interleave commands.
    pub iter_block: Option<u64>,
}

/// Everything guarded by the engine's single state lock.
struct EngineState {
    /// The next step to execute.
    timept: Timepoint,
    /// Price produced by the most recent step.
    current_price: Price,
    price_history: Ts<Price>,
    info_history: Ts<Infoset>,
    /// Greatest lower bound of the unread info across non-ignored agents;
    /// `None` until info exists (and after the history empties).
    info_watermark: Option<Timepoint>,
    /// Keyed by monotonically increasing id, so iteration order is
    /// insertion order — the canonical composition order of agent forces.
    agents: BTreeMap<AgentId, AgentRecord>,
    run_state: RunState,
    /// Iterations left to run; `None` means unbounded.
    remaining_iter: Option<u64>,
    perf: PerfMap,
}

impl EngineState {
    fn new() -> Self {
        Self {
            timept: Timepoint::ZERO,
            current_price: INITIAL_PRICE,
            price_history: Ts::new(Timepoint::ZERO, MarkMode::Missing),
            info_history: Ts::new(Timepoint::ZERO, MarkMode::Present),
            info_watermark: None,
            agents: BTreeMap::new(),
            run_state: RunState::Paused,
            remaining_iter: None,
            perf: PerfMap::new(),
        }
    }
}

/// Walk a series on the `granularity` grid from `from` (exclusive of
/// `until`), collecting present slots through a dense view.
fn collect_records<T: Clone>(
    ts: &Ts<T>,
    from: Timepoint,
    granularity: u64,
    until: Timepoint,
) -> Result<Vec<(Timepoint, T)>, FeedError> {
    let mut out = Vec::new();
    let Some(cursor) = ts.cursor() else {
        return Ok(out);
    };

    // first grid point inside the stored range
    let mut start = from;
    if start < ts.first_tp() {
        let behind = ts.first_tp() - start;
        start += behind.div_ceil(granularity) * granularity;
    }
    let end = until.min(cursor.next());
    if start >= end {
        return Ok(out);
    }

    let mut view = ts
        .view(Some(start), None)
        .map_err(|e| FeedError::Read(e.to_string()))?;
    while view.cursor() < end {
        if view.has_value() {
            let value = view.value().map_err(|e| FeedError::Read(e.to_string()))?;
            out.push((view.cursor(), value.clone()));
        }
        view.advance(granularity);
    }
    Ok(out)
}

impl RecordFeed for EngineState {
    fn current_timepoint(&self) -> Timepoint {
        self.timept
    }

    fn price_records(
        &self,
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, Price)>, FeedError> {
        collect_records(&self.price_history, from, granularity, until)
    }

    fn action_records(
        &self,
        agent: AgentId,
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, AgentAction)>, FeedError> {
        let record = self
            .agents
            .get(&agent)
            .ok_or_else(|| FeedError::StreamMissing(format!("agent {agent} not found")))?;
        collect_records(&record.history, from, granularity, until)
    }
}

/// Apply one agent evaluation: invoke the agent against the sub-step's
/// existing price, clamp its force, and compose the fractional move onto the
/// running price.
fn evaluate_step(
    agent: &mut dyn Agent,
    p_existing: Price,
    p_current: Price,
    info: &mut Option<InfoView<'_>>,
) -> Result<(AgentAction, Price), AgentError> {
    let action = agent.evaluate(p_existing, info)?.clamped();

    let force = (action.internal_force / MAX_INTERNAL_FORCE) * agent.base().external_force;
    let factor = match action.direction {
        types::Direction::Up => 1.0 + force,
        types::Direction::Down => 1.0 - force,
    };
    let factor = Price::from_f64(factor)
        .ok_or_else(|| AgentError::Numeric(format!("factor {factor} not representable")))?;

    Ok((action, p_current * factor))
}

/// Invoke one agent in isolation, the way the engine would during a step:
/// no engine, no subscribers. Returns the price one step would produce and
/// the action taken. The optional infoset is staged as a one-slot history.
pub fn test_evaluate(
    agent: &mut dyn Agent,
    p_existing: Price,
    p_current: Price,
    info: Option<Infoset>,
) -> Result<(Price, AgentAction), MarketError> {
    let mut history = Ts::new(Timepoint::ZERO, MarkMode::Present);
    let mut view = match info {
        Some(set) => {
            history.append(set);
            Some(
                history
                    .sparse_view(None)
                    .map_err(|e| MarketError::InfoRejected(e.to_string()))?,
            )
        }
        None => None,
    };

    let (action, price) = evaluate_step(agent, p_existing, p_current, &mut view)?;
    Ok((price, action))
}

enum WatermarkUpdate {
    /// Some participating agent has read nothing yet; hold position.
    Blocked,
    Cursor(Option<Timepoint>),
}

fn lowest_unignored_cursor(agents: &BTreeMap<AgentId, AgentRecord>) -> WatermarkUpdate {
    let mut lowest: Option<Timepoint> = None;
    for record in agents.values() {
        if record.flags.contains(&AgentFlag::IgnoreInfo) {
            continue;
        }
        match record.agent.info_cursor() {
            None => return WatermarkUpdate::Blocked,
            Some(c) => lowest = Some(lowest.map_or(c, |l| l.min(c))),
        }
    }
    WatermarkUpdate::Cursor(lowest)
}

/// The simulation engine and its thread-safe API facade.
///
/// Shared as `Arc<Market>` between the engine thread, the subscriber
/// manager, and any number of caller threads.
pub struct Market {
    inner: Mutex<EngineState>,
    ops: OpQueue,
    subscribers: Arc<SubscriberSet>,

    iter_block: AtomicU64,
    configured: AtomicBool,
    launched: AtomicBool,
    started: AtomicBool,
    shutdown: AtomicBool,
    next_agent_id: AtomicU64,
}

impl Market {
    pub fn new(subscribers: Arc<SubscriberSet>) -> Self {
        Self {
            inner: Mutex::new(EngineState::new()),
            ops: OpQueue::new(),
            subscribers,
            iter_block: AtomicU64::new(DEFAULT_ITER_BLOCK),
            configured: AtomicBool::new(false),
            launched: AtomicBool::new(false),
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            next_agent_id: AtomicU64::new(0),
        }
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Apply configuration. May be called at any time; only provided fields
    /// change.
    pub fn configure(&self, config: MarketConfig) {
        if let Some(iter_block) = config.iter_block {
            self.iter_block.store(iter_block.max(1), Ordering::SeqCst);
        }
        self.configured.store(true, Ordering::SeqCst);
    }

    /// Spawn the engine thread. It waits on the op queue until a `Start` op
    /// arrives, so agents can be added before any time advances. One-shot.
    pub fn launch(self: &Arc<Self>) -> Result<thread::JoinHandle<()>, MarketError> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(MarketError::AlreadyLaunched);
        }

        let market = Arc::clone(self);
        thread::Builder::new()
            .name("engine".to_string())
            .spawn(move || market.main_loop())
            .map_err(|e| MarketError::Spawn(e.to_string()))
    }

    /// Let the engine enter its main loop. One-shot; applies the default
    /// configuration if `configure` was never called.
    pub fn start(&self) -> Result<(), MarketError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MarketError::AlreadyStarted);
        }
        if !self.configured.load(Ordering::SeqCst) {
            self.configure(MarketConfig {
                iter_block: Some(DEFAULT_ITER_BLOCK),
            });
        }

        self.queue_op(Op::Start);
        Ok(())
    }

    /// Set the shutdown flag and wake the engine so it can exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.queue_op(Op::Shutdown);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Enqueue an op; returns the one-shot receiver for its reply.
    pub fn queue_op(&self, op: Op) -> Receiver<OpReply> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.ops.push(QueuedOp {
            op,
            done: Some(tx),
        });
        rx
    }

    /// Add `count` iterations (unbounded when `None`) and resume. The
    /// synchronous form: returns once the engine has observed the command.
    pub fn run(&self, count: Option<u64>) {
        let _ = self.queue_op(Op::Run(count)).recv();
    }

    /// Zero out pending iterations; the engine pauses at the next block
    /// boundary. The synchronous form.
    pub fn pause(&self) {
        let _ = self.queue_op(Op::Pause).recv();
    }

    /// Stop, remove all agents and subscribers (draining observers), and
    /// restore time 0 and the initial price.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.run_state = RunState::Paused;
        state.remaining_iter = Some(0);

        self.del_agents_locked(&mut state, None);

        let now = state.timept;
        self.subscribers.update_matching(&*state, now, StreamSelector::All);
        self.subscribers.retire_matching(StreamSelector::All);

        state.timept = Timepoint::ZERO;
        state.current_price = INITIAL_PRICE;
        state.price_history = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        state.info_history = Ts::new(Timepoint::ZERO, MarkMode::Present);
        state.info_watermark = None;
        debug!("market reset");
    }

    /// Poll until the engine is PAUSED. With a `deadline` and `require_time`
    /// unset, gives up once the current timepoint passes the deadline. With
    /// `require_time` set, additionally requires the pause to happen past
    /// the deadline; observing a pause at or below it with no pending
    /// iterations fails immediately (nothing will advance the clock).
    /// Returns the timepoint of the observed pause, or `None` on timeout or
    /// shutdown.
    pub fn wait_for_pause(
        &self,
        deadline: Option<Timepoint>,
        require_time: bool,
    ) -> Option<Timepoint> {
        loop {
            if self.is_shutdown() {
                return None;
            }

            {
                let state = self.inner.lock();
                if state.run_state == RunState::Paused {
                    match deadline {
                        Some(d) if require_time => {
                            if state.timept > d {
                                return Some(state.timept);
                            }
                            if state.remaining_iter.is_none_or(|r| r == 0) {
                                return None;
                            }
                        }
                        _ => return Some(state.timept),
                    }
                } else if !require_time
                    && let Some(d) = deadline
                    && state.timept > d
                {
                    return None;
                }
            }

            thread::sleep(PAUSE_POLL_INTERVAL);
        }
    }

    // =========================================================================
    // State inspection
    // =========================================================================

    pub fn run_state(&self) -> RunState {
        self.inner.lock().run_state
    }

    /// The next step to execute.
    pub fn current_timepoint(&self) -> Timepoint {
        self.inner.lock().timept
    }

    /// The price produced by the most recent step.
    pub fn current_price(&self) -> Price {
        self.inner.lock().current_price
    }

    pub fn perf_snapshot(&self) -> BTreeMap<String, BTreeMap<Timepoint, u64>> {
        self.inner.lock().perf.snapshot()
    }

    pub fn reset_perf(&self) {
        self.inner.lock().perf.reset();
    }

    // =========================================================================
    // Agents
    // =========================================================================

    /// Insert an agent; its history starts at the current timepoint.
    pub fn add_agent(&self, agent: Box<dyn Agent>) -> AgentId {
        let mut state = self.inner.lock();
        self.add_agent_locked(&mut state, agent)
    }

    fn add_agent_locked(&self, state: &mut EngineState, agent: Box<dyn Agent>) -> AgentId {
        let id = AgentId(self.next_agent_id.fetch_add(1, Ordering::SeqCst));

        let mut flags = BTreeSet::new();
        if !agent.uses_info() {
            flags.insert(AgentFlag::IgnoreInfo);
        }

        debug!(agent = %id, name = agent.name(), created = %state.timept, "added agent");
        state.agents.insert(
            id,
            AgentRecord {
                agent,
                id,
                created: state.timept,
                history: Ts::new(state.timept, MarkMode::Missing),
                flags,
            },
        );
        id
    }

    /// Delete the given agents (all of them when `None`). Observers of a
    /// deleted agent's stream are drained — final records, then the sentinel
    /// — and destroyed before the record goes away. Per-id `false` marks an
    /// unknown agent.
    pub fn del_agents(&self, ids: Option<&[AgentId]>) -> BTreeMap<AgentId, bool> {
        let mut state = self.inner.lock();
        self.del_agents_locked(&mut state, ids)
    }

    fn del_agents_locked(
        &self,
        state: &mut EngineState,
        ids: Option<&[AgentId]>,
    ) -> BTreeMap<AgentId, bool> {
        let targets: Vec<AgentId> = match ids {
            Some(ids) => ids.to_vec(),
            None => state.agents.keys().copied().collect(),
        };

        let mut outcome = BTreeMap::new();
        for id in targets {
            if !state.agents.contains_key(&id) {
                outcome.insert(id, false);
                continue;
            }

            let now = state.timept;
            self.subscribers
                .update_matching(&*state, now, StreamSelector::Agent(id));
            self.subscribers.retire_matching(StreamSelector::Agent(id));

            state.agents.remove(&id);
            debug!(agent = %id, "deleted agent");
            outcome.insert(id, true);
        }
        outcome
    }

    pub fn list_agents(&self) -> Vec<AgentDescriptor> {
        self.inner
            .lock()
            .agents
            .values()
            .map(|record| AgentDescriptor {
                id: record.id,
                created: record.created,
                history_count: record.history.len() as u64,
                flags: record.flags.iter().copied().collect(),
            })
            .collect()
    }

    // =========================================================================
    // Histories
    // =========================================================================

    /// An agent's action history. With `erase`, observers of the stream are
    /// flushed first and the history is moved out, replaced by an empty one
    /// starting at the current timepoint.
    pub fn get_agent_history(&self, id: AgentId, erase: bool) -> Option<Ts<AgentAction>> {
        let mut state = self.inner.lock();
        if !state.agents.contains_key(&id) {
            warn!(agent = %id, "get_agent_history: agent not found");
            return None;
        }

        if erase {
            let now = state.timept;
            self.subscribers
                .update_matching(&*state, now, StreamSelector::Agent(id));
            self.subscribers.flush_matching(StreamSelector::Agent(id));

            let record = state.agents.get_mut(&id)?;
            let fresh = Ts::new(now, MarkMode::Missing);
            Some(std::mem::replace(&mut record.history, fresh))
        } else {
            state.agents.get(&id).map(|record| record.history.clone())
        }
    }

    /// The price history. With `erase`, PRICE observers are flushed first
    /// and the history is moved out, replaced by an empty one.
    pub fn get_price_history(&self, erase: bool) -> Ts<Price> {
        let mut state = self.inner.lock();

        if erase {
            let now = state.timept;
            self.subscribers
                .update_matching(&*state, now, StreamSelector::Price);
            self.subscribers.flush_matching(StreamSelector::Price);

            let fresh = Ts::new(now, MarkMode::Missing);
            std::mem::replace(&mut state.price_history, fresh)
        } else {
            state.price_history.clone()
        }
    }

    // =========================================================================
    // Information channel
    // =========================================================================

    /// Append an infoset at the current timepoint. A second emit at the same
    /// timepoint merges into the existing slot instead of creating another.
    pub fn emit_info(&self, set: Infoset) -> Result<Timepoint, MarketError> {
        if !set.is_valid() {
            return Err(MarketError::InfoRejected(
                "infoset contains out-of-domain values".to_string(),
            ));
        }

        let mut state = self.inner.lock();
        let now = state.timept;

        match state.info_history.cursor() {
            Some(cursor) if cursor == now => {
                // merge with whatever occupies the current slot
                let existing = match state.info_history.at(cursor) {
                    Ok(slot) => slot.cloned(),
                    Err(e) => return Err(MarketError::InfoRejected(e.to_string())),
                };
                state.info_history.pop();

                let mut merged = set;
                if let Some(existing) = existing {
                    merged.merge(existing);
                }
                state.info_history.append(merged);
            }
            _ => {
                state
                    .info_history
                    .append_at(set, now)
                    .map_err(|e| MarketError::InfoRejected(e.to_string()))?;
            }
        }

        trace!(timepoint = %now, "info emitted");
        Ok(now)
    }

    // =========================================================================
    // Main loop
    // =========================================================================

    fn main_loop(&self) {
        debug!("engine thread running; waiting for start");
        while !self.started.load(Ordering::SeqCst) {
            if self.is_shutdown() {
                return;
            }
            let ops = self.ops.wait_drain();
            self.execute_ops(ops);
        }
        debug!("engine entering main loop");

        loop {
            if self.is_shutdown() {
                debug!("engine thread exiting");
                return;
            }

            let produced = {
                let mut state = self.inner.lock();
                if state.run_state == RunState::Running && !state.agents.is_empty() {
                    let block = self.iter_block.load(Ordering::SeqCst).max(1);
                    let r = block.min(state.remaining_iter.unwrap_or(block));
                    if r > 0 {
                        trace!(
                            iterations = r,
                            remaining = ?state.remaining_iter,
                            "executing iteration block"
                        );
                        self.run_block(&mut state, r);
                    } else {
                        debug!("no iterations remain; pausing");
                        state.run_state = RunState::Paused;
                    }
                    r
                } else {
                    if state.run_state == RunState::Running {
                        debug!("running with no agents; pausing");
                        state.run_state = RunState::Paused;
                    }
                    0
                }
            };

            if produced > 0 {
                // push fresh records to the subscribers, then service any
                // ops that arrived during the block
                let update_started = Instant::now();
                self.update_subscribers();
                self.inner
                    .lock()
                    .perf
                    .record("subscriber_update", update_started.elapsed());

                let ops = self.ops.try_drain();
                self.execute_ops(ops);
            } else {
                // paused (or no agents): sleep until an op arrives
                let ops = self.ops.wait_drain();
                self.execute_ops(ops);
            }
        }
    }

    /// Execute `r` contiguous steps while holding the state lock.
    fn run_block(&self, state: &mut EngineState, r: u64) {
        let view_started = Instant::now();
        let block_started;
        let had_view;

        {
            let EngineState {
                timept,
                current_price,
                price_history,
                info_history,
                info_watermark,
                agents,
                perf,
                ..
            } = &mut *state;

            // one sparse view over unread info for the whole block; None
            // when the history is empty or holds only absent slots
            let mut info_view: Option<InfoView<'_>> = if info_history.is_empty() {
                None
            } else {
                match info_history.sparse_view(*info_watermark) {
                    Ok(view) => Some(view),
                    Err(TsError::EmptySparseView(_)) => None,
                    Err(e) => {
                        error!(error = %e, "info view construction failed");
                        None
                    }
                }
            };
            had_view = info_view.is_some();
            perf.record("info_view", view_started.elapsed());

            block_started = Instant::now();
            for _ in 0..r {
                let existing_price = *current_price;
                let mut price = existing_price;

                for record in agents.values_mut() {
                    if !record.is_scheduled(*timept) {
                        // keep the history aligned with engine time
                        record.history.skip(1);
                        continue;
                    }

                    // resume the info stream where this agent left it
                    if let Some(view) = info_view.as_mut() {
                        match record.agent.info_cursor() {
                            None => view.reset(),
                            Some(cursor) => view.seek_past(cursor),
                        }
                    }

                    match evaluate_step(
                        record.agent.as_mut(),
                        existing_price,
                        price,
                        &mut info_view,
                    ) {
                        Ok((action, next_price)) => {
                            price = next_price;
                            record.history.append(action);
                        }
                        Err(e) => {
                            error!(
                                agent = %record.id,
                                error = %e,
                                "agent evaluation failed; skipping history entry"
                            );
                            record.history.skip(1);
                        }
                    }
                }

                *current_price = price;
                price_history.append(price);
                *timept += 1;
            }

            // recompute the global low-watermark over unread info
            if !info_history.is_empty() {
                if had_view {
                    match lowest_unignored_cursor(agents) {
                        // an unread agent pins the watermark in place
                        WatermarkUpdate::Blocked => {}
                        WatermarkUpdate::Cursor(cursor) => {
                            trace!(watermark = ?cursor, "info watermark updated");
                            *info_watermark = cursor;
                        }
                    }
                } else {
                    *info_watermark = None;
                }
            }
        }

        // no emits can have landed while the block held the state lock
        state.info_history.skip(r as usize);

        if let Some(remaining) = state.remaining_iter.as_mut() {
            *remaining = remaining.saturating_sub(r);
        }
        state.perf.record("iter_block", block_started.elapsed());
        trace!(
            price = %state.current_price,
            timepoint = %state.timept,
            "iteration block complete"
        );
    }

    fn update_subscribers(&self) {
        let state = self.inner.lock();
        let now = state.timept;
        self.subscribers
            .update_matching(&*state, now, StreamSelector::All);
    }

    fn execute_ops(&self, ops: Vec<QueuedOp>) {
        for queued in ops {
            trace!(op = ?queued.op, "executing op");
            let reply = self.execute_op(queued.op);
            if let Some(done) = queued.done {
                // the submitter may have dropped its receiver
                let _ = done.try_send(reply);
            }
        }
    }

    fn execute_op(&self, op: Op) -> OpReply {
        match op {
            Op::Start => {
                self.started.store(true, Ordering::SeqCst);
                OpReply::Done
            }
            Op::Run(count) => {
                let mut state = self.inner.lock();
                let pending = state.remaining_iter.unwrap_or(0);
                state.remaining_iter = count.map(|c| pending + c);
                state.run_state = RunState::Running;
                OpReply::Done
            }
            Op::Pause => {
                let mut state = self.inner.lock();
                state.remaining_iter = Some(0);
                state.run_state = RunState::Paused;
                OpReply::Done
            }
            Op::AddAgent(agent) => {
                let mut state = self.inner.lock();
                OpReply::AgentAdded(self.add_agent_locked(&mut state, agent))
            }
            Op::Shutdown => {
                self.shutdown.store(true, Ordering::SeqCst);
                OpReply::Done
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agents::{ConstantAgent, ConstantConfig};
    use rust_decimal_macros::dec;
    use types::{Direction, Info};

    fn constant_agent(direction: Direction, internal: f64) -> Box<dyn Agent> {
        Box::new(
            ConstantAgent::new(ConstantConfig {
                external_force: 0.01,
                schedule_every: 1,
                direction,
                internal_force: internal,
            })
            .unwrap(),
        )
    }

    fn market() -> Market {
        Market::new(Arc::new(SubscriberSet::new(1000)))
    }

    #[test]
    fn test_evaluate_step_composes_on_current_price() {
        let mut agent = constant_agent(Direction::Up, 100.0);
        let (price, action) =
            test_evaluate(agent.as_mut(), dec!(1), dec!(1.01), None).unwrap();

        // force applies to the running price, not the observed one
        assert_eq!(price, dec!(1.0201));
        assert_eq!(action.direction, Direction::Up);
    }

    #[test]
    fn test_test_evaluate_feeds_info() {
        let mut agent = agents::CohortAgentV1::new(agents::CohortV1Config {
            external_force: 0.01,
            schedule_every: 1,
            variance_multiplier: 0.0,
            force_threshold: 1.0,
            default_price_view: dec!(1),
        })
        .unwrap();

        let info = Infoset::from(vec![Info::Subjective {
            subjectivity_extent: 0.0,
            price_indication: dec!(2),
            is_relative: false,
        }]);

        let (price, action) =
            test_evaluate(&mut agent, dec!(1), dec!(1), Some(info)).unwrap();
        // the view moved to 2, so the agent pushes up from 1
        assert_eq!(action.direction, Direction::Up);
        assert!(price > dec!(1));
        assert_eq!(agent.info_cursor(), Some(Timepoint::ZERO));
    }

    #[test]
    fn test_emit_info_merges_at_same_timepoint() {
        let m = market();

        let first = Infoset::from(vec![Info::Subjective {
            subjectivity_extent: 10.0,
            price_indication: dec!(2),
            is_relative: false,
        }]);
        let second = Infoset::from(vec![Info::Subjective {
            subjectivity_extent: 20.0,
            price_indication: dec!(3),
            is_relative: false,
        }]);

        assert_eq!(m.emit_info(first).unwrap(), Timepoint::ZERO);
        assert_eq!(m.emit_info(second).unwrap(), Timepoint::ZERO);

        let state = m.inner.lock();
        assert_eq!(state.info_history.len(), 1);
        let merged = state
            .info_history
            .at(Timepoint::ZERO)
            .unwrap()
            .expect("merged slot present");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_emit_info_rejects_invalid_values() {
        let m = market();
        let invalid = Infoset::from(vec![Info::Subjective {
            subjectivity_extent: 400.0,
            price_indication: dec!(1),
            is_relative: false,
        }]);
        assert!(matches!(
            m.emit_info(invalid),
            Err(MarketError::InfoRejected(_))
        ));
    }

    #[test]
    fn test_add_then_delete_leaves_no_residue() {
        let m = market();
        let id = m.add_agent(constant_agent(Direction::Up, 1.0));
        assert_eq!(m.list_agents().len(), 1);

        let outcome = m.del_agents(Some(&[id]));
        assert_eq!(outcome[&id], true);
        assert!(m.list_agents().is_empty());

        // deleting again reports not-found
        let outcome = m.del_agents(Some(&[id]));
        assert_eq!(outcome[&id], false);
    }

    #[test]
    fn test_ignore_info_flag_follows_uses_info() {
        let m = market();
        m.add_agent(constant_agent(Direction::Up, 1.0));
        let listed = m.list_agents();
        assert_eq!(listed[0].flags, vec![AgentFlag::IgnoreInfo]);

        let cohort = agents::CohortAgentV1::new(agents::CohortV1Config {
            external_force: 0.01,
            schedule_every: 1,
            variance_multiplier: 0.0,
            force_threshold: 1.0,
            default_price_view: dec!(1),
        })
        .unwrap();
        m.add_agent(Box::new(cohort));
        let listed = m.list_agents();
        assert!(listed[1].flags.is_empty());
    }

    #[test]
    fn test_run_block_directly_advances_price() {
        // exercise the block executor without the engine thread
        let m = market();
        m.add_agent(constant_agent(Direction::Up, 100.0));

        let mut state = m.inner.lock();
        state.run_state = RunState::Running;
        state.remaining_iter = Some(3);
        m.run_block(&mut state, 3);

        assert_eq!(state.timept, Timepoint(3));
        assert_eq!(state.current_price, dec!(1.030301));
        assert_eq!(state.price_history.len(), 3);
        assert_eq!(state.remaining_iter, Some(0));
        // the block also skipped the info history forward
        assert_eq!(state.info_history.len(), 3);
    }

    #[test]
    fn test_opposing_constants_compose_in_insertion_order() {
        let m = market();
        m.add_agent(constant_agent(Direction::Up, 100.0));
        m.add_agent(constant_agent(Direction::Down, 100.0));

        let mut state = m.inner.lock();
        state.run_state = RunState::Running;
        state.remaining_iter = Some(1);
        m.run_block(&mut state, 1);

        // 1 * 1.01 * 0.99 = 0.9999
        assert_eq!(state.current_price, dec!(0.9999));
    }

    #[test]
    fn test_start_is_one_shot() {
        let m = market();
        assert!(m.start().is_ok());
        assert!(matches!(m.start(), Err(MarketError::AlreadyStarted)));
    }
}

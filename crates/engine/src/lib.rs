//! The crowdsim simulation engine.
//!
//! A [`Market`] owns the population of agents, the current price, and the
//! price/action/info histories. Its engine thread advances discrete time in
//! *iteration blocks*: contiguous runs of steps executed under the single
//! state lock, with subscriber updates and queued control operations
//! serviced at the block boundaries. External callers drive the engine
//! through the thread-safe API facade or, to sequence against other
//! commands, through the FIFO [`Op`] queue.
//!
//! # Threads and locks
//!
//! - the engine thread (spawned by [`Market::launch`]) runs the main loop;
//! - callers take the state mutex briefly per API call, or just enqueue
//!   ops; the op queue mutex is a leaf lock;
//! - the subscriber set has its own locking and is only entered while the
//!   state lock is held (state → subscribers, never inverted).

mod error;
mod market;
mod ops;
mod perf;
mod record;

pub use error::MarketError;
pub use market::{DEFAULT_ITER_BLOCK, Market, MarketConfig, RunState, test_evaluate};
pub use ops::{Op, OpQueue, OpReply, QueuedOp};
pub use perf::PerfMap;
pub use record::{AgentDescriptor, AgentFlag, AgentRecord};

//! Subscriber data-plane: ships selected time-series out of the process.
//!
//! A subscriber binds a record type (price or per-agent actions) to a
//! datagram endpoint. The engine pushes fresh records into subscribers
//! between iteration blocks ([`SubscriberSet::update_matching`]); a
//! background manager thread ([`SubscriberSet::run_manager`]) converts
//! pending records into JSON chunks and hands them to the shared endpoints,
//! so the simulation loop never waits on the network.
//!
//! Endpoints are shared: subscribers pointing at the same `(address, port)`
//! hold one refcounted [`Endpoint`]; the map entry is dropped when the last
//! subscriber referencing it dies.
//!
//! The engine is decoupled from this crate through the [`RecordFeed`] trait:
//! subscribers only know how to ask a feed for the records between their
//! cursor and the engine's current timepoint.

mod config;
mod endpoint;
mod feed;
mod record;
mod set;
mod subscriber;

pub use config::{
    DeleteStatus, EndpointConfig, RecordKind, SubscriberConfig, SubscriberEntry, SubscriberError,
    SubscriberSpec,
};
pub use endpoint::Endpoint;
pub use feed::{FeedError, RecordFeed};
pub use record::Record;
pub use set::{StreamSelector, SubscriberSet};
pub use subscriber::{AnySubscriber, Subscriber, SubscriberFlag};

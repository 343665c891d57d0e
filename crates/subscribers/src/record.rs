//! Association between record types and their stream, parameter, and wire
//! shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use types::{AgentAction, AgentId, Price, Timepoint};

use crate::config::RecordKind;
use crate::feed::{FeedError, RecordFeed};

/// A value that can flow through a subscriber: ties together the stream it
/// is pulled from, the parameter selecting that stream, and the outer JSON
/// shape of its chunks.
pub trait Record: Clone + Send + Serialize + 'static {
    const KIND: RecordKind;

    /// Stream selector: the agent id for actions, nothing for prices.
    type Param: Clone + Copy + Send + Sync + PartialEq + fmt::Debug + 'static;

    /// Pull the present records on the granularity grid in `[from, until)`.
    fn fetch(
        feed: &dyn RecordFeed,
        param: &Self::Param,
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, Self)>, FeedError>;

    /// Wrap a map of records into the outer chunk object. An empty map
    /// produces the sentinel chunk of the same shape.
    fn wrap_chunk(param: &Self::Param, records: &BTreeMap<Timepoint, Self>) -> Value;
}

impl Record for Price {
    const KIND: RecordKind = RecordKind::Price;
    type Param = ();

    fn fetch(
        feed: &dyn RecordFeed,
        _param: &(),
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, Price)>, FeedError> {
        feed.price_records(from, granularity, until)
    }

    /// `{"PRICE": {timepoint: value, …}}`
    fn wrap_chunk(_param: &(), records: &BTreeMap<Timepoint, Price>) -> Value {
        json!({ (RecordKind::Price.to_string()): records })
    }
}

impl Record for AgentAction {
    const KIND: RecordKind = RecordKind::AgentAction;
    type Param = AgentId;

    fn fetch(
        feed: &dyn RecordFeed,
        param: &AgentId,
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, AgentAction)>, FeedError> {
        feed.action_records(*param, from, granularity, until)
    }

    /// `{"AGENT_ACTION": {agent_id: {timepoint: action, …}}}`
    fn wrap_chunk(param: &AgentId, records: &BTreeMap<Timepoint, AgentAction>) -> Value {
        json!({ (RecordKind::AgentAction.to_string()): { (param.to_string()): records } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::Direction;

    #[test]
    fn test_price_chunk_shape() {
        let mut records = BTreeMap::new();
        records.insert(Timepoint(3), dec!(1.01));

        let chunk = Price::wrap_chunk(&(), &records);
        assert_eq!(chunk["PRICE"]["3"], "1.01");
    }

    #[test]
    fn test_action_chunk_shape() {
        let mut records = BTreeMap::new();
        records.insert(
            Timepoint(0),
            AgentAction::new(Direction::Up, 100.0),
        );

        let chunk = AgentAction::wrap_chunk(&AgentId(4), &records);
        assert_eq!(chunk["AGENT_ACTION"]["4"]["0"]["direction"], "UP");
        assert_eq!(chunk["AGENT_ACTION"]["4"]["0"]["internal_force"], 100.0);
    }

    #[test]
    fn test_sentinel_shapes() {
        let empty_price = Price::wrap_chunk(&(), &BTreeMap::new());
        assert_eq!(empty_price, json!({"PRICE": {}}));

        let empty_action = AgentAction::wrap_chunk(&AgentId(4), &BTreeMap::new());
        assert_eq!(empty_action, json!({"AGENT_ACTION": {"4": {}}}));
    }
}

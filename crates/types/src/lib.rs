//! Core types for the crowdsim market simulator.
//!
//! This crate provides the shared vocabulary of the simulation: discrete
//! time, the arbitrary-precision price, directional agent actions, and the
//! polymorphic information values that external callers feed to agents.

use std::fmt;
use std::ops::{Add, AddAssign, Rem, Sub};

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// The price every simulation starts from.
pub const INITIAL_PRICE: Price = rust_decimal::Decimal::ONE;

/// Upper bound on an agent's internal force; values beyond it are clamped.
pub const MAX_INTERNAL_FORCE: f64 = 100.0;

// =============================================================================
// Price
// =============================================================================

/// Market price. Arbitrary-precision decimal so that compounded per-step
/// factors (e.g. 1.01 × 1.01 × 1.01 = 1.030301) stay exact.
pub type Price = rust_decimal::Decimal;

// =============================================================================
// Time
// =============================================================================

/// Discrete simulation step index.
///
/// Timepoint 0 is the first step. The engine's "current timepoint" always
/// names the *next* step to be executed, so the price at step `t` is the
/// output of executing step `t - 1`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Default,
    From,
    Into,
)]
#[serde(transparent)]
pub struct Timepoint(pub u64);

impl Timepoint {
    pub const ZERO: Timepoint = Timepoint(0);

    /// Raw step index.
    #[inline]
    pub fn to_numeric(self) -> u64 {
        self.0
    }

    /// The immediately following timepoint.
    #[inline]
    pub fn next(self) -> Timepoint {
        Timepoint(self.0 + 1)
    }

    /// Saturating step backwards.
    #[inline]
    pub fn saturating_sub(self, steps: u64) -> Timepoint {
        Timepoint(self.0.saturating_sub(steps))
    }
}

impl Add<u64> for Timepoint {
    type Output = Timepoint;

    fn add(self, steps: u64) -> Timepoint {
        Timepoint(self.0 + steps)
    }
}

impl AddAssign<u64> for Timepoint {
    fn add_assign(&mut self, steps: u64) {
        self.0 += steps;
    }
}

impl Sub<Timepoint> for Timepoint {
    type Output = u64;

    /// Distance in steps. The left operand must not precede the right one.
    fn sub(self, earlier: Timepoint) -> u64 {
        self.0 - earlier.0
    }
}

impl Rem<u64> for Timepoint {
    type Output = u64;

    fn rem(self, modulus: u64) -> u64 {
        self.0 % modulus
    }
}

impl fmt::Display for Timepoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Core ID Types (Newtypes for type safety)
// =============================================================================

/// Unique identifier for agents. Handed out by a monotone counter, so id
/// order is insertion order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Default,
    From,
    Into,
)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for subscribers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Default,
    From,
    Into,
)]
#[serde(transparent)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Direction & AgentAction
// =============================================================================

/// Which way an agent pushes the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Parse error for [`Direction`].
#[derive(Debug, thiserror::Error)]
#[error("Direction must be either UP or DOWN; provided: {0}")]
pub struct DirectionParseError(String);

impl std::str::FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            other => Err(DirectionParseError(other.to_string())),
        }
    }
}

/// The investment action an agent takes at one scheduled step.
///
/// `internal_force` lives in `[0, 100]`; the engine clamps anything outside
/// that range before applying it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub direction: Direction,
    pub internal_force: f64,
}

impl AgentAction {
    /// Create an action with the internal force clamped into `[0, 100]`.
    pub fn new(direction: Direction, internal_force: f64) -> Self {
        Self {
            direction,
            internal_force: internal_force.clamp(0.0, MAX_INTERNAL_FORCE),
        }
    }

    /// Copy of this action with the force clamped into `[0, 100]`.
    pub fn clamped(self) -> Self {
        Self::new(self.direction, self.internal_force)
    }
}

// =============================================================================
// Information values
// =============================================================================

/// One unit of information emitted to the market by an external caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Info {
    /// A (partly) subjective indication of what the price "should" be.
    Subjective {
        /// 0 means completely objective, 100 completely subjective.
        subjectivity_extent: f64,
        /// The price inferred from the content of the information.
        price_indication: Price,
        /// When true, the indication is a premium relative to other
        /// non-relative indications rather than an absolute level.
        is_relative: bool,
    },
}

impl Info {
    /// Whether the carried fields are within their documented domains.
    pub fn is_valid(&self) -> bool {
        match self {
            Info::Subjective {
                subjectivity_extent,
                price_indication,
                is_relative,
            } => {
                (0.0..=MAX_INTERNAL_FORCE).contains(subjectivity_extent)
                    && (*is_relative || *price_indication >= Price::ZERO)
            }
        }
    }
}

/// An unordered collection of [`Info`] values, all emitted at one timepoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Infoset(pub Vec<Info>);

impl Infoset {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Absorb another infoset; two emits at the same timepoint end up as the
    /// union of their contents.
    pub fn merge(&mut self, other: Infoset) {
        self.0.extend(other.0);
    }

    pub fn push(&mut self, info: Info) {
        self.0.push(info);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Info> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every contained value is valid.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(Info::is_valid)
    }
}

impl From<Vec<Info>> for Infoset {
    fn from(v: Vec<Info>) -> Self {
        Self(v)
    }
}

impl IntoIterator for Infoset {
    type Item = Info;
    type IntoIter = std::vec::IntoIter<Info>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// Tests
// =============================================================================

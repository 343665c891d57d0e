//! Cohort reference agents: a population segment holding a subjective view
//! of the "correct" price, updated by incoming information, pushing the
//! market price toward that view.
//!
//! Version 2 contains a version 1 agent (composition) and adds a sampled
//! attraction point: instead of pulling straight toward the price view, it
//! draws from a piecewise-linear distribution stretched between the current
//! price and the view, shaped by eight config parameters.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Deserialize;
use types::{AgentAction, Direction, Info, MAX_INTERNAL_FORCE, Price, Timepoint};

use crate::traits::{Agent, AgentBuildError, AgentConfigBase, AgentError, InfoTap, InfoView};

/// Configuration for [`CohortAgentV1`].
#[derive(Debug, Clone, Deserialize)]
pub struct CohortV1Config {
    pub external_force: f64,
    pub schedule_every: u64,

    /// Scales the subjectivity extent of incoming info into the spread of
    /// the view-update factor.
    pub variance_multiplier: f64,

    /// Price distance at which the agent acts at full force. Must be > 0.
    pub force_threshold: f64,

    /// Price view before any information arrives.
    #[serde(default = "default_price_view")]
    pub default_price_view: Price,
}

fn default_price_view() -> Price {
    Price::ONE
}

/// Subjectivity extents arrive in `[0, 100]`; the view-update and
/// distribution math work on `[0, 1]`.
fn normalize_extent(extent: f64) -> f64 {
    (extent / MAX_INTERNAL_FORCE).clamp(0.0, 1.0)
}

fn price_to_f64(p: Price) -> Result<f64, AgentError> {
    p.to_f64()
        .ok_or_else(|| AgentError::Numeric(format!("price {p} not representable as f64")))
}

fn f64_to_price(x: f64) -> Result<Price, AgentError> {
    Price::from_f64(x).ok_or_else(|| AgentError::Numeric(format!("{x} not representable as decimal")))
}

/// Maintains a subjective price view and pushes the price toward it with
/// force proportional to the distance, saturating at `force_threshold`.
pub struct CohortAgentV1 {
    base: AgentConfigBase,
    variance_multiplier: f64,
    force_threshold: f64,
    price_view: Price,
    tap: InfoTap,
    rng: StdRng,
}

impl CohortAgentV1 {
    pub fn new(config: CohortV1Config) -> Result<Self, AgentBuildError> {
        let base = AgentConfigBase::new(config.external_force, config.schedule_every)?;
        if config.force_threshold <= 0.0 {
            return Err(AgentBuildError::Config(
                "force_threshold must be > 0".to_string(),
            ));
        }
        if config.variance_multiplier < 0.0 {
            return Err(AgentBuildError::Config(
                "variance_multiplier must be >= 0".to_string(),
            ));
        }

        Ok(Self {
            base,
            variance_multiplier: config.variance_multiplier,
            force_threshold: config.force_threshold,
            price_view: config.default_price_view,
            tap: InfoTap::new(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Current price view (testing hook).
    pub fn price_view(&self) -> Price {
        self.price_view
    }

    /// Override the price view (testing hook).
    pub fn set_price_view(&mut self, p: Price) {
        self.price_view = p;
    }

    /// Fold one subjective indication into the price view.
    ///
    /// The update factor is sampled from `N(0, variance_multiplier × s)` and
    /// mapped so that samples `x` and `-x` scale the indication by `1 + x`
    /// and `1 / (1 + x)` respectively. Relative indications currently leave
    /// the view unchanged.
    fn apply_subjective(
        &mut self,
        extent: f64,
        price_indication: Price,
        is_relative: bool,
    ) -> Result<(), AgentError> {
        let spread = self.variance_multiplier * normalize_extent(extent);
        let sample = if spread > 0.0 {
            Normal::new(0.0, spread)
                .map_err(|e| AgentError::Distribution(e.to_string()))?
                .sample(&mut self.rng)
        } else {
            0.0
        };

        let factor = if sample >= 0.0 {
            1.0 + sample
        } else {
            1.0 / (1.0 - sample)
        };

        if !is_relative {
            self.price_view = price_indication * f64_to_price(factor)?;
        }
        Ok(())
    }

    fn consume_info(&mut self, info: &mut Option<InfoView<'_>>) -> Result<(), AgentError> {
        while let Some(set) = self.tap.read_next(info) {
            for item in set.iter() {
                let Info::Subjective {
                    subjectivity_extent,
                    price_indication,
                    is_relative,
                } = item;
                self.apply_subjective(*subjectivity_extent, *price_indication, *is_relative)?;
            }
        }
        Ok(())
    }

    /// Force toward `attraction`, proportional to distance, saturating at
    /// the configured threshold.
    fn force_toward(&self, current_price: f64, attraction: f64) -> AgentAction {
        let diff = current_price - attraction;
        let internal_force = (diff.abs() / self.force_threshold).min(1.0) * MAX_INTERNAL_FORCE;
        let direction = if diff < 0.0 {
            Direction::Up
        } else {
            Direction::Down
        };
        AgentAction::new(direction, internal_force)
    }
}

impl Agent for CohortAgentV1 {
    fn base(&self) -> &AgentConfigBase {
        &self.base
    }

    fn evaluate(
        &mut self,
        current_price: Price,
        info: &mut Option<InfoView<'_>>,
    ) -> Result<AgentAction, AgentError> {
        self.consume_info(info)?;
        let current = price_to_f64(current_price)?;
        let view = price_to_f64(self.price_view)?;
        Ok(self.force_toward(current, view))
    }

    fn info_cursor(&self) -> Option<Timepoint> {
        self.tap.cursor()
    }

    fn uses_info(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "CohortAgentV1"
    }
}

// =============================================================================
// Version 2
// =============================================================================

/// The eight shape parameters of the v2 attraction distribution, all in
/// `[0, 1]`. See [`CohortAgentV2::distribution_points`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionShape {
    pub e_0: f64,
    pub i_0: f64,
    pub r_0: f64,
    pub r_1: f64,
    pub r_2: f64,
    pub i_1: f64,
    pub i_2: f64,
    pub e_1: f64,
}

impl DistributionShape {
    /// Build from the wire-format parameter list `[e_0, i_0, r_0, r_1, r_2,
    /// i_1, i_2, e_1]`.
    pub fn from_parameters(params: &[f64]) -> Result<Self, AgentBuildError> {
        if params.len() != 8 {
            return Err(AgentBuildError::Config(format!(
                "distribution_parameters needs exactly 8 values; provided: {}",
                params.len()
            )));
        }
        if params.iter().any(|x| !(0.0..=1.0).contains(x)) {
            return Err(AgentBuildError::Config(
                "values in distribution_parameters need to all be in [0,1]".to_string(),
            ));
        }

        Ok(Self {
            e_0: params[0],
            i_0: params[1],
            r_0: params[2],
            r_1: params[3],
            r_2: params[4],
            i_1: params[5],
            i_2: params[6],
            e_1: params[7],
        })
    }
}

/// Configuration for [`CohortAgentV2`]: the v1 fields plus the distribution
/// shape parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CohortV2Config {
    #[serde(flatten)]
    pub v1: CohortV1Config,
    pub distribution_parameters: Vec<f64>,
}

/// V2 cohort agent: contains a v1 agent and layers the sampled attraction
/// point on top of its price view.
pub struct CohortAgentV2 {
    inner: CohortAgentV1,
    shape: DistributionShape,
    /// Normalized subjectivity extent of the most recent subjective info.
    subjectivity_extent: f64,
}

impl CohortAgentV2 {
    pub fn new(config: CohortV2Config) -> Result<Self, AgentBuildError> {
        let shape = DistributionShape::from_parameters(&config.distribution_parameters)?;
        Ok(Self {
            inner: CohortAgentV1::new(config.v1)?,
            shape,
            subjectivity_extent: 0.0,
        })
    }

    /// Current price view (testing hook).
    pub fn price_view(&self) -> Price {
        self.inner.price_view()
    }

    /// Override the price view (testing hook).
    pub fn set_price_view(&mut self, p: Price) {
        self.inner.set_price_view(p);
    }

    /// Override the stored subjectivity extent, raw `[0, 100]` scale
    /// (testing hook).
    pub fn set_subjectivity_extent(&mut self, extent: f64) {
        self.subjectivity_extent = normalize_extent(extent);
    }

    fn consume_info(&mut self, info: &mut Option<InfoView<'_>>) -> Result<(), AgentError> {
        while let Some(set) = self.inner.tap.read_next(info) {
            for item in set.iter() {
                let Info::Subjective {
                    subjectivity_extent,
                    price_indication,
                    is_relative,
                } = item;
                self.inner
                    .apply_subjective(*subjectivity_extent, *price_indication, *is_relative)?;
                self.subjectivity_extent = normalize_extent(*subjectivity_extent);
            }
        }
        Ok(())
    }

    /// The points of the piecewise-linear attraction density between the
    /// current price and the price view.
    ///
    /// The x axis is split into seven segments whose widths are fractions of
    /// `d = |view - price|` picked by the shape parameters; the density
    /// heights blend "price inertia" (mass near the current price, scaled by
    /// the subjectivity extent `s`) with the pull of the view (mass near it,
    /// scaled by `r_0 (1 - s)`). Returns ascending xs with one y each;
    /// empty when `s = 0` or the geometry collapses.
    pub fn distribution_points(
        &self,
        price: Price,
        override_subjectivity_extent: Option<f64>,
    ) -> Result<(Vec<f64>, Vec<f64>), AgentError> {
        let s = override_subjectivity_extent
            .map(normalize_extent)
            .unwrap_or(self.subjectivity_extent);
        if s == 0.0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let DistributionShape {
            e_0,
            i_0,
            r_0,
            r_1,
            r_2,
            i_1,
            i_2,
            e_1,
        } = self.shape;

        let v = price_to_f64(self.inner.price_view)?;
        let c = price_to_f64(price)?;
        // the breadth of the distribution scales with the disagreement
        // between the view and the current price
        let d = (v - c).abs();

        let far = r_0 * (1.0 - s);
        let mut ys = vec![
            0.0,
            s,
            s, // current price
            far.min(s) + (far - s).abs() * r_2,
            far,
            far, // price view
            far,
            0.0,
        ];

        let mut segments = vec![
            e_0 * s * d,
            i_0 * s * d,
            (d - i_1 * s * d) * (1.0 - r_1 * s),
            (d - i_1 * s * d) * (r_1 * s),
            i_1 * s * d,
            i_2 * s * d,
            e_1 * s * d,
        ];

        // when the view sits below the price, the same construction runs
        // mirrored: the segment and height sequences reverse and the walk
        // starts below the view instead of below the price
        let upward = self.inner.price_view > price;
        if !upward {
            segments.reverse();
            ys.reverse();
        }
        let start_x = if upward {
            c - segments[1] - segments[0]
        } else {
            v - segments[1] - segments[0]
        };

        // assemble points left to right; zero-width segments collapse onto
        // the previous x
        let mut points: Vec<(f64, Vec<f64>)> = vec![(start_x, vec![ys[0]])];
        for (k, segment) in segments.iter().enumerate() {
            let next_y = ys[k + 1];
            let last = points
                .last_mut()
                .expect("points is seeded with the starting point");
            let new_x = last.0 + segment;
            if new_x == last.0 {
                last.1.push(next_y);
            } else {
                points.push((new_x, vec![next_y]));
            }
        }

        // consolidate duplicate x values into single y values: the anchor
        // points of the distribution (indices 2 and 5 in insertion order,
        // the current price and the price view) win; otherwise keep the
        // value closest to the center, i.e. the maximum
        let anchors = [2usize, 5usize];
        let mut xs_final = Vec::with_capacity(points.len());
        let mut ys_final = Vec::with_capacity(points.len());
        let mut consumed = 0usize;
        for (x, y_multi) in &points {
            xs_final.push(*x);
            let y = if y_multi.len() == 1 {
                y_multi[0]
            } else {
                anchors
                    .iter()
                    .find(|&&j| consumed <= j && j <= consumed + y_multi.len())
                    .map(|&j| ys[j])
                    .unwrap_or_else(|| y_multi.iter().copied().fold(f64::MIN, f64::max))
            };
            ys_final.push(y);
            consumed += y_multi.len();
        }

        Ok((xs_final, ys_final))
    }
}

impl Agent for CohortAgentV2 {
    fn base(&self) -> &AgentConfigBase {
        self.inner.base()
    }

    fn evaluate(
        &mut self,
        current_price: Price,
        info: &mut Option<InfoView<'_>>,
    ) -> Result<AgentAction, AgentError> {
        self.consume_info(info)?;

        let current = price_to_f64(current_price)?;
        let attraction = if self.subjectivity_extent > 0.0 {
            let (xs, ys) = self.distribution_points(current_price, None)?;
            match sample_piecewise_linear(&xs, &ys, &mut self.inner.rng) {
                Some(x) => x,
                // degenerate geometry (e.g. price equals view): fall back to
                // the plain price view
                None => price_to_f64(self.inner.price_view)?,
            }
        } else {
            price_to_f64(self.inner.price_view)?
        };

        Ok(self.inner.force_toward(current, attraction))
    }

    fn info_cursor(&self) -> Option<Timepoint> {
        self.inner.info_cursor()
    }

    fn uses_info(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "CohortAgentV2"
    }
}

/// Draw from the piecewise-linear density described by `(xs, ys)` via
/// inverse-CDF sampling over the trapezoid areas.
///
/// Returns `None` when the density carries no mass (fewer than two points or
/// zero total area).
fn sample_piecewise_linear<R: Rng>(xs: &[f64], ys: &[f64], rng: &mut R) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }

    let areas: Vec<f64> = (0..xs.len() - 1)
        .map(|i| (ys[i] + ys[i + 1]) / 2.0 * (xs[i + 1] - xs[i]))
        .collect();
    let total: f64 = areas.iter().sum();
    if !(total > 0.0) {
        return None;
    }

    let mut target = rng.r#gen::<f64>() * total;
    for (i, &area) in areas.iter().enumerate() {
        if target > area {
            target -= area;
            continue;
        }

        let (x0, x1, y0, y1) = (xs[i], xs[i + 1], ys[i], ys[i + 1]);
        let width = x1 - x0;
        if width <= 0.0 || area <= 0.0 {
            return Some(x0);
        }

        // solve  y0·t + (slope/2)·t² = target  for t in [0, width]
        let slope = (y1 - y0) / width;
        let t = if slope.abs() < f64::EPSILON * (y0.abs() + 1.0) {
            target / y0
        } else {
            let discriminant = (y0 * y0 + 2.0 * slope * target).max(0.0);
            (discriminant.sqrt() - y0) / slope
        };
        return Some(x0 + t.clamp(0.0, width));
    }

    // target landed beyond the last area by rounding; take the upper edge
    xs.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use timeseries::{MarkMode, Ts};
    use types::Infoset;

    fn v1_config() -> CohortV1Config {
        CohortV1Config {
            external_force: 0.01,
            schedule_every: 1,
            variance_multiplier: 0.0,
            force_threshold: 0.5,
            default_price_view: dec!(1),
        }
    }

    fn v2_config(params: Vec<f64>) -> CohortV2Config {
        CohortV2Config {
            v1: v1_config(),
            distribution_parameters: params,
        }
    }

    fn subjective(extent: f64, indication: Price) -> Infoset {
        Infoset::from(vec![Info::Subjective {
            subjectivity_extent: extent,
            price_indication: indication,
            is_relative: false,
        }])
    }

    #[test]
    fn test_v1_pushes_toward_view() {
        let mut agent = CohortAgentV1::new(v1_config()).unwrap();
        agent.set_price_view(dec!(2));

        // price below view: push up, |diff| = 1 >= threshold -> full force
        let action = agent.evaluate(dec!(1), &mut None).unwrap();
        assert_eq!(action.direction, Direction::Up);
        assert_eq!(action.internal_force, 100.0);

        // price above view: push down at partial force, |diff|/0.5 * 100
        let action = agent.evaluate(dec!(2.25), &mut None).unwrap();
        assert_eq!(action.direction, Direction::Down);
        assert!((action.internal_force - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_v1_zero_variance_adopts_indication_exactly() {
        let mut agent = CohortAgentV1::new(v1_config()).unwrap();

        let mut history = Ts::new(Timepoint::ZERO, MarkMode::Present);
        history.append(subjective(0.0, dec!(3)));
        let mut view = Some(history.sparse_view(None).unwrap());

        agent.evaluate(dec!(1), &mut view).unwrap();
        // variance_multiplier = 0 so the factor is exactly 1
        assert_eq!(agent.price_view(), dec!(3));
        assert_eq!(agent.info_cursor(), Some(Timepoint(0)));
    }

    #[test]
    fn test_v1_relative_info_keeps_view() {
        let mut agent = CohortAgentV1::new(v1_config()).unwrap();

        let mut history = Ts::new(Timepoint::ZERO, MarkMode::Present);
        history.append(Infoset::from(vec![Info::Subjective {
            subjectivity_extent: 10.0,
            price_indication: dec!(9),
            is_relative: true,
        }]));
        let mut view = Some(history.sparse_view(None).unwrap());

        agent.evaluate(dec!(1), &mut view).unwrap();
        assert_eq!(agent.price_view(), dec!(1));
    }

    #[test]
    fn test_shape_validation() {
        assert!(DistributionShape::from_parameters(&[0.1; 8]).is_ok());
        assert!(DistributionShape::from_parameters(&[0.1; 7]).is_err());
        assert!(DistributionShape::from_parameters(&[0.1, 0.1, 1.5, 0.1, 0.1, 0.1, 0.1, 0.1]).is_err());
    }

    #[test]
    fn test_v2_distribution_points_zero_extent_empty() {
        let agent = CohortAgentV2::new(v2_config(vec![0.2; 8])).unwrap();
        let (xs, ys) = agent.distribution_points(dec!(1.5), None).unwrap();
        assert!(xs.is_empty());
        assert!(ys.is_empty());
    }

    #[test]
    fn test_v2_distribution_points_geometry() {
        let mut agent = CohortAgentV2::new(v2_config(vec![0.2; 8])).unwrap();
        agent.set_price_view(dec!(2));
        agent.set_subjectivity_extent(50.0);

        let (xs, ys) = agent.distribution_points(dec!(1), None).unwrap();
        assert_eq!(xs.len(), ys.len());
        assert!(xs.len() >= 2);
        // xs ascend strictly after consolidation
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        // density is nonnegative and vanishes at both edges
        assert!(ys.iter().all(|&y| y >= 0.0));
        assert_eq!(*ys.first().unwrap(), 0.0);
        assert_eq!(*ys.last().unwrap(), 0.0);
        // the span covers both the current price and the view
        assert!(*xs.first().unwrap() <= 1.0 && *xs.last().unwrap() >= 2.0);
        // the current-price anchor carries height s (0.5 here)
        assert!(ys.contains(&0.5));
    }

    #[test]
    fn test_v2_distribution_points_mirror() {
        // view below price walks the same construction downward
        let mut agent = CohortAgentV2::new(v2_config(vec![0.2; 8])).unwrap();
        agent.set_price_view(dec!(1));
        agent.set_subjectivity_extent(50.0);

        let (xs, ys) = agent.distribution_points(dec!(2), None).unwrap();
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        assert!(*xs.first().unwrap() <= 1.0 && *xs.last().unwrap() >= 2.0);
        // mirrored, so the current-price mass sits on the right
        assert!(ys.contains(&0.5));
    }

    #[test]
    fn test_v2_samples_between_bounds() {
        let mut agent = CohortAgentV2::new(v2_config(vec![0.3; 8])).unwrap();
        agent.set_price_view(dec!(2));

        let mut history = Ts::new(Timepoint::ZERO, MarkMode::Present);
        history.append(subjective(60.0, dec!(2)));
        let mut view = Some(history.sparse_view(None).unwrap());

        // after consuming info the extent is positive, so evaluation samples
        let action = agent.evaluate(dec!(1), &mut view).unwrap();
        assert!((0.0..=100.0).contains(&action.internal_force));
    }

    #[test]
    fn test_v2_degenerate_geometry_falls_back_to_view() {
        // price == view: the distribution has no width; force should be the
        // plain pull toward the view, which is zero
        let mut agent = CohortAgentV2::new(v2_config(vec![0.3; 8])).unwrap();
        agent.set_price_view(dec!(1));
        agent.set_subjectivity_extent(40.0);

        let action = agent.evaluate(dec!(1), &mut None).unwrap();
        assert_eq!(action.internal_force, 0.0);
    }

    #[test]
    fn test_sample_piecewise_linear_stays_in_support() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [0.0, 2.0, 0.0];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let x = sample_piecewise_linear(&xs, &ys, &mut rng).unwrap();
            assert!((0.0..=3.0).contains(&x));
        }
    }

    #[test]
    fn test_sample_piecewise_linear_rejects_empty_mass() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sample_piecewise_linear(&[1.0], &[1.0], &mut rng).is_none());
        assert!(sample_piecewise_linear(&[0.0, 1.0], &[0.0, 0.0], &mut rng).is_none());
    }
}

//! Dense cursor over a [`Ts`].

use types::Timepoint;

use crate::{Ts, TsError};

/// A dense, forward-only cursor over a [`Ts`].
///
/// The cursor names the slot the next read comes from. Reads of absent slots
/// fail with [`TsError::Absent`]; reads past the stored range fail with
/// [`TsError::OutOfRange`]. An optional upper bound restricts how far the
/// view may be seeked.
#[derive(Debug, Clone)]
pub struct TsView<'a, T> {
    ts: &'a Ts<T>,
    cursor: Timepoint,
    lower: Timepoint,
    upper: Option<Timepoint>,
}

impl<'a, T> TsView<'a, T> {
    /// Construct a view positioned at `start` (defaults to the series
    /// start). Fails when `start` lies outside the stored range, which also
    /// covers the empty-series case.
    pub(crate) fn new(
        ts: &'a Ts<T>,
        start: Option<Timepoint>,
        upper: Option<Timepoint>,
    ) -> Result<Self, TsError> {
        let cursor = start.unwrap_or(ts.first_tp());
        ts.at(cursor)?;

        Ok(Self {
            ts,
            cursor,
            lower: ts.first_tp(),
            upper,
        })
    }

    /// Timepoint of the next slot to be read.
    pub fn cursor(&self) -> Timepoint {
        self.cursor
    }

    /// `(lower, upper)` navigation bounds; `None` means unbounded above.
    pub fn bounds(&self) -> (Timepoint, Option<Timepoint>) {
        (self.lower, self.upper)
    }

    fn in_bounds(&self, tp: Timepoint) -> bool {
        tp >= self.lower && self.upper.is_none_or(|u| tp <= u)
    }

    /// Position the cursor at `tp`. Fails when `tp` violates the bounds.
    pub fn seek_to(&mut self, tp: Timepoint) -> Result<(), TsError> {
        if !self.in_bounds(tp) {
            return Err(TsError::OutOfRange {
                tp,
                first_tp: self.lower,
                cursor: self.upper,
            });
        }
        self.cursor = tp;
        Ok(())
    }

    /// Step the cursor forward `n` slots. The cursor may pass the end of the
    /// stored data; subsequent reads then fail.
    pub fn advance(&mut self, n: u64) {
        self.cursor += n;
    }

    /// Read the value under the cursor.
    pub fn value(&self) -> Result<&'a T, TsError> {
        self.ts
            .at(self.cursor)?
            .ok_or(TsError::Absent(self.cursor))
    }

    /// Whether the slot under the cursor exists and holds a value.
    pub fn has_value(&self) -> bool {
        matches!(self.ts.at(self.cursor), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarkMode;

    fn sample() -> Ts<u32> {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        ts.append(10);
        ts.skip(1);
        ts.append(12);
        ts.append(13);
        ts
    }

    #[test]
    fn test_view_walk() {
        let ts = sample();
        let mut view = ts.view(None, None).unwrap();

        assert_eq!(view.cursor(), Timepoint(0));
        assert_eq!(view.value().unwrap(), &10);

        view.advance(1);
        assert!(!view.has_value());
        assert!(matches!(view.value(), Err(TsError::Absent(_))));

        view.advance(1);
        assert_eq!(view.value().unwrap(), &12);
    }

    #[test]
    fn test_view_from_offset() {
        let ts = sample();
        let view = ts.view(Some(Timepoint(2)), None).unwrap();
        assert_eq!(view.value().unwrap(), &12);
    }

    #[test]
    fn test_view_construction_requires_valid_start() {
        let ts = sample();
        assert!(ts.view(Some(Timepoint(9)), None).is_err());

        let empty: Ts<u32> = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        assert!(empty.view(None, None).is_err());
    }

    #[test]
    fn test_view_seek_respects_bounds() {
        let ts = sample();
        let mut view = ts.view(None, Some(Timepoint(2))).unwrap();

        view.seek_to(Timepoint(2)).unwrap();
        assert_eq!(view.value().unwrap(), &12);
        assert!(view.seek_to(Timepoint(3)).is_err());
    }

    #[test]
    fn test_view_past_end_reads_fail() {
        let ts = sample();
        let mut view = ts.view(None, None).unwrap();
        view.advance(10);
        assert!(!view.has_value());
        assert!(matches!(view.value(), Err(TsError::OutOfRange { .. })));
    }
}

//! Sparse cursor over the present slots of a [`Ts`].

use types::Timepoint;

use crate::{Ts, TsError};

/// A materialized cursor over only the present slots of a [`Ts`].
///
/// Construction walks the mark set once, capturing `(timepoint, &value)`
/// pairs in a sorted vector; afterwards stepping is O(1) and seeking is
/// O(log n). The captured range is fixed at construction time — values
/// appended later are not visible.
///
/// A sparse view is never empty: construction fails when the source holds no
/// present slot at or after the requested start.
#[derive(Debug, Clone)]
pub struct TsSparseView<'a, T> {
    entries: Vec<(Timepoint, &'a T)>,
    pos: usize,
}

impl<'a, T> TsSparseView<'a, T> {
    pub(crate) fn new(ts: &'a Ts<T>, start: Option<Timepoint>) -> Result<Self, TsError> {
        let start = start.unwrap_or(ts.first_tp());
        // Also rejects the empty series and a start beyond the cursor.
        ts.at(start)?;

        let offset = (start - ts.first_tp()) as usize;
        let entries: Vec<(Timepoint, &'a T)> = ts
            .present_indices_from(offset)
            .into_iter()
            .map(|i| {
                let value = ts
                    .slot(i)
                    .expect("present_indices_from only yields present slots");
                (ts.first_tp() + i as u64, value)
            })
            .collect();

        if entries.is_empty() {
            return Err(TsError::EmptySparseView(start));
        }

        Ok(Self { entries, pos: 0 })
    }

    /// First and last present timepoint (inclusive) contained by the view.
    pub fn bounds(&self) -> (Timepoint, Timepoint) {
        (
            self.entries[0].0,
            self.entries[self.entries.len() - 1].0,
        )
    }

    /// Timepoint of the current entry, or `None` once exhausted.
    pub fn cursor(&self) -> Option<Timepoint> {
        self.entries.get(self.pos).map(|(tp, _)| *tp)
    }

    /// Value of the current entry, or `None` once exhausted.
    pub fn value(&self) -> Option<&'a T> {
        self.entries.get(self.pos).map(|(_, v)| *v)
    }

    /// Step forward `n` present entries, saturating at the exhausted state.
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.entries.len());
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.entries.len()
    }

    /// Rewind to the first present entry.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Position the cursor at `tp`, which must be a present slot.
    pub fn seek_to(&mut self, tp: Timepoint) -> Result<(), TsError> {
        match self.entries.binary_search_by_key(&tp, |(t, _)| *t) {
            Ok(i) => {
                self.pos = i;
                Ok(())
            }
            Err(_) => Err(TsError::NotPresent(tp)),
        }
    }

    /// Position the cursor at the first present entry strictly after `tp`;
    /// the view becomes exhausted when no such entry exists.
    pub fn seek_past(&mut self, tp: Timepoint) {
        self.pos = self.entries.partition_point(|(t, _)| *t <= tp);
    }

    /// Number of present entries captured by the view.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        // construction guarantees at least one entry
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarkMode;

    /// Present slots at t ∈ {0, 5, 9}, built in the given mark mode.
    fn sample(mode: MarkMode) -> Ts<u32> {
        let mut ts = Ts::new(Timepoint::ZERO, mode);
        ts.append(100);
        ts.skip(4);
        ts.append(105);
        ts.skip(3);
        ts.append(109);
        ts
    }

    #[test]
    fn test_sparse_view_skips_absent_slots() {
        for mode in [MarkMode::Present, MarkMode::Missing] {
            let ts = sample(mode);
            let mut view = ts.sparse_view(None).unwrap();

            assert_eq!(view.bounds(), (Timepoint(0), Timepoint(9)));
            assert_eq!(view.cursor(), Some(Timepoint(0)));
            assert_eq!(view.value(), Some(&100));

            view.advance(1);
            assert_eq!(view.cursor(), Some(Timepoint(5)));
            view.advance(1);
            assert_eq!(view.cursor(), Some(Timepoint(9)));
            view.advance(1);
            assert!(view.is_exhausted());
            assert_eq!(view.value(), None);
        }
    }

    #[test]
    fn test_sparse_view_with_start_offset() {
        // start at t=3: bounds become (5, 9), two advances reach the end
        let ts = sample(MarkMode::Present);
        let mut view = ts.sparse_view(Some(Timepoint(3))).unwrap();

        assert_eq!(view.bounds(), (Timepoint(5), Timepoint(9)));
        view.advance(1);
        view.advance(1);
        assert!(view.is_exhausted());
    }

    #[test]
    fn test_sparse_view_empty_source_fails() {
        let empty: Ts<u32> = Ts::new(Timepoint::ZERO, MarkMode::Present);
        assert!(matches!(
            empty.sparse_view(None),
            Err(TsError::OutOfRange { .. })
        ));

        let mut only_absent: Ts<u32> = Ts::new(Timepoint::ZERO, MarkMode::Present);
        only_absent.skip(4);
        assert!(matches!(
            only_absent.sparse_view(None),
            Err(TsError::EmptySparseView(_))
        ));
    }

    #[test]
    fn test_sparse_view_all_read_from_start_fails() {
        let ts = sample(MarkMode::Present);
        // no present slots at or after t > 9 is unreachable (start must be
        // in range), but a start past the last present slot yields empty
        let mut beyond = Ts::new(Timepoint::ZERO, MarkMode::Present);
        beyond.append(1);
        beyond.skip(3);
        assert!(matches!(
            beyond.sparse_view(Some(Timepoint(2))),
            Err(TsError::EmptySparseView(_))
        ));

        // in-range start works
        assert!(ts.sparse_view(Some(Timepoint(9))).is_ok());
    }

    #[test]
    fn test_seek_to_present_only() {
        let ts = sample(MarkMode::Missing);
        let mut view = ts.sparse_view(None).unwrap();

        view.seek_to(Timepoint(5)).unwrap();
        assert_eq!(view.value(), Some(&105));

        assert!(matches!(
            view.seek_to(Timepoint(4)),
            Err(TsError::NotPresent(_))
        ));
    }

    #[test]
    fn test_seek_past() {
        let ts = sample(MarkMode::Present);
        let mut view = ts.sparse_view(None).unwrap();

        view.seek_past(Timepoint(0));
        assert_eq!(view.cursor(), Some(Timepoint(5)));

        view.seek_past(Timepoint(7));
        assert_eq!(view.cursor(), Some(Timepoint(9)));

        view.seek_past(Timepoint(9));
        assert!(view.is_exhausted());

        view.reset();
        assert_eq!(view.cursor(), Some(Timepoint(0)));
    }

    #[test]
    fn test_capture_is_fixed_at_construction() {
        let mut ts = sample(MarkMode::Present);
        let view_len = ts.sparse_view(None).unwrap().len();
        assert_eq!(view_len, 3);

        ts.append_at(112, Timepoint(12)).unwrap();
        // a new view sees the appended slot; the old capture would not have
        assert_eq!(ts.sparse_view(None).unwrap().len(), 4);
    }
}

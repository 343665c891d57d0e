//! Append-only time-series storage for the simulation.
//!
//! [`Ts`] emulates a `map<Timepoint, T>` with constant-time reads and seeks:
//! a contiguous run of optional slots indexed by a half-open range of
//! timepoints. Slots are appended at the high end only and deleted from the
//! low end only, and a slot is either a value of `T` or "absent".
//!
//! Every instance declares a [`MarkMode`]: either the present or the absent
//! slot indices are tracked explicitly (whichever side is expected to be
//! rarer), so a sparse reader can enumerate present slots in time
//! proportional to their count rather than to the length of the series.
//!
//! Two read views are provided:
//! - [`TsView`] — a dense cursor that walks every slot, used for streams
//!   where most slots hold values (prices, agent actions);
//! - [`TsSparseView`] — a materialized index of only the present slots,
//!   used for streams that are mostly absent (information history).
//!
//! Both views borrow the underlying [`Ts`]; the borrow checker enforces the
//! "source must outlive the view" rule the views rely on.

mod sparse;
mod view;

use std::collections::{BTreeMap, VecDeque};

use types::Timepoint;

pub use sparse::TsSparseView;
pub use view::TsView;

/// Which side of the present/absent split is tracked explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkMode {
    /// The indices of present slots are tracked (absent is the common case).
    Present,
    /// The indices of absent slots are tracked (present is the common case).
    Missing,
}

/// Errors produced by [`Ts`] and its views.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TsError {
    /// The requested timepoint lies outside the stored range.
    #[error("timepoint {tp} lies outside the series (first={first_tp}, cursor={cursor:?})")]
    OutOfRange {
        tp: Timepoint,
        first_tp: Timepoint,
        cursor: Option<Timepoint>,
    },

    /// `append_at` refused to overwrite an existing slot.
    #[error("append_at cannot overwrite: tp={tp}, cursor={cursor:?}")]
    Overwrite {
        tp: Timepoint,
        cursor: Option<Timepoint>,
    },

    /// A dense read landed on an absent slot.
    #[error("slot at timepoint {0} is absent")]
    Absent(Timepoint),

    /// A sparse view would contain no entries.
    #[error("sparse view cannot be empty: no present slots at or after {0}")]
    EmptySparseView(Timepoint),

    /// A sparse seek targeted a timepoint that is not a present slot.
    #[error("timepoint {0} is not a present slot")]
    NotPresent(Timepoint),
}

/// Append-only sequence of optional values indexed by timepoint.
///
/// `first_tp` is the timepoint of the first stored slot (or, while empty,
/// of the slot the next `append` will create). The cursor is the timepoint
/// of the most recently inserted slot and is undefined while empty.
#[derive(Debug, Clone)]
pub struct Ts<T> {
    seq: VecDeque<Option<T>>,
    /// Indices into `seq` on the side selected by `mark_mode`, ascending.
    marked: VecDeque<usize>,
    mark_mode: MarkMode,
    first_tp: Timepoint,
}

impl<T> Ts<T> {
    pub fn new(first_tp: Timepoint, mark_mode: MarkMode) -> Self {
        Self {
            seq: VecDeque::new(),
            marked: VecDeque::new(),
            mark_mode,
            first_tp,
        }
    }

    pub fn first_tp(&self) -> Timepoint {
        self.first_tp
    }

    pub fn mark_mode(&self) -> MarkMode {
        self.mark_mode
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Timepoint of the most recently inserted slot; `None` while empty.
    pub fn cursor(&self) -> Option<Timepoint> {
        if self.seq.is_empty() {
            None
        } else {
            Some(self.first_tp + (self.seq.len() as u64 - 1))
        }
    }

    /// Store `x` at the cursor's successor.
    pub fn append(&mut self, x: T) {
        self.seq.push_back(Some(x));
        if self.mark_mode == MarkMode::Present {
            self.marked.push_back(self.seq.len() - 1);
        }
    }

    /// Append `n` absent slots.
    pub fn skip(&mut self, n: usize) {
        let start = self.seq.len();
        for i in 0..n {
            self.seq.push_back(None);
            if self.mark_mode == MarkMode::Missing {
                self.marked.push_back(start + i);
            }
        }
    }

    /// Pad with absent slots up to `tp`, then store `x` there.
    ///
    /// Refuses to overwrite: fails when `tp` is at or below the cursor.
    pub fn append_at(&mut self, x: T, tp: Timepoint) -> Result<(), TsError> {
        if tp < self.first_tp {
            return Err(TsError::OutOfRange {
                tp,
                first_tp: self.first_tp,
                cursor: self.cursor(),
            });
        }

        let pos = (tp - self.first_tp) as usize;
        if pos < self.seq.len() {
            return Err(TsError::Overwrite {
                tp,
                cursor: self.cursor(),
            });
        }

        if pos > self.seq.len() {
            self.skip(pos - self.seq.len());
        }
        self.append(x);
        Ok(())
    }

    /// The optional value at `tp`. Fails when `tp` lies outside the stored
    /// range; absence inside the range is `Ok(None)`.
    pub fn at(&self, tp: Timepoint) -> Result<Option<&T>, TsError> {
        let out_of_range = || TsError::OutOfRange {
            tp,
            first_tp: self.first_tp,
            cursor: self.cursor(),
        };

        match self.cursor() {
            None => Err(out_of_range()),
            Some(cursor) if tp > cursor || tp < self.first_tp => Err(out_of_range()),
            Some(_) => Ok(self.seq[(tp - self.first_tp) as usize].as_ref()),
        }
    }

    /// Remove the last slot, returning the timepoint it occupied (which is
    /// now one past the new cursor). On an empty series, returns `first_tp`.
    pub fn pop(&mut self) -> Timepoint {
        let Some(popped_tp) = self.cursor() else {
            return self.first_tp;
        };

        let last_index = self.seq.len() - 1;
        // `marked` ascends, so the last slot's mark (if any) sits at the back.
        if self.marked.back() == Some(&last_index) {
            self.marked.pop_back();
        }
        self.seq.pop_back();
        popped_tp
    }

    /// Drop every slot with timepoint `< tp`, advancing `first_tp` to `tp`.
    /// Returns the number of slots dropped.
    pub fn delete_until(&mut self, tp: Timepoint) -> usize {
        if tp <= self.first_tp {
            return 0;
        }

        let diff = (tp - self.first_tp) as usize;
        let dropped = diff.min(self.seq.len());

        if diff >= self.seq.len() {
            self.seq.clear();
            self.marked.clear();
        } else {
            self.seq.drain(..diff);
            self.marked = self
                .marked
                .iter()
                .filter(|&&i| i >= diff)
                .map(|&i| i - diff)
                .collect();
        }

        self.first_tp = tp;
        dropped
    }

    /// Empty the series while preserving `first_tp`.
    pub fn clear(&mut self) {
        self.seq.clear();
        self.marked.clear();
    }

    /// Ascending indices of present slots at or after `offset`.
    pub(crate) fn present_indices_from(&self, offset: usize) -> Vec<usize> {
        match self.mark_mode {
            MarkMode::Present => self
                .marked
                .iter()
                .copied()
                .filter(|&i| i >= offset)
                .collect(),
            MarkMode::Missing => {
                // Walk the sequence and the (ascending) missing marks in
                // tandem, emitting every index not marked missing.
                let mut missing = self.marked.iter().copied().peekable();
                while missing.next_if(|&m| m < offset).is_some() {}

                let mut out = Vec::new();
                for i in offset..self.seq.len() {
                    if missing.next_if_eq(&i).is_some() {
                        continue;
                    }
                    out.push(i);
                }
                out
            }
        }
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&T> {
        self.seq[index].as_ref()
    }

    /// Dense view starting at `start` (defaults to `first_tp`), optionally
    /// bounded above by `upper`.
    pub fn view(
        &self,
        start: Option<Timepoint>,
        upper: Option<Timepoint>,
    ) -> Result<TsView<'_, T>, TsError> {
        TsView::new(self, start, upper)
    }

    /// Sparse view over present slots at or after `start` (defaults to
    /// `first_tp`). Fails when the result would be empty.
    pub fn sparse_view(&self, start: Option<Timepoint>) -> Result<TsSparseView<'_, T>, TsError> {
        TsSparseView::new(self, start)
    }
}

impl<T: Clone> Ts<T> {
    /// Snapshot of the present slots from `start` (defaults to `first_tp`)
    /// through the cursor, keyed by timepoint.
    pub fn to_map(&self, start: Option<Timepoint>) -> BTreeMap<Timepoint, T> {
        let mut out = BTreeMap::new();
        let Some(cursor) = self.cursor() else {
            return out;
        };

        let mut tp = start.unwrap_or(self.first_tp).max(self.first_tp);
        while tp <= cursor {
            if let Ok(Some(v)) = self.at(tp) {
                out.insert(tp, v.clone());
            }
            tp += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Enumerate the actual present timepoints by scanning every slot.
    fn scan_present(ts: &Ts<u32>) -> Vec<Timepoint> {
        let Some(cursor) = ts.cursor() else {
            return vec![];
        };
        let mut out = vec![];
        let mut tp = ts.first_tp();
        while tp <= cursor {
            if ts.at(tp).unwrap().is_some() {
                out.push(tp);
            }
            tp += 1;
        }
        out
    }

    /// The mark set must enumerate exactly the present (resp. missing)
    /// indices, ascending, after any sequence of operations.
    fn assert_marks_exact(ts: &Ts<u32>) {
        let present: Vec<usize> = (0..ts.len())
            .filter(|&i| ts.seq[i].is_some())
            .collect();
        let missing: Vec<usize> = (0..ts.len())
            .filter(|&i| ts.seq[i].is_none())
            .collect();

        let marked: Vec<usize> = ts.marked.iter().copied().collect();
        match ts.mark_mode() {
            MarkMode::Present => assert_eq!(marked, present),
            MarkMode::Missing => assert_eq!(marked, missing),
        }
    }

    #[test]
    fn test_append_and_cursor() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        assert!(ts.is_empty());
        assert_eq!(ts.cursor(), None);

        ts.append(10);
        ts.append(11);
        assert_eq!(ts.cursor(), Some(Timepoint(1)));
        assert_eq!(ts.at(Timepoint(0)).unwrap(), Some(&10));
        assert_eq!(ts.at(Timepoint(1)).unwrap(), Some(&11));
        assert_marks_exact(&ts);
    }

    #[test]
    fn test_at_out_of_range() {
        let mut ts = Ts::new(Timepoint(5), MarkMode::Missing);
        assert!(matches!(
            ts.at(Timepoint(5)),
            Err(TsError::OutOfRange { .. })
        ));

        ts.append(1);
        assert!(ts.at(Timepoint(4)).is_err());
        assert!(ts.at(Timepoint(6)).is_err());
        assert_eq!(ts.at(Timepoint(5)).unwrap(), Some(&1));
    }

    #[test]
    fn test_skip_marks_missing() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        ts.append(1);
        ts.skip(3);
        ts.append(2);

        assert_eq!(ts.cursor(), Some(Timepoint(4)));
        assert_eq!(ts.at(Timepoint(2)).unwrap(), None);
        assert_marks_exact(&ts);
        assert_eq!(scan_present(&ts), vec![Timepoint(0), Timepoint(4)]);
    }

    #[test]
    fn test_append_at_pads_and_refuses_overwrite() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Present);
        ts.append_at(7, Timepoint(3)).unwrap();

        assert_eq!(ts.len(), 4);
        assert_eq!(ts.at(Timepoint(1)).unwrap(), None);
        assert_eq!(ts.at(Timepoint(3)).unwrap(), Some(&7));
        assert_marks_exact(&ts);

        // spec: tp at or below the cursor must be refused
        assert!(matches!(
            ts.append_at(8, Timepoint(3)),
            Err(TsError::Overwrite { .. })
        ));
        assert!(matches!(
            ts.append_at(8, Timepoint(1)),
            Err(TsError::Overwrite { .. })
        ));

        ts.append_at(9, Timepoint(4)).unwrap();
        assert_eq!(ts.at(Timepoint(4)).unwrap(), Some(&9));
    }

    #[test]
    fn test_append_at_below_first_tp() {
        let mut ts = Ts::new(Timepoint(10), MarkMode::Present);
        assert!(matches!(
            ts.append_at(1, Timepoint(9)),
            Err(TsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_pop_unwinds_marks() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Present);
        ts.append(1);
        ts.skip(1);
        ts.append(3);

        assert_eq!(ts.pop(), Timepoint(2));
        assert_marks_exact(&ts);
        assert_eq!(ts.pop(), Timepoint(1));
        assert_marks_exact(&ts);
        assert_eq!(ts.cursor(), Some(Timepoint(0)));

        // popping an empty series reports first_tp
        let mut empty: Ts<u32> = Ts::new(Timepoint(4), MarkMode::Missing);
        assert_eq!(empty.pop(), Timepoint(4));
    }

    #[test]
    fn test_delete_until() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        for i in 0..6 {
            if i % 2 == 0 {
                ts.append(i);
            } else {
                ts.skip(1);
            }
        }

        assert_eq!(ts.delete_until(Timepoint(3)), 3);
        assert_eq!(ts.first_tp(), Timepoint(3));
        assert_marks_exact(&ts);

        // spec invariant 6: reads below the new first_tp are out of range
        assert!(matches!(
            ts.at(Timepoint(2)),
            Err(TsError::OutOfRange { .. })
        ));
        assert_eq!(ts.at(Timepoint(4)).unwrap(), Some(&4));

        // deleting at or before first_tp is a no-op
        assert_eq!(ts.delete_until(Timepoint(3)), 0);

        // deleting beyond the end empties the series and moves first_tp
        assert_eq!(ts.delete_until(Timepoint(100)), 3);
        assert!(ts.is_empty());
        assert_eq!(ts.first_tp(), Timepoint(100));
        assert_marks_exact(&ts);
    }

    #[test]
    fn test_clear_preserves_first_tp() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Missing);
        ts.append(1);
        ts.delete_until(Timepoint(1));
        ts.append(2);
        ts.clear();

        assert!(ts.is_empty());
        assert_eq!(ts.first_tp(), Timepoint(1));
    }

    #[test]
    fn test_to_map() {
        let mut ts = Ts::new(Timepoint::ZERO, MarkMode::Present);
        ts.append(1);
        ts.skip(2);
        ts.append(4);

        let all = ts.to_map(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[&Timepoint(0)], 1);
        assert_eq!(all[&Timepoint(3)], 4);

        let tail = ts.to_map(Some(Timepoint(1)));
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[&Timepoint(3)], 4);
    }

    #[test]
    fn test_mark_set_exact_after_mixed_operations() {
        for mode in [MarkMode::Present, MarkMode::Missing] {
            let mut ts = Ts::new(Timepoint::ZERO, mode);
            ts.append(1);
            ts.skip(2);
            ts.append(2);
            ts.append_at(3, Timepoint(6)).unwrap();
            ts.pop();
            ts.skip(1);
            ts.delete_until(Timepoint(2));
            assert_marks_exact(&ts);
        }
    }

    #[test]
    fn test_present_indices_from_both_modes() {
        for mode in [MarkMode::Present, MarkMode::Missing] {
            let mut ts = Ts::new(Timepoint::ZERO, mode);
            ts.append(0);
            ts.skip(2);
            ts.append(3);
            ts.skip(1);
            ts.append(5);

            assert_eq!(ts.present_indices_from(0), vec![0, 3, 5]);
            assert_eq!(ts.present_indices_from(1), vec![3, 5]);
            assert_eq!(ts.present_indices_from(4), vec![5]);
            assert_eq!(ts.present_indices_from(6), Vec::<usize>::new());
        }
    }
}

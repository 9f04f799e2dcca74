//! Time-windowed views into the history store.
//!
//! A slice resolves user-supplied offsets (seconds relative to run start)
//! to the nearest actually-recorded timestamps on a reference channel, then
//! applies the same resolved index range to every requested channel. Channels
//! with sparser data than the reference may therefore yield shorter or
//! misaligned slices; the sampling is assumed roughly synchronized across
//! channels and this approximation is intentional.

use std::collections::BTreeMap;

use crate::core::TOTAL_CHANNELS;
use crate::data::history::HistoryStore;

/// A time-window-restricted view of history, recomputed per request.
#[derive(Debug, Clone)]
pub struct SliceResult {
    /// Sliced `(timestamp, value)` rows per requested channel. Channels with
    /// nothing recorded inside the window are absent.
    pub history: BTreeMap<usize, Vec<(f64, f64)>>,
    /// Maximum over the sliced rows only, per channel present in `history`.
    /// Distinct from the run-wide running maximum.
    pub max_in_slice: BTreeMap<usize, f64>,
    /// Timestamp of the resolved window start, for elapsed-time axes.
    pub start_timestamp: f64,
}

/// Index of the recorded timestamp nearest to `target`.
///
/// Binary search over the non-decreasing axis; on an exact tie between the
/// two neighbors the earlier index wins.
fn nearest_index(timestamps: &[f64], target: f64) -> usize {
    let after = timestamps.partition_point(|&t| t < target);
    if after == 0 {
        return 0;
    }
    if after == timestamps.len() {
        return timestamps.len() - 1;
    }
    let before = after - 1;
    if (target - timestamps[before]).abs() <= (timestamps[after] - target).abs() {
        before
    } else {
        after
    }
}

/// Slice the requested channels to a `[start_offset, end_offset]` window.
///
/// Offsets are seconds relative to `run_start`. `None` defaults to the run
/// start and the last recorded timestamp respectively. Returns `None` when no
/// requested channel (nor any fallback channel) has recorded data.
pub fn slice_window(
    history: &HistoryStore,
    run_start: f64,
    channels: &[usize],
    start_offset: Option<f64>,
    end_offset: Option<f64>,
) -> Option<SliceResult> {
    let reference = history.reference_channel(channels)?;
    let axis: Vec<f64> = history
        .channel(reference)
        .iter()
        .map(|&(ts, _)| ts)
        .collect();
    if axis.is_empty() {
        return None;
    }

    let last_offset = axis[axis.len() - 1] - run_start;
    let start_offset = start_offset.unwrap_or(0.0);
    let end_offset = end_offset.unwrap_or(last_offset);

    let mut start_idx = nearest_index(&axis, run_start + start_offset);
    let mut end_idx = nearest_index(&axis, run_start + end_offset);
    if start_idx > end_idx {
        std::mem::swap(&mut start_idx, &mut end_idx);
    }

    let mut sliced = BTreeMap::new();
    let mut max_in_slice = BTreeMap::new();
    for &ch in channels {
        if ch >= TOTAL_CHANNELS {
            continue;
        }
        let series = history.channel(ch);
        if series.is_empty() {
            continue;
        }
        // Same resolved index range for every channel; clamp to what this
        // channel actually recorded.
        let lo = start_idx.min(series.len());
        let hi = (end_idx + 1).min(series.len());
        if lo >= hi {
            continue;
        }
        let rows: Vec<(f64, f64)> = series[lo..hi].to_vec();
        let max = rows
            .iter()
            .map(|&(_, v)| v)
            .fold(f64::NEG_INFINITY, f64::max);
        max_in_slice.insert(ch, max);
        sliced.insert(ch, rows);
    }

    Some(SliceResult {
        history: sliced,
        max_in_slice,
        start_timestamp: axis[start_idx],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sample;

    fn store_with(series: &[(usize, &[(f64, f64)])]) -> HistoryStore {
        let mut store = HistoryStore::new();
        // replay as samples so the store stays the only writer
        let mut stamps: Vec<f64> = series
            .iter()
            .flat_map(|(_, rows)| rows.iter().map(|&(ts, _)| ts))
            .collect();
        stamps.sort_by(f64::total_cmp);
        stamps.dedup();
        for ts in stamps {
            let mut sample = Sample::empty(ts);
            for (ch, rows) in series {
                if let Some(&(_, v)) = rows.iter().find(|&&(t, _)| t == ts) {
                    sample.values[*ch] = Some(v);
                }
            }
            store.ingest(&sample);
        }
        store
    }

    #[test]
    fn nearest_index_prefers_earlier_on_tie() {
        let axis = [0.0, 2.0, 4.0];
        assert_eq!(nearest_index(&axis, 1.0), 0); // equidistant: earlier wins
        assert_eq!(nearest_index(&axis, 1.1), 1);
        assert_eq!(nearest_index(&axis, -5.0), 0);
        assert_eq!(nearest_index(&axis, 9.0), 2);
        assert_eq!(nearest_index(&axis, 2.0), 1);
    }

    #[test]
    fn full_range_defaults_cover_every_sample() {
        let store = store_with(&[(0, &[(10.0, 1.0), (11.0, 2.0), (12.0, 3.0)])]);
        let slice = slice_window(&store, 10.0, &[0], None, None).unwrap();
        assert_eq!(slice.history[&0].len(), 3);
        assert_eq!(slice.start_timestamp, 10.0);
        assert_eq!(slice.max_in_slice[&0], 3.0);
    }

    #[test]
    fn window_restricts_rows_and_max() {
        let store = store_with(&[(
            0,
            &[(10.0, 1.0), (11.0, 9.0), (12.0, 3.0), (13.0, 4.0)],
        )]);
        // offsets 1.9..=3.2 resolve to timestamps 12.0 and 13.0
        let slice = slice_window(&store, 10.0, &[0], Some(1.9), Some(3.2)).unwrap();
        assert_eq!(slice.history[&0], vec![(12.0, 3.0), (13.0, 4.0)]);
        assert_eq!(slice.max_in_slice[&0], 4.0);
        assert_eq!(slice.start_timestamp, 12.0);
    }

    #[test]
    fn inverted_window_is_swapped() {
        let store = store_with(&[(0, &[(10.0, 1.0), (11.0, 2.0), (12.0, 3.0)])]);
        let slice = slice_window(&store, 10.0, &[0], Some(2.0), Some(0.0)).unwrap();
        assert_eq!(slice.history[&0].len(), 3);
    }

    #[test]
    fn sparse_channel_slices_by_reference_indices() {
        let store = store_with(&[
            (0, &[(10.0, 1.0), (11.0, 2.0), (12.0, 3.0), (13.0, 4.0)]),
            (1, &[(10.0, 5.0), (12.0, 6.0)]),
        ]);
        // reference is channel 0; indices 2..=3 of channel 1 are clamped to
        // its own two recorded rows, of which none fall in [2, 3]
        let slice = slice_window(&store, 10.0, &[0, 1], Some(2.0), Some(3.0)).unwrap();
        assert_eq!(slice.history[&0], vec![(12.0, 3.0), (13.0, 4.0)]);
        assert!(!slice.history.contains_key(&1));
    }

    #[test]
    fn falls_back_to_any_channel_with_data() {
        let store = store_with(&[(5, &[(10.0, 1.0), (11.0, 2.0)])]);
        // requested channel has no data, reference falls back to channel 5,
        // but only requested channels appear in the result
        let slice = slice_window(&store, 10.0, &[2], None, None).unwrap();
        assert!(slice.history.is_empty());
        assert_eq!(slice.start_timestamp, 10.0);
    }

    #[test]
    fn no_data_at_all_yields_none() {
        let store = HistoryStore::new();
        assert!(slice_window(&store, 10.0, &[0], None, None).is_none());
    }

    #[test]
    fn out_of_layout_channels_are_ignored() {
        let store = store_with(&[(0, &[(10.0, 1.0)])]);
        let slice = slice_window(&store, 10.0, &[0, 9999], None, None).unwrap();
        assert_eq!(slice.history.len(), 1);
    }
}

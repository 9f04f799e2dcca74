//! Acquisition producer loop and the bounded sample queue.
//!
//! The producer polls the instrument on a dedicated task at a fixed cadence,
//! remaps each raw reading block into the fixed 160-slot channel layout and
//! pushes timestamped samples into a bounded queue. The consumer (the
//! session's drain tick) empties the queue on its own cadence; the two sides
//! share nothing else.
//!
//! The queue never blocks the producer: on overflow the freshly read sample
//! is dropped and counted, because a stalled consumer must not back up into
//! instrument I/O.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{unix_now, Sample, TOTAL_CHANNELS};
use crate::hardware::{ModuleLayout, ScanInstrument};

/// Producer half of the sample queue. `push` never blocks.
#[derive(Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<Sample>,
    dropped: Arc<AtomicU64>,
}

impl QueueProducer {
    /// Enqueue a sample, dropping it with a diagnostic if the queue is full.
    pub fn push(&self, sample: Sample) {
        match self.tx.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped_total = total, "sample queue full; dropping sample");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("sample queue closed; consumer is gone");
            }
        }
    }
}

/// Bounded FIFO buffer decoupling the acquisition cadence from the consumer
/// cadence.
pub struct SampleQueue {
    tx: mpsc::Sender<Sample>,
    rx: mpsc::Receiver<Sample>,
    dropped: Arc<AtomicU64>,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Producer handle for the acquisition loop.
    pub fn producer(&self) -> QueueProducer {
        QueueProducer {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Pop everything currently buffered, in push order, without blocking.
    pub fn drain_all(&mut self) -> Vec<Sample> {
        let mut drained = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            drained.push(sample);
        }
        drained
    }

    /// Samples dropped on overflow since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Map one raw reading block into the fixed channel layout.
///
/// The block lands at `bank_offset + layout.start_within_bank()`; every slot
/// outside it is missing. A length mismatch between the block and the layout
/// is an error, the tick that produced it is discarded.
pub fn map_block(
    raw: &[Option<f64>],
    bank_offset: usize,
    layout: ModuleLayout,
) -> Result<Vec<Option<f64>>> {
    let expected = layout.active_channels();
    if raw.len() != expected {
        bail!(
            "raw block has {} readings, layout {:?} expects {}",
            raw.len(),
            layout,
            expected
        );
    }
    let start = bank_offset + layout.start_within_bank();
    if start + expected > TOTAL_CHANNELS {
        bail!(
            "placement window {}..{} exceeds channel capacity {}",
            start,
            start + expected,
            TOTAL_CHANNELS
        );
    }

    let mut values = vec![None; TOTAL_CHANNELS];
    values[start..start + expected].copy_from_slice(raw);
    Ok(values)
}

/// Spawn the acquisition producer.
///
/// Runs until `cancel` turns true. Each iteration records a wall-clock
/// timestamp, performs one scan, remaps and enqueues it, then sleeps for
/// `poll_interval` (the interval excludes scan latency, so the effective
/// sampling period is interval + scan time). A failed read is logged and
/// skipped; it never terminates the loop. Cancellation is cooperative: a
/// read already in flight completes before the signal is observed.
pub fn spawn_acquisition(
    instrument: Arc<dyn ScanInstrument>,
    producer: QueueProducer,
    bank_offset: usize,
    layout: ModuleLayout,
    poll_interval: Duration,
    mut cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(bank_offset, ?layout, interval = ?poll_interval, "acquisition loop started");
        loop {
            if *cancel.borrow() {
                break;
            }

            let read_time = unix_now();
            match instrument.read_raw().await {
                Ok(raw) => match map_block(&raw, bank_offset, layout) {
                    Ok(values) => producer.push(Sample {
                        timestamp: read_time,
                        values,
                    }),
                    Err(e) => warn!(error = %e, "discarding malformed reading"),
                },
                Err(e) => {
                    warn!(error = %e, "instrument read failed; retrying on next tick");
                }
            }

            // Sleep the configured interval, but wake early on cancellation.
            // A dropped sender means the session is gone; stop either way.
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        info!("acquisition loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BANK_CHANNELS;

    fn block(len: usize) -> Vec<Option<f64>> {
        (0..len).map(|i| Some(i as f64)).collect()
    }

    #[test]
    fn maps_dual_module_into_lower_bank() {
        let values = map_block(&block(80), 0, ModuleLayout::DualModule).unwrap();
        assert_eq!(values.len(), TOTAL_CHANNELS);
        assert_eq!(values[0], Some(0.0));
        assert_eq!(values[79], Some(79.0));
        assert!(values[80..].iter().all(Option::is_none));
    }

    #[test]
    fn maps_dual_module_into_upper_bank() {
        let values = map_block(&block(80), BANK_CHANNELS, ModuleLayout::DualModule).unwrap();
        assert!(values[..80].iter().all(Option::is_none));
        assert_eq!(values[80], Some(0.0));
        assert_eq!(values[159], Some(79.0));
    }

    #[test]
    fn maps_first_module_at_bank_start() {
        let values = map_block(&block(40), 0, ModuleLayout::FirstOnly).unwrap();
        assert_eq!(values[0], Some(0.0));
        assert_eq!(values[39], Some(39.0));
        assert!(values[40..].iter().all(Option::is_none));
    }

    #[test]
    fn maps_second_module_into_upper_half_of_bank() {
        let values = map_block(&block(40), BANK_CHANNELS, ModuleLayout::SecondOnly).unwrap();
        assert!(values[..120].iter().all(Option::is_none));
        assert_eq!(values[120], Some(0.0));
        assert_eq!(values[159], Some(39.0));
    }

    #[test]
    fn rejects_wrong_block_length() {
        assert!(map_block(&block(40), 0, ModuleLayout::DualModule).is_err());
        assert!(map_block(&block(80), 0, ModuleLayout::FirstOnly).is_err());
    }

    #[test]
    fn preserves_missing_entries() {
        let mut raw = block(80);
        raw[5] = None;
        let values = map_block(&raw, 0, ModuleLayout::DualModule).unwrap();
        assert_eq!(values[5], None);
        assert_eq!(values[6], Some(6.0));
    }

    #[tokio::test]
    async fn queue_drains_in_push_order() {
        let mut queue = SampleQueue::bounded(8);
        let producer = queue.producer();
        for i in 0..5 {
            producer.push(Sample::empty(i as f64));
        }
        let drained = queue.drain_all();
        let stamps: Vec<f64> = drained.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(queue.dropped(), 0);
    }

    #[tokio::test]
    async fn queue_drops_on_overflow_without_blocking() {
        let mut queue = SampleQueue::bounded(2);
        let producer = queue.producer();
        for i in 0..5 {
            producer.push(Sample::empty(i as f64));
        }
        let drained = queue.drain_all();
        // the first two pushes survive; later ones were dropped
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].timestamp, 0.0);
        assert_eq!(drained[1].timestamp, 1.0);
        assert_eq!(queue.dropped(), 3);
    }

    #[tokio::test]
    async fn drain_is_non_blocking_when_empty() {
        let mut queue = SampleQueue::bounded(4);
        assert!(queue.drain_all().is_empty());
    }
}

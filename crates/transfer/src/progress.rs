use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::ChunkPlan;

// ---------------------------------------------------------------------------
// ChunkProgress
// ---------------------------------------------------------------------------

/// Per-chunk upload progress for one file (thread-safe).
///
/// Overall progress is the sum of loaded bytes over the file size. Chunks
/// the server already holds count as fully loaded. Loaded counts never go
/// backwards, so the aggregate is monotone.
pub struct ChunkProgress {
    inner: Mutex<ProgressInner>,
}

struct ProgressInner {
    sizes: Vec<u64>,
    loaded: Vec<u64>,
    file_size: u64,
}

impl ChunkProgress {
    pub fn new(plan: &ChunkPlan) -> Self {
        let sizes: Vec<u64> = plan.spans().iter().map(|s| s.len()).collect();
        Self {
            inner: Mutex::new(ProgressInner {
                loaded: vec![0; sizes.len()],
                sizes,
                file_size: plan.file_size(),
            }),
        }
    }

    /// Marks a chunk as fully transferred (already stored or acknowledged).
    pub fn mark_complete(&self, index: u64) {
        let mut s = self.lock();
        if let Some(i) = s.slot(index) {
            s.loaded[i] = s.sizes[i];
        }
    }

    /// Records bytes sent for one chunk. Returns the chunk's loaded count.
    pub fn set_loaded(&self, index: u64, loaded: u64) -> u64 {
        let mut s = self.lock();
        match s.slot(index) {
            Some(i) => {
                let clamped = loaded.min(s.sizes[i]);
                if clamped > s.loaded[i] {
                    s.loaded[i] = clamped;
                }
                s.loaded[i]
            }
            None => 0,
        }
    }

    /// Total bytes accounted for across all chunks.
    pub fn loaded_bytes(&self) -> u64 {
        self.lock().loaded.iter().sum()
    }

    /// Overall progress in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        let s = self.lock();
        if s.file_size == 0 {
            return 1.0;
        }
        let loaded: u64 = s.loaded.iter().sum();
        loaded as f64 / s.file_size as f64
    }

    /// Returns `true` if every chunk is fully loaded.
    pub fn is_complete(&self) -> bool {
        let s = self.lock();
        s.loaded.iter().zip(&s.sizes).all(|(l, n)| l == n)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressInner {
    fn slot(&self, index: u64) -> Option<usize> {
        usize::try_from(index).ok().filter(|&i| i < self.sizes.len())
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

const DEFAULT_SPEED_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

/// Upload throughput over a sliding time window.
///
/// Samples are byte deltas; the rate is the sum of deltas in the window
/// divided by the time the window spans.
pub struct SpeedCalculator {
    window: Duration,
    max_samples: usize,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_WINDOW, DEFAULT_MAX_SAMPLES)
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            window,
            max_samples: max_samples.max(2),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Records `bytes` newly sent at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let now = Instant::now();
        let mut samples = self.lock();
        samples.push_back((now, bytes));

        while let Some(&(at, _)) = samples.front() {
            let stale = now.duration_since(at) > self.window;
            if stale || samples.len() > self.max_samples {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average bytes per second within the window, 0.0 until two samples
    /// some time apart exist.
    pub fn bytes_per_second(&self) -> f64 {
        let samples = self.lock();
        let (Some(&(first, _)), Some(&(last, _))) = (samples.front(), samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(first);
        if samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        let bytes: u64 = samples.iter().map(|&(_, n)| n).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to send `remaining_bytes` at the current rate.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(Instant, u64)>> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn progress_for(file_size: u64, chunk_size: u64) -> ChunkProgress {
        ChunkProgress::new(&ChunkPlan::new(file_size, chunk_size).unwrap())
    }

    #[test]
    fn starts_at_zero() {
        let p = progress_for(10, 4);
        assert_eq!(p.fraction(), 0.0);
        assert!(!p.is_complete());
    }

    #[test]
    fn already_stored_chunks_count_as_loaded() {
        let p = progress_for(10, 4);
        p.mark_complete(0);
        p.mark_complete(2);
        assert_eq!(p.loaded_bytes(), 6);
        assert!((p.fraction() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn partial_chunk_bytes() {
        let p = progress_for(10, 4);
        assert_eq!(p.set_loaded(1, 3), 3);
        assert_eq!(p.loaded_bytes(), 3);
    }

    #[test]
    fn loaded_never_decreases_or_overflows_chunk() {
        let p = progress_for(10, 4);
        p.set_loaded(0, 3);
        assert_eq!(p.set_loaded(0, 1), 3);
        assert_eq!(p.set_loaded(0, 100), 4);
    }

    #[test]
    fn unknown_index_is_ignored() {
        let p = progress_for(10, 4);
        assert_eq!(p.set_loaded(9, 4), 0);
        p.mark_complete(9);
        assert_eq!(p.loaded_bytes(), 0);
    }

    #[test]
    fn complete_when_all_loaded() {
        let p = progress_for(10, 4);
        for i in 0..3 {
            p.mark_complete(i);
        }
        assert!(p.is_complete());
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn empty_file_is_trivially_complete() {
        let p = progress_for(0, 4);
        assert!(p.is_complete());
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn concurrent_updates() {
        let p = Arc::new(progress_for(1000, 10));
        let handles: Vec<_> = (0..10)
            .map(|t| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let index = t * 10 + i;
                        for loaded in 1..=10 {
                            p.set_loaded(index, loaded);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(p.is_complete());
    }

    #[test]
    fn speed_without_samples_is_zero() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_from_spread_samples() {
        let calc = SpeedCalculator::new(Duration::from_secs(10), 100);
        calc.add_sample(500);
        std::thread::sleep(Duration::from_millis(50));
        calc.add_sample(500);

        assert!(calc.bytes_per_second() > 0.0);
        assert!(calc.eta(10_000).is_some_and(|d| d.as_secs_f64() > 0.0));
    }

    #[test]
    fn speed_keeps_at_most_max_samples() {
        let calc = SpeedCalculator::new(Duration::from_secs(60), 5);
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert_eq!(calc.lock().len(), 5);
        assert_eq!(calc.lock().back().map(|&(_, n)| n), Some(190));
    }
}

//! Round-robin timeline DB (§3.9, `dbrrd`): three fixed-length-256 rings
//! at minute/day/month resolution, each entry a `(unix_time, txg)` pair,
//! answering "which txg was open around time T" for scrub/rollback UX.
//! Best-effort and monotone in time — callers are expected to record
//! samples in non-decreasing time order, matching how `dsl_pool_sync`
//! would feed it once per sync.

const RING_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sample {
    time: u64,
    txg: u64,
}

struct Ring {
    resolution: u64,
    samples: Vec<Sample>,
    next: usize,
}

impl Ring {
    fn new(resolution: u64) -> Self {
        Ring { resolution, samples: Vec::with_capacity(RING_LEN), next: 0 }
    }

    /// Record `(time, txg)`, overwriting the oldest slot once the ring is
    /// full for this resolution's write cadence (a record is skipped
    /// entirely if less than `resolution` has elapsed since the last one,
    /// the way a minute ring only takes a new sample once a minute).
    fn record(&mut self, time: u64, txg: u64) {
        if let Some(last) = self.samples.last() {
            if time < last.time + self.resolution {
                return;
            }
        }
        if self.samples.len() < RING_LEN {
            self.samples.push(Sample { time, txg });
        } else {
            self.samples[self.next] = Sample { time, txg };
            self.next = (self.next + 1) % RING_LEN;
        }
    }

    fn nearest(&self, time: u64) -> Option<Sample> {
        self.samples.iter().copied().min_by_key(|s| s.time.abs_diff(time))
    }
}

/// Three concentric rings (minute/day/month); queries pick whichever
/// ring's nearest sample is closest in absolute time to `t`.
pub struct Timeline {
    minute: Ring,
    day: Ring,
    month: Ring,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline {
            minute: Ring::new(60),
            day: Ring::new(60 * 60 * 24),
            month: Ring::new(60 * 60 * 24 * 30),
        }
    }

    /// Record a `(time, txg)` sample in every ring (each ring decides for
    /// itself whether enough time has passed to take it).
    pub fn record(&mut self, time: u64, txg: u64) {
        self.minute.record(time, txg);
        self.day.record(time, txg);
        self.month.record(time, txg);
    }

    /// The txg whose recorded timestamp is nearest `t` across all three
    /// rings (§8 property 9).
    pub fn query(&self, t: u64) -> Option<u64> {
        [self.minute.nearest(t), self.day.nearest(t), self.month.nearest(t)]
            .into_iter()
            .flatten()
            .min_by_key(|s| s.time.abs_diff(t))
            .map(|s| s.txg)
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Timeline::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_returns_the_nearest_sample_across_rings() {
        let mut tl = Timeline::new();
        tl.record(0, 1);
        tl.record(60, 2);
        tl.record(120, 3);
        assert_eq!(tl.query(61), Some(2));
        assert_eq!(tl.query(119), Some(3));
    }

    #[test]
    fn samples_within_a_rings_resolution_are_coalesced() {
        let mut ring = Ring::new(60);
        ring.record(0, 1);
        ring.record(10, 2);
        assert_eq!(ring.samples.len(), 1);
        assert_eq!(ring.samples[0].txg, 1);
    }

    #[test]
    fn empty_timeline_has_no_query_result() {
        let tl = Timeline::new();
        assert_eq!(tl.query(100), None);
    }
}

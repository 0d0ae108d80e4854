//! Running byte-value histogram plus Welford mean/variance accumulator.

/// Tracks a 256-bin payload byte-value histogram and the running mean/M2 needed to
/// report mean, standard deviation and entropy without re-scanning the payload.
#[derive(Debug, Clone)]
pub struct ByteDistribution {
    pub counts: [u64; 256],
    /// Total bytes folded into `counts`/the running mean.
    pub n: u64,
    mean: f64,
    /// Welford's `M2`: the running sum of squared deviations from the *current*
    /// mean. Sample variance is `m2 / (n - 1)`.
    m2: f64,
}

impl Default for ByteDistribution {
    fn default() -> Self {
        ByteDistribution {
            counts: [0; 256],
            n: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl ByteDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one payload byte into the histogram and the running mean/variance,
    /// per `spec.md` §4.4: `n += 1; delta = b - mean; mean += delta/n; M2 += delta*(b - mean)`
    /// (note the second term uses the *updated* mean, matching the original source).
    pub fn update(&mut self, byte: u8) {
        self.counts[byte as usize] += 1;
        self.n += 1;
        let delta = byte as f64 - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (byte as f64 - self.mean);
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// `M2`, exposed so twin pairs can be combined with the exact weighting the
    /// original source uses (see [`ByteDistribution::merge_stats`]).
    pub fn m2(&self) -> f64 {
        self.m2
    }

    /// Sample standard deviation: `sqrt(M2 / (n - 1))`, or `0` when `n <= 1`.
    pub fn stdev(&self) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            (self.m2 / (self.n - 1) as f64).sqrt()
        }
    }

    /// Combines two sides of a twin pair: sums the histograms and computes an
    /// `n`-weighted mean and a pooled-by-weighted-M2 standard deviation, exactly as
    /// `flow_record_print_json` does for bidirectional flows.
    pub fn merge_stats(a: &ByteDistribution, b: &ByteDistribution) -> (u64, [u64; 256], f64, f64) {
        let mut counts = [0u64; 256];
        for i in 0..256 {
            counts[i] = a.counts[i] + b.counts[i];
        }
        let total = a.n + b.n;
        if total == 0 {
            return (0, counts, 0.0, 0.0);
        }
        let wa = a.n as f64 / total as f64;
        let wb = b.n as f64 / total as f64;
        let mean = wa * a.mean + wb * b.mean;
        let mut variance = wa * a.m2 + wb * b.m2;
        variance /= (total - 1).max(1) as f64;
        let stdev = if total == 1 { 0.0 } else { variance.sqrt() };
        (total, counts, mean, stdev)
    }
}

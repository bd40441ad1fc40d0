use rand::Rng;

/// Integer coefficients drawn from a discrete Gaussian of width `sigma`,
/// tail-cut at 6σ.
pub fn sample_gaussian_coeffs<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i64> {
    let table = CdtTable::new(sigma);
    (0..n).map(|_| table.sample(rng)).collect()
}

/// Unnormalized cumulative table of `exp(-x^2 / 2σ^2)` over `[-tail, tail]`.
struct CdtTable {
    tail: i64,
    cdf: Vec<f64>,
}

impl CdtTable {
    fn new(sigma: f64) -> Self {
        let tail = (6.0 * sigma).ceil().max(1.0) as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let cdf = (-tail..=tail)
            .scan(0.0f64, |acc, x| {
                *acc += (-((x * x) as f64) / two_sigma_sq).exp();
                Some(*acc)
            })
            .collect();
        Self { tail, cdf }
    }

    /// Every entry is visited; the lowest index with `u < cdf[i]` wins
    /// through a masked select rather than a branch.
    fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let total = self.cdf.last().copied().unwrap_or(1.0);
        let u = rng.random::<f64>() * total;
        let mut result = self.tail;
        for (i, &c) in self.cdf.iter().enumerate().rev() {
            let mask = ((u < c) as i64).wrapping_neg();
            let candidate = i as i64 - self.tail;
            result = (candidate & mask) | (result & !mask);
        }
        result
    }
}

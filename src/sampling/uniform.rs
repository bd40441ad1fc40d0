use rand::Rng;

/// `n` uniform residues in `[0, modulus)`, by rejection on a bit mask.
pub fn sample_uniform_residues<R: Rng>(n: usize, modulus: u64, rng: &mut R) -> Vec<u64> {
    let mask = if modulus.is_power_of_two() {
        modulus - 1
    } else {
        u64::MAX >> modulus.leading_zeros()
    };
    (0..n)
        .map(|_| loop {
            let val = rng.random::<u64>() & mask;
            if val < modulus {
                break val;
            }
        })
        .collect()
}

/// Exactly `hwt` nonzero coefficients, each ±1 with equal probability.
pub fn sample_hwt_coeffs<R: Rng>(n: usize, hwt: usize, rng: &mut R) -> Vec<i64> {
    let hwt = hwt.min(n);
    let mut coeffs = vec![0i64; n];
    let mut placed = 0;
    while placed < hwt {
        let idx = rng.random_range(0..n);
        if coeffs[idx] == 0 {
            coeffs[idx] = if rng.random::<bool>() { 1 } else { -1 };
            placed += 1;
        }
    }
    coeffs
}

/// Coefficients in {-1, 0, 1} with probabilities 1/4, 1/2, 1/4.
pub fn sample_small_coeffs<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| match rng.random::<u8>() & 0x03 {
            0 => -1,
            1 => 1,
            _ => 0,
        })
        .collect()
}

use std::collections::VecDeque;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::chain::ModulusChain;
use crate::error::Result;
use crate::keys::handle::SkHandle;
use crate::ring::ResiduePoly;

/// Key-switching matrix from the key expression `from` to the base key
/// `to_key_id`, one column per chain digit.
///
/// Column `i` is the pair `(b_i, a_i)` with
/// `b_i + s_to * a_i = P * B_i * s_from + p * e_i` over every chain prime,
/// where `P` is the product of the special primes and `B_i` the product
/// of digits `0..i`. The `a_i` are not stored: they are replayed from
/// `prg_seed`.
#[derive(Clone, Debug)]
pub struct KeySwitchMatrix {
    pub from: SkHandle,
    pub to_key_id: usize,
    pub ptxt_space: u64,
    pub prg_seed: u64,
    pub b: Vec<ResiduePoly>,
}

impl KeySwitchMatrix {
    /// A fresh replay of the hidden `a_i` columns.
    pub fn hidden_columns<'a>(&self, chain: &'a ModulusChain) -> HiddenColumns<'a> {
        HiddenColumns::new(chain, self.prg_seed)
    }
}

/// Deterministic stream of uniform column polynomials over the whole chain.
///
/// Column `i` is always drawn in full even when the caller keeps only a
/// few residues, so the stream stays aligned with key generation.
pub struct HiddenColumns<'a> {
    chain: &'a ModulusChain,
    rng: ChaCha20Rng,
}

impl<'a> HiddenColumns<'a> {
    pub fn new(chain: &'a ModulusChain, seed: u64) -> Self {
        Self { chain, rng: ChaCha20Rng::seed_from_u64(seed) }
    }

    pub fn next_column(&mut self) -> Result<ResiduePoly> {
        ResiduePoly::sample_uniform(self.chain, &self.chain.all_primes(), &mut self.rng)
    }
}

/// For one key, which matrix to apply first on the way to each `X^k`.
///
/// Entry `k` holds the index (into the public key's matrix list) of a
/// matrix from `s(X^j)` such that `X^{k/j}` is strictly closer to the
/// identity. `k = 1` needs no matrix and is always reachable.
#[derive(Clone, Debug, Default)]
pub struct KeySwitchMap {
    next: Vec<Option<usize>>,
}

impl KeySwitchMap {
    /// Breadth-first search from 1 over the automorphism matrices of
    /// `key_id`, i.e. those from `(1, j, key_id)` to `key_id`.
    pub fn build(matrices: &[KeySwitchMatrix], key_id: usize, m: u64) -> Self {
        let m_usize = m as usize;
        let edges: Vec<(u64, usize)> = matrices
            .iter()
            .enumerate()
            .filter(|(_, w)| w.from.power_of_s() == 1 && w.from.key_id() == key_id && w.to_key_id == key_id)
            .map(|(idx, w)| (w.from.power_of_x() % m, idx))
            .collect();

        let mut next = vec![None; m_usize];
        let mut seen = vec![false; m_usize];
        let mut queue = VecDeque::from([1u64]);
        if m_usize > 1 {
            seen[1] = true;
        }
        while let Some(cur) = queue.pop_front() {
            for &(j, idx) in &edges {
                let reached = ((cur as u128 * j as u128) % m as u128) as usize;
                if !seen[reached] {
                    seen[reached] = true;
                    next[reached] = Some(idx);
                    queue.push_back(reached as u64);
                }
            }
        }
        Self { next }
    }

    pub fn next_matrix(&self, k: u64) -> Option<usize> {
        self.next.get(k as usize).copied().flatten()
    }

    pub fn is_reachable(&self, k: u64) -> bool {
        k == 1 || self.next_matrix(k).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PrimeSet;
    use crate::params::presets::toy_context;

    fn fake_matrix(chain: &ModulusChain, from: SkHandle, to_key_id: usize) -> KeySwitchMatrix {
        KeySwitchMatrix {
            from,
            to_key_id,
            ptxt_space: 7,
            prg_seed: 0,
            b: vec![ResiduePoly::zero(chain, &PrimeSet::singleton(0)).unwrap()],
        }
    }

    #[test]
    fn test_map_reaches_generated_subgroup() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        // 7 generates a subgroup of order 8 in Z_64^*
        let matrices = vec![
            fake_matrix(chain, SkHandle::new(2, 1, 0), 0),
            fake_matrix(chain, SkHandle::new(1, 7, 0), 0),
        ];
        let map = KeySwitchMap::build(&matrices, 0, 64);
        let mut k = 1u64;
        for _ in 0..8 {
            assert!(map.is_reachable(k));
            k = k * 7 % 64;
        }
        assert!(!map.is_reachable(3));
        assert_eq!(map.next_matrix(7), Some(1));
        assert_eq!(map.next_matrix(1), None);
    }

    #[test]
    fn test_map_ignores_other_keys() {
        let ctx = toy_context().unwrap();
        let matrices = vec![fake_matrix(&ctx.chain, SkHandle::new(1, 3, 1), 1)];
        let map = KeySwitchMap::build(&matrices, 0, 64);
        assert!(!map.is_reachable(3));
        assert!(map.is_reachable(1));
        assert!(KeySwitchMap::build(&matrices, 1, 64).is_reachable(9));
    }

    #[test]
    fn test_hidden_columns_replay() {
        let ctx = toy_context().unwrap();
        let mut first = HiddenColumns::new(&ctx.chain, 11);
        let mut second = HiddenColumns::new(&ctx.chain, 11);
        let a0 = first.next_column().unwrap();
        assert_eq!(a0, second.next_column().unwrap());
        assert_ne!(a0, first.next_column().unwrap());
        assert_eq!(a0.prime_set(), &ctx.chain.all_primes());
    }
}

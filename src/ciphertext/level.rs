use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::chain::PrimeSet;
use crate::error::{Result, StrataError, Violation};
use crate::ring::modular::mod_inv;

use super::Ciphertext;

/// How primes leave a ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModDownStrategy {
    /// Exact rounding by the dropped product; noise shrinks by that
    /// product and picks up the rounding noise.
    Rounding,
    /// Noise is already below the rounding noise: just forget the
    /// dropped residues and fix up the plaintext factor.
    DegenerateDrop,
}

impl ModDownStrategy {
    /// Rounding would add more noise than it removes once
    /// `noise * t^2 < added`.
    pub fn choose(noise_var: f64, ptxt_space: u64, added_noise_var: f64) -> Self {
        let t = ptxt_space as f64;
        if noise_var * t * t < added_noise_var {
            ModDownStrategy::DegenerateDrop
        } else {
            ModDownStrategy::Rounding
        }
    }
}

impl Ciphertext {
    /// Noise variance that one rounding step adds: per part,
    /// `phi * t^2 / 12` times the expected size of its key expression.
    pub fn mod_switch_added_noise_var(&self) -> Result<f64> {
        let mut added = 0.0;
        for part in &self.parts {
            if part.handle.is_one() {
                added += 1.0;
                continue;
            }
            let h = self.pub_key.key_weight(part.handle.key_id())? as f64;
            let d = part.handle.power_of_s();
            // E|s^d|^2 grows like d! * h^d
            let mut term = h;
            for j in 2..=d {
                term *= h * j as f64;
            }
            added += term;
        }
        let phi = self.context.phi_m() as f64;
        let t = self.ptxt_space as f64;
        Ok(added * phi * t * (t / 12.0))
    }

    /// Add the primes of `s` by scaling with their product.
    pub fn mod_up_to_set(&self, s: &PrimeSet) -> Result<Ciphertext> {
        let mut out = self.clone();
        out.mod_up_in_place(s)?;
        Ok(out)
    }

    /// Drop every prime outside `s`.
    pub fn mod_down_to_set(&self, s: &PrimeSet) -> Result<Ciphertext> {
        let mut out = self.clone();
        out.mod_down_in_place(s)?;
        Ok(out)
    }

    /// Bring the ciphertext down to level `lvl`, see [`find_base_level`].
    ///
    /// [`find_base_level`]: Ciphertext::find_base_level
    pub fn mod_down_to_level(&self, lvl: usize) -> Result<Ciphertext> {
        let mut out = self.clone();
        out.mod_down_to_level_in_place(lvl)?;
        Ok(out)
    }

    pub(crate) fn mod_up_in_place(&mut self, s: &PrimeSet) -> Result<()> {
        let new_primes = s.difference(&self.prime_set);
        if new_primes.is_empty() {
            return Ok(());
        }
        let context = Arc::clone(&self.context);
        let chain = &context.chain;
        for part in &mut self.parts {
            part.poly.add_primes_and_scale(chain, &new_primes)?;
        }
        self.noise_var *= (2.0 * chain.log_of_product(&new_primes)).exp();
        self.prime_set.insert_all(&new_primes);
        self.check_prime_set()
    }

    #[instrument(skip_all, fields(target = %s))]
    pub(crate) fn mod_down_in_place(&mut self, s: &PrimeSet) -> Result<()> {
        let keep = self.prime_set.intersection(s);
        if keep.is_empty() {
            return Err(Violation::EmptyIntersection.into());
        }
        if keep == self.prime_set {
            return Ok(());
        }
        let dropped = self.prime_set.difference(&keep);
        let context = Arc::clone(&self.context);
        let chain = &context.chain;
        let added = self.mod_switch_added_noise_var()?;
        let t = self.ptxt_space;

        match ModDownStrategy::choose(self.noise_var, t, added) {
            ModDownStrategy::DegenerateDrop => {
                let prod_inv = mod_inv(chain.product_mod(&dropped, t), t)
                    .ok_or(Violation::PlaintextSpaceShape(t))?;
                let shrink = prod_inv as f64 * prod_inv as f64;
                for part in &mut self.parts {
                    part.poly.remove_primes(&dropped);
                    part.poly = part.poly.scalar_mul(prod_inv);
                    self.noise_var *= shrink;
                }
                warn!(
                    dropped = %dropped,
                    noise_var = self.noise_var,
                    added,
                    "dropping primes without rounding, noise is below the rounding noise"
                );
            }
            ModDownStrategy::Rounding => {
                for part in &mut self.parts {
                    part.poly.scale_down_to_set(chain, &keep, t)?;
                }
                self.noise_var /= (2.0 * chain.log_of_product(&dropped)).exp();
                self.noise_var += added;
            }
        }
        self.prime_set = keep;
        self.check_prime_set()
    }

    /// Levels count half-size primes as one and full-size primes as two
    /// when the chain has a half-size prime, primes otherwise. Level `lvl`
    /// maps to the ciphertext-prime interval holding exactly that many.
    pub(crate) fn mod_down_to_level_in_place(&mut self, lvl: usize) -> Result<()> {
        if lvl == 0 {
            return Err(StrataError::InvalidParam("level must be at least 1".into()));
        }
        let context = Arc::clone(&self.context);
        let chain = &context.chain;
        let current = self.prime_set.difference(chain.special_primes());

        let (current_lvl, mut target) = if chain.contains_small_prime() {
            let mut cur = 2 * current.len();
            if current.contains(0) {
                cur -= 1;
            }
            let target = if lvl % 2 == 1 {
                PrimeSet::interval(0, (lvl - 1) / 2)
            } else {
                PrimeSet::interval(1, lvl / 2)
            };
            (cur, target)
        } else {
            (current.len(), PrimeSet::interval(0, lvl - 1))
        };

        if lvl >= current_lvl {
            if current == self.prime_set {
                return Ok(());
            }
            target = current.clone();
        }
        if !target.is_subset(chain.ctxt_primes()) {
            return Err(Violation::MalformedPrimeSet(target).into());
        }
        if target.contains(0) && !current.contains(0) {
            self.mod_up_in_place(&target)?;
        }
        self.mod_down_in_place(&target)
    }

    /// Smallest prime set that still holds the noise, ignoring the
    /// special primes, i.e. the set a later multiplication should start
    /// from.
    pub fn find_base_set(&self) -> Result<PrimeSet> {
        let chain = &self.context.chain;
        if self.noise_var <= 0.0 {
            return Ok(chain.ctxt_primes().clone());
        }
        self.check_prime_set()?;

        let half = chain.contains_small_prime();
        let added = self.mod_switch_added_noise_var()?.ln() / 2.0;
        let mut cur = self.noise_var.ln() / 2.0;
        let first = chain.ln_prime(0);
        let mut s = self.prime_set.clone();

        let specials = chain.special_primes();
        if !s.is_disjoint(specials) {
            cur -= chain.log_of_product(specials);
            s.remove_all(specials);
        }
        if cur <= 2.0 * added {
            return Ok(s);
        }

        if half && s.contains(0) {
            cur -= first;
            s.remove(0);
        }
        while cur > added && s.len() > 1 {
            let Some(last) = s.last() else { break };
            cur -= chain.ln_prime(last);
            s.remove(last);
        }
        if half {
            if cur > added {
                cur = first;
                s = PrimeSet::singleton(0);
            } else if cur + first <= added {
                cur += first;
                s.insert(0);
            }
        }

        if cur > added && self.log_of_ratio() > -0.5 {
            warn!(log_of_ratio = self.log_of_ratio(), "ciphertext is already at the lowest level");
        }
        debug!(base = %s, "found base set");
        Ok(s)
    }

    /// The level of [`find_base_set`](Ciphertext::find_base_set).
    pub fn find_base_level(&self) -> Result<usize> {
        let s = self.find_base_set()?;
        if self.context.chain.contains_small_prime() {
            Ok(if s.contains(0) { 2 * s.len() - 1 } else { 2 * s.len() })
        } else {
            Ok(s.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphertext::testutil::Fixture;

    #[test]
    fn test_strategy_choice() {
        assert_eq!(ModDownStrategy::choose(1.0, 7, 100.0), ModDownStrategy::DegenerateDrop);
        assert_eq!(ModDownStrategy::choose(10.0, 7, 100.0), ModDownStrategy::Rounding);
    }

    #[test]
    fn test_added_noise_of_fresh_ciphertext() {
        let mut fx = Fixture::toy();
        let ct = fx.encrypt(&fx.plaintext(&[1]));
        // (1 + h) * phi * t^2 / 12
        let expected = 17.0 * 32.0 * 7.0 * (7.0 / 12.0);
        assert!((ct.mod_switch_added_noise_var().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_mod_up_then_down_roundtrip() {
        let mut fx = Fixture::toy();
        let pt = fx.plaintext(&[3, 1, 4, 1, 5]);
        let ct = fx.encrypt(&pt);
        let specials = fx.ctx.chain.special_primes().clone();
        let up = ct.mod_up_to_set(&specials).unwrap();
        assert_eq!(up.prime_set(), &fx.ctx.chain.all_primes());
        let expect = ct.noise_var() * (2.0 * fx.ctx.chain.log_of_product(&specials)).exp();
        assert!((up.noise_var() / expect - 1.0).abs() < 1e-9);
        assert_eq!(fx.decrypt(&up), pt);

        let down = up.mod_down_to_set(fx.ctx.chain.ctxt_primes()).unwrap();
        assert_eq!(down.prime_set(), fx.ctx.chain.ctxt_primes());
        assert_eq!(fx.decrypt(&down), pt);
    }

    #[test]
    fn test_mod_down_rounding_noise() {
        let mut fx = Fixture::toy();
        let pt = fx.plaintext(&[2, 6]);
        let ct = fx.encrypt(&pt);
        let keep = PrimeSet::interval(0, 2);
        let down = ct.mod_down_to_set(&keep).unwrap();
        let dropped = ct.prime_set().difference(&keep);
        let added = ct.mod_switch_added_noise_var().unwrap();
        let expect = ct.noise_var() / (2.0 * fx.ctx.chain.log_of_product(&dropped)).exp() + added;
        assert!((down.noise_var() / expect - 1.0).abs() < 1e-9);
        assert_eq!(fx.decrypt(&down), pt);
        assert!(ct.mod_down_to_set(&fx.ctx.chain.special_primes().clone()).is_err());
    }

    #[test]
    fn test_degenerate_drop_keeps_plaintext() {
        let mut fx = Fixture::toy();
        let pt = fx.plaintext(&[1, 2, 3]);
        let ct = fx.encrypt(&pt);
        let added = ct.mod_switch_added_noise_var().unwrap();
        // pretend the noise is tiny so rounding would only hurt
        let mut quiet = ct.clone();
        quiet.noise_var = added / 1000.0;
        let down = quiet.mod_down_to_set(&PrimeSet::interval(0, 4)).unwrap();
        assert_eq!(down.prime_set(), &PrimeSet::interval(0, 4));
        assert_eq!(fx.decrypt(&down), pt);
    }

    #[test]
    fn test_fresh_ciphertext_stays_at_top() {
        let mut fx = Fixture::toy();
        let ct = fx.encrypt(&fx.plaintext(&[1]));
        assert_eq!(ct.find_base_set().unwrap(), PrimeSet::interval(0, 5));
        assert_eq!(ct.find_base_level().unwrap(), 11);
    }

    #[test]
    fn test_mod_down_to_level() {
        let mut fx = Fixture::toy();
        let pt = fx.plaintext(&[4, 4, 4]);
        let ct = fx.encrypt(&pt);

        let odd = ct.mod_down_to_level(5).unwrap();
        assert_eq!(odd.prime_set(), &PrimeSet::interval(0, 2));
        assert_eq!(fx.decrypt(&odd), pt);

        let even = ct.mod_down_to_level(6).unwrap();
        assert_eq!(even.prime_set(), &PrimeSet::interval(1, 3));
        assert_eq!(fx.decrypt(&even), pt);

        // from {1..3} (level 6) to level 3 needs prime 0 back first
        let back = even.mod_down_to_level(3).unwrap();
        assert_eq!(back.prime_set(), &PrimeSet::interval(0, 1));
        assert_eq!(fx.decrypt(&back), pt);

        let same = ct.mod_down_to_level(20).unwrap();
        assert_eq!(same.prime_set(), ct.prime_set());
    }

    #[test]
    fn test_base_set_of_empty_ciphertext() {
        let fx = Fixture::toy();
        let empty = Ciphertext::empty(&fx.pk);
        assert_eq!(empty.find_base_set().unwrap(), fx.ctx.chain.ctxt_primes().clone());
    }
}

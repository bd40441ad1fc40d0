use tracing::{debug, instrument};

use crate::error::{Result, Violation};
use crate::ring::modular::{mod_inv, mod_pow};

use super::Ciphertext;

impl Ciphertext {
    /// Apply `X -> X^k` to every part. Non-constant handles pick up the
    /// factor `k` in their power of `X`; the noise estimate is unchanged.
    pub fn automorph(&self, k: u64) -> Result<Ciphertext> {
        let m = self.context.m;
        let k = k % m;
        if !self.context.in_zm_star(k) {
            return Err(Violation::NotInZmStar(k).into());
        }
        let mut out = self.clone();
        if k == 1 {
            return Ok(out);
        }
        for part in &mut out.parts {
            part.poly = part.poly.automorph(k)?;
            part.handle = part.handle.automorphed(k, m);
        }
        out.check_prime_set()?;
        Ok(out)
    }

    /// `X -> X^k` followed by relinearization, walking the key-switch map
    /// of the ciphertext's key one matrix at a time. Negative `k` is taken
    /// mod `m`.
    #[instrument(skip(self))]
    pub fn smart_automorph(&self, k: i64) -> Result<Ciphertext> {
        let m = self.context.m;
        let mut k = k.rem_euclid(m as i64) as u64;
        if !self.context.in_zm_star(k) {
            return Err(Violation::NotInZmStar(k).into());
        }
        if self.is_empty() || k == 1 {
            return Ok(self.clone());
        }

        let key_id = self.key_id().unwrap_or(0);
        let mut out = if self.in_canonical_form(key_id) {
            self.clone()
        } else {
            self.relinearize(key_id)?
        };
        if !self.pub_key.is_reachable(k, key_id) {
            return Err(Violation::Unreachable { k, key_id }.into());
        }

        let mut hops = 0usize;
        while k != 1 {
            let step = self
                .pub_key
                .next_matrix(k, key_id)
                .ok_or(Violation::Unreachable { k, key_id })?
                .from
                .power_of_x();
            out = out.automorph(step)?.relinearize(key_id)?;
            let step_inv = mod_inv(step, m).ok_or(Violation::NotInZmStar(step))?;
            k = ((k as u128 * step_inv as u128) % m as u128) as u64;
            hops += 1;
        }
        debug!(hops, "automorphism applied");
        Ok(out)
    }

    /// The Frobenius map `X -> X^(p^j)`, `j` taken mod the order of `p`.
    pub fn frobenius_automorph(&self, j: i64) -> Result<Ciphertext> {
        let ctx = &self.context;
        let ord_p = ctx.ord_p.ok_or(Violation::NotInZmStar(ctx.p))?;
        let j = j.rem_euclid(ord_p as i64) as u64;
        if j == 0 {
            return Ok(self.clone());
        }
        self.smart_automorph(mod_pow(ctx.p, j, ctx.m) as i64)
    }
}

//! Text form of a ciphertext:
//!
//! ```text
//! [ptxtSpace noiseVar {primeSet} partCount [[{set} [row]...] [s x id]]... ]
//! ```
//!
//! Each `[row]` lists the coefficient-form residues modulo one prime of
//! `set`, in increasing prime order. Every part must be over exactly the
//! declared prime set.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::chain::PrimeSet;
use crate::error::{Result, StrataError};
use crate::keys::handle::SkHandle;
use crate::keys::keygen::PublicKey;
use crate::ring::ResiduePoly;

use super::{Ciphertext, CtxtPart};

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {:e} {} {}", self.ptxt_space, self.noise_var, self.prime_set, self.parts.len())?;
        for part in &self.parts {
            write!(f, " [[{}", part.poly.prime_set())?;
            for row in part.poly.to_coeff_rows() {
                f.write_str(" [")?;
                for (i, c) in row.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("]")?;
            }
            write!(f, "] {}]", part.handle)?;
        }
        f.write_str("]")
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() || matches!(c, '[' | ']' | '{' | '}') {
            if let Some(s) = start.take() {
                out.push(&text[s..i]);
            }
            if !c.is_whitespace() {
                out.push(&text[i..i + c.len_utf8()]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(&text[s..]);
    }
    out
}

struct Reader<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self { tokens: tokenize(text), pos: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<&'a str> {
        let tok = self
            .peek()
            .ok_or_else(|| StrataError::Parse("unexpected end of input".into()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: &str) -> Result<()> {
        let got = self.next()?;
        if got != want {
            return Err(StrataError::Parse(format!("expected '{want}' at token {}, found '{got}'", self.pos - 1)));
        }
        Ok(())
    }

    fn parse<T: FromStr>(&mut self) -> Result<T> {
        let tok = self.next()?;
        tok.parse()
            .map_err(|_| StrataError::Parse(format!("bad number '{tok}' at token {}", self.pos - 1)))
    }

    fn prime_set(&mut self) -> Result<PrimeSet> {
        self.expect("{")?;
        let mut set = PrimeSet::new();
        while self.peek() != Some("}") {
            set.insert(self.parse()?);
        }
        self.expect("}")?;
        Ok(set)
    }

    fn row(&mut self) -> Result<Vec<u64>> {
        self.expect("[")?;
        let mut row = Vec::new();
        while self.peek() != Some("]") {
            row.push(self.parse()?);
        }
        self.expect("]")?;
        Ok(row)
    }

    fn handle(&mut self) -> Result<SkHandle> {
        self.expect("[")?;
        let handle = SkHandle::new(self.parse()?, self.parse()?, self.parse()?);
        self.expect("]")?;
        Ok(handle)
    }
}

impl Ciphertext {
    /// Parse the text form under `pub_key`. Any malformed, truncated or
    /// inconsistent input is a [`StrataError::Parse`].
    pub fn read_from(text: &str, pub_key: &Arc<PublicKey>) -> Result<Ciphertext> {
        let chain = &pub_key.context().chain;
        let mut rd = Reader::new(text);
        rd.expect("[")?;
        let ptxt_space: u64 = rd.parse()?;
        let noise_var: f64 = rd.parse()?;
        let prime_set = rd.prime_set()?;
        let count: usize = rd.parse()?;

        let mut parts = Vec::with_capacity(count);
        for k in 0..count {
            rd.expect("[")?;
            rd.expect("[")?;
            let part_set = rd.prime_set()?;
            if part_set != prime_set {
                return Err(StrataError::Parse(format!(
                    "part {k} is over {part_set}, ciphertext is over {prime_set}"
                )));
            }
            let mut rows = Vec::with_capacity(prime_set.len());
            while rd.peek() == Some("[") {
                rows.push(rd.row()?);
            }
            rd.expect("]")?;
            let handle = rd.handle()?;
            rd.expect("]")?;
            let poly = ResiduePoly::from_coeff_rows(chain, &prime_set, rows)
                .map_err(|e| StrataError::Parse(format!("part {k}: {e}")))?;
            parts.push(CtxtPart::new(poly, handle));
        }
        rd.expect("]")?;
        if let Some(tok) = rd.peek() {
            return Err(StrataError::Parse(format!("trailing input starting at '{tok}'")));
        }

        if !(noise_var >= 0.0) {
            return Err(StrataError::Parse(format!("noise variance {noise_var} is negative")));
        }
        let mut ct = Ciphertext::new(pub_key, ptxt_space)
            .map_err(|e| StrataError::Parse(e.to_string()))?;
        if ct.ptxt_space != ptxt_space {
            return Err(StrataError::Parse(format!(
                "plaintext space {ptxt_space} does not divide the key's {}",
                pub_key.ptxt_space()
            )));
        }
        if !chain.verify_prime_set(&prime_set) {
            return Err(StrataError::Parse(format!("malformed prime set {prime_set}")));
        }
        if let Some((i, _)) = parts
            .iter()
            .enumerate()
            .find(|(i, p)| parts[..*i].iter().any(|q| q.handle == p.handle))
        {
            return Err(StrataError::Parse(format!("part {i} repeats a handle")));
        }
        ct.prime_set = prime_set;
        ct.parts = parts;
        ct.noise_var = noise_var;
        Ok(ct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphertext::testutil::Fixture;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("[7 1e3 {0 1}]"), vec!["[", "7", "1e3", "{", "0", "1", "}", "]"]);
    }

    #[test]
    fn test_text_roundtrip() {
        let mut fx = Fixture::toy();
        let pt = fx.plaintext(&[1, 5, 2]);
        let ct = fx.encrypt(&pt);
        let text = ct.to_string();
        assert!(text.starts_with("[7 "));
        let back = Ciphertext::read_from(&text, &fx.pk).unwrap();
        assert_eq!(back, ct);
        assert_eq!(back.noise_var(), ct.noise_var());
        assert_eq!(fx.decrypt(&back), pt);
    }

    #[test]
    fn test_empty_roundtrip() {
        let fx = Fixture::toy();
        let empty = Ciphertext::empty(&fx.pk);
        let text = empty.to_string();
        assert_eq!(text, "[7 0e0 {0 1 2 3 4 5} 0]");
        assert!(Ciphertext::read_from(&text, &fx.pk).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_mismatched_part() {
        let mut fx = Fixture::toy();
        let ct = fx.encrypt(&fx.plaintext(&[1]));
        let text = ct.to_string();
        // the ciphertext's set is printed first, the first part's second
        let bad = text.replacen("{0 1 2 3 4 5}", "{0 1 2 3 4}", 2).replacen("{0 1 2 3 4}", "{0 1 2 3 4 5}", 1);
        assert!(matches!(Ciphertext::read_from(&bad, &fx.pk), Err(StrataError::Parse(_))));
    }

    #[test]
    fn test_rejects_truncated() {
        let mut fx = Fixture::toy();
        let text = fx.encrypt(&fx.plaintext(&[3])).to_string();
        let cut = &text[..text.len() / 2];
        assert!(matches!(Ciphertext::read_from(cut, &fx.pk), Err(StrataError::Parse(_))));
        assert!(matches!(
            Ciphertext::read_from(&format!("{text} ]"), &fx.pk),
            Err(StrataError::Parse(_))
        ));
    }
}

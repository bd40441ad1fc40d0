use criterion::{criterion_group, criterion_main, Criterion, black_box};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use strata::chain::PrimeSet;
use strata::keys::encrypt::{decrypt, encrypt_pk_with_rng, encrypt_sk_with_rng};
use strata::keys::keygen::SecretKey;
use strata::params::presets::small_context;
use strata::ring::poly::CoeffPoly;

fn plaintext(n: usize, t: u64, seed: u64) -> CoeffPoly {
    let coeffs = (0..n as u64).map(|i| (i * 31 + seed) % t).collect();
    CoeffPoly { coeffs, modulus: t }
}

fn keygen(c: &mut Criterion) {
    let ctx = small_context().unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(0);

    c.bench_function("keygen_secret_with_relin", |b| {
        b.iter(|| {
            let mut sk = SecretKey::new(&ctx);
            sk.gen_secret_key_with_rng(black_box(64), &mut rng).unwrap();
            sk
        })
    });
}

fn encrypt_decrypt(c: &mut Criterion) {
    let ctx = small_context().unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let mut sk = SecretKey::new(&ctx);
    sk.gen_secret_key_with_rng(64, &mut rng).unwrap();
    let pk = sk.public_key();
    let pt = plaintext(ctx.ring_degree, ctx.ptxt_space, 5);

    c.bench_function("encrypt_sk", |b| {
        b.iter(|| encrypt_sk_with_rng(black_box(&pt), &sk, &pk, &mut rng))
    });

    c.bench_function("encrypt_pk", |b| {
        b.iter(|| encrypt_pk_with_rng(black_box(&pt), &pk, &mut rng))
    });

    let ct = encrypt_sk_with_rng(&pt, &sk, &pk, &mut rng).unwrap();
    c.bench_function("decrypt", |b| {
        b.iter(|| decrypt(black_box(&ct), &sk))
    });
}

fn maintenance(c: &mut Criterion) {
    let ctx = small_context().unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let mut sk = SecretKey::new(&ctx);
    sk.gen_secret_key_with_rng(64, &mut rng).unwrap();
    sk.add_automorph_matrices_with_rng(0, &[3], &mut rng).unwrap();
    let pk = sk.public_key();
    let ct1 = encrypt_sk_with_rng(&plaintext(ctx.ring_degree, ctx.ptxt_space, 1), &sk, &pk, &mut rng).unwrap();
    let ct2 = encrypt_sk_with_rng(&plaintext(ctx.ring_degree, ctx.ptxt_space, 2), &sk, &pk, &mut rng).unwrap();
    let lower = PrimeSet::interval(0, 4);

    c.bench_function("add", |b| {
        b.iter(|| black_box(&ct1).add(black_box(&ct2)))
    });

    c.bench_function("mod_down_rounding", |b| {
        b.iter(|| black_box(&ct1).mod_down_to_set(&lower))
    });

    c.bench_function("tensor_only", |b| {
        b.iter(|| black_box(&ct1).mul(black_box(&ct2)))
    });

    let prod = ct1.mul(&ct2).unwrap();
    c.bench_function("relinearize", |b| {
        b.iter(|| black_box(&prod).relinearize(0))
    });

    c.bench_function("multiply_by", |b| {
        b.iter(|| black_box(&ct1).multiply_by(black_box(&ct2)))
    });

    c.bench_function("smart_automorph_one_hop", |b| {
        b.iter(|| black_box(&ct1).smart_automorph(3))
    });

    c.bench_function("serialize", |b| {
        b.iter(|| black_box(&ct1).to_string())
    });
}

criterion_group!(benches, keygen, encrypt_decrypt, maintenance);
criterion_main!(benches);

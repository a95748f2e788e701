use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SECRET: &[u8] = b"whsec_bench";

fn sign_bench(c: &mut Criterion) {
    let body = vec![b'x'; 2048];

    c.bench_function("sign_payload_2KB", |b| {
        b.iter(|| crew_crypto::sign_payload(SECRET, black_box(1_700_000_000), black_box(&body)))
    });
}

fn verify_bench(c: &mut Criterion) {
    let body = vec![b'x'; 2048];
    let header = crew_crypto::signature_header(SECRET, 1_700_000_000, &body).unwrap();

    c.bench_function("verify_webhook_2KB", |b| {
        b.iter(|| {
            crew_crypto::verify_webhook_signature(
                black_box(&body),
                black_box(&header),
                SECRET,
                1_700_000_000,
                300,
            )
        })
    });
}

fn token_digest_bench(c: &mut Criterion) {
    c.bench_function("sha256_hex_token", |b| {
        b.iter(|| crew_crypto::sha256_hex(black_box("op-token-0123456789abcdef")))
    });
}

criterion_group!(benches, sign_bench, verify_bench, token_digest_bench);
criterion_main!(benches);

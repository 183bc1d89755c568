use std::sync::OnceLock;

use sbx_crypto::{
    decrypt_file, encrypt_file, generate_file_key, generate_identity, unwrap_key, wrap_key_for,
    IdentityKeyPair,
};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn identity() -> &'static IdentityKeyPair {
    static IDENTITY: OnceLock<IdentityKeyPair> = OnceLock::new();
    IDENTITY.get_or_init(|| generate_identity().unwrap())
}

#[divan::bench(sample_count = 10)]
fn bench_generate_identity() -> IdentityKeyPair {
    generate_identity().unwrap()
}

#[divan::bench]
fn bench_generate_file_key() -> sbx_crypto::FileKey {
    generate_file_key()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_file(bencher: divan::Bencher, size: usize) {
    let file_key = generate_file_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt_file(divan::black_box(&data), divan::black_box(&file_key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_file(bencher: divan::Bencher, size: usize) {
    let file_key = generate_file_key();
    let data = make_data(size);
    let envelope = encrypt_file(&data, &file_key).unwrap().to_bytes();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt_file(divan::black_box(&envelope), divan::black_box(&file_key)).unwrap()
        });
}

#[divan::bench]
fn bench_wrap_key(bencher: divan::Bencher) {
    let file_key = generate_file_key();
    let public = &identity().public;
    bencher.bench(|| wrap_key_for(divan::black_box(&file_key), divan::black_box(public)).unwrap());
}

#[divan::bench]
fn bench_unwrap_key(bencher: divan::Bencher) {
    let file_key = generate_file_key();
    let wrapped = wrap_key_for(&file_key, &identity().public).unwrap();
    let private = &identity().private;
    bencher.bench(|| unwrap_key(divan::black_box(private), divan::black_box(&wrapped)).unwrap());
}

fn main() {
    divan::main();
}

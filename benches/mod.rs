use criterion::{criterion_group, criterion_main};

mod at;

criterion_group!(
    benches,
    at::classifier::bench_status_lines,
    at::classifier::bench_socket_read,
    at::classifier::bench_byte_at_a_time
);
criterion_main!(benches);

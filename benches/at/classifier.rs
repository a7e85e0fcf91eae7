use criterion::{BatchSize, Criterion, Throughput};
use libcellular::at::{Classifier, RX_BUFFER_SIZE, Scan};

const STATUS: &[u8] = b"\r\n+CREG: 2,1,\"3A9B\",\"01A2B3C4\",2\r\n\r\nOK\r\n\
\r\n+CGREG: 2,1,\"3A9B\",\"01A2B3C4\",2\r\n\r\nOK\r\n\
\r\n+CSQ: 15,2\r\n\r\nOK\r\n\
\r\n+UUSORD: 0,1024\r\n";

/// A full-size `+USORD` reply whose payload is all quotes and line ends.
fn socket_read() -> Vec<u8> {
    let mut reply = b"\r\n+USORD: 0,1024,\"".to_vec();
    reply.extend((0..1024).map(|i| [b'"', b'\r', b'\n', b'x'][i % 4]));
    reply.extend_from_slice(b"\"\r\n\r\nOK\r\n");
    reply
}

/// Classify `stream` fed in `step`-byte pieces, returning the unit count.
fn drain(stream: &[u8], step: usize) -> usize {
    let mut rx: Classifier<RX_BUFFER_SIZE> = Classifier::new();
    let mut units = 0;
    for piece in stream.chunks(step) {
        rx.feed(piece);
        while let Scan::Unit(unit) = rx.scan() {
            rx.consume(unit.len);
            units += 1;
        }
    }
    units
}

pub fn bench_status_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_status");
    group.throughput(Throughput::Bytes(STATUS.len() as u64));
    group.bench_function("status_lines", |b| b.iter(|| drain(STATUS, STATUS.len())));
    group.finish();
}

pub fn bench_socket_read(c: &mut Criterion) {
    let reply = socket_read();
    let mut group = c.benchmark_group("classify_socket_read");
    group.throughput(Throughput::Bytes(reply.len() as u64));
    group.bench_function("usord_1024", |b| {
        b.iter_batched_ref(
            || reply.clone(),
            |reply| drain(reply, 64),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_byte_at_a_time(c: &mut Criterion) {
    let reply = socket_read();
    let mut group = c.benchmark_group("classify_byte_at_a_time");
    group.throughput(Throughput::Bytes(reply.len() as u64));
    group.bench_function("usord_1024", |b| b.iter(|| drain(&reply, 1)));
    group.finish();
}

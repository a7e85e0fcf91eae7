use libcellular::at::{Classifier, RX_BUFFER_SIZE, ResponseKind, Scan, fields};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A session transcript mixing replies, notifications and payloads.
const TRANSCRIPT: &[u8] = b"\r\n+CREG: 2,1,\"3A9B\",\"01A2B3C4\"\r\n\r\nOK\r\n\
\r\n+UUSORD: 0,6\r\n\
\r\n+USORD: 0,6,\"a\"\r\nOK\"\r\n\r\nOK\r\n\
\r\n+USORF: 1,\"10.0.0.9\",5683,4,\"\r\n\r\n\"\r\n\r\nOK\r\n\
\r\n@\
\r\nOK\r\n\
\r\n+CME ERROR: operation not allowed\r\n\
\r\nSARA-U260\r\n\r\nOK\r\n\
\r\n+UUSOCL: 0\r\n";

fn classify(stream: &[u8], mut chunk: impl FnMut() -> usize) -> Vec<(ResponseKind, Vec<u8>)> {
    let mut rx: Classifier<RX_BUFFER_SIZE> = Classifier::new();
    let mut out = Vec::new();
    let mut rest = stream;
    while !rest.is_empty() {
        let n = chunk().min(rest.len());
        assert_eq!(rx.feed(&rest[..n]), n);
        rest = &rest[n..];
        while let Scan::Unit(unit) = rx.scan() {
            out.push((unit.kind, rx.bytes(&unit).to_vec()));
            rx.consume(unit.len);
        }
    }
    assert_eq!(rx.buffered(), 0);
    out
}

#[test]
fn test_random_chunking_is_invariant() {
    let _ = env_logger::builder().is_test(true).try_init();
    let whole = classify(TRANSCRIPT, || TRANSCRIPT.len());
    let kinds: Vec<ResponseKind> = whole.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        kinds,
        vec![
            ResponseKind::Plus,
            ResponseKind::Ok,
            ResponseKind::Plus,
            ResponseKind::Plus,
            // blank line between the payload reply and its OK
            ResponseKind::Unknown,
            ResponseKind::Ok,
            ResponseKind::Plus,
            ResponseKind::Ok,
            ResponseKind::Prompt,
            ResponseKind::Ok,
            ResponseKind::Error,
            ResponseKind::Unknown,
            ResponseKind::Ok,
            ResponseKind::Plus,
        ]
    );

    let mut rng = StdRng::seed_from_u64(0x5a4a);
    for _ in 0..200 {
        let max = rng.gen_range(1..=32);
        let got = classify(TRANSCRIPT, || rng.gen_range(1..=max));
        assert_eq!(got, whole);
    }
}

#[test]
fn test_payload_bytes_survive_chunking() {
    let whole = classify(TRANSCRIPT, || 1);
    let (_, unit) = whole
        .iter()
        .find(|(_, bytes)| bytes.starts_with(b"\r\n+USORF"))
        .unwrap();
    let (header, data) = fields::payload_reply(unit, "USORF", 4).unwrap();
    assert_eq!(fields::ipv4(&header, 1), Ok(core::net::Ipv4Addr::new(10, 0, 0, 9)));
    assert_eq!(fields::int::<u16>(&header, 2), Ok(5683));
    assert_eq!(data, b"\r\n\r\n");

    let (_, unit) = whole
        .iter()
        .find(|(_, bytes)| bytes.starts_with(b"\r\n+USORD"))
        .unwrap();
    let (_, data) = fields::payload_reply(unit, "USORD", 2).unwrap();
    assert_eq!(data, b"a\"\r\nOK");
}

#[test]
fn test_random_garbage_never_stalls() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let len = rng.gen_range(1..512);
        let noise: Vec<u8> = (0..len).map(|_| rng.gen_range(0x20u8..0x7f)).collect();
        let mut rx: Classifier<64> = Classifier::new();
        let mut rest = noise.as_slice();
        while !rest.is_empty() {
            let n = rx.feed(rest);
            rest = &rest[n..];
            while let Scan::Unit(unit) = rx.scan() {
                rx.consume(unit.len);
            }
        }
        assert!(rx.buffered() < 64);
    }
}

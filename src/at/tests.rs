use super::*;

/// Feed `stream` in pieces of `step` bytes, collecting every unit.
fn units<const N: usize>(stream: &[u8], step: usize) -> Vec<(ResponseKind, Vec<u8>)> {
    let mut rx: Classifier<N> = Classifier::new();
    let mut out = Vec::new();
    for piece in stream.chunks(step) {
        assert_eq!(rx.feed(piece), piece.len());
        while let Scan::Unit(unit) = rx.scan() {
            out.push((unit.kind, rx.bytes(&unit).to_vec()));
            rx.consume(unit.len);
        }
    }
    out
}

#[test]
fn test_final_results() {
    let scan = classifier::classify(b"\r\nOK\r\n", false, 64);
    assert_eq!(
        scan,
        Scan::Unit(Classified {
            kind: ResponseKind::Ok,
            len: 6
        })
    );

    let scan = classifier::classify(b"\r\nERROR\r\n", false, 64);
    assert!(matches!(scan, Scan::Unit(Classified { kind: ResponseKind::Error, .. })));

    let scan = classifier::classify(b"\r\nABORTED\r\n", false, 64);
    assert!(matches!(scan, Scan::Unit(Classified { kind: ResponseKind::Aborted, .. })));
}

#[test]
fn test_partial_line_waits() {
    assert_eq!(classifier::classify(b"\r\nO", false, 64), Scan::Wait);
    assert_eq!(classifier::classify(b"\r\n+CREG: 2,1", false, 64), Scan::Wait);
    assert_eq!(classifier::classify(b"", false, 64), Scan::Wait);
}

#[test]
fn test_cme_error_keeps_text() {
    let stream = b"\r\n+CME ERROR: SIM not inserted\r\n";
    let got = units::<64>(stream, stream.len());
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].0, ResponseKind::Error);

    let response = Response {
        kind: got[0].0,
        bytes: &got[0].1,
    };
    assert_eq!(response.text(), "+CME ERROR: SIM not inserted");
}

#[test]
fn test_payload_with_quote_and_crlf() {
    let stream = b"\r\n+USORD: 0,5,\"a\"\r\nb\"\r\nOK\r\n";
    let got = units::<64>(stream, stream.len());
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].0, ResponseKind::Plus);
    assert_eq!(got[1].0, ResponseKind::Ok);

    let (header, data) = fields::payload_reply(&got[0].1, "USORD", 2).unwrap();
    assert_eq!(header.as_slice(), &["0", "5"]);
    assert_eq!(data, b"a\"\r\nb");
}

#[test]
fn test_oversized_length_is_plain_line() {
    // a length that cannot fit the buffer must not stall the channel
    let stream = b"\r\n+USORD: 0,9999,\"ab\r\n";
    let scan = classifier::classify(stream, false, 64);
    assert_eq!(
        scan,
        Scan::Unit(Classified {
            kind: ResponseKind::Plus,
            len: stream.len()
        })
    );
}

#[test]
fn test_unknown_prefix_delivered() {
    let stream = b"SARA-U260\r\nOK\r\n";
    let got = units::<64>(stream, stream.len());
    assert_eq!(got.len(), 2);
    assert_eq!(got[0], (ResponseKind::Unknown, b"SARA-U260".to_vec()));
    assert_eq!(got[1].0, ResponseKind::Ok);
}

#[test]
fn test_identity_line() {
    let stream = b"\r\nSARA-U260\r\n\r\nOK\r\n";
    let got = units::<64>(stream, 1);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].0, ResponseKind::Unknown);
    let response = Response {
        kind: got[0].0,
        bytes: &got[0].1,
    };
    assert_eq!(response.text(), "SARA-U260");
}

#[test]
fn test_prompt() {
    let got = units::<64>(b"\r\n@", 3);
    assert_eq!(got, vec![(ResponseKind::Prompt, b"\r\n@".to_vec())]);
}

#[test]
fn test_byte_at_a_time_matches_one_shot() {
    let stream: &[u8] = b"\r\n+UUSORD: 0,12\r\n\r\n+USORD: 0,3,\"x\"y\"\r\nOK\r\n\r\n+CGREG: 2,1\r\n";
    let whole = units::<128>(stream, stream.len());
    assert_eq!(whole.len(), 4);
    assert_eq!(units::<128>(stream, 1), whole);
    assert_eq!(units::<128>(stream, 7), whole);
}

#[test]
fn test_full_buffer_flushes_unknown() {
    let mut rx: Classifier<8> = Classifier::new();
    assert_eq!(rx.feed(b"garbage!xyz"), 8);
    assert_eq!(
        rx.scan(),
        Scan::Unit(Classified {
            kind: ResponseKind::Unknown,
            len: 8
        })
    );
    rx.consume(8);
    assert_eq!(rx.buffered(), 0);
}

#[test]
fn test_response_helpers() {
    let response = Response {
        kind: ResponseKind::Plus,
        bytes: b"\r\n+CREG: 2,1\r\n",
    };
    assert_eq!(response.line(), b"+CREG: 2,1");
    assert_eq!(response.plus_body(), Some("CREG: 2,1"));

    let ok = Response {
        kind: ResponseKind::Ok,
        bytes: b"\r\nOK\r\n",
    };
    assert_eq!(ok.plus_body(), None);
    assert!(ok.kind.is_final());
    assert!(!ResponseKind::Ring.is_final());
}

#[test]
fn test_split_fields_keeps_quoted_commas() {
    let f = fields::named("+COPS: 0,2,\"310,410\",7", "COPS").unwrap();
    assert_eq!(f.len(), 4);
    assert_eq!(fields::quoted(&f, 2), Ok("310,410"));
    assert_eq!(fields::int::<u8>(&f, 3), Ok(7));
    assert_eq!(fields::int::<u8>(&f, 4), Err(fields::FieldError::Missing));
}

#[test]
fn test_typed_fields() {
    let f = fields::named("CREG: 2,1,\"3A9B\",\"01A2B3C4\",7", "CREG").unwrap();
    assert_eq!(fields::hex(&f, 2), Ok(0x3A9B));
    assert_eq!(fields::hex(&f, 3), Ok(0x01A2_B3C4));
    assert_eq!(fields::named("+CGREG: 1", "CREG"), Err(fields::FieldError::WrongName));

    let f = fields::named("UPSND: 0,0,\"10.52.1.7\"", "UPSND").unwrap();
    assert_eq!(fields::ipv4(&f, 2), Ok(core::net::Ipv4Addr::new(10, 52, 1, 7)));
    assert_eq!(fields::parse_ipv4("example.com"), None);
}

#[test]
fn test_printable_escapes_control_bytes() {
    let text = format!("{}", Printable(b"OK\r\n\x01"));
    assert_eq!(text, "OK\\r\\n\\x01");
}

use sio_protocol::{encoder::Buffer, Decoder, Input, Packet, PacketType, Value};

#[test]
fn scenario_a_encode_decode_event() {
    let packet = Packet::event("/", "msg", vec![Value::string("hi")]).unwrap();
    let bufs = sio_protocol::encode(&packet).unwrap();
    assert_eq!(bufs, vec![Buffer::Text(r#"2["msg","hi"]"#.to_string())]);

    let Buffer::Text(header) = &bufs[0] else {
        panic!("expected text header");
    };
    let mut decoder = Decoder::new();
    let decoded = decoder.feed(Input::Text(header.clone())).unwrap().unwrap();
    assert_eq!(decoded.packet_type, packet.packet_type);
    assert_eq!(decoded.payload, packet.payload);
}

#[test]
fn scenario_b_binary_upgrade_round_trip() {
    let packet = Packet::event("/", "upload", vec![Value::Bytes(vec![0x01, 0x02])]).unwrap();
    let bufs = sio_protocol::encode(&packet).unwrap();
    assert_eq!(
        bufs,
        vec![
            Buffer::Text(r#"51-["upload",{"_placeholder":true,"num":0}]"#.to_string()),
            Buffer::Binary(vec![0x01, 0x02]),
        ]
    );

    let mut decoder = Decoder::new();
    let Buffer::Text(header) = &bufs[0] else {
        panic!("expected text header");
    };
    assert!(decoder.feed(Input::Text(header.clone())).unwrap().is_none());
    let Buffer::Binary(attachment) = &bufs[1] else {
        panic!("expected binary attachment");
    };
    let decoded = decoder
        .feed(Input::Binary(attachment.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(decoded.packet_type, PacketType::BinaryEvent);
    match &decoded.payload {
        Value::Array(items) => {
            assert_eq!(items[0], Value::string("upload"));
            assert_eq!(items[1], Value::Bytes(vec![0x01, 0x02]));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

/// Round-trip fidelity and attachment-count bookkeeping, table-driven over a handful of
/// representative cases rather than pulling in a property-test dependency.
#[test]
fn invariant_round_trip_and_attachment_count_over_case_table() {
    let cases: Vec<Packet> = vec![
        Packet::event("/", "ping", vec![]).unwrap(),
        Packet::event("/", "msg", vec![Value::string("hi"), Value::from(42u64)]).unwrap(),
        Packet::event_with_ack("/chat", "msg", vec![Value::string("hi")], 17).unwrap(),
        Packet::ack("/", 3, vec![Value::string("ok")]),
        Packet::disconnect("/room"),
        Packet::event(
            "/",
            "upload",
            vec![Value::Bytes(vec![1, 2, 3]), Value::Bytes(vec![4, 5])],
        )
        .unwrap(),
    ];

    for packet in cases {
        let bufs = sio_protocol::encode(&packet).unwrap();
        let Buffer::Text(header) = &bufs[0] else {
            panic!("first buffer must be text");
        };

        let declared_attachments = bufs.len() as u64 - 1;
        let mut decoder = Decoder::new();
        let mut decoded = decoder.feed(Input::Text(header.clone())).unwrap();
        for buf in &bufs[1..] {
            let Buffer::Binary(b) = buf else {
                panic!("attachment buffers must be binary");
            };
            decoded = decoder.feed(Input::Binary(b.clone())).unwrap();
        }
        let decoded = decoded.expect("packet should have been fully reconstructed");

        assert_eq!(decoded.packet_type, packet.packet_type);
        assert_eq!(decoded.namespace, packet.namespace);
        assert_eq!(decoded.ack_id, packet.ack_id);
        assert_eq!(decoded.payload, packet.payload);
        if declared_attachments > 0 {
            assert_eq!(decoded.attachments, Some(declared_attachments));
        }
    }
}

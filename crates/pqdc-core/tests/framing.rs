use pqdc_core::{cbor_from_slice, cbor_to_vec, read_frame, write_frame, FrameError};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Greeting {
    text: String,
    sequence: u32,
}

#[tokio::test]
async fn frames_survive_a_byte_stream_in_order() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    let writer = tokio::spawn(async move {
        for sequence in 0..3u32 {
            let payload = cbor_to_vec(&Greeting {
                text: "hello, server".into(),
                sequence,
            })
            .expect("encode greeting");
            write_frame(&mut client, &payload).await.expect("write frame");
        }
    });

    for expected in 0..3u32 {
        let frame = read_frame(&mut server).await.expect("read frame");
        let greeting: Greeting = cbor_from_slice(&frame).expect("decode greeting");
        assert_eq!(greeting.sequence, expected);
        assert_eq!(greeting.text, "hello, server");
    }

    writer.await.expect("writer task");
    let err = read_frame(&mut server).await.expect_err("stream drained");
    assert!(matches!(err, FrameError::Closed));
}

#[tokio::test]
async fn empty_payloads_are_refused() {
    let (mut client, _server) = tokio::io::duplex(64);
    let err = write_frame(&mut client, &[]).await.expect_err("empty");
    assert!(matches!(err, FrameError::Empty));
}

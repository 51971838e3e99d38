//! Integration tests for the portpool-core frame codec.
//!
//! These tests drive the public API the way a connection handler does: bytes
//! arrive on an async stream and [`read_frame`] must either yield one complete
//! message or a typed error.  They cover the size ceiling, truncation, and
//! several frames sharing one stream.

use portpool_core::{encode_frame, read_frame, write_frame, FrameError, Message, MAX_MESSAGE_SIZE};
use serde_json::json;

/// Builds a well-formed message body of exactly `size` bytes.
fn body_of_exact_size(size: usize) -> Vec<u8> {
    let prefix = br#"{"action":"echo","payload":{"pad":""#;
    let suffix = br#""}}"#;
    let pad = size - prefix.len() - suffix.len();

    let mut body = Vec::with_capacity(size);
    body.extend_from_slice(prefix);
    body.extend(std::iter::repeat(b'x').take(pad));
    body.extend_from_slice(suffix);
    assert_eq!(body.len(), size);
    body
}

fn frame_from_body(body: &[u8]) -> Vec<u8> {
    let mut frame = (body.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(body);
    frame
}

#[tokio::test]
async fn test_frame_of_exactly_max_size_decodes() {
    // Arrange
    let frame = frame_from_body(&body_of_exact_size(MAX_MESSAGE_SIZE));
    let mut reader: &[u8] = &frame;

    // Act
    let msg = read_frame(&mut reader).await.expect("max-size frame must decode");

    // Assert
    assert_eq!(msg.action, "echo");
    let pad = msg.payload["pad"].as_str().unwrap();
    assert!(pad.bytes().all(|b| b == b'x'));
    assert!(reader.is_empty(), "the whole frame must be consumed");
}

#[tokio::test]
async fn test_frame_one_byte_over_max_is_rejected() {
    // Arrange – a valid body one byte over the limit.  The reader must stop at
    // the prefix, so the body must remain unread.
    let frame = frame_from_body(&body_of_exact_size(MAX_MESSAGE_SIZE + 1));
    let mut reader: &[u8] = &frame;

    // Act
    let result = read_frame(&mut reader).await;

    // Assert
    assert!(matches!(
        result,
        Err(FrameError::MessageTooLarge { declared, .. }) if declared == MAX_MESSAGE_SIZE + 1
    ));
    assert_eq!(
        reader.len(),
        MAX_MESSAGE_SIZE + 1,
        "the oversized body must not be read"
    );
}

#[tokio::test]
async fn test_body_cut_short_is_truncated_never_partial() {
    // Arrange – send the prefix and only half of the body, then close.
    let full = encode_frame(&Message::new(
        "echo",
        json!({"text": "this body will be cut"}).as_object().unwrap().clone(),
    ))
    .unwrap();
    let cut = full.len() - 10;
    let mut reader: &[u8] = &full[..cut];

    // Act
    let result = read_frame(&mut reader).await;

    // Assert
    match result {
        Err(FrameError::TruncatedMessage { expected, received }) => {
            assert_eq!(expected, full.len() - 4);
            assert_eq!(received, cut - 4);
        }
        other => panic!("expected TruncatedMessage, got {other:?}"),
    }
}

#[tokio::test]
async fn test_consecutive_frames_on_one_stream_decode_in_order() {
    // Arrange – write two frames into an in-memory duplex pipe.
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);
    let hello = Message::empty("hello");
    let echo = Message::new("echo", json!({"n": 1}).as_object().unwrap().clone());

    write_frame(&mut client, &hello).await.unwrap();
    write_frame(&mut client, &echo).await.unwrap();
    drop(client);

    // Act
    let first = read_frame(&mut server).await.unwrap();
    let second = read_frame(&mut server).await.unwrap();
    let third = read_frame(&mut server).await;

    // Assert
    assert_eq!(first, hello);
    assert_eq!(second, echo);
    assert!(matches!(third, Err(FrameError::ConnectionClosed)));
}

#[tokio::test]
async fn test_zero_length_frame_is_malformed_not_transport_error() {
    let mut reader: &[u8] = &[0, 0, 0, 0];

    let err = read_frame(&mut reader).await.unwrap_err();

    assert!(err.is_recoverable());
}

//! Verify the length-prefixed message framer reassembles whole messages out
//! of a byte stream regardless of how the underlying transport chunks its
//! writes, including back-to-back messages delivered in one read.

use anyhow::Result;
use tokio::io::{duplex, AsyncWriteExt};

use transport_rs::executor::Executor;
use transport_rs::framing::message_reader::{LengthPrefixed, MessageReader};
use transport_rs::framing::message_reader_transport::MessageReaderTransport;
use transport_rs::transport::inprocess::InprocessTransportHost;
use transport_rs::transport::io_transport::IoTransport;
use transport_rs::transport::{AnyTransport, Transport};

#[tokio::test]
async fn three_length_prefixed_messages_reassemble_from_one_write() -> Result<()> {
    let executor = Executor::current();
    let (mut peer, local) = duplex(4096);

    let io = IoTransport::new(local, "test", true, executor);
    let mut framed = MessageReaderTransport::new(
        AnyTransport::new(Box::new(io)),
        MessageReader::new(64, LengthPrefixed::u16()),
    );
    framed.open().await?;

    // One write carrying three length-prefixed messages back to back:
    // a 1-byte body, a 2-byte body, and a 3-byte body.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&[0xAA]);
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&[0xBB, 0xCC]);
    bytes.extend_from_slice(&3u16.to_le_bytes());
    bytes.extend_from_slice(&[0x01, 0x02, 0x03]);
    peer.write_all(&bytes).await?;

    let mut buf = [0u8; 32];

    let n = framed.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"\x01\x00\xAA");

    let n = framed.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"\x02\x00\xBB\xCC");

    let n = framed.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"\x03\x00\x01\x02\x03");

    Ok(())
}

#[tokio::test]
async fn a_message_split_across_several_writes_still_reassembles() -> Result<()> {
    let executor = Executor::current();
    let (mut peer, local) = duplex(64);

    let io = IoTransport::new(local, "test", true, executor);
    let mut framed = MessageReaderTransport::new(
        AnyTransport::new(Box::new(io)),
        MessageReader::new(64, LengthPrefixed::u16()),
    );
    framed.open().await?;

    peer.write_all(&5u16.to_le_bytes()).await?;
    peer.write_all(b"he").await?;
    peer.write_all(b"llo").await?;

    let mut buf = [0u8; 16];
    let n = framed.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"\x05\x00hello");

    Ok(())
}

#[tokio::test]
async fn a_trailing_partial_message_in_one_datagram_is_rejected() -> Result<()> {
    let host = InprocessTransportHost::new();
    let executor = Executor::current();

    let mut server = AnyTransport::new(Box::new(host.create_server("framer-composite", executor.clone())));
    server.open().await?;
    let mut client = AnyTransport::new(Box::new(host.create_client("framer-composite", executor.clone())));
    client.open().await?;
    let accepted = server.accept().await?;

    let mut framed = MessageReaderTransport::new(accepted, MessageReader::new(64, LengthPrefixed::u16()));
    framed.open().await?;

    // One underlying message-oriented datagram carrying a complete 2-byte
    // message followed by the start of a second message that never arrives.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(b"ok");
    bytes.extend_from_slice(&9u16.to_le_bytes());
    bytes.extend_from_slice(b"partial");
    client.write(&bytes).await?;

    let mut buf = [0u8; 32];
    let n = framed.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"\x02\x00ok");

    let err = framed.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, transport_rs::TransportError::Failed(_)));

    Ok(())
}

//! Verify a passive UDP transport demultiplexes datagrams from distinct peer
//! addresses into distinct accepted transports, and keeps routing each peer's
//! later datagrams to the transport it was originally accepted on.

use anyhow::Result;

use transport_rs::executor::Executor;
use transport_rs::transport::udp::{ActiveUdpTransport, PassiveUdpTransport};
use transport_rs::transport::{AnyTransport, Transport};

const SERVER_PORT: u16 = 58231;

#[tokio::test]
async fn two_peers_demux_into_two_accepted_transports() -> Result<()> {
    let executor = Executor::current();

    let mut server = AnyTransport::new(Box::new(PassiveUdpTransport::new(
        "127.0.0.1",
        SERVER_PORT,
        executor.clone(),
    )));
    server.open().await?;

    let mut client_a = AnyTransport::new(Box::new(ActiveUdpTransport::new(
        "127.0.0.1",
        SERVER_PORT,
        executor.clone(),
    )));
    client_a.open().await?;
    let mut client_b = AnyTransport::new(Box::new(ActiveUdpTransport::new(
        "127.0.0.1",
        SERVER_PORT,
        executor.clone(),
    )));
    client_b.open().await?;

    client_a.write(b"from-a").await?;
    client_b.write(b"from-b").await?;

    let mut first = server.accept().await?;
    let mut second = server.accept().await?;

    let mut buf = [0u8; 32];
    let n1 = first.read(&mut buf).await?;
    let first_payload = buf[..n1].to_vec();
    let n2 = second.read(&mut buf).await?;
    let second_payload = buf[..n2].to_vec();

    // The two accepted transports are distinct peers; exactly one of each
    // expected payload, order unconstrained.
    let mut payloads = vec![first_payload.clone(), second_payload.clone()];
    payloads.sort();
    assert_eq!(payloads, vec![b"from-a".to_vec(), b"from-b".to_vec()]);

    // Later datagrams from the same peers keep routing to the same accepted
    // transport each was originally demultiplexed onto.
    client_a.write(b"a-again").await?;
    client_b.write(b"b-again").await?;

    let (a_side, b_side) = if first_payload == b"from-a" {
        (&mut first, &mut second)
    } else {
        (&mut second, &mut first)
    };

    let n = a_side.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"a-again");
    let n = b_side.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"b-again");

    Ok(())
}

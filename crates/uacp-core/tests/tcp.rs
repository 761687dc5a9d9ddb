//! Dial and accept over real loopback TCP.

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use tokio::{net::TcpListener, time::Instant};
use uacp_core::{
    ConnError, ConnIdAllocator, HandshakeError, Listener, ListenerConfig,
    transport::tcp::{TcpAcceptor, TcpConnector},
};
use uacp_proto::{MessageType, Reassembled, StatusCode};

async fn loopback_listener() -> (Listener<TcpAcceptor, TcpConnector>, String) {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let url = format!("opc.tcp://127.0.0.1:{port}/ua");
    let listener = Listener::with_acceptor(
        TcpAcceptor::from_listener(socket),
        TcpConnector,
        url.clone(),
        ListenerConfig::default(),
        Arc::new(ConnIdAllocator::new()),
    );
    (listener, url)
}

#[tokio::test]
async fn exchange_chunked_messages_over_tcp() {
    let (listener, url) = loopback_listener().await;

    let (server, client) = tokio::join!(listener.accept(), uacp_core::dial(&url));
    let (mut server, mut client) = (server.unwrap(), client.unwrap());
    assert_eq!(server.limits(), client.limits());
    assert_eq!(client.peer_addr().unwrap(), listener.local_addr().unwrap());
    assert_eq!(server.peer_addr().unwrap(), client.local_addr().unwrap());

    // spans several chunks at the default buffer sizes
    let body = (0..200_000u32).map(|i| i as u8).collect::<Vec<_>>();
    client.set_deadline(Some(Instant::now() + Duration::from_secs(10)));
    let (sent, received) =
        tokio::join!(client.send_message(MessageType::Message, &body), server.recv_message());
    sent.unwrap();
    let Reassembled::Complete { body: got, .. } = received.unwrap() else {
        panic!("expected a complete message");
    };
    assert_eq!(&got[..], &body[..]);

    server.send_message(MessageType::Message, b"ok").await.unwrap();
    let reply = client.recv_message().await.unwrap();
    assert!(matches!(reply, Reassembled::Complete { ref body, .. } if &body[..] == b"ok"));

    client.close().await.unwrap();
    assert!(matches!(client.close().await, Err(ConnError::AlreadyClosed)));
    assert!(client.is_closed());

    // peer sees end of stream
    assert!(server.recv_message().await.is_err());
    server.close().await.unwrap();
    assert!(matches!(server.close().await, Err(ConnError::AlreadyClosed)));
}

#[tokio::test]
async fn wrong_path_is_rejected_over_tcp() {
    let (listener, url) = loopback_listener().await;
    let wrong = url.replace("/ua", "/other");

    let (server, client) = tokio::join!(listener.accept(), uacp_core::dial(&wrong));
    assert!(matches!(
        server,
        Err(ConnError::Handshake(HandshakeError::EndpointMismatch { .. }))
    ));
    assert!(matches!(
        client,
        Err(ConnError::Handshake(HandshakeError::Rejected {
            code: StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
            ..
        }))
    ));
}

#[tokio::test]
async fn bind_picks_an_ephemeral_port() {
    let listener =
        Listener::bind("opc.tcp://127.0.0.1:0", ListenerConfig::default()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_ne!(addr.port(), 0);
    listener.close();

    let err = uacp_core::dial(&format!("opc.tcp://127.0.0.1:{}", addr.port())).await.unwrap_err();
    assert!(matches!(err, ConnError::Connect { .. }));
}

//! End-to-end tests of a correlator bound to a transport, with a mock
//! background dispatcher on the other end.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use correlator::testing::EchoDispatcher;
use correlator::{Channel, CorrelatorConfig, Error, RequestCorrelator};
use futures::StreamExt;
use futures::future::join_all;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wire::testing::MemoryTransport;
use wire::{Framing, Message, MessageCodec, MessageReader, RemoteError, Transport};

#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }
    let _ = color_eyre::install();
}

fn channel_pair(config: CorrelatorConfig) -> (Channel, MemoryTransport) {
    let (client, server) = MemoryTransport::pair();
    let channel = Channel::from_transport(client, RequestCorrelator::builder().config(config));
    (channel, server)
}

#[tokio::test]
async fn call_roundtrip() -> eyre::Result<()> {
    let (channel, server) = channel_pair(CorrelatorConfig::default());
    let dispatcher = EchoDispatcher::spawn(server, Framing::ContentLength);

    let response = channel
        .call(Message::request(7, "ping", Some(json!(["pong"]))))
        .await?;
    assert_eq!(response.id, Some(json!(7)));
    assert_eq!(response.result, Some(json!(["pong"])));

    let received = dispatcher.received();
    assert_eq!(received.len(), 1);
    assert_ne!(received[0].id, Some(json!(7)));

    channel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_resolved_out_of_order() -> eyre::Result<()> {
    let (channel, server) = channel_pair(CorrelatorConfig::default());
    let _dispatcher = EchoDispatcher::spawn_reversed(server, Framing::ContentLength, 8, |m, p| {
        Ok(json!({"method": m, "params": p}))
    });

    let calls = (0..8).map(|n| {
        channel.call(Message::request(
            json!(format!("caller-{n}")),
            format!("method_{n}"),
            Some(json!([n])),
        ))
    });
    let responses = join_all(calls).await;

    for (n, response) in responses.into_iter().enumerate() {
        let response = response?;
        assert_eq!(response.id, Some(json!(format!("caller-{n}"))));
        assert_eq!(
            response.result,
            Some(json!({"method": format!("method_{n}"), "params": [n]}))
        );
    }
    assert_eq!(channel.correlator().pending_len(), 0);

    Ok(())
}

#[tokio::test]
async fn remote_errors_are_typed() -> eyre::Result<()> {
    let (channel, server) = channel_pair(CorrelatorConfig::default());
    let _dispatcher =
        EchoDispatcher::spawn_with(server, Framing::ContentLength, |method, _| match method {
            "eth_chainId" => Ok(json!("0x1")),
            other => Err(RemoteError::method_not_found(other)),
        });

    assert_eq!(channel.request("eth_chainId", None).await?, json!("0x1"));

    let err = channel.request("eth_mine", None).await.unwrap_err();
    match err {
        Error::Remote(remote) => assert_eq!(remote.code, RemoteError::METHOD_NOT_FOUND),
        other => panic!("expected remote error, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn transport_close_cancels_pending_calls() -> eyre::Result<()> {
    let (channel, server) = channel_pair(CorrelatorConfig::default());

    let silent = tokio::spawn(async move {
        let (mut reader, writer) = wire::split(server, Framing::ContentLength);
        let request = reader.next().await;
        drop(writer);
        drop(reader);
        request
    });

    let err = channel
        .call(Message::request(1, "eth_requestAccounts", None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "got {err:?}");
    assert!(channel.correlator().is_closed());

    let request = silent.await?.expect("dispatcher saw the request")?;
    assert_eq!(request.method.as_deref(), Some("eth_requestAccounts"));

    Ok(())
}

#[tokio::test]
async fn malformed_frame_cancels_pending_calls() -> eyre::Result<()> {
    let (channel, server) = channel_pair(CorrelatorConfig::default());
    let (read, mut write) = server.into_split();
    let mut reader = MessageReader::new(read, MessageCodec::content_length());

    let call = channel.call(Message::request(5, "eth_accounts", None));
    let garbage = async {
        let request = reader.next().await.expect("request arrives")?;
        write.write_all(b"Content-Length: 5\r\n\r\nnope!").await?;
        eyre::Ok(request)
    };
    let (outcome, request) = tokio::join!(call, garbage);

    assert_eq!(request?.method.as_deref(), Some("eth_accounts"));
    assert!(matches!(outcome, Err(Error::Cancelled)), "got {outcome:?}");
    assert!(channel.correlator().is_closed());

    drop(write);
    Ok(())
}

#[tokio::test]
async fn notifications_and_strays_from_the_remote_side() -> eyre::Result<()> {
    let (client, server) = MemoryTransport::pair();
    let strays = Arc::new(AtomicUsize::new(0));
    let channel = Channel::from_transport(
        client,
        RequestCorrelator::builder().on_stray({
            let strays = Arc::clone(&strays);
            move |_| {
                strays.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );
    let mut notifications = channel.notifications();

    let background = tokio::spawn(async move {
        let (mut reader, mut writer) = wire::split(server, Framing::ContentLength);
        let request = reader.next().await.unwrap().unwrap();

        writer
            .send(Message::notification("chainChanged", Some(json!("0x89"))))
            .await
            .unwrap();
        writer
            .send(Message::response(987_654, json!("nobody asked")))
            .await
            .unwrap();
        writer
            .send(Message::response(request.id.unwrap(), json!("ok")))
            .await
            .unwrap();

        (reader, writer)
    });

    let response = channel
        .call(Message::request("req", "wallet_switchChain", None))
        .await?;
    assert_eq!(response.result, Some(json!("ok")));

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.method.as_deref(), Some("chainChanged"));
    assert_eq!(strays.load(Ordering::SeqCst), 1);

    let _halves = background.await?;
    Ok(())
}

#[tokio::test]
async fn unanswered_calls_time_out_when_configured() -> eyre::Result<()> {
    let config = CorrelatorConfig::default().with_request_timeout(Duration::from_millis(50));
    let (channel, server) = channel_pair(config);
    let (_reader, _writer) = wire::split(server, Framing::ContentLength);

    let err = channel
        .call(Message::request(1, "eth_sign", None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TimedOut(d) if d == Duration::from_millis(50)));
    assert_eq!(channel.correlator().pending_len(), 0);

    Ok(())
}

#[tokio::test]
async fn line_framing_from_config() -> eyre::Result<()> {
    let config = CorrelatorConfig::from_toml_str(r#"framing = "lines""#)?;
    let (channel, server) = channel_pair(config);
    let _dispatcher = EchoDispatcher::spawn(server, Framing::Lines);

    let value = channel.request("echo", Some(json!({"k": "v"}))).await?;
    assert_eq!(value, json!({"k": "v"}));

    Ok(())
}

#[tokio::test]
async fn connect_over_tcp() -> eyre::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        EchoDispatcher::spawn(stream, Framing::ContentLength).join().await;
    });

    let channel = Channel::connect(addr, CorrelatorConfig::default()).await?;
    let value = channel.request("echo", Some(json!(42))).await?;
    assert_eq!(value, json!(42));

    channel.shutdown().await?;
    server.await?;
    Ok(())
}

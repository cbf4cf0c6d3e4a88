//! Plain-HTTP forwarding through the proxy.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use localhost_proxy::SPOOFED_USER_AGENT;

mod common;

#[tokio::test]
async fn user_agent_is_replaced_before_reaching_target() {
    let (target, mut requests) = common::spawn_stub_target("hello".into(), Duration::ZERO).await;
    let mut proxy = common::start_test_proxy().await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!(
        "GET http://{target}/ HTTP/1.1\r\nHost: example.test\r\nUser-Agent: test-agent\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let response = common::read_to_end(&mut client).await;
    assert_eq!(common::response_body(&response), b"hello");

    let seen = requests.recv().await.expect("target saw a request");
    assert_eq!(seen.request_line(), format!("GET http://{target}/ HTTP/1.1"));
    assert_eq!(seen.header_values("user-agent"), vec![SPOOFED_USER_AGENT.to_string()]);
    assert_eq!(seen.header_values("host"), vec!["example.test".to_string()]);
    for (name, value) in [
        ("X-Forwarded-For", "127.0.0.1"),
        ("X-Real-IP", "127.0.0.1"),
        ("X-Forwarded-Host", "localhost"),
        ("X-Forwarded-Proto", "http"),
        ("X-Forwarded-Port", "80"),
        ("X-Original-Host", "localhost"),
        ("Remote-Addr", "127.0.0.1"),
        ("Client-IP", "127.0.0.1"),
    ] {
        assert_eq!(seen.header_values(name), vec![value.to_string()], "{name}");
    }

    proxy.stop().await;
}

#[tokio::test]
async fn existing_forwarding_headers_are_overwritten_in_place() {
    let (target, mut requests) = common::spawn_stub_target("ok".into(), Duration::ZERO).await;
    let mut proxy = common::start_test_proxy().await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!(
        "GET http://{target}/ HTTP/1.1\r\nx-forwarded-for: 203.0.113.9\r\nAccept: */*\r\nX-Forwarded-For: 198.51.100.2\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.unwrap();
    common::read_to_end(&mut client).await;

    let seen = requests.recv().await.unwrap();
    let lines: Vec<&str> = seen.head.split("\r\n").collect();
    assert_eq!(lines[1], "X-Forwarded-For: 127.0.0.1");
    assert_eq!(lines[2], "Accept: */*");
    assert_eq!(lines[3], "X-Forwarded-For: 127.0.0.1");
    assert!(!seen.head.contains("203.0.113.9"));

    proxy.stop().await;
}

#[tokio::test]
async fn request_body_is_forwarded_unmodified() {
    let (target, mut requests) = common::spawn_stub_target("stored".into(), Duration::ZERO).await;
    let mut proxy = common::start_test_proxy().await;

    let body = "User-Agent: not-a-header\r\n".repeat(500);
    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let head = format!(
        "POST http://{target}/upload HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    client.write_all(head.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(body.as_bytes()).await.unwrap();

    let response = common::read_to_end(&mut client).await;
    assert_eq!(common::response_body(&response), b"stored");

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.body, body.as_bytes());

    proxy.stop().await;
}

#[tokio::test]
async fn chunked_body_is_forwarded_up_to_its_last_chunk() {
    // The target keeps the connection open, so anything forwarded past the
    // end of the body would show up as a second request.
    let (target, mut requests) = common::spawn_keepalive_target("ok".into(), false).await;
    let mut proxy = common::start_test_proxy().await;

    let body = "5\r\nhello\r\n7;note=x\r\n, world\r\n0\r\n\r\n";
    let follow_up = format!(
        "GET http://{target}/second HTTP/1.1\r\nUser-Agent: real-agent\r\nX-Forwarded-For: 10.9.9.9\r\n\r\n"
    );
    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!(
        "POST http://{target}/upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\nUser-Agent: real-agent\r\n\r\n{body}{follow_up}"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let first = requests.recv().await.expect("target saw the upload");
    assert_eq!(first.request_line(), format!("POST http://{target}/upload HTTP/1.1"));
    assert_eq!(first.body, body.as_bytes());
    assert_eq!(first.header_values("user-agent"), vec![SPOOFED_USER_AGENT.to_string()]);

    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: keep-alive\r\n\r\nok";
    let mut response = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, expected);

    // A follow-up written after the response is not forwarded either.
    let _ = client.write_all(follow_up.as_bytes()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(leaked) = requests.try_recv() {
        assert!(
            !leaked.head.contains("real-agent") && !leaked.head.contains("10.9.9.9"),
            "client identity reached target: {}",
            leaked.head
        );
    }

    proxy.stop().await;
}

#[tokio::test]
async fn unsupported_transfer_encoding_is_dropped() {
    let (target, mut requests) = common::spawn_keepalive_target("ok".into(), false).await;
    let mut proxy = common::start_test_proxy().await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!(
        "POST http://{target}/ HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\nGET http://{target}/ HTTP/1.1\r\nUser-Agent: real-agent\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let response = common::read_to_end(&mut client).await;
    assert!(response.is_empty(), "unexpected response: {response:?}");
    assert!(requests.try_recv().is_err());

    proxy.stop().await;
}

#[tokio::test]
async fn target_is_asked_to_close_after_response() {
    let (target, mut requests) = common::spawn_keepalive_target("pooled".into(), true).await;
    let mut proxy = common::start_test_proxy().await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(proxy.proxy_url()).unwrap())
        .build()
        .unwrap();

    for i in 0..3 {
        let res = tokio::time::timeout(
            Duration::from_secs(5),
            client.get(format!("http://{target}/item/{i}")).send(),
        )
        .await
        .expect("request finished in time")
        .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.text().await.unwrap(), "pooled");

        let seen = requests.recv().await.unwrap();
        assert_eq!(seen.header_values("connection"), vec!["close".to_string()]);
        assert!(seen.header_values("proxy-connection").is_empty());

        // Let the client notice the closed connection before reusing it.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    proxy.stop().await;
}

#[tokio::test]
async fn fifty_concurrent_clients_get_their_own_payload() {
    let mut proxy = common::start_test_proxy().await;
    let proxy_addr = proxy.local_addr();

    let mut tasks = Vec::new();
    for i in 0..50 {
        let payload = format!("payload-{i}-{}", "x".repeat(i * 37));
        let (target, _) =
            common::spawn_stub_target(payload.clone(), Duration::from_millis(10)).await;
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(proxy_addr).await.unwrap();
            let request = format!("GET http://{target}/item/{i} HTTP/1.1\r\nHost: {target}\r\n\r\n");
            client.write_all(request.as_bytes()).await.unwrap();
            let response = common::read_to_end(&mut client).await;
            assert_eq!(common::response_body(&response), payload.as_bytes(), "client {i}");
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    proxy.stop().await;
}

#[tokio::test]
async fn works_as_reqwest_http_proxy() {
    let (target, mut requests) = common::spawn_stub_target("via reqwest".into(), Duration::ZERO).await;
    let mut proxy = common::start_test_proxy().await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(proxy.proxy_url()).unwrap())
        .user_agent("test-agent")
        .build()
        .unwrap();

    let res = client.get(format!("http://{target}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "via reqwest");

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.header_values("user-agent"), vec![SPOOFED_USER_AGENT.to_string()]);

    proxy.stop().await;
}

#[tokio::test]
async fn unreachable_target_closes_client_without_response() {
    let dead = common::closed_addr().await;
    let mut proxy = common::start_test_proxy().await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!("GET http://{dead}/ HTTP/1.1\r\nHost: {dead}\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    let response = common::read_to_end(&mut client).await;
    assert!(response.is_empty(), "unexpected response: {response:?}");

    proxy.stop().await;
}

#[tokio::test]
async fn malformed_request_is_dropped_silently() {
    let mut proxy = common::start_test_proxy().await;

    for garbage in [&b"garbage\r\n\r\n"[..], b"GET / HTTP/1.1\r\nno colon here\r\n\r\n"] {
        let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
        client.write_all(garbage).await.unwrap();
        let response = common::read_to_end(&mut client).await;
        assert!(response.is_empty(), "unexpected response: {response:?}");
    }

    // A bad client does not disturb the listener.
    let (target, _requests) = common::spawn_stub_target("still up".into(), Duration::ZERO).await;
    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    client
        .write_all(format!("GET http://{target}/ HTTP/1.1\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let response = common::read_to_end(&mut client).await;
    assert_eq!(common::response_body(&response), b"still up");

    proxy.stop().await;
}

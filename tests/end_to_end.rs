//! Ship and offshore proxies wired together over a real link.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn get_through_both_proxies() {
    let (origin, seen) = common::start_path_origin().await;
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let client = common::proxied_client(ship);
    let res = client
        .get(format!("http://{origin}/hello?x=1"))
        .send()
        .await
        .expect("ship proxy unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/hello?x=1");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
}

#[tokio::test]
async fn post_body_reaches_origin() {
    let (origin, seen) = common::start_origin(|req| ("201 Created", String::from_utf8_lossy(&req.body).to_uppercase())).await;
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let client = common::proxied_client(ship);
    let res = client
        .post(format!("http://{origin}/submit"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 201);
    assert_eq!(res.text().await.unwrap(), "PAYLOAD");
    assert_eq!(seen.lock().unwrap()[0].body, b"payload");
}

#[tokio::test]
async fn hop_by_hop_headers_never_reach_origin() {
    let (origin, seen) = common::start_path_origin().await;
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let mut client = TcpStream::connect(ship).await.unwrap();
    let request = format!(
        "GET http://{origin}/h HTTP/1.1\r\nHost: {origin}\r\nProxy-Connection: keep-alive\r\n\
         Proxy-Authorization: Basic dXNlcjpwYXNz\r\nConnection: X-Hop\r\nX-Hop: gone\r\n\
         Keep-Alive: timeout=5\r\nX-End-To-End: kept\r\n\r\n"
    );
    let response = common::raw_exchange(&mut client, request.as_bytes()).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    // Origin's "Connection: close" is stripped on the way back as well.
    assert!(!response.to_ascii_lowercase().contains("connection: close"));

    let seen = seen.lock().unwrap();
    let req = &seen[0];
    assert_eq!(req.header("x-end-to-end"), Some("kept"));
    for name in ["proxy-connection", "proxy-authorization", "x-hop", "keep-alive"] {
        assert!(req.header(name).is_none(), "{name} reached the origin");
    }
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    let dead = common::dead_address().await;
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let res = common::proxied_client(ship)
        .get(format!("http://{dead}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients_are_served_one_at_a_time() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    // The origin is synchronous per request, so overlap shows up as in_flight > 1.
    let (origin, seen) = {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        common::start_origin(move |req| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            ("200 OK", req.target.clone())
        })
        .await
    };
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let client = common::proxied_client(ship);
    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        let url = format!("http://{origin}/c{i}");
        tasks.push(tokio::spawn(async move {
            let res = client.get(&url).send().await.unwrap();
            (url, res.text().await.unwrap())
        }));
    }

    for task in tasks {
        let (url, body) = task.await.unwrap();
        assert!(url.ends_with(&body), "{url} got {body}");
    }
    assert_eq!(seen.lock().unwrap().len(), 8);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_tunnel_relays_bytes_and_link_recovers() {
    let echo = common::start_echo_target().await;
    let (origin, seen) = common::start_path_origin().await;
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let mut tunnel = TcpStream::connect(ship).await.unwrap();
    let established = common::raw_exchange(
        &mut tunnel,
        format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes(),
    )
    .await;
    assert_eq!(established, "HTTP/1.1 200 Connection Established\r\n\r\n");

    // Opaque bytes, including something that looks like a frame header.
    let payload = b"\x16\x03\x01\x00\x05\x00\x00\x00\x01hello";
    tunnel.write_all(payload).await.unwrap();
    let mut back = vec![0u8; payload.len()];
    tunnel.read_exact(&mut back).await.unwrap();
    assert_eq!(&back[..], payload);
    drop(tunnel);

    // The tunnel used up the link; the next request rides a fresh one.
    let res = common::proxied_client(ship)
        .get(format!("http://{origin}/after-tunnel"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/after-tunnel");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn refused_connect_is_reported_and_link_stays_usable() {
    let dead = common::dead_address().await;
    let (origin, _seen) = common::start_path_origin().await;
    let (offshore, _offshore_shutdown) = common::start_offshore().await;
    let (ship, _ship_shutdown) = common::start_ship(common::ship_config(offshore)).await;

    let mut client = TcpStream::connect(ship).await.unwrap();
    let response = common::raw_exchange(
        &mut client,
        format!("CONNECT {dead} HTTP/1.1\r\nHost: {dead}\r\n\r\n").as_bytes(),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 502 Bad Gateway"));

    let res = common::proxied_client(ship)
        .get(format!("http://{origin}/still-up"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

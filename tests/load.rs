use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use volley::driver;
use volley::echo;
use volley::model::{CodecKind, Config};
use volley::protocol::Connection;
use volley::worker::payload_for;

fn config(addr: SocketAddr, workers: usize, messages: usize) -> Config {
    Config {
        addr,
        workers,
        messages,
        spawn_delay: Duration::ZERO,
        connect_timeout: Duration::from_secs(5),
        exchange_timeout: Duration::from_secs(5),
        codec: CodecKind::Checksum,
        verify_echo: false,
    }
}

async fn spawn_echo(kind: CodecKind) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(echo::serve(listener, kind));
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_round_trip_all_exchanges_succeed() {
    let addr = spawn_echo(CodecKind::Checksum).await;
    let mut cfg = config(addr, 4, 8);
    cfg.verify_echo = true;

    let summary = driver::run(cfg, ProgressBar::hidden()).await.unwrap();

    assert_eq!(summary.ok, 32);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.failed_workers, 0);
    assert!(summary.elapsed > Duration::ZERO);
    assert!(summary.throughput() > 0.0);
    assert_eq!(summary.latency.len(), 32);
}

#[tokio::test(flavor = "multi_thread")]
async fn line_codec_round_trip() {
    let addr = spawn_echo(CodecKind::Lines).await;
    let mut cfg = config(addr, 2, 5);
    cfg.codec = CodecKind::Lines;
    cfg.verify_echo = true;

    let summary = driver::run(cfg, ProgressBar::hidden()).await.unwrap();

    assert_eq!(summary.ok, 10);
    assert_eq!(summary.failed_workers, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_sends_three_messages_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let log = log.clone();
            tokio::spawn(async move {
                let mut conn = Connection::from_stream(stream, CodecKind::Checksum);
                while let Ok(payload) = conn.recv().await {
                    log.lock().await.push(payload.clone());
                    conn.send(&payload).await.unwrap();
                }
            });
        }
    });

    let summary = driver::run(config(addr, 1, 3), ProgressBar::hidden())
        .await
        .unwrap();

    assert_eq!(summary.ok, 3);
    assert_eq!(summary.failed_workers, 0);
    assert!(summary.elapsed > Duration::ZERO);
    let log = received.lock().await;
    assert_eq!(
        *log,
        vec![payload_for(0, 0), payload_for(0, 1), payload_for(0, 2)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn opens_and_closes_one_connection_per_worker() {
    const WORKERS: usize = 8;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let (opened_srv, closed_srv) = (opened.clone(), closed.clone());
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            opened_srv.fetch_add(1, Ordering::SeqCst);
            let closed = closed_srv.clone();
            tokio::spawn(async move {
                let mut conn = Connection::from_stream(stream, CodecKind::Checksum);
                while let Ok(payload) = conn.recv().await {
                    conn.send(&payload).await.unwrap();
                }
                closed.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    let summary = driver::run(config(addr, WORKERS, 2), ProgressBar::hidden())
        .await
        .unwrap();

    assert_eq!(summary.ok, WORKERS * 2);
    assert_eq!(opened.load(Ordering::SeqCst), WORKERS);
    // the peer observes each close shortly after the worker drops its socket
    tokio::time::timeout(Duration::from_secs(5), async {
        while closed.load(Ordering::SeqCst) < WORKERS {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("every connection should be closed by run's end");
    assert_eq!(opened.load(Ordering::SeqCst), WORKERS);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_worker_sends_unique_ordered_payloads() {
    const WORKERS: usize = 3;
    const MESSAGES: usize = 5;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let logs = Arc::new(Mutex::new(Vec::new()));
    let logs_srv = logs.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let logs = logs_srv.clone();
            tokio::spawn(async move {
                let mut conn = Connection::from_stream(stream, CodecKind::Checksum);
                let mut log = Vec::new();
                while let Ok(payload) = conn.recv().await {
                    log.push(payload.clone());
                    conn.send(&payload).await.unwrap();
                }
                logs.lock().await.push(log);
            });
        }
    });

    let summary = driver::run(config(addr, WORKERS, MESSAGES), ProgressBar::hidden())
        .await
        .unwrap();
    assert_eq!(summary.ok, WORKERS * MESSAGES);

    // server tasks flush their logs once they observe the close
    tokio::time::timeout(Duration::from_secs(5), async {
        while logs.lock().await.len() < WORKERS {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all connection logs should be flushed");

    let logs = logs.lock().await;
    let mut all = HashSet::new();
    for log in logs.iter() {
        assert_eq!(log.len(), MESSAGES);
        // within a connection, payloads arrive in sequence order for one rank
        let rank: usize = log[0]
            .split_whitespace()
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        for (seq, payload) in log.iter().enumerate() {
            assert_eq!(*payload, payload_for(rank, seq));
            assert!(all.insert(payload.clone()), "duplicate payload {payload}");
        }
    }
    assert_eq!(all.len(), WORKERS * MESSAGES);
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_endpoint_reports_every_worker_failed() {
    // bind then drop to get a port that refuses connections
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let summary = tokio::time::timeout(
        Duration::from_secs(30),
        driver::run(config(addr, 5, 4), ProgressBar::hidden()),
    )
    .await
    .expect("a refused endpoint must not hang the run")
    .unwrap();

    assert_eq!(summary.failed_workers, 5);
    assert_eq!(summary.ok, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_peer_is_bounded_by_exchange_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // accept and hold the sockets open without ever replying
        let mut sockets = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            sockets.push(stream);
        }
    });

    let mut cfg = config(addr, 2, 3);
    cfg.exchange_timeout = Duration::from_millis(200);

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        driver::run(cfg, ProgressBar::hidden()),
    )
    .await
    .expect("a stalled peer must not hang the run")
    .unwrap();

    assert_eq!(summary.ok, 0);
    assert_eq!(summary.failed_workers, 2);
    // each worker records its one failed exchange, then stops
    assert_eq!(summary.failed, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn verify_echo_rejects_wrong_payloads() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut conn = Connection::from_stream(stream, CodecKind::Checksum);
                while conn.recv().await.is_ok() {
                    conn.send("nope").await.unwrap();
                }
            });
        }
    });

    let mut cfg = config(addr, 1, 2);
    cfg.verify_echo = true;

    let summary = driver::run(cfg, ProgressBar::hidden()).await.unwrap();

    assert_eq!(summary.ok, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_workers, 1);
}

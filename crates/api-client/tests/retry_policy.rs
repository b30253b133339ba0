//! Retry policy against a raw TCP stub that drops connections on purpose.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use democrm_api::PageRequest;
use democrm_api_client::{ApiClient, ClientError, RetryConfig};
use democrm_core::testing;

/// Accept connections forever. The first `drop_first` are closed without a
/// response; later ones get `200 []` with `X-Total-Count: 0`.
async fn flaky_stub(drop_first: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < drop_first {
                drop(stream);
                continue;
            }
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(k) => read += k,
                    }
                }
                let body = "[]";
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nx-total-count: 0\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), accepted)
}

fn client(base: &str) -> ApiClient {
    let mut api = ApiClient::new(base, Duration::from_secs(5))
        .unwrap()
        .with_retry(RetryConfig {
            read_retries: 1,
            delay: Duration::from_millis(10),
        });
    api.set_auth("token".into());
    api
}

#[tokio::test]
async fn read_is_retried_once_after_a_dropped_connection() {
    let (base, accepted) = flaky_stub(1).await;
    let page = client(&base)
        .list_clients(&PageRequest::first(10, None).unwrap())
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_matches, 0);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn read_gives_up_after_the_single_retry() {
    let (base, accepted) = flaky_stub(usize::MAX).await;
    let err = client(&base).all_clients().await.unwrap_err();
    assert!(matches!(err, ClientError::NetworkUnavailable(_)));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn writes_are_never_retried() {
    let (base, accepted) = flaky_stub(usize::MAX).await;
    let err = client(&base)
        .create_client(&testing::record("", "Initech", "ini@mail.test", "5557778888"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NetworkUnavailable(_)));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

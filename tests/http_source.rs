// tests/http_source.rs
//
// HttpDealSource against a one-shot local listener that answers with a canned
// HTTP response.
//
// Covered:
// - non-2xx status  -> Err (transient, cycle aborted)
// - empty body      -> Ok(empty)
// - non-JSON body   -> Ok(empty)
// - canonical body  -> deals in fetch order

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use deal_alerts::deals::{DealSource, HttpDealSource};

/// Serve exactly one request on an ephemeral port; returns the base URL.
async fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.expect("accept");
        let mut req = Vec::new();
        let mut buf = [0u8; 1024];
        while !req.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = sock.read(&mut buf).await.expect("read request");
            if n == 0 {
                break;
            }
            req.extend_from_slice(&buf[..n]);
        }
        let resp = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(resp.as_bytes()).await.expect("write response");
        let _ = sock.shutdown().await;
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn server_error_aborts_the_fetch() {
    let base = serve_once("503 Service Unavailable", r#"{"deals":[{"id":"a"}]}"#).await;
    let src = HttpDealSource::new(base).with_timeout(5);

    let err = src.fetch_deals().await.expect_err("5xx must be an error");
    assert!(err.to_string().contains("503"), "unexpected error: {err}");
}

#[tokio::test]
async fn empty_body_means_no_deals() {
    let base = serve_once("200 OK", "").await;
    let src = HttpDealSource::new(base).with_timeout(5);

    let deals = src.fetch_deals().await.expect("empty body is not an error");
    assert!(deals.is_empty());
}

#[tokio::test]
async fn non_json_body_means_no_deals() {
    let base = serve_once("200 OK", "<html>maintenance</html>").await;
    let src = HttpDealSource::new(base).with_timeout(5);

    let deals = src.fetch_deals().await.expect("garbage body is not an error");
    assert!(deals.is_empty());
}

#[tokio::test]
async fn canonical_body_yields_deals_in_order() {
    let base = serve_once(
        "200 OK",
        r#"{"deals":[{"id":"b","title":"Two Tacos"},{"id":7,"title":null,"discount":20}]}"#,
    )
    .await;
    let src = HttpDealSource::new(format!("{base}/")).with_timeout(5);

    let deals = src.fetch_deals().await.expect("fetch");
    let ids: Vec<&str> = deals.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "7"]);
    assert_eq!(deals[1].discount.as_deref(), Some("20"));
}

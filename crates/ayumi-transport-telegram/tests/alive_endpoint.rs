//! The alive endpoint answers plain HTTP requests.

use ayumi_transport_telegram::alive::{serve_alive, ALIVE_TEXT};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn alive_endpoint_answers_and_shuts_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve_alive(listener, shutdown.clone()));

    let response = reqwest::get(format!("http://{addr}/"))
        .await
        .expect("alive endpoint reachable");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.expect("body"), ALIVE_TEXT);

    let missing = reqwest::get(format!("http://{addr}/nope"))
        .await
        .expect("server still up");
    assert_eq!(missing.status().as_u16(), 404);

    shutdown.cancel();
    let finished = server.await.expect("server task");
    assert!(finished.is_ok());
}

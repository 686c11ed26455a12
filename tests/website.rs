use hello_service::service;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_website() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(service::website().serve(listener));
    addr
}

#[tokio::test]
async fn root_serves_the_page_with_button_and_result_elements() {
    let addr = spawn_website().await;

    let response = reqwest::get(format!("http://{}/", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/html");
    let page = response.text().await.unwrap();
    assert!(page.contains("id=\"button\""));
    assert!(page.contains("id=\"result\""));
}

#[tokio::test]
async fn the_script_fetches_hello_and_appends_the_body() {
    let addr = spawn_website().await;

    let response = reqwest::get(format!("http://{}/index.js", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/javascript");
    let script = response.text().await.unwrap();
    assert!(script.contains("window.config.apiUrl + '/hello'"));
    assert!(script.contains("result.innerHTML += body"));
}

#[tokio::test]
async fn config_carries_the_api_base_url() {
    let addr = spawn_website().await;

    let response = reqwest::get(format!("http://{}/config.js", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("apiUrl"));
}

#[tokio::test]
async fn missing_assets_are_404() {
    let addr = spawn_website().await;

    let response = reqwest::get(format!("http://{}/missing.css", addr)).await.unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn dotdot_paths_cannot_escape_the_static_directory() {
    // reqwest normalizes `..` away client-side, so speak raw HTTP instead.
    let addr = spawn_website().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /../Cargo.toml HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 404"));
}

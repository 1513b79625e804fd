//! In-process stub for the search engine and image hosts.

#![allow(dead_code)]

use std::future::Future;

use axum::Router;

/// Bind to an ephemeral port, build the router with the base URL, and serve it.
pub async fn serve<F>(build: F) -> String
where
    F: FnOnce(String) -> Router,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

/// Run a future with a generous upper bound so a hang fails the test.
pub async fn bounded<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(std::time::Duration::from_secs(30), fut)
        .await
        .expect("test timed out")
}

/// A JPEG-looking payload of exactly `len` bytes.
pub fn jpeg(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    bytes.resize(len, 0x42);
    bytes
}

/// A results page with one metadata entry per URL.
pub fn results_page(urls: &[String]) -> String {
    let entries: String = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            format!(
                r#"<div class="rg_meta notranslate">{{"ou":"{}","pt":"Result {}","ity":"jpg","ow":800,"oh":600}}</div>"#,
                url, i
            )
        })
        .collect();
    format!("<html><body><div id=\"rg\">{}</div></body></html>", entries)
}

/// Files in `dir`, sorted by name.
pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

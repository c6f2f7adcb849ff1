//! HTTP probe of the application's health endpoint.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeResult {
    Reachable { url: String, status: u16 },
    Unreachable { url: String, reason: String },
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Reachable { status, .. } if (200..300).contains(status))
    }
}

/// GET `url` once, bounded by `timeout`.
pub async fn probe_health(url: &str, timeout: Duration) -> ProbeResult {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            return ProbeResult::Unreachable {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };
    match client.get(url).send().await {
        Ok(resp) => ProbeResult::Reachable {
            url: url.to_string(),
            status: resp.status().as_u16(),
        },
        Err(e) => ProbeResult::Unreachable {
            url: url.to_string(),
            reason: if e.is_timeout() {
                "timed out".to_string()
            } else if e.is_connect() {
                "connection refused".to_string()
            } else {
                e.to_string()
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_probe_reads_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await
                .unwrap();
        });

        let result = probe_health(&format!("http://{}/health", addr), Duration::from_secs(5)).await;
        assert!(result.is_healthy(), "{result:?}");
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe_health(&format!("http://{}/health", addr), Duration::from_secs(2)).await;
        assert!(!result.is_healthy());
        assert!(matches!(result, ProbeResult::Unreachable { .. }));
    }
}

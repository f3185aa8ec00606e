use std::{collections::HashMap, future::Future};

use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};

use crate::{
    accounts::Credential,
    config::Config,
    error::ConfigError,
    http::{build_client, get_claim_headers, send_http_request, RequestParams},
};

/// One attempt to claim points for a username.
///
/// `true` only on an unambiguous success. Rejections, timeouts and transport
/// errors all collapse to `false`; nothing is retried.
pub trait ClaimClient: Send + Sync + 'static {
    fn claim(&self, identifier: &str, credential: &Credential)
        -> impl Future<Output = bool> + Send;
}

pub fn claim_payload(identifier: &str) -> Value {
    json!({ "0": { "json": { "username": identifier } } })
}

pub struct HttpClaimClient {
    client: Client,
    url: String,
}

impl HttpClaimClient {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = build_client(
            config.claim_timeout(),
            config.proxy()?,
            config.accept_invalid_certs,
        )?;

        Ok(Self {
            client,
            url: config.claim_url.clone(),
        })
    }
}

impl ClaimClient for HttpClaimClient {
    async fn claim(&self, identifier: &str, credential: &Credential) -> bool {
        let headers = match get_claim_headers(identifier, credential.token()) {
            Ok(headers) => headers,
            Err(e) => {
                tracing::debug!(
                    "Cannot build claim headers for {identifier} with {}: {e}",
                    credential.label()
                );
                return false;
            }
        };

        let request_params = RequestParams {
            url: &self.url,
            method: Method::POST,
            body: Some(claim_payload(identifier)),
            query_args: Some(HashMap::from([("batch", "1")])),
        };

        match send_http_request(&self.client, &request_params, Some(&headers)).await {
            Ok(response) => {
                let status = response.status();
                if status != StatusCode::OK {
                    tracing::debug!("Claim for {identifier} answered with {status}");
                }
                status == StatusCode::OK
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves one connection with a fixed status line and returns the raw request.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/trpc/users.claimPoints", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response =
                format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (url, handle)
    }

    /// Reads headers plus a `content-length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let body_len = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + body_len {
                    return text;
                }
            }
        }

        String::from_utf8_lossy(&raw).to_string()
    }

    fn client_for(url: String) -> HttpClaimClient {
        HttpClaimClient::new(&Config {
            claim_url: url,
            claim_timeout_secs: 5,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn payload_wraps_username_in_trpc_batch() {
        assert_eq!(
            claim_payload("alice"),
            json!({ "0": { "json": { "username": "alice" } } })
        );
    }

    #[tokio::test]
    async fn ok_status_is_a_success() {
        let (url, server) = serve_once("200 OK").await;

        let claimed = client_for(url)
            .claim("alice", &Credential::new("main", "session=abc"))
            .await;
        let request = server.await.unwrap().to_lowercase();

        assert!(claimed);
        assert!(request.starts_with("post /api/trpc/users.claimpoints?batch=1 "));
        assert!(request.contains("cookie: session=abc"));
    }

    #[tokio::test]
    async fn other_status_is_a_failure() {
        let (url, server) = serve_once("401 Unauthorized").await;

        let claimed = client_for(url)
            .claim("alice", &Credential::new("main", "expired"))
            .await;
        server.await.unwrap();

        assert!(!claimed);
    }

    #[tokio::test]
    async fn silent_endpoint_fails_at_the_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/claim", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });

        let client = HttpClaimClient::new(&Config {
            claim_url: url,
            claim_timeout_secs: 1,
            ..Config::default()
        })
        .unwrap();

        let claimed = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            client.claim("alice", &Credential::new("main", "session=abc")),
        )
        .await
        .expect("claim should give up after its own timeout");
        server.abort();

        assert!(!claimed);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/claim", listener.local_addr().unwrap());
        drop(listener);

        assert!(
            !client_for(url)
                .claim("alice", &Credential::new("main", "session=abc"))
                .await
        );
    }
}

use std::{collections::HashMap, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue},
    Client, Method, Proxy, Response,
};
use serde::Serialize;

use crate::{constants::ORIGIN, error::ConfigError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

#[derive(Clone)]
pub struct RequestParams<'a, S: Serialize> {
    pub url: &'a str,
    pub method: Method,
    pub body: Option<S>,
    pub query_args: Option<HashMap<&'a str, &'a str>>,
}

pub fn build_client(
    timeout: Duration,
    proxy: Option<Proxy>,
    accept_invalid_certs: bool,
) -> Result<Client, ConfigError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs);

    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Sends one request; no retries. The caller decides what the status means.
pub async fn send_http_request(
    client: &Client,
    request_params: &RequestParams<'_, impl Serialize>,
    headers: Option<&HeaderMap>,
) -> reqwest::Result<Response> {
    let mut request = client.request(request_params.method.clone(), request_params.url);

    if let Some(params) = &request_params.query_args {
        request = request.query(&params);
    }

    if let Some(body) = &request_params.body {
        request = request.json(&body);
    }

    if let Some(headers) = headers {
        request = request.headers(headers.clone());
    }

    request
        .send()
        .await
        .inspect_err(|e| tracing::debug!("Request to {} failed: {e}", request_params.url))
}

/// Browser-like headers the claim endpoint expects, authenticated by `cookie`.
pub fn get_claim_headers(username: &str, cookie: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();

    let static_headers = [
        ("accept", "*/*"),
        ("accept-language", "zh-CN,zh;q=0.9"),
        ("content-type", "application/json"),
        ("origin", ORIGIN),
        ("sec-ch-ua", "\"Not)A;Brand\";v=\"8\", \"Chromium\";v=\"138\", \"Google Chrome\";v=\"138\""),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("trpc-accept", "application/jsonl"),
        ("user-agent", USER_AGENT),
        ("x-trpc-source", "nextjs-react"),
    ];

    for (name, value) in static_headers {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    headers.insert(
        HeaderName::from_static("referer"),
        HeaderValue::from_str(&format!("{ORIGIN}/boost/{username}"))?,
    );

    let mut cookie = HeaderValue::from_str(cookie)?;
    cookie.set_sensitive(true);
    headers.insert(HeaderName::from_static("cookie"), cookie);

    Ok(headers)
}

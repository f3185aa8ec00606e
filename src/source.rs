use std::future::Future;

use reqwest::{Client, Method};
use serde::Deserialize;

use crate::{
    config::Config,
    error::{ConfigError, FetchError},
    http::{build_client, send_http_request, RequestParams},
    ledger::WorkItem,
};

/// Where the list of claimable usernames comes from.
pub trait WorkSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<WorkItem>, FetchError>> + Send;
}

#[derive(Deserialize, Debug)]
struct UsernamesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<WorkItem>,
}

pub fn parse_usernames_response(body: &str) -> Result<Vec<WorkItem>, FetchError> {
    let response: UsernamesResponse = serde_json::from_str(body)?;

    if !response.success {
        return Err(FetchError::Rejected);
    }

    Ok(response.data)
}

pub struct HttpWorkSource {
    client: Client,
    url: String,
}

impl HttpWorkSource {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = build_client(config.fetch_timeout(), config.proxy()?, false)?;

        Ok(Self {
            client,
            url: config.usernames_url.clone(),
        })
    }
}

impl WorkSource for HttpWorkSource {
    async fn fetch(&self) -> Result<Vec<WorkItem>, FetchError> {
        tracing::info!("Fetching usernames from {}", self.url);

        let request_params = RequestParams::<'_, ()> {
            url: &self.url,
            method: Method::GET,
            body: None,
            query_args: None,
        };

        let body = send_http_request(&self.client, &request_params, None)
            .await?
            .error_for_status()?
            .text()
            .await?;

        let items = parse_usernames_response(&body)?;
        tracing::info!("Fetched {} usernames", items.len());

        Ok(items)
    }
}

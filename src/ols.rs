use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::PipelineError;

/// Seam for the OLS REST API. One method per endpoint shape: the paginated
/// term listing and the per-term parent lookup.
pub trait OlsApi: Send + Sync {
    fn fetch_page(&self, url: &str) -> Result<Value, PipelineError>;
    fn fetch_parents(&self, url: &str) -> Result<Value, PipelineError>;
}

#[derive(Clone)]
pub struct OlsHttpClient {
    client: Client,
}

impl OlsHttpClient {
    pub fn new() -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("efo-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::OlsHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| PipelineError::OlsHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn get_json(&self, url: &str) -> Result<Value, PipelineError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "OLS request failed".to_string());
            return Err(PipelineError::OlsStatus {
                status,
                url: url.to_string(),
                message,
            });
        }
        let body = response
            .text()
            .map_err(|err| PipelineError::OlsHttp(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| PipelineError::PageDecode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, PipelineError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(PipelineError::OlsHttp(err.to_string()));
                }
            }
        }
    }
}

impl OlsApi for OlsHttpClient {
    fn fetch_page(&self, url: &str) -> Result<Value, PipelineError> {
        self.get_json(url)
    }

    fn fetch_parents(&self, url: &str) -> Result<Value, PipelineError> {
        self.get_json(url)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Walks a dot-separated path into a JSON body. Absence at any level is
/// `None`, never an error.
pub fn value_at_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Pull-based iterator over listing pages. Each `next` call fetches exactly
/// one page and yields its raw item batch; the sequence ends when the page
/// body carries no next link.
pub struct Pager<'a> {
    client: &'a dyn OlsApi,
    data_selector: String,
    next_link_path: String,
    next_url: Option<String>,
}

impl<'a> Pager<'a> {
    pub fn new(
        client: &'a dyn OlsApi,
        first_url: String,
        data_selector: &str,
        next_link_path: &str,
    ) -> Self {
        Self {
            client,
            data_selector: data_selector.to_string(),
            next_link_path: next_link_path.to_string(),
            next_url: Some(first_url),
        }
    }
}

impl Iterator for Pager<'_> {
    type Item = Result<Vec<Value>, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.next_url.take()?;
        let body = match self.client.fetch_page(&url) {
            Ok(body) => body,
            Err(err) => return Some(Err(err)),
        };

        self.next_url = value_at_path(&body, &self.next_link_path)
            .and_then(Value::as_str)
            .map(str::to_string);

        let items = value_at_path(&body, &self.data_selector)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Some(Ok(items))
    }
}

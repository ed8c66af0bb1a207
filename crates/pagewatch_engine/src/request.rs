use std::collections::BTreeMap;
use std::time::Duration;

use pagewatch_core::{ProbeMethod, ProbeReply};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;

use crate::types::RequestError;

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// The injected HTTP collaborator: HEAD/GET with access to the response
/// headers a fingerprint is derived from, and plain text bodies.
#[async_trait::async_trait]
pub trait Requester: Send + Sync {
    async fn request(
        &self,
        method: ProbeMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<ProbeReply, RequestError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestRequester {
    client: reqwest::Client,
}

impl ReqwestRequester {
    pub fn new(settings: RequestSettings) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| RequestError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Requester for ReqwestRequester {
    async fn request(
        &self,
        method: ProbeMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<ProbeReply, RequestError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| RequestError::InvalidUrl(err.to_string()))?;
        let reqwest_method = match method {
            ProbeMethod::Head => reqwest::Method::HEAD,
            ProbeMethod::Get => reqwest::Method::GET,
        };

        let response = self
            .client
            .request(reqwest_method, parsed)
            .headers(build_headers(headers))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_MODIFIED {
            return Err(RequestError::HttpStatus(status.as_u16()));
        }

        let mut reply = ProbeReply {
            status: status.as_u16(),
            etag: header_string(&response, reqwest::header::ETAG),
            last_modified: header_string(&response, reqwest::header::LAST_MODIFIED),
            content_type: header_string(&response, reqwest::header::CONTENT_TYPE),
            content_length: header_string(&response, reqwest::header::CONTENT_LENGTH),
            body: None,
        };

        if method == ProbeMethod::Get {
            reply.body = Some(response.text().await.map_err(map_reqwest_error)?);
        }

        Ok(reply)
    }
}

fn build_headers(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        map.insert(name, value);
    }
    map
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        return RequestError::Timeout;
    }
    RequestError::Network(err.to_string())
}

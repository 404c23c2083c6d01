//! Remote API client for the FieldServe platform.
//!
//! The engine talks to the API through the [`JobsApi`] trait so the drainer,
//! façade, and orchestrator can be exercised against an in-memory fake. The
//! production implementation is a thin reqwest wrapper; the API itself (a
//! REST-style JSON service) stays authoritative and is not specified here
//! beyond the three calls the mobile client makes.

use async_trait::async_trait;
use fieldserve_core::TechnicianId;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{JobRecord, OutboxMethod, UploadAsset};

/// Remote call failure, classified by how the caller should react.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Transport-level failure (DNS, refused connection, timeout). Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// 5xx response. Retryable.
    #[error("server error ({status})")]
    Server { status: u16 },

    /// 4xx response — the server will never accept this request. Not
    /// retryable.
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The response body was not the JSON we expected.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// True for failures worth retrying on a later sync cycle.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Rejected { .. })
    }
}

/// The three platform calls the mobile client makes.
#[async_trait]
pub trait JobsApi: Send + Sync {
    /// Fetch the authoritative job list for a technician.
    async fn fetch_jobs(&self, technician: TechnicianId) -> Result<Vec<JobRecord>, ApiError>;

    /// Dispatch a JSON mutation (`POST`/`PUT`).
    async fn dispatch(
        &self,
        method: OutboxMethod,
        endpoint: &str,
        body: &Value,
    ) -> Result<Value, ApiError>;

    /// Post a photo as `multipart/form-data` (`photo` binary part plus text
    /// fields such as `caption`).
    async fn upload(
        &self,
        endpoint: &str,
        asset: &UploadAsset,
        bytes: Vec<u8>,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError>;
}

/// Read the bytes an [`UploadAsset`] points at.
///
/// Accepts `file://` URIs and plain paths. The file must still exist at
/// replay time; a missing file is the caller's signal that the upload can
/// never succeed.
pub async fn read_asset_bytes(asset: &UploadAsset) -> std::io::Result<Vec<u8>> {
    let path = asset.uri.strip_prefix("file://").unwrap_or(&asset.uri);
    tokio::fs::read(path).await
}

/// HTTP implementation over reqwest.
pub struct HttpJobsApi {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HttpJobsApi {
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            token: None,
        }
    }

    pub fn with_token(api_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            token: Some(token),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_url, endpoint)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Classify the response: success body, definitive rejection, or
    /// retryable server failure.
    async fn read_json(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();

        if status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            if text.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
        } else if status.is_client_error() {
            let detail = resp.text().await.unwrap_or_default();
            Err(ApiError::Rejected {
                status: status.as_u16(),
                detail,
            })
        } else {
            Err(ApiError::Server {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl JobsApi for HttpJobsApi {
    async fn fetch_jobs(&self, technician: TechnicianId) -> Result<Vec<JobRecord>, ApiError> {
        let url = self.url(&format!("/technicians/{technician}/jobs"));
        let req = self.authorize(self.client.get(&url));

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let body = Self::read_json(resp).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn dispatch(
        &self,
        method: OutboxMethod,
        endpoint: &str,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint);
        let req = match method {
            OutboxMethod::Post => self.client.post(&url),
            OutboxMethod::Put => self.client.put(&url),
            OutboxMethod::Upload => {
                return Err(ApiError::Parse(
                    "upload entries must be replayed as multipart".to_string(),
                ));
            }
        };

        let resp = self
            .authorize(req.json(body))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::read_json(resp).await
    }

    async fn upload(
        &self,
        endpoint: &str,
        asset: &UploadAsset,
        bytes: Vec<u8>,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in fields {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(asset.file_name.clone())
            .mime_str(&asset.mime_type)
            .map_err(|_| ApiError::Parse(format!("invalid mime type {:?}", asset.mime_type)))?;
        form = form.part("photo", part);

        let resp = self
            .authorize(self.client.post(self.url(endpoint)).multipart(form))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::read_json(resp).await
    }
}

/// In-memory fake for tests and development, scripted per call.
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// One call the fake observed, in arrival order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedCall {
        Fetch {
            technician: TechnicianId,
        },
        Dispatch {
            method: OutboxMethod,
            endpoint: String,
            body: Value,
        },
        Upload {
            endpoint: String,
            file_name: String,
            bytes: Vec<u8>,
            fields: Map<String, Value>,
        },
    }

    /// Scripted [`JobsApi`] double.
    ///
    /// Dispatch/upload results are consumed from a queue in call order; when
    /// the queue is empty the call succeeds with `{"ok": true}`.
    #[derive(Default)]
    pub struct FakeJobsApi {
        calls: Mutex<Vec<RecordedCall>>,
        jobs: Mutex<Vec<JobRecord>>,
        fetch_failure: Mutex<Option<ApiError>>,
        scripted: Mutex<VecDeque<Result<Value, ApiError>>>,
        fetch_delay: Mutex<Option<Duration>>,
        active_fetches: AtomicUsize,
        max_concurrent_fetches: AtomicUsize,
    }

    impl FakeJobsApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_jobs(&self, jobs: Vec<JobRecord>) {
            *self.jobs.lock().unwrap() = jobs;
        }

        pub fn fail_fetch_with(&self, err: ApiError) {
            *self.fetch_failure.lock().unwrap() = Some(err);
        }

        /// Queue the outcome of the next dispatch/upload call.
        pub fn script(&self, result: Result<Value, ApiError>) {
            self.scripted.lock().unwrap().push_back(result);
        }

        /// Make fetches take a while (for overlap tests).
        pub fn slow_fetch(&self, delay: Duration) {
            *self.fetch_delay.lock().unwrap() = Some(delay);
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Highest number of fetches ever in flight at once.
        pub fn max_concurrent_fetches(&self) -> usize {
            self.max_concurrent_fetches.load(Ordering::SeqCst)
        }

        fn next_scripted(&self) -> Result<Value, ApiError> {
            self.scripted
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(serde_json::json!({"ok": true})))
        }
    }

    #[async_trait]
    impl JobsApi for FakeJobsApi {
        async fn fetch_jobs(&self, technician: TechnicianId) -> Result<Vec<JobRecord>, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(RecordedCall::Fetch { technician });

            let active = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_fetches
                .fetch_max(active, Ordering::SeqCst);

            let delay = *self.fetch_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.active_fetches.fetch_sub(1, Ordering::SeqCst);

            if let Some(err) = self.fetch_failure.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(self.jobs.lock().unwrap().clone())
        }

        async fn dispatch(
            &self,
            method: OutboxMethod,
            endpoint: &str,
            body: &Value,
        ) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().push(RecordedCall::Dispatch {
                method,
                endpoint: endpoint.to_string(),
                body: body.clone(),
            });
            self.next_scripted()
        }

        async fn upload(
            &self,
            endpoint: &str,
            asset: &UploadAsset,
            bytes: Vec<u8>,
            fields: &Map<String, Value>,
        ) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().push(RecordedCall::Upload {
                endpoint: endpoint.to_string(),
                file_name: asset.file_name.clone(),
                bytes,
                fields: fields.clone(),
            });
            self.next_scripted()
        }
    }
}

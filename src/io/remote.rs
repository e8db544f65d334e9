//! HTTP client for the remote processing service.
//!
//! Every call goes through a bounded retry loop: timeouts, connection
//! failures, HTTP 429 and 5xx are retried with exponential backoff, other
//! failures are returned at once.

use crate::io::service::{Classifier, ClassifierTrainer, ImageSource, RandomForestParams, SceneQuery};
use crate::types::{CipError, CipResult, GeoTransform, MultiBandImage, SampleTable, SceneImage};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable holding the service API token
pub const TOKEN_ENV_VAR: &str = "CIPMAP_TOKEN";

/// Connection and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Total attempts per call, first try included
    pub max_attempts: u32,
    /// Backoff before the first retry, doubled after each failure
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Feature rows per prediction request
    pub predict_batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 300,
            max_attempts: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 30_000,
            predict_batch_size: 10_000,
        }
    }
}

impl ServiceConfig {
    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` is used up. The last error is returned.
pub fn with_retry<T, F>(config: &ServiceConfig, what: &str, mut call: F) -> CipResult<T>
where
    F: FnMut() -> CipResult<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        log::debug!("{}: attempt {} of {}", what, attempt, max_attempts);
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let wait = config.backoff(attempt);
                log::warn!("{} failed ({}), retrying in {:?}", what, e, wait);
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!("{} failed after {} attempts: {}", what, attempt, e);
                }
                return Err(e);
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> CipError {
    CipError::Service {
        message: format!("HTTP request failed: {}", e),
        retryable: e.is_timeout() || e.is_connect() || e.is_request(),
    }
}

fn status_error(status: reqwest::StatusCode, url: &str, body: &str) -> CipError {
    CipError::Service {
        message: format!(
            "HTTP {} {}: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            url,
            body.trim()
        ),
        retryable: status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
    }
}

/// Blocking client for the processing service; clones share the connection pool
#[derive(Clone)]
pub struct RemoteService {
    client: reqwest::blocking::Client,
    config: ServiceConfig,
    token: Option<String>,
}

impl RemoteService {
    /// Build a client; the token is read from `CIPMAP_TOKEN` when set
    pub fn new(config: ServiceConfig) -> CipResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cipmap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CipError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            log::debug!("{} not set, calling the service without a token", TOKEN_ENV_VAR);
        }
        Ok(Self {
            client,
            config,
            token,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body and decode the JSON reply, with retries
    fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> CipResult<R> {
        let url = self.url(path);
        with_retry(&self.config, &format!("POST {}", path), || {
            let mut request = self.client.post(&url).json(body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            let response = request.send().map_err(transport_error)?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                return Err(status_error(status, &url, &text));
            }
            response.json::<R>().map_err(|e| CipError::Service {
                message: format!("Malformed response from {}: {}", url, e),
                retryable: false,
            })
        })
    }
}

/// Scene as delivered by the service: row-major band arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneResponse {
    pub id: String,
    pub acquired: NaiveDate,
    pub cloudy_pixel_percentage: f32,
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    pub bands: HashMap<String, Vec<f32>>,
}

impl SceneResponse {
    /// Convert into a scene, ordering bands as `band_order`
    pub fn into_scene(mut self, band_order: &[String]) -> CipResult<SceneImage> {
        let mut image = MultiBandImage::new((self.rows, self.cols), self.geo_transform);
        for name in band_order {
            let values = self.bands.remove(name).ok_or_else(|| {
                CipError::Service {
                    message: format!("Scene {} is missing band {}", self.id, name),
                    retryable: false,
                }
            })?;
            let data = Array2::from_shape_vec((self.rows, self.cols), values).map_err(|e| {
                CipError::Service {
                    message: format!("Scene {} band {} has the wrong size: {}", self.id, name, e),
                    retryable: false,
                }
            })?;
            image.add_band(name.clone(), data)?;
        }
        Ok(SceneImage {
            id: self.id,
            acquired: self.acquired,
            cloudy_pixel_percentage: self.cloudy_pixel_percentage,
            image,
        })
    }
}

#[derive(Debug, Serialize)]
struct SceneSearchRequest<'a> {
    #[serde(flatten)]
    query: &'a SceneQuery,
    /// Bands to deliver, QA band included
    deliver: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SceneSearchResponse {
    scenes: Vec<SceneResponse>,
}

/// Remote scene source; also delivers the QA band needed for masking
pub struct RemoteImageSource {
    service: RemoteService,
    qa_band: String,
}

impl RemoteImageSource {
    pub fn new(service: RemoteService, qa_band: impl Into<String>) -> Self {
        Self {
            service,
            qa_band: qa_band.into(),
        }
    }
}

impl ImageSource for RemoteImageSource {
    fn fetch_scenes(&self, query: &SceneQuery) -> CipResult<Vec<SceneImage>> {
        let mut deliver = query.bands.clone();
        if !deliver.contains(&self.qa_band) {
            deliver.push(self.qa_band.clone());
        }
        let response: SceneSearchResponse = self.service.post_json(
            "v1/scenes/search",
            &SceneSearchRequest { query, deliver: deliver.clone() },
        )?;
        log::info!("Service returned {} scenes for '{}'", response.scenes.len(), query.collection);
        response
            .scenes
            .into_iter()
            .map(|s| s.into_scene(&deliver))
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct TrainRequest<'a> {
    feature_names: &'a [String],
    features: Vec<Vec<f32>>,
    labels: Vec<u8>,
    label_property: &'static str,
    params: &'a RandomForestParams,
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    model_id: String,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    features: &'a [Vec<f32>],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    labels: Vec<u8>,
}

/// Random-forest training on the service
pub struct RemoteTrainer {
    service: RemoteService,
}

impl RemoteTrainer {
    pub fn new(service: RemoteService) -> Self {
        Self { service }
    }
}

impl ClassifierTrainer for RemoteTrainer {
    fn train(&self, table: &SampleTable, params: &RandomForestParams) -> CipResult<Box<dyn Classifier>> {
        log::info!(
            "Training random forest ({} trees, {} variables per split) on {} samples",
            params.number_of_trees,
            params.variables_per_split,
            table.len()
        );
        let response: TrainResponse = self.service.post_json(
            "v1/classifiers/random-forest",
            &TrainRequest {
                feature_names: &table.feature_names,
                features: table.feature_rows(),
                labels: table.labels(),
                label_property: "landcover",
                params,
            },
        )?;
        log::info!("Trained model {}", response.model_id);
        Ok(Box::new(RemoteClassifier {
            service: self.service.clone(),
            model_id: response.model_id,
            feature_names: table.feature_names.clone(),
        }))
    }
}

/// Handle to a model trained on the service
pub struct RemoteClassifier {
    service: RemoteService,
    model_id: String,
    feature_names: Vec<String>,
}

impl Classifier for RemoteClassifier {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, rows: &[Vec<f32>]) -> CipResult<Vec<u8>> {
        let path = format!("v1/classifiers/{}/predict", self.model_id);
        let batch = self.service.config().predict_batch_size.max(1);
        let mut labels = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(batch) {
            let response: PredictResponse =
                self.service.post_json(&path, &PredictRequest { features: chunk })?;
            if response.labels.len() != chunk.len() {
                return Err(CipError::Service {
                    message: format!(
                        "Model {} returned {} labels for {} rows",
                        self.model_id,
                        response.labels.len(),
                        chunk.len()
                    ),
                    retryable: false,
                });
            }
            labels.extend(response.labels);
        }
        Ok(labels)
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Local, NaiveDate, SecondsFormat, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use reqwest::blocking::multipart::Form as MultipartForm;
use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use zodia_contracts::audit::{AuditLog, AuditPayload};
use zodia_contracts::naming::output_filename;
use zodia_contracts::receipts::{write_receipt, CostReceipt};
use zodia_contracts::{
    Category, GenerationError, GenerationMode, GenerationRequest, GenerationResult, ZodiacSign,
};

mod compose;

pub use compose::Compositor;

/// Decoded background image, owned by the pipeline for the duration of one
/// call and consumed read-only by the compositor.
#[derive(Debug, Clone)]
pub struct Background {
    image: DynamicImage,
}

impl Background {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// What a backend needs to produce a background: content semantics plus the
/// already-composed prompt and the target canvas.
#[derive(Debug, Clone)]
pub struct BackgroundRequest {
    pub sign: ZodiacSign,
    pub category: Category,
    pub prompt: String,
    pub canvas: (u32, u32),
}

/// The single capability the three backends are polymorphic over. Adding a
/// fourth backend is a new implementation plus a registry entry, nothing else.
pub trait BackgroundProvider: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn mode(&self) -> GenerationMode;
    fn generate_background(
        &self,
        request: &BackgroundRequest,
        credential: Option<&str>,
    ) -> Result<Background, GenerationError>;
}

#[derive(Default)]
pub struct BackendRegistry {
    providers: Vec<Box<dyn BackgroundProvider>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: BackgroundProvider + 'static>(&mut self, provider: P) {
        self.providers.push(Box::new(provider));
    }

    /// Pure mode-to-provider lookup; an unregistered mode is a configuration
    /// problem, never a fallback to another backend.
    pub fn select(&self, mode: GenerationMode) -> Result<&dyn BackgroundProvider, GenerationError> {
        self.providers
            .iter()
            .map(|provider| provider.as_ref())
            .find(|provider| provider.mode() == mode)
            .ok_or_else(|| {
                let available = self
                    .modes()
                    .iter()
                    .map(|mode| mode.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                GenerationError::Configuration(format!(
                    "no backend registered for mode '{mode}' (available: [{available}])"
                ))
            })
    }

    pub fn modes(&self) -> Vec<GenerationMode> {
        self.providers.iter().map(|provider| provider.mode()).collect()
    }
}

pub fn default_backend_registry(timeout: Duration) -> Result<BackendRegistry, GenerationError> {
    let mut backends = BackendRegistry::new();
    backends.register(GradientProvider);
    backends.register(StabilityProvider::new(timeout)?);
    backends.register(OpenAiProvider::new(timeout)?);
    Ok(backends)
}

/// Free path: a vertical gradient between the sign's fixed color pair. No
/// network, no credential, deterministic per sign.
#[derive(Debug)]
pub struct GradientProvider;

impl BackgroundProvider for GradientProvider {
    fn name(&self) -> &'static str {
        "gradient"
    }

    fn mode(&self) -> GenerationMode {
        GenerationMode::Free
    }

    fn generate_background(
        &self,
        request: &BackgroundRequest,
        _credential: Option<&str>,
    ) -> Result<Background, GenerationError> {
        let (width, height) = request.canvas;
        if width == 0 || height == 0 {
            return Err(GenerationError::LocalRender(format!(
                "cannot render a {width}x{height} gradient"
            )));
        }
        let (top, bottom) = request.sign.gradient_colors();
        let mut image = RgbImage::new(width, height);
        let span = (height - 1).max(1) as f64;
        for y in 0..height {
            let t = y as f64 / span;
            let pixel = Rgb([
                lerp_channel(top[0], bottom[0], t),
                lerp_channel(top[1], bottom[1], t),
                lerp_channel(top[2], bottom[2], t),
            ]);
            for x in 0..width {
                image.put_pixel(x, y, pixel);
            }
        }
        Ok(Background::new(DynamicImage::ImageRgb8(image)))
    }
}

fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    (from as f64 + (to as f64 - from as f64) * t).round().clamp(0.0, 255.0) as u8
}

/// Paid path A: Stability text-to-image. Each successful call bills the
/// account behind the credential, which is why the output filename carries
/// the `stability` tag.
#[derive(Debug)]
pub struct StabilityProvider {
    api_base: String,
    http: HttpClient,
}

impl StabilityProvider {
    pub fn new(timeout: Duration) -> Result<Self, GenerationError> {
        Ok(Self {
            api_base: env::var("STABILITY_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://api.stability.ai".to_string()),
            http: build_http_client(timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v2beta/stable-image/generate/core", self.api_base)
    }

    fn decode_json_image(payload: &Value) -> Result<Vec<u8>, GenerationError> {
        let image_b64 = payload
            .get("image")
            .or_else(|| {
                payload
                    .get("artifacts")
                    .and_then(Value::as_array)
                    .and_then(|rows| rows.first())
                    .and_then(|row| row.get("base64"))
            })
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                GenerationError::Service("stability JSON response missing image bytes".to_string())
            })?;
        BASE64.decode(image_b64.as_bytes()).map_err(|err| {
            GenerationError::Service(format!("stability image base64 decode failed: {err}"))
        })
    }
}

impl BackgroundProvider for StabilityProvider {
    fn name(&self) -> &'static str {
        "stability"
    }

    fn mode(&self) -> GenerationMode {
        GenerationMode::Stability
    }

    fn generate_background(
        &self,
        request: &BackgroundRequest,
        credential: Option<&str>,
    ) -> Result<Background, GenerationError> {
        let credential = credential.ok_or_else(|| {
            GenerationError::Configuration("stability backend needs a credential".to_string())
        })?;

        let endpoint = self.endpoint();
        let form = MultipartForm::new()
            .text("prompt", request.prompt.clone())
            .text("aspect_ratio", aspect_ratio_for(request.canvas))
            .text("output_format", "png");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(credential)
            .header("Accept", "image/*")
            .multipart(form)
            .send()
            .map_err(|err| classify_transport_error("stability", &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status("stability", status, &body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = if content_type.starts_with("image/") {
            response
                .bytes()
                .map_err(|err| classify_transport_error("stability", &err))?
                .to_vec()
        } else {
            let payload: Value = response
                .json()
                .map_err(|err| classify_transport_error("stability", &err))?;
            Self::decode_json_image(&payload)?
        };
        decode_background("stability", &bytes)
    }
}

/// Paid path B: OpenAI image generation, one `b64_json` image per call.
#[derive(Debug)]
pub struct OpenAiProvider {
    api_base: String,
    model: String,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(timeout: Duration) -> Result<Self, GenerationError> {
        Ok(Self {
            api_base: env::var("OPENAI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: env::var("OPENAI_IMAGE_MODEL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "gpt-image-1".to_string()),
            http: build_http_client(timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.api_base)
    }
}

impl BackgroundProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn mode(&self) -> GenerationMode {
        GenerationMode::OpenAi
    }

    fn generate_background(
        &self,
        request: &BackgroundRequest,
        credential: Option<&str>,
    ) -> Result<Background, GenerationError> {
        let credential = credential.ok_or_else(|| {
            GenerationError::Configuration("openai backend needs a credential".to_string())
        })?;

        let endpoint = self.endpoint();
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "n": 1,
            "size": openai_size_for(request.canvas),
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(credential)
            .json(&payload)
            .send()
            .map_err(|err| classify_transport_error("openai", &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status("openai", status, &body));
        }

        let value: Value = response
            .json()
            .map_err(|err| classify_transport_error("openai", &err))?;
        let image_b64 = value
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("b64_json"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|row| !row.is_empty())
            .ok_or_else(|| {
                GenerationError::Service("openai response returned no image data".to_string())
            })?;
        let bytes = BASE64.decode(image_b64.as_bytes()).map_err(|err| {
            GenerationError::Service(format!("openai image base64 decode failed: {err}"))
        })?;
        decode_background("openai", &bytes)
    }
}

fn build_http_client(timeout: Duration) -> Result<HttpClient, GenerationError> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| GenerationError::Configuration(format!("http client build failed: {err}")))
}

fn decode_background(provider: &str, bytes: &[u8]) -> Result<Background, GenerationError> {
    let image = image::load_from_memory(bytes).map_err(|err| {
        GenerationError::Service(format!("{provider} returned undecodable image bytes: {err}"))
    })?;
    Ok(Background::new(image))
}

/// Maps transport-level failures onto the retry taxonomy. A connect-phase
/// timeout cannot have billed anything, so only that flavor is charge-safe
/// to retry.
fn classify_transport_error(provider: &str, err: &reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::timeout(
            format!("{provider} request timed out: {err}"),
            err.is_connect(),
        )
    } else if err.is_connect() {
        GenerationError::Service(format!("{provider} connection failed: {err}"))
    } else {
        GenerationError::Service(format!("{provider} transport failure: {err}"))
    }
}

fn classify_status(provider: &str, status: StatusCode, body: &str) -> GenerationError {
    let code = status.as_u16();
    let detail = truncate_text(body, 512);
    match code {
        401 | 403 => GenerationError::Auth(format!(
            "{provider} rejected the credential ({code}): {detail}"
        )),
        408 => GenerationError::timeout(
            format!("{provider} reported a request timeout ({code}): {detail}"),
            false,
        ),
        _ => GenerationError::Service(format!("{provider} request failed ({code}): {detail}")),
    }
}

/// Nearest Stability aspect ratio for the canvas; vertical canvases land on
/// 9:16.
fn aspect_ratio_for(canvas: (u32, u32)) -> String {
    let (width, height) = canvas;
    if width == 0 || height == 0 {
        return "1:1".to_string();
    }
    let ratio = width as f64 / height as f64;
    let candidates = [
        ("1:1", 1.0),
        ("16:9", 16.0 / 9.0),
        ("9:16", 9.0 / 16.0),
        ("3:2", 3.0 / 2.0),
        ("2:3", 2.0 / 3.0),
        ("4:5", 4.0 / 5.0),
        ("5:4", 5.0 / 4.0),
    ];
    let mut best = "1:1";
    let mut best_delta = f64::MAX;
    for (name, value) in candidates {
        let delta = (ratio - value).abs();
        if delta < best_delta {
            best_delta = delta;
            best = name;
        }
    }
    best.to_string()
}

fn openai_size_for(canvas: (u32, u32)) -> &'static str {
    let (width, height) = canvas;
    if height > width {
        "1024x1536"
    } else if width > height {
        "1536x1024"
    } else {
        "1024x1024"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

/// Bounded retry with linear backoff. Only errors the taxonomy marks as
/// charge-safe transient failures are retried; everything else surfaces on
/// the first attempt.
pub fn call_with_retry<T>(
    policy: RetryPolicy,
    mut call: impl FnMut() -> Result<T, GenerationError>,
) -> Result<T, GenerationError> {
    let mut attempt = 0u32;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                thread::sleep(policy.backoff.saturating_mul(attempt));
            }
            Err(err) => return Err(err),
        }
    }
}

/// Process-wide pipeline configuration, read once at engine construction and
/// immutable afterwards. Multiple engines with different configs can coexist.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: GenerationMode,
    pub credential: Option<String>,
    pub out_dir: PathBuf,
    pub canvas: (u32, u32),
    pub default_date: Option<NaiveDate>,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl EngineConfig {
    pub fn new(mode: GenerationMode, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            credential: None,
            out_dir: out_dir.into(),
            canvas: (1080, 1920),
            default_date: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(1500),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.canvas = (width, height);
        self
    }

    pub fn with_default_date(mut self, date: NaiveDate) -> Self {
        self.default_date = Some(date);
        self
    }
}

/// The pipeline orchestrator. One `generate` call runs select backend →
/// background → composite → persist; no state survives across calls beyond
/// the immutable configuration and the audit log handle.
pub struct HoroscopeEngine {
    config: EngineConfig,
    backends: BackendRegistry,
    compositor: Compositor,
    audit: AuditLog,
}

impl HoroscopeEngine {
    pub fn new(config: EngineConfig) -> Result<Self, GenerationError> {
        let backends = default_backend_registry(config.request_timeout)?;
        Self::with_backends(config, backends)
    }

    /// Construction with a caller-supplied registry, used for additional
    /// backends and for tests that stub out the paid providers.
    pub fn with_backends(
        config: EngineConfig,
        backends: BackendRegistry,
    ) -> Result<Self, GenerationError> {
        if config.mode.requires_credential() && trimmed_credential(&config).is_none() {
            return Err(GenerationError::Configuration(format!(
                "mode '{}' requires a non-empty credential",
                config.mode
            )));
        }
        let (width, height) = config.canvas;
        if width == 0 || height == 0 {
            return Err(GenerationError::Configuration(format!(
                "canvas {width}x{height} has a zero dimension"
            )));
        }
        fs::create_dir_all(&config.out_dir).map_err(|err| {
            GenerationError::LocalRender(format!(
                "cannot create output directory {}: {err}",
                config.out_dir.display()
            ))
        })?;

        let audit = AuditLog::new(config.out_dir.join("audit.jsonl"), run_identifier(&config.out_dir));
        audit
            .emit(
                "run_started",
                payload(json!({
                    "mode": config.mode.to_string(),
                    "out_dir": config.out_dir.to_string_lossy(),
                })),
            )
            .map_err(audit_error)?;

        Ok(Self {
            compositor: Compositor::new(width, height),
            config,
            backends,
            audit,
        })
    }

    pub fn mode(&self) -> GenerationMode {
        self.config.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The single entry point. Fails with a typed error and leaves no partial
    /// output file behind; a `GenerationResult` is returned only once the
    /// final image is persisted.
    pub fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        match self.generate_inner(request) {
            Ok(result) => Ok(result),
            Err(err) => {
                let _ = self.audit.emit(
                    "generation_failed",
                    payload(json!({
                        "mode": self.config.mode.to_string(),
                        "sign": request.sign.slug(),
                        "category": request.category.slug(),
                        "error": err.to_string(),
                    })),
                );
                Err(err)
            }
        }
    }

    fn generate_inner(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        if request.text.trim().is_empty() {
            return Err(GenerationError::Configuration(
                "horoscope text must not be empty".to_string(),
            ));
        }
        let mode = self.config.mode;
        // Fail fast on a missing credential before anything touches the
        // network.
        let credential = trimmed_credential(&self.config);
        if mode.requires_credential() && credential.is_none() {
            return Err(GenerationError::Configuration(format!(
                "mode '{mode}' requires a non-empty credential"
            )));
        }
        let provider = self.backends.select(mode)?;
        let date = request
            .date
            .or(self.config.default_date)
            .unwrap_or_else(|| Local::now().date_naive());
        let filename = output_filename(request.sign, request.category, mode, date);
        let final_path = self.config.out_dir.join(&filename);

        self.audit
            .emit(
                "generation_planned",
                payload(json!({
                    "mode": mode.to_string(),
                    "provider": provider.name(),
                    "sign": request.sign.slug(),
                    "category": request.category.slug(),
                    "filename": filename,
                    "cost_estimate_usd": mode.cost_estimate_usd(),
                })),
            )
            .map_err(audit_error)?;

        let background_request = BackgroundRequest {
            sign: request.sign,
            category: request.category,
            prompt: build_prompt(request.sign, request.category),
            canvas: self.config.canvas,
        };
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            backoff: self.config.retry_backoff,
        };
        let background = call_with_retry(policy, || {
            provider.generate_background(&background_request, credential)
        })?;
        self.audit
            .emit(
                "background_ready",
                payload(json!({ "provider": provider.name() })),
            )
            .map_err(audit_error)?;

        // A composite or persistence failure past this point must not
        // re-invoke the provider; the retry budget applies to the fetch only.
        let composed =
            self.compositor
                .compose(&background, request.sign, &request.text, request.show_emoji);
        self.persist_image(&composed, &final_path)?;

        let stem = filename.trim_end_matches(".png");
        let receipt_path = self.config.out_dir.join(format!("receipt-{stem}.json"));
        let receipt = CostReceipt::new(
            provider.name(),
            mode,
            request.sign,
            request.category,
            date,
            background_request.prompt.clone(),
            final_path.to_string_lossy(),
            now_utc_iso(),
        );
        write_receipt(&receipt_path, &receipt).map_err(|err| {
            GenerationError::LocalRender(format!("receipt write failed: {err:#}"))
        })?;

        self.audit
            .emit(
                "artifact_created",
                payload(json!({
                    "image_path": final_path.to_string_lossy(),
                    "receipt_path": receipt_path.to_string_lossy(),
                    "cost_estimate_usd": mode.cost_estimate_usd(),
                })),
            )
            .map_err(audit_error)?;

        Ok(GenerationResult {
            final_image_path: final_path,
            backend_used: mode,
        })
    }

    /// Write-to-temp-then-rename so a failed call never leaves a partial
    /// final image on disk.
    fn persist_image(&self, image: &RgbaImage, final_path: &Path) -> Result<(), GenerationError> {
        let tmp_path = final_path.with_extension("png.tmp");
        let outcome = image
            .save_with_format(&tmp_path, ImageFormat::Png)
            .map_err(|err| {
                GenerationError::LocalRender(format!(
                    "failed to write {}: {err}",
                    tmp_path.display()
                ))
            })
            .and_then(|_| {
                fs::rename(&tmp_path, final_path).map_err(|err| {
                    GenerationError::LocalRender(format!(
                        "failed to move image into place at {}: {err}",
                        final_path.display()
                    ))
                })
            });
        if outcome.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        outcome
    }
}

fn trimmed_credential(config: &EngineConfig) -> Option<&str> {
    config
        .credential
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn build_prompt(sign: ZodiacSign, category: Category) -> String {
    format!(
        "Mystical cosmic background for the zodiac sign {}, theme {}: {}. \
         Vertical composition, rich colors, no text, no people.",
        sign.slug(),
        category.slug(),
        category.prompt_theme()
    )
}

fn audit_error(err: anyhow::Error) -> GenerationError {
    GenerationError::LocalRender(format!("audit log write failed: {err:#}"))
}

fn payload(value: Value) -> AuditPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn run_identifier(out_dir: &Path) -> String {
    let label = out_dir
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("zodia");
    format!("{label}-{}", short_id(label, timestamp_millis()))
}

fn short_id(seed: &str, stamp: u128) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(stamp.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

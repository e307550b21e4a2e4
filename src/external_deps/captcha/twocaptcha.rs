use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::sleep;
use url::Url;

use super::{CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult, CaptchaSolution, CaptchaTask};

const DEFAULT_ENDPOINT: &str = "https://2captcha.com/";
const NOT_READY: &str = "CAPCHA_NOT_READY";
const TOKEN_TTL: Duration = Duration::from_secs(120);

/// Adapter for the 2captcha reCAPTCHA v2 API (`in.php` / `res.php`).
#[derive(Debug, Clone)]
pub struct TwoCaptchaProvider {
    pub api_key: String,
    pub config: CaptchaConfig,
    endpoint: Url,
    client: Client,
}

/// Envelope returned by both 2captcha endpoints when `json=1` is set.
#[derive(Debug, Deserialize)]
struct ApiReply {
    status: u8,
    request: String,
}

impl TwoCaptchaProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(api_key, CaptchaConfig::default())
    }

    pub fn with_config(api_key: impl Into<String>, config: CaptchaConfig) -> Self {
        Self {
            api_key: api_key.into(),
            config,
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("invalid 2captcha endpoint"),
            client: Client::new(),
        }
    }

    /// Point the provider at a different API host (used against mock servers).
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn submit(&self, task: &CaptchaTask) -> Result<String, CaptchaError> {
        let url = self.api_url("in.php")?;
        let mut form = vec![
            ("key", self.api_key.clone()),
            ("method", "userrecaptcha".to_string()),
            ("googlekey", task.site_key.clone()),
            ("pageurl", task.page_url.to_string()),
            ("json", "1".to_string()),
        ];
        if task.invisible {
            form.push(("invisible", "1".to_string()));
        }

        let reply = self.call(self.client.post(url).form(&form)).await?;
        if reply.status != 1 {
            return Err(CaptchaError::Rejected(reply.request));
        }
        Ok(reply.request)
    }

    async fn poll(&self, task_id: &str) -> CaptchaResult {
        let started = Instant::now();
        loop {
            sleep(self.config.poll_interval).await;

            let url = self.api_url("res.php")?;
            let query = [
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ];
            let reply = self.call(self.client.get(url).query(&query)).await?;

            if reply.status == 1 {
                return Ok(CaptchaSolution::new(reply.request)
                    .valid_for(TOKEN_TTL)
                    .with_task_id(task_id));
            }
            if reply.request != NOT_READY {
                return Err(CaptchaError::Rejected(reply.request));
            }
            if started.elapsed() >= self.config.timeout {
                return Err(CaptchaError::Timeout(self.config.timeout));
            }
            log::debug!("2captcha task {task_id} not ready yet");
        }
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<ApiReply, CaptchaError> {
        let response = request
            .send()
            .await
            .map_err(|err| CaptchaError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CaptchaError::Transport(format!(
                "2captcha responded with {}",
                response.status()
            )));
        }
        response
            .json::<ApiReply>()
            .await
            .map_err(|err| CaptchaError::Transport(err.to_string()))
    }

    fn api_url(&self, path: &str) -> Result<Url, CaptchaError> {
        self.endpoint
            .join(path)
            .map_err(|err| CaptchaError::Configuration(err.to_string()))
    }
}

#[async_trait]
impl CaptchaProvider for TwoCaptchaProvider {
    fn name(&self) -> &'static str {
        "twocaptcha"
    }

    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult {
        if self.api_key.trim().is_empty() {
            return Err(CaptchaError::Configuration("missing 2captcha api key".into()));
        }

        let task_id = self.submit(task).await?;
        log::info!("2captcha accepted task {task_id} for {}", task.page_url);
        self.poll(&task_id).await
    }
}

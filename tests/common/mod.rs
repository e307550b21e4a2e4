#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use upload_harvester::{
    BrowserEngine, CaptchaError, CaptchaProvider, CaptchaResult, CaptchaSolution, CaptchaTask,
    ClickOptions, Download, ElementHandle, EventHandler, HarvestEvent, HttpBrowser, Locator,
    PageResult, PageSession, RunState, SiteProfile,
};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SITE_KEY: &str = "6LfFixtureSiteKey000";
pub const TOKEN: &str = "fixture-token";
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "hunter2";

const LOGIN_PAGE: &str = r#"<html><body>
<form action="/login" method="post">
  <input id="user_login" name="user_login" type="text">
  <input id="user_password" name="user_password" type="password">
  <input type="hidden" name="authenticity_token" value="csrf123">
  <div class="g-recaptcha" data-sitekey="6LfFixtureSiteKey000"></div>
  <iframe title="reCAPTCHA" src="https://www.google.com/recaptcha/api2/anchor?ar=1&k=6LfFixtureSiteKey000"></iframe>
  <textarea id="g-recaptcha-response" name="g-recaptcha-response" style="display:none"></textarea>
  <button id="login_from_loginpage" type="submit">Log in</button>
</form>
</body></html>"#;

const DASHBOARD_PAGE: &str = r#"<html><body>
<div data-cy="user-dropdown-trigger">Account</div>
<div data-cy="edit-my-uploads-link"><a href="/uploads">My uploads</a></div>
</body></html>"#;

/// Mocked document-sharing site: login form, dashboard, listing pages, and
/// download endpoints.
pub struct FixtureSite {
    pub server: MockServer,
}

impl FixtureSite {
    /// Login and dashboard mounted; listing pages are added per test.
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/login/email"))
            .respond_with(html(LOGIN_PAGE))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains(format!("user_login={USERNAME}")))
            .and(body_string_contains(format!("user_password={PASSWORD}")))
            .and(body_string_contains(format!("g-recaptcha-response={TOKEN}")))
            .and(body_string_contains("authenticity_token=csrf123"))
            .respond_with(html(DASHBOARD_PAGE))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn site_profile(&self) -> SiteProfile {
        SiteProfile {
            login_url: self.url("/login/email"),
            ..SiteProfile::default()
        }
    }

    pub fn url(&self, route: &str) -> Url {
        Url::parse(&format!("{}{route}", self.server.uri())).unwrap()
    }

    /// Listing page at `route`. `next` of `None` omits the next-page control.
    pub async fn mount_listing(&self, route: &str, rows: &[(&str, &str)], next: Option<&str>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html(&listing_html(rows, next)))
            .mount(&self.server)
            .await;
    }

    /// Route that must never be requested.
    pub async fn forbid(&self, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_failure(&self, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_download(&self, id: &str, filename: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/download/{id}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "content-disposition",
                        format!("attachment; filename=\"{filename}\"").as_str(),
                    )
                    .set_body_raw(body.to_vec(), "application/pdf"),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

pub fn listing_html(rows: &[(&str, &str)], next: Option<&str>) -> String {
    let mut markup = String::from("<html><body><div class=\"uploads\">\n");
    for (title, id) in rows {
        markup.push_str(&format!(
            r#"<div class="my-upload-row">
  <div class="title-container">
    {title}
  </div>
  <a aria-label="Download slideshow" href="/download/{id}">Download</a>
  <button type="button" aria-label="Delete slideshow" data-delete-id="{id}">Delete</button>
</div>
"#
        ));
    }
    markup.push_str("</div>\n");
    if let Some(href) = next {
        markup.push_str(&format!(
            "<div class=\"next_page\"><a href=\"{href}\">Next</a></div>\n"
        ));
    }
    markup.push_str("</body></html>");
    markup
}

/// Captcha provider answering every task with [`TOKEN`].
pub struct StubCaptcha {
    pub tasks: Mutex<Vec<CaptchaTask>>,
}

impl StubCaptcha {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CaptchaProvider for StubCaptcha {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(CaptchaSolution::new(TOKEN))
    }
}

/// Captcha provider that always gives up.
pub struct RejectingCaptcha;

#[async_trait]
impl CaptchaProvider for RejectingCaptcha {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn solve(&self, _task: &CaptchaTask) -> CaptchaResult {
        Err(CaptchaError::Rejected("ERROR_CAPTCHA_UNSOLVABLE".into()))
    }
}

/// Counters shared between a [`CountingBrowser`] and its sessions.
#[derive(Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub gotos: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn gotos(&self) -> usize {
        self.gotos.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// [`HttpBrowser`] wrapper counting launches, navigations, and teardowns.
pub struct CountingBrowser {
    inner: HttpBrowser,
    pub counters: Arc<Counters>,
}

impl CountingBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HttpBrowser::default(),
            counters: Arc::new(Counters::default()),
        })
    }
}

#[async_trait]
impl BrowserEngine for CountingBrowser {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn launch(&self) -> PageResult<Box<dyn PageSession>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.launch().await?;
        Ok(Box::new(CountingSession {
            inner,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct CountingSession {
    inner: Box<dyn PageSession>,
    counters: Arc<Counters>,
}

#[async_trait]
impl PageSession for CountingSession {
    async fn goto(&mut self, url: &str) -> PageResult<()> {
        self.counters.gotos.fetch_add(1, Ordering::SeqCst);
        self.inner.goto(url).await
    }

    fn current_url(&self) -> Option<String> {
        self.inner.current_url()
    }

    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    async fn content(&mut self) -> PageResult<String> {
        self.inner.content().await
    }

    async fn locate(&mut self, locator: &Locator) -> PageResult<ElementHandle> {
        self.inner.locate(locator).await
    }

    async fn locate_all(&mut self, locator: &Locator) -> PageResult<Vec<ElementHandle>> {
        self.inner.locate_all(locator).await
    }

    async fn locate_within(
        &mut self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> PageResult<ElementHandle> {
        self.inner.locate_within(scope, locator).await
    }

    async fn inner_text(&mut self, element: &ElementHandle) -> PageResult<String> {
        self.inner.inner_text(element).await
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> PageResult<Option<String>> {
        self.inner.attribute(element, name).await
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> PageResult<()> {
        self.inner.fill(element, value).await
    }

    async fn click(&mut self, element: &ElementHandle, options: ClickOptions) -> PageResult<()> {
        self.inner.click(element, options).await
    }

    async fn click_for_download(&mut self, element: &ElementHandle) -> PageResult<Download> {
        self.inner.click_for_download(element).await
    }

    async fn wait(&mut self, duration: Duration) {
        self.inner.wait(duration).await
    }

    async fn close(&mut self) -> PageResult<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Page interaction seen by a [`RecordingSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Located(Locator, ElementHandle),
    LocatedAll(Locator),
    Clicked(ElementHandle, Duration),
    Waited(Duration),
}

/// [`HttpBrowser`] wrapper logging locates, clicks, and waits in order.
///
/// Requested delays are recorded, not slept.
pub struct RecordingBrowser {
    inner: HttpBrowser,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HttpBrowser::default(),
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserEngine for RecordingBrowser {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn launch(&self) -> PageResult<Box<dyn PageSession>> {
        let inner = self.inner.launch().await?;
        Ok(Box::new(RecordingSession {
            inner,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct RecordingSession {
    inner: Box<dyn PageSession>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingSession {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PageSession for RecordingSession {
    async fn goto(&mut self, url: &str) -> PageResult<()> {
        self.inner.goto(url).await
    }

    fn current_url(&self) -> Option<String> {
        self.inner.current_url()
    }

    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    async fn content(&mut self) -> PageResult<String> {
        self.inner.content().await
    }

    async fn locate(&mut self, locator: &Locator) -> PageResult<ElementHandle> {
        let found = self.inner.locate(locator).await?;
        self.record(Call::Located(locator.clone(), found.clone()));
        Ok(found)
    }

    async fn locate_all(&mut self, locator: &Locator) -> PageResult<Vec<ElementHandle>> {
        self.record(Call::LocatedAll(locator.clone()));
        self.inner.locate_all(locator).await
    }

    async fn locate_within(
        &mut self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> PageResult<ElementHandle> {
        self.inner.locate_within(scope, locator).await
    }

    async fn inner_text(&mut self, element: &ElementHandle) -> PageResult<String> {
        self.inner.inner_text(element).await
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> PageResult<Option<String>> {
        self.inner.attribute(element, name).await
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> PageResult<()> {
        self.inner.fill(element, value).await
    }

    async fn click(&mut self, element: &ElementHandle, options: ClickOptions) -> PageResult<()> {
        self.record(Call::Clicked(element.clone(), options.delay));
        self.inner.click(element, ClickOptions::default()).await
    }

    async fn click_for_download(&mut self, element: &ElementHandle) -> PageResult<Download> {
        self.inner.click_for_download(element).await
    }

    async fn wait(&mut self, duration: Duration) {
        self.record(Call::Waited(duration));
    }

    async fn close(&mut self) -> PageResult<()> {
        self.inner.close().await
    }
}

/// Event handler keeping every state the run passed through.
#[derive(Default)]
pub struct StateRecorder {
    states: Mutex<Vec<RunState>>,
}

impl StateRecorder {
    pub fn states(&self) -> Vec<RunState> {
        self.states.lock().unwrap().clone()
    }
}

impl EventHandler for StateRecorder {
    fn handle(&self, event: &HarvestEvent) {
        if let HarvestEvent::StateChanged(change) = event {
            self.states.lock().unwrap().push(change.to);
        }
    }
}

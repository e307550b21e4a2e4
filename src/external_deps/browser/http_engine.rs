//! Reqwest/scraper-backed page automation engine.
//!
//! Models a browsing context as a cookie-preserving HTTP client plus the
//! markup of the current page. Clicking a link follows it, clicking a submit
//! control posts its form, and downloads are streamed into a staging file.
//! Nothing is rendered and no scripts run.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use ego_tree::NodeId;
use http::Method;
use http::header::CONTENT_DISPOSITION;
use once_cell::sync::Lazy;
use reqwest::{Client, RequestBuilder, Response};
use scraper::{ElementRef, Html, Selector};
use tempfile::NamedTempFile;
use url::Url;

use super::{
    BrowserEngine, ClickOptions, Download, ElementHandle, HandleTarget, Locator, PageError,
    PageResult, PageSession,
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const FALLBACK_DOWNLOAD_NAME: &str = "download";

static ALL_ELEMENTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("*").expect("invalid universal selector"));

static FORM_CONTROLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").expect("invalid form control selector"));

static ANCHORS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("invalid anchor selector"));

static LABELS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("label[for]").expect("invalid label selector"));

static OPTIONS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("option").expect("invalid option selector"));

/// Settings fixed when the engine is constructed.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Engine handing out one cookie-isolated [`HttpSession`] per launch.
#[derive(Debug, Clone, Default)]
pub struct HttpBrowser {
    config: BrowserConfig,
}

impl HttpBrowser {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }
}

#[async_trait]
impl BrowserEngine for HttpBrowser {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn launch(&self) -> PageResult<Box<dyn PageSession>> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(self.config.user_agent.clone())
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|err| PageError::Navigation(err.to_string()))?;

        log::debug!("launched http browsing context");
        Ok(Box::new(HttpSession::new(client)))
    }
}

/// Current document, parsed once per load.
#[derive(Debug)]
struct LoadedPage {
    url: Url,
    markup: String,
    document: Html,
    /// Every element in document order. Handle indices point into this.
    elements: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
}

impl LoadedPage {
    fn parse(url: Url, markup: String) -> Self {
        let document = Html::parse_document(&markup);
        let elements: Vec<NodeId> = document.select(&ALL_ELEMENTS).map(|el| el.id()).collect();
        let positions = elements
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();
        Self {
            url,
            markup,
            document,
            elements,
            positions,
        }
    }

    fn element(&self, index: usize) -> Option<ElementRef<'_>> {
        let id = *self.elements.get(index)?;
        self.document.tree.get(id).and_then(ElementRef::wrap)
    }

    fn index_of(&self, element: ElementRef<'_>) -> Option<usize> {
        self.positions.get(&element.id()).copied()
    }
}

/// What a click on a given element amounts to over plain HTTP.
#[derive(Debug, Clone, PartialEq)]
enum ClickAction {
    Nothing,
    Follow(Url),
    Submit {
        method: Method,
        url: Url,
        fields: Vec<(String, String)>,
    },
}

/// Browsing context backed by a reqwest client with a cookie store.
pub struct HttpSession {
    client: Client,
    page: Option<LoadedPage>,
    generation: u64,
    filled: HashMap<usize, String>,
    closed: bool,
}

impl HttpSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            page: None,
            generation: 0,
            filled: HashMap::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> PageResult<()> {
        if self.closed {
            return Err(PageError::Navigation("browsing context is closed".into()));
        }
        Ok(())
    }

    fn current(&self) -> PageResult<&LoadedPage> {
        self.ensure_open()?;
        self.page.as_ref().ok_or(PageError::NoPage)
    }

    fn checked(&self, handle: &ElementHandle) -> PageResult<&LoadedPage> {
        let page = self.current()?;
        if handle.generation() != self.generation {
            return Err(PageError::StaleHandle);
        }
        Ok(page)
    }

    fn build_request(&self, action: &ClickAction) -> Option<RequestBuilder> {
        match action {
            ClickAction::Nothing => None,
            ClickAction::Follow(url) => Some(self.client.get(url.clone())),
            ClickAction::Submit {
                method,
                url,
                fields,
            } => {
                if *method == Method::POST {
                    Some(self.client.post(url.clone()).form(fields))
                } else {
                    let mut target = url.clone();
                    target.query_pairs_mut().clear().extend_pairs(fields.iter());
                    Some(self.client.get(target))
                }
            }
        }
    }

    async fn load(&mut self, request: RequestBuilder) -> PageResult<()> {
        let response = send_checked(request).await?;
        let url = response.url().clone();
        let markup = response
            .text()
            .await
            .map_err(|err| PageError::Navigation(err.to_string()))?;

        log::debug!("loaded {url} ({} bytes)", markup.len());
        self.page = Some(LoadedPage::parse(url, markup));
        self.generation += 1;
        self.filled.clear();
        Ok(())
    }

    /// Works out what clicking `element` does, without touching the network.
    fn plan_action(&self, element: &ElementHandle) -> PageResult<ClickAction> {
        let page = self.checked(element)?;
        match element.target() {
            HandleTarget::FrameContent(inner) => {
                log::debug!("click on {inner} inside frame has no effect over http");
                Ok(ClickAction::Nothing)
            }
            HandleTarget::Element => plan_click(page, element.index(), &self.filled),
        }
    }
}

#[async_trait]
impl PageSession for HttpSession {
    async fn goto(&mut self, url: &str) -> PageResult<()> {
        self.ensure_open()?;
        let target = match self.page.as_ref() {
            Some(page) => page.url.join(url),
            None => Url::parse(url),
        }
        .map_err(|err| PageError::Navigation(format!("invalid url '{url}': {err}")))?;

        let request = self.client.get(target);
        self.load(request).await
    }

    fn current_url(&self) -> Option<String> {
        self.page.as_ref().map(|page| page.url.to_string())
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    async fn content(&mut self) -> PageResult<String> {
        Ok(self.current()?.markup.clone())
    }

    async fn locate(&mut self, locator: &Locator) -> PageResult<ElementHandle> {
        find_matches(self.current()?, None, locator, self.generation)?
            .into_iter()
            .next()
            .ok_or_else(|| PageError::LocatorNotFound(locator.to_string()))
    }

    async fn locate_all(&mut self, locator: &Locator) -> PageResult<Vec<ElementHandle>> {
        find_matches(self.current()?, None, locator, self.generation)
    }

    async fn locate_within(
        &mut self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> PageResult<ElementHandle> {
        let page = self.checked(scope)?;
        if scope.target() != &HandleTarget::Element {
            return Err(PageError::Unsupported("cannot search inside frame content".into()));
        }
        find_matches(page, Some(scope.index()), locator, self.generation)?
            .into_iter()
            .next()
            .ok_or_else(|| PageError::LocatorNotFound(locator.to_string()))
    }

    async fn inner_text(&mut self, element: &ElementHandle) -> PageResult<String> {
        read_element(self.checked(element)?, element, normalized_text)
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> PageResult<Option<String>> {
        read_element(self.checked(element)?, element, |el| {
            el.value().attr(name).map(str::to_string)
        })
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> PageResult<()> {
        let is_control = read_element(self.checked(element)?, element, |el| {
            matches!(el.value().name(), "input" | "textarea" | "select")
        })?;
        if !is_control {
            return Err(PageError::Unsupported(format!(
                "element #{} is not a form control",
                element.index()
            )));
        }
        self.filled.insert(element.index(), value.to_string());
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle, options: ClickOptions) -> PageResult<()> {
        let action = self.plan_action(element)?;

        if !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }

        match self.build_request(&action) {
            Some(request) => self.load(request).await,
            None => Ok(()),
        }
    }

    async fn click_for_download(&mut self, element: &ElementHandle) -> PageResult<Download> {
        if element.target() != &HandleTarget::Element {
            return Err(PageError::Unsupported("cannot download from frame content".into()));
        }
        let action = self.plan_action(element)?;
        let request = self.build_request(&action).ok_or_else(|| {
            PageError::Download(format!("element #{} triggers no transfer", element.index()))
        })?;

        let mut response = send_checked(request).await?;
        let suggested = suggested_filename(&response)?;
        let mut staged = NamedTempFile::new()?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| PageError::Download(err.to_string()))?
        {
            staged.write_all(&chunk)?;
        }
        staged.flush()?;

        log::debug!("downloaded {} from {}", suggested, response.url());
        Ok(Download::new(suggested, staged))
    }

    async fn close(&mut self) -> PageResult<()> {
        self.page = None;
        self.filled.clear();
        self.closed = true;
        Ok(())
    }
}

async fn send_checked(request: RequestBuilder) -> PageResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|err| PageError::Navigation(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PageError::Navigation(format!(
            "{} responded with {}",
            response.url(),
            status
        )));
    }
    Ok(response)
}

fn parse_selector(raw: &str) -> PageResult<Selector> {
    Selector::parse(raw).map_err(|err| PageError::Unsupported(format!("selector '{raw}': {err}")))
}

fn read_element<T>(
    page: &LoadedPage,
    handle: &ElementHandle,
    read: impl FnOnce(ElementRef<'_>) -> T,
) -> PageResult<T> {
    if handle.target() != &HandleTarget::Element {
        return Err(PageError::Unsupported("frame content is not readable over http".into()));
    }
    let element = page.element(handle.index()).ok_or(PageError::StaleHandle)?;
    Ok(read(element))
}

fn normalized_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves `locator` against the page, optionally restricted to the
/// descendants of the element at `scope`.
fn find_matches(
    page: &LoadedPage,
    scope: Option<usize>,
    locator: &Locator,
    generation: u64,
) -> PageResult<Vec<ElementHandle>> {
    let html = &page.document;
    let scope_el = match scope {
        Some(index) => Some(page.element(index).ok_or(PageError::StaleHandle)?),
        None => None,
    };

    let found: Vec<ElementRef<'_>> = match locator {
        Locator::Css { selector } => {
            let selector = parse_selector(selector)?;
            match scope_el {
                Some(root) => root
                    .select(&selector)
                    .filter(|el| el.id() != root.id())
                    .collect(),
                None => html.select(&selector).collect(),
            }
        }
        Locator::Label { text } => {
            let candidates: Vec<ElementRef<'_>> = match scope_el {
                Some(root) => root
                    .select(&ALL_ELEMENTS)
                    .filter(|el| el.id() != root.id())
                    .collect(),
                None => html.select(&ALL_ELEMENTS).collect(),
            };
            let labelled_ids: Vec<&str> = html
                .select(&LABELS)
                .filter(|label| normalized_text(*label) == *text)
                .filter_map(|label| label.value().attr("for"))
                .collect();
            candidates
                .into_iter()
                .filter(|el| {
                    el.value().attr("aria-label") == Some(text.as_str())
                        || el
                            .value()
                            .id()
                            .is_some_and(|id| labelled_ids.contains(&id))
                })
                .collect()
        }
        Locator::InFrame { frame, inner } => {
            let selector = parse_selector(frame)?;
            let frames: Vec<ElementRef<'_>> = match scope_el {
                Some(root) => root.select(&selector).collect(),
                None => html.select(&selector).collect(),
            };
            return Ok(frames
                .into_iter()
                .filter(|el| matches!(el.value().name(), "iframe" | "frame"))
                .filter_map(|el| page.index_of(el))
                .map(|index| ElementHandle::frame_content(generation, index, (**inner).clone()))
                .collect());
        }
    };

    Ok(found
        .into_iter()
        .filter_map(|el| page.index_of(el))
        .map(|index| ElementHandle::new(generation, index))
        .collect())
}

fn plan_click(
    page: &LoadedPage,
    index: usize,
    filled: &HashMap<usize, String>,
) -> PageResult<ClickAction> {
    let element = page.element(index).ok_or(PageError::StaleHandle)?;

    if is_submit_control(element) {
        let form = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|ancestor| ancestor.value().name() == "form");
        return match form {
            Some(form) => plan_submit(page, form, element, filled),
            None => Ok(ClickAction::Nothing),
        };
    }

    let anchor = if element.value().name() == "a" && element.value().attr("href").is_some() {
        Some(element)
    } else {
        element.select(&ANCHORS).next()
    };

    let Some(href) = anchor.and_then(|a| a.value().attr("href")) else {
        return Ok(ClickAction::Nothing);
    };
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return Ok(ClickAction::Nothing);
    }

    page.url
        .join(href)
        .map(ClickAction::Follow)
        .map_err(|err| PageError::Navigation(format!("invalid link '{href}': {err}")))
}

fn is_submit_control(element: ElementRef<'_>) -> bool {
    let value = element.value();
    let kind = value.attr("type").map(str::to_ascii_lowercase);
    match value.name() {
        "button" => kind.as_deref().is_none_or(|kind| kind == "submit"),
        "input" => matches!(kind.as_deref(), Some("submit" | "image")),
        _ => false,
    }
}

fn plan_submit(
    page: &LoadedPage,
    form: ElementRef<'_>,
    submitter: ElementRef<'_>,
    filled: &HashMap<usize, String>,
) -> PageResult<ClickAction> {
    let mut fields = Vec::new();

    for control in form.select(&FORM_CONTROLS) {
        let value = control.value();
        let Some(name) = value.attr("name") else {
            continue;
        };
        if value.attr("disabled").is_some() {
            continue;
        }
        let kind = value.attr("type").unwrap_or("text").to_ascii_lowercase();
        if value.name() == "input" {
            match kind.as_str() {
                "submit" | "image" | "button" | "reset" | "file" => continue,
                "checkbox" | "radio" if value.attr("checked").is_none() => continue,
                _ => {}
            }
        }

        let filled_value = page.index_of(control).and_then(|index| filled.get(&index));
        let field_value = match filled_value {
            Some(value) => value.clone(),
            None => default_value(control),
        };
        fields.push((name.to_string(), field_value));
    }

    if let Some(name) = submitter.value().attr("name") {
        let value = submitter.value().attr("value").unwrap_or_default();
        fields.push((name.to_string(), value.to_string()));
    }

    let action = form
        .value()
        .attr("action")
        .map(str::trim)
        .filter(|action| !action.is_empty());
    let url = match action {
        Some(action) => page
            .url
            .join(action)
            .map_err(|err| PageError::Navigation(format!("invalid form action '{action}': {err}")))?,
        None => page.url.clone(),
    };
    let method = match form.value().attr("method") {
        Some(method) if method.eq_ignore_ascii_case("post") => Method::POST,
        _ => Method::GET,
    };

    Ok(ClickAction::Submit {
        method,
        url,
        fields,
    })
}

fn default_value(control: ElementRef<'_>) -> String {
    match control.value().name() {
        "textarea" => control.text().collect(),
        "select" => {
            let options: Vec<ElementRef<'_>> = control.select(&OPTIONS).collect();
            options
                .iter()
                .find(|option| option.value().attr("selected").is_some())
                .or_else(|| options.first())
                .map(|option| {
                    option
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| normalized_text(*option))
                })
                .unwrap_or_default()
        }
        _ => control.value().attr("value").unwrap_or_default().to_string(),
    }
}

fn suggested_filename(response: &Response) -> PageResult<String> {
    if let Some(value) = response.headers().get(CONTENT_DISPOSITION)
        && let Ok(value) = value.to_str()
        && let Some(name) = filename_from_disposition(value)?
    {
        return Ok(name);
    }

    match response
        .url()
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
    {
        Some(segment) => decode_component(segment),
        None => Ok(FALLBACK_DOWNLOAD_NAME.to_string()),
    }
}

/// Extracts the filename from a `Content-Disposition` value, preferring the
/// RFC 5987 `filename*` form.
fn filename_from_disposition(value: &str) -> PageResult<Option<String>> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.trim().trim_matches('"');
                let encoded = encoded
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(encoded);
                let decoded = decode_component(encoded)?;
                if !decoded.is_empty() {
                    return Ok(Some(decoded));
                }
            }
            "filename" => {
                let name = raw.trim().trim_matches('"').to_string();
                if !name.is_empty() {
                    plain = Some(name);
                }
            }
            _ => {}
        }
    }
    Ok(plain)
}

fn decode_component(raw: &str) -> PageResult<String> {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .map_err(|err| PageError::Download(format!("undecodable filename '{raw}': {err}")))
}

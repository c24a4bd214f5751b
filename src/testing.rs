//! In-crate fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::app::{BackendError, NetworkError, Result, TethysError};
use crate::article::ArticleService;
use crate::client::{HttpClient, HttpRequest, HttpResponse};
use crate::domain::Article;
use crate::sync::Backend;
use crate::update::UpdateSubscriber;

/// HTTP client answering from a per-URL script.
///
/// One-shot responses queued with [`enqueue`](Self::enqueue) are consumed
/// first, then the persistent response set with [`respond`](Self::respond).
/// Unscripted URLs fail with `ServerNotFound`.
type RequestHook = Box<dyn Fn(&HttpRequest) + Send + Sync>;

#[derive(Default)]
pub struct ScriptedClient {
    queued: Mutex<HashMap<String, VecDeque<std::result::Result<HttpResponse, NetworkError>>>>,
    persistent: Mutex<HashMap<String, std::result::Result<HttpResponse, NetworkError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    hook: Mutex<Option<RequestHook>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, result: std::result::Result<HttpResponse, NetworkError>) {
        self.persistent
            .lock()
            .unwrap()
            .insert(url.to_string(), result);
    }

    pub fn respond_ok(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.respond(url, Ok(HttpResponse::new(200, body)));
    }

    pub fn enqueue(&self, url: &str, result: std::result::Result<HttpResponse, NetworkError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(result);
    }

    /// Run `hook` on every request before it is answered, standing in for
    /// work that happens elsewhere while a request is in flight.
    pub fn on_request(&self, hook: impl Fn(&HttpRequest) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn request(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, NetworkError> {
        let url = request.url.clone();
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(&request);
        }
        self.requests.lock().unwrap().push(request);

        if let Some(result) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&url)
            .and_then(|q| q.pop_front())
        {
            return result;
        }

        self.persistent
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or(Err(NetworkError::ServerNotFound))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberEvent {
    WillUpdate,
    Progress(usize, usize),
}

#[derive(Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<SubscriberEvent>>,
}

impl RecordingSubscriber {
    pub fn events(&self) -> Vec<SubscriberEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Upcast for APIs taking a slice of trait objects.
pub fn as_subscribers(subscriber: &Arc<RecordingSubscriber>) -> Vec<Arc<dyn UpdateSubscriber>> {
    let subscriber: Arc<dyn UpdateSubscriber> = subscriber.clone();
    vec![subscriber]
}

impl UpdateSubscriber for RecordingSubscriber {
    fn will_update_feeds(&self) {
        self.events.lock().unwrap().push(SubscriberEvent::WillUpdate);
    }

    fn did_update_feeds_progress(&self, current: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(SubscriberEvent::Progress(current, total));
    }
}

/// Article service that counts calls and can hold `mark` until released.
pub struct CountingArticleService {
    marks: AtomicUsize,
    removes: AtomicUsize,
    gated: bool,
    gate: Semaphore,
    failure: Mutex<Option<TethysError>>,
}

impl CountingArticleService {
    pub fn new() -> Self {
        Self {
            marks: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            gated: false,
            gate: Semaphore::new(0),
            failure: Mutex::new(None),
        }
    }

    /// `mark` calls block until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    pub fn failing(error: TethysError) -> Self {
        let service = Self::new();
        *service.failure.lock().unwrap() = Some(error);
        service
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn marks(&self) -> usize {
        self.marks.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleService for CountingArticleService {
    async fn mark(&self, article: &Article, read: bool) -> Result<Article> {
        self.marks.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            let permit = self.gate.acquire().await.map_err(|_| TethysError::Unknown)?;
            permit.forget();
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let mut marked = article.clone();
        marked.read = read;
        Ok(marked)
    }

    async fn remove(&self, _article: &Article) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend that records every push and answers from a script (default Ok).
/// A gated backend records the push, then holds it until released.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<HashMap<String, bool>>>,
    script: Mutex<VecDeque<std::result::Result<(), BackendError>>>,
    gate: Option<Semaphore>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn enqueue(&self, result: std::result::Result<(), BackendError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<HashMap<String, bool>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn mark_read(
        &self,
        articles: HashMap<String, bool>,
    ) -> std::result::Result<(), BackendError> {
        self.calls.lock().unwrap().push(articles);
        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| BackendError::Unknown)?.forget();
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Minimal RSS 2.0 document. Items are `(title, link, guid)`.
pub fn rss(title: &str, items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, guid)| {
            format!(
                "<item><title>{}</title><link>{}</link><guid>{}</guid>\
                 <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>\
                 <description>About {}</description></item>",
                title, link, guid, title
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>{}</title><link>https://example.com/</link>
<description>Test feed</description>{}</channel></rss>"#,
        title, items
    )
}

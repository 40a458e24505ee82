use std::{
    cell::RefCell,
    collections::HashSet,
    future::{Future, poll_fn},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_core::{Stream, ready};
use pin_project_lite::pin_project;
use regex::Regex;

use actix_http::error::PayloadError;
use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, Result};

use crate::extract::RequestInfo;
use crate::logger::{Entry, Value};
use crate::sink::Sink;

/// Middleware writing one access log line per request.
///
/// Every request starts from a fresh [`Entry`] holding the extras configured with
/// [`add`](HttpLog::add); only the [`Sink`] is shared between requests.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_httplog::{HttpLog, Sink};
///
/// let app = App::new()
///     .wrap(HttpLog::new(Sink::stdout()).exclude("/health"));
/// ```
pub struct HttpLog(Rc<Inner>);

#[derive(Debug, Clone)]
struct Inner {
    sink: Sink,
    template: Entry,
    exclude: HashSet<String>,
    exclude_regex: Vec<Regex>,
    capture_body: bool,
    capture_limit: usize,
}

/// Bodies larger than this are not captured unless configured otherwise.
pub const DEFAULT_CAPTURE_LIMIT: usize = 64 * 1024;

impl HttpLog {
    /// Create `HttpLog` middleware writing to `sink`.
    pub fn new(sink: Sink) -> HttpLog {
        HttpLog(Rc::new(Inner {
            sink,
            template: Entry::default(),
            exclude: HashSet::new(),
            exclude_regex: Vec::new(),
            capture_body: true,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }))
    }

    /// Ignore and do not log access info for specified path.
    pub fn exclude<T: Into<String>>(mut self, path: T) -> Self {
        self.inner_mut().exclude.insert(path.into());
        self
    }

    /// Ignore and do not log access info for paths that match regex.
    pub fn exclude_regex<T: AsRef<str>>(mut self, pattern: T) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern.as_ref())?;
        self.inner_mut().exclude_regex.push(regex);
        Ok(self)
    }

    /// Add an extra `key=value` pair to the line of every request.
    pub fn add(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner_mut().template.add(key, value);
        self
    }

    /// Buffer request bodies so they can be logged as params. Enabled by default.
    ///
    /// The buffered body is handed on to the wrapped service unchanged.
    pub fn capture_body(mut self, capture: bool) -> Self {
        self.inner_mut().capture_body = capture;
        self
    }

    /// Largest body, in bytes, that is captured as params.
    ///
    /// A body declaring a larger `Content-Length` is not read at all. A body
    /// without one is read until it passes `limit`, then the read part and the
    /// rest of the stream are handed on as they come. Either way the body is
    /// left out of params.
    pub fn capture_limit(mut self, limit: usize) -> Self {
        self.inner_mut().capture_limit = limit;
        self
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Rc::make_mut(&mut self.0)
    }
}

impl Default for HttpLog {
    /// Create `HttpLog` middleware writing to stdout.
    fn default() -> Self {
        HttpLog::new(Sink::stdout())
    }
}

impl<S, B> Transform<S, ServiceRequest> for HttpLog
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = HttpLogMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HttpLogMiddlewareService {
            service: Rc::new(service),
            inner: Rc::clone(&self.0),
        }))
    }
}

/// Logger middleware service.
pub struct HttpLogMiddlewareService<S> {
    inner: Rc<Inner>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HttpLogMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = HttpLogResponse<B>;

    actix_service::forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let excluded = self.inner.exclude.contains(req.path())
            || self
                .inner
                .exclude_regex
                .iter()
                .any(|r| r.is_match(req.path()));

        if excluded {
            return HttpLogResponse {
                fut: Box::pin(self.service.call(req)),
                pending: None,
            };
        }

        let mut entry = self.inner.template.clone();
        entry.set_request_info(RequestInfo::extract(req.request(), Some(b"".as_slice())));
        let entry = Rc::new(RefCell::new(entry));
        req.extensions_mut()
            .insert(RequestLog(Some(Rc::clone(&entry))));

        let service = Rc::clone(&self.service);
        let capture = self.inner.capture_body.then_some(self.inner.capture_limit);
        let request_entry = Rc::clone(&entry);

        let fut = async move {
            if let Some(limit) = capture {
                match capture_payload(&mut req, limit).await {
                    Ok(Some(body)) => request_entry
                        .borrow_mut()
                        .set_request_info(RequestInfo::extract(req.request(), Some(body.as_ref()))),
                    Ok(None) => {}
                    Err(err) => {
                        request_entry
                            .borrow_mut()
                            .set_request_info(RequestInfo::extract(req.request(), None));
                        return Err(Error::from(err));
                    }
                }
            }

            service.call(req).await
        };

        HttpLogResponse {
            fut: Box::pin(fut),
            pending: Some(PendingLog {
                entry,
                sink: self.inner.sink.clone(),
            }),
        }
    }
}

type BoxedResponse<B> = Pin<Box<dyn Future<Output = Result<ServiceResponse<B>, Error>>>>;

struct PendingLog {
    entry: Rc<RefCell<Entry>>,
    sink: Sink,
}

impl PendingLog {
    fn write(self) {
        if let Ok(entry) = self.entry.try_borrow() {
            entry.write_to(&self.sink);
        }
    }
}

pin_project! {
    /// Response future of [`HttpLogMiddlewareService`].
    ///
    /// The line is written once the wrapped service resolves. A future dropped
    /// before that (cancelled, or unwinding from a panic) writes it on drop.
    pub struct HttpLogResponse<B> {
        #[pin]
        fut: BoxedResponse<B>,
        pending: Option<PendingLog>,
    }

    impl<B> PinnedDrop for HttpLogResponse<B> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(pending) = this.project().pending.take() {
                pending.write();
            }
        }
    }
}

impl<B> Future for HttpLogResponse<B> {
    type Output = Result<ServiceResponse<B>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let res = ready!(this.fut.poll(cx));

        if let Some(pending) = this.pending.take() {
            let status = match &res {
                Ok(res) => {
                    if let Some(_error) = res.response().error() {
                        #[cfg(feature = "log")]
                        log::debug!("Error in response: {:?}", _error);
                    }
                    res.status()
                }
                Err(err) => err.as_response_error().status_code(),
            };

            pending.entry.borrow_mut().set_status(status.as_u16());
            pending.write();
        }

        Poll::Ready(res)
    }
}

type PayloadStream = Pin<Box<dyn Stream<Item = Result<Bytes, PayloadError>>>>;

/// Read the request body if it fits in `limit` bytes and put it back for the
/// wrapped service.
///
/// `None` when the body is too large to capture; the service still gets all of it.
async fn capture_payload(
    req: &mut ServiceRequest,
    limit: usize,
) -> Result<Option<Bytes>, PayloadError> {
    if content_length(req).is_some_and(|len| len > limit) {
        return Ok(None);
    }

    let mut payload: PayloadStream = Box::pin(req.take_payload());
    let mut body = BytesMut::new();

    loop {
        let chunk = match poll_fn(|cx| payload.as_mut().poll_next(cx)).await {
            Some(chunk) => chunk?,
            None => break,
        };
        body.extend_from_slice(&chunk);

        if body.len() > limit {
            req.set_payload(Payload::Stream {
                payload: Box::pin(Replay {
                    head: Some(body.freeze()),
                    rest: payload,
                }),
            });
            return Ok(None);
        }
    }

    let body = body.freeze();
    if !body.is_empty() {
        req.set_payload(bytes_to_payload(body.clone()));
    }

    Ok(Some(body))
}

fn content_length(req: &ServiceRequest) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn bytes_to_payload(body: Bytes) -> Payload {
    let (_, mut payload) = actix_http::h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}

/// Already read bytes followed by the rest of the original payload.
struct Replay {
    head: Option<Bytes>,
    rest: PayloadStream,
}

impl Stream for Replay {
    type Item = Result<Bytes, PayloadError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.head.take() {
            Some(head) => Poll::Ready(Some(Ok(head))),
            None => this.rest.as_mut().poll_next(cx),
        }
    }
}

/// Handle to the log line of the current request.
///
/// Extract it in a handler wrapped by [`HttpLog`] to put extra fields on that
/// request's line. Outside of the middleware additions are dropped.
///
/// # Examples
/// ```rust
/// use actix_web::{HttpResponse, Responder};
/// use actix_web_middleware_httplog::RequestLog;
///
/// async fn profile(log: RequestLog) -> impl Responder {
///     log.add("uid", 1234);
///     HttpResponse::Ok()
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Option<Rc<RefCell<Entry>>>);

impl RequestLog {
    pub fn add(&self, key: impl Into<String>, value: impl Into<Value>) {
        if let Some(entry) = &self.0 {
            entry.borrow_mut().add(key, value);
        }
    }
}

impl FromRequest for RequestLog {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(req
            .extensions()
            .get::<RequestLog>()
            .cloned()
            .unwrap_or_default()))
    }
}

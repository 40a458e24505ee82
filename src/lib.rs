//! HTTP access logging for actix-web, one line per request.
//!
//! The crate provides a standalone [`Logger`] and the [`HttpLog`] middleware
//! built on top of it. Both write the same line format to a [`Sink`]:
//!
//! ```text
//! level=I time=2017-07-08T17:08:12UTC ip=193.92.20.19 method=GET path=/logs ua=Mozilla/5.0 status=200 params={"q": "works"}
//! ```
//!
//! Fields are separated by a blank, keys and values by `=`. Values are written
//! as they are, nothing is quoted or escaped. Extra fields added by the caller
//! follow the default ones in no particular order.
//!
//! # Examples:
//! ## Middleware
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_httplog::{HttpLog, Sink};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     HttpServer::new(|| {
//!         App::new()
//!             .wrap(HttpLog::new(Sink::stdout()).exclude("/health"))
//!             .route("/logs", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await
//! }
//! ```
//! ## Standalone
//! ```rust
//! use actix_web_middleware_httplog::{Logger, Sink};
//!
//! let mut logger = Logger::new(Sink::stderr());
//! logger.add("uid", 1234);
//! logger.add("meta", "new-request");
//! logger.log();
//! // => level=I [...] uid=1234 meta=new-request
//! ```
//! ## Extra fields per request
//! Handlers wrapped by [`HttpLog`] can extract a [`RequestLog`] to add fields to
//! their own line:
//! ```rust
//! use actix_web::{web, App, HttpResponse};
//! use actix_web_middleware_httplog::{HttpLog, RequestLog};
//!
//! let app = App::new()
//!     .wrap(HttpLog::default().add("service", "profiles"))
//!     .route(
//!         "/me",
//!         web::get().to(|log: RequestLog| async move {
//!             log.add("uid", 1234);
//!             HttpResponse::Ok()
//!         }),
//!     );
//! ```
//! ## `log` facade
//! With the `log` feature (default) lines can be forwarded to the `log` crate
//! instead of a writer:
//! ```rust,no_run
//! use actix_web::App;
//! use actix_web_middleware_httplog::{HttpLog, Sink};
//! use structured_logger::{Builder, async_json::new_writer};
//!
//! Builder::new()
//!     .with_target_writer("*", new_writer(tokio::io::stdout()))
//!     .init();
//!
//! let app = App::new().wrap(HttpLog::new(Sink::log_facade("access")));
//! ```
//!
//! # Request information
//!
//! - `ip` - the `X-Forwarded-For` header as is, otherwise the peer address without port
//! - `method`, `path`, `ua` - taken from a wire-format dump of the request
//! - `params` - the query string turned into a JSON-ish object
//!   (`foo=bar&page=2` becomes `{"foo": "bar", "page": "2"}`), or the last line
//!   of the dump, which is the body of single-line payloads. Bodies over
//!   [`HttpLog::capture_limit`] are passed through without being captured
//! - `status` - the response status, `0` until set
//!
//! # Feature Flags
//!
//! - `log` (default) - [`Sink::log_facade`] and diagnostics through the standard `log` crate

mod extract;
mod logger;
mod middleware;
mod sink;
mod wrapper;

pub use crate::extract::{RequestDump, RequestInfo, client_ip, query_to_json};
pub use crate::logger::{Entry, Logger, Value};
pub use crate::middleware::{
    DEFAULT_CAPTURE_LIMIT, HttpLog, HttpLogMiddlewareService, HttpLogResponse, RequestLog,
};
pub use crate::sink::Sink;

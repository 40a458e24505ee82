use std::{borrow::Cow, sync::LazyLock};

use actix_http::Version;
use actix_web::HttpRequest;
use actix_web::http::header::{self, HeaderValue};
use regex::Regex;

// `<method> <target> HTTP...`
static REQUEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+)\s(.+)\sHTTP").unwrap());
static USER_AGENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"User-Agent:\s(.+)").unwrap());
static QUERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.+)\?(.+)").unwrap());

/// Request attributes that end up on an access log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Client address. Example: 193.92.20.19
    pub ip: String,
    /// Method. Example: GET
    pub method: String,
    /// Request target without the query string. Example: /logs
    pub path: String,
    /// User agent. Example: Mozilla/5.0
    pub user_agent: String,
    /// JSON-ish parameters. Example: {"q": "works"}
    pub params: String,
}

impl RequestInfo {
    /// Derive the request attributes of `req`.
    ///
    /// `body` is the request payload. `None` means the request could not be
    /// dumped, in which case only the client address is derived.
    pub fn extract(req: &HttpRequest, body: Option<&[u8]>) -> Self {
        let dump = body
            .map(|body| RequestDump::new(req, body))
            .unwrap_or_default();

        RequestInfo {
            ip: client_ip(req),
            ..RequestInfo::scan(dump.as_str())
        }
    }

    /// Scan a wire-format request dump for method, path, user agent and params.
    ///
    /// The query string of the request line wins over the body. Without a
    /// query string the last line of the dump is taken as params, which is the
    /// body for single-line payloads and an empty string for bodiless requests.
    pub fn scan(dump: &str) -> Self {
        let mut info = RequestInfo::default();
        let mut params = None;
        let mut last = "";

        for line in dump.lines() {
            if let Some(request_line) = REQUEST_LINE.captures(line) {
                info.method = request_line[1].to_string();
                info.path = request_line[2].to_string();

                if let Some(target) = QUERY.captures(&request_line[2]) {
                    info.path = target[1].to_string();
                    params = Some(query_to_json(&target[2]));
                }
            }

            if let Some(ua) = USER_AGENT.captures(line) {
                info.user_agent = ua[1].to_string();
            }

            last = line;
        }

        info.params = params.unwrap_or_else(|| last.to_string());
        info
    }
}

/// Wire-format serialization of a request: request line, headers, blank line, body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDump(String);

impl RequestDump {
    pub fn new(req: &HttpRequest, body: &[u8]) -> Self {
        let mut dump = format!(
            "{} {} {}\r\n",
            req.method(),
            req.uri(),
            http_version(req.version())
        );

        let host = match req.headers().get(header::HOST) {
            Some(host) => Some(lossy(host).into_owned()),
            None => req.uri().authority().map(|authority| authority.to_string()),
        };
        if let Some(host) = host.filter(|host| !host.is_empty()) {
            dump.push_str(&format!("Host: {host}\r\n"));
        }

        let mut headers: Vec<(String, Cow<'_, str>)> = req
            .headers()
            .iter()
            .filter(|(name, _)| name.as_str() != "host")
            .map(|(name, value)| (canonical_header_name(name.as_str()), lossy(value)))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, value) in headers {
            dump.push_str(&format!("{name}: {value}\r\n"));
        }

        dump.push_str("\r\n");
        dump.push_str(&String::from_utf8_lossy(body));

        RequestDump(dump)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Client address of `req`.
///
/// A non-empty `X-Forwarded-For` header is used verbatim, list or not.
/// Otherwise the peer address without its port.
pub fn client_ip(req: &HttpRequest) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        let forwarded = lossy(forwarded);
        if !forwarded.is_empty() {
            return forwarded.into_owned();
        }
    }

    req.peer_addr()
        .map(|addr| strip_port(&addr.to_string()).to_string())
        .unwrap_or_default()
}

/// Turn `a=1&b=2` into `{"a": "1", "b": "2"}`.
///
/// Purely textual: nothing is decoded or escaped, so keys and values holding
/// `=`, `&` or `"` produce broken JSON.
pub fn query_to_json(query: &str) -> String {
    let pairs = query.replace('=', "\": \"").replace('&', "\", \"");
    format!("{{\"{pairs}\"}}")
}

/// Drop the port of `host:port` or `[host]:port`. Anything else is returned as is.
fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, _)) => host,
            None => addr,
        };
    }

    match addr.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host,
        _ => addr,
    }
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

// user-agent -> User-Agent
fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let c = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            c
        })
        .collect()
}

fn lossy(value: &HeaderValue) -> Cow<'_, str> {
    String::from_utf8_lossy(value.as_bytes())
}

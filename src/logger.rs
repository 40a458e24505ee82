use std::{borrow::Cow, collections::HashMap, fmt};

use actix_web::HttpRequest;
use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::extract::RequestInfo;
use crate::sink::Sink;

/// Standalone access logger bound to one [`Sink`].
///
/// The logger keeps its state between [`log`](Logger::log) calls. Fields are only
/// ever overwritten, so logging twice without changes writes the same line twice.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_httplog::{Logger, Sink};
///
/// let mut logger = Logger::new(Sink::stdout());
/// logger.set_status(200);
/// logger.add("uid", 1234);
/// logger.add("meta", "new-request");
/// logger.log();
/// // level=I time=... ip= method= path= ua= status=200 params= uid=1234 meta=new-request
/// ```
#[derive(Debug, Clone)]
pub struct Logger {
    sink: Sink,
    entry: Entry,
}

impl Logger {
    pub fn new(sink: Sink) -> Self {
        Logger {
            sink,
            entry: Entry::default(),
        }
    }

    /// Write the current state as one line to the sink.
    pub fn log(&self) {
        self.entry.write_to(&self.sink);
    }

    pub fn set_status(&mut self, status: u16) {
        self.entry.set_status(status);
    }

    /// Take ip, method, path, user agent and params from `req` and its `body`.
    pub fn set_request_info(&mut self, req: &HttpRequest, body: &[u8]) {
        self.entry
            .set_request_info(RequestInfo::extract(req, Some(body)));
    }

    /// Add an extra `key=value` pair to every following line.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entry.add(key, value);
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

/// State behind one access log line.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    info: RequestInfo,
    status: u16,
    extras: HashMap<String, Value>,
}

impl Entry {
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_request_info(&mut self, info: RequestInfo) {
        self.info = info;
    }

    /// Insert or replace the extra under `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extras.insert(key.into(), value.into());
    }

    pub fn request_info(&self) -> &RequestInfo {
        &self.info
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn extras(&self) -> &HashMap<String, Value> {
        &self.extras
    }

    /// Render the line stamped with `now`, without the trailing newline.
    ///
    /// Default fields come in a fixed order, extras follow in no particular
    /// order. Nothing is quoted or escaped.
    pub fn render(&self, now: OffsetDateTime) -> String {
        let mut line = format!(
            "level=I time={} ip={} method={} path={} ua={} status={} params={}",
            timestamp(now),
            self.info.ip,
            self.info.method,
            self.info.path,
            self.info.user_agent,
            self.status,
            self.info.params,
        );

        for (key, value) in &self.extras {
            line.push_str(&format!(" {key}={value}"));
        }

        line
    }

    pub(crate) fn write_to(&self, sink: &Sink) {
        let mut line = self.render(OffsetDateTime::now_utc());
        line.push('\n');
        sink.write_line(line.as_bytes());
    }
}

// 2017-07-08T17:08:12UTC
const TIMESTAMP: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]UTC");

fn timestamp(now: OffsetDateTime) -> String {
    now.to_offset(UtcOffset::UTC)
        .format(TIMESTAMP)
        .unwrap_or_default()
}

/// Value of an extra field.
///
/// Integers render as decimals and strings verbatim. Everything else is
/// stored as its `Display` output, see [`Value::display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(String),
    Other(String),
}

impl Value {
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
        Value::Other(value.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(v) | Value::Other(v) => f.write_str(v),
        }
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

macro_rules! wide_int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    match i64::try_from(v) {
                        Ok(v) => Value::Int(v),
                        Err(_) => Value::display(&v),
                    }
                }
            }
        )*
    };
}

macro_rules! other_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::display(&v)
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);
wide_int_value!(isize, usize, u64, i128, u128);
other_value!(bool, char, f32, f64);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<Cow<'_, str>> for Value {
    fn from(v: Cow<'_, str>) -> Self {
        Value::Str(v.into_owned())
    }
}

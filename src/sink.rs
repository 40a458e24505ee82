use std::{
    fmt,
    io::{self, Write},
    sync::{Arc, Mutex},
};

/// Shared handle to the destination of access log lines.
///
/// Clones write to the same destination. The sink never opens, flushes or
/// closes the underlying writer, that stays with whoever built it.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_httplog::Sink;
///
/// let sink = Sink::new(std::io::stdout());
/// let same = sink.clone();
/// ```
#[derive(Clone)]
pub struct Sink(Arc<Mutex<dyn Write + Send>>);

impl Sink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Sink(Arc::new(Mutex::new(writer)))
    }

    pub fn stdout() -> Self {
        Sink::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Sink::new(io::stderr())
    }

    /// Forward every line to the `log` facade as an `Info` record with `target`.
    #[cfg(feature = "log")]
    pub fn log_facade(target: impl Into<std::borrow::Cow<'static, str>>) -> Self {
        Sink::new(crate::wrapper::rust_log::LogWriter::new(target))
    }

    /// Hand `line` to the writer in one `write_all` call.
    ///
    /// Failures are swallowed; with the `log` feature they show up as a warning.
    pub(crate) fn write_line(&self, line: &[u8]) {
        let mut writer = match self.0.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(_err) = writer.write_all(line) {
            #[cfg(feature = "log")]
            log::warn!("failed to write access log line: {_err}");
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        Sink::stdout()
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

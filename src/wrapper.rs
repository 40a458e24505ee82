#[cfg(feature = "log")]
pub(crate) mod rust_log {
    use std::{borrow::Cow, io};

    pub(crate) fn log(
        level: log::Level,
        target: &str,
        module_path: &'static str,
        line: &str,
    ) {
        log::logger().log(
            &log::Record::builder()
                .args(format_args!("{line}"))
                .level(level)
                .target(target)
                .module_path_static(Some(module_path))
                .build(),
        );
    }

    /// Writer that turns every newline terminated line into a `log` record.
    pub(crate) struct LogWriter {
        target: Cow<'static, str>,
        buf: Vec<u8>,
    }

    impl LogWriter {
        pub(crate) fn new(target: impl Into<Cow<'static, str>>) -> Self {
            LogWriter {
                target: target.into(),
                buf: Vec::new(),
            }
        }
    }

    impl io::Write for LogWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(buf);

            while let Some(end) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=end).collect();
                log(
                    log::Level::Info,
                    self.target.as_ref(),
                    module_path!(),
                    String::from_utf8_lossy(&line[..end]).as_ref(),
                );
            }

            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Write;
        use std::sync::{Mutex, OnceLock};

        struct Capture(Mutex<Vec<(String, String, Option<u32>)>>);

        impl log::Log for Capture {
            fn enabled(&self, _: &log::Metadata) -> bool {
                true
            }

            fn log(&self, record: &log::Record) {
                if record.target().starts_with("httplog_test") {
                    self.0
                        .lock()
                        .unwrap()
                        .push((
                            record.target().to_string(),
                            record.args().to_string(),
                            record.line(),
                        ));
                }
            }

            fn flush(&self) {}
        }

        fn capture() -> &'static Capture {
            static CAPTURE: OnceLock<&'static Capture> = OnceLock::new();
            CAPTURE.get_or_init(|| {
                let capture: &'static Capture = Box::leak(Box::new(Capture(Mutex::new(Vec::new()))));
                log::set_logger(capture).unwrap();
                log::set_max_level(log::LevelFilter::Trace);
                capture
            })
        }

        #[test]
        fn test_log_writer_emits_one_record_per_line() {
            let capture = capture();
            let mut writer = LogWriter::new("httplog_test");

            writer.write_all(b"level=I status=200\n").unwrap();
            writer.write_all(b"level=I ").unwrap();
            writer.write_all(b"status=404\n").unwrap();

            let records = capture.0.lock().unwrap().clone();
            assert_eq!(
                records,
                vec![
                    ("httplog_test".to_string(), "level=I status=200".to_string(), None),
                    ("httplog_test".to_string(), "level=I status=404".to_string(), None),
                ]
            );
        }
    }
}

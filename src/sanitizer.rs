/*!
Log sanitizer.

A `log::Log` decorator that rewrites sensitive substrings before a record
reaches the inner sink: paths under `/home/` lose the username component
and SSH key fingerprints are redacted. `init_logging` installs it over the
`env_logger` sink at startup, so no call site has to think about what ends
up in a log line.
*/

use log::{Log, Metadata, Record};

/// Decorator around any [`Log`] sink.
pub struct SanitizingLogger {
    inner: Box<dyn Log>,
}

impl SanitizingLogger {
    pub fn new(inner: Box<dyn Log>) -> Self {
        SanitizingLogger { inner }
    }
}

impl Log for SanitizingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        let message = sanitize_string(&record.args().to_string());
        self.inner.log(
            &Record::builder()
                .metadata(record.metadata().clone())
                .args(format_args!("{message}"))
                .module_path(record.module_path())
                .file(record.file())
                .line(record.line())
                .build(),
        );
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the sanitizing logger over an `env_logger` sink.
///
/// `RUST_LOG` still controls filtering; `verbose` only raises the default
/// from `info` to `debug`.
pub fn init_logging(verbose: bool) -> Result<(), log::SetLoggerError> {
    let default_filter = if verbose { "debug" } else { "info" };
    let inner = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .build();
    let max_level = inner.filter();
    log::set_boxed_logger(Box::new(SanitizingLogger::new(Box::new(inner))))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Strip usernames from `/home/<user>/...` paths and redact SSH key
/// fingerprints of the `SHA256:...` form.
pub fn sanitize_string(s: &str) -> String {
    let mut out = sanitize_home_paths(s);
    if let Some(idx) = out.find("SHA256:") {
        let start = idx + "SHA256:".len();
        let end = out[start..]
            .find([' ', '\n'])
            .map(|off| start + off)
            .unwrap_or(out.len());
        out.replace_range(start..end, "<redacted>");
    }
    out
}

fn sanitize_home_paths(s: &str) -> String {
    if !s.contains("/home/") {
        return s.to_string();
    }
    let mut parts = s.split("/home/");
    let mut out = String::with_capacity(s.len());
    out.push_str(parts.next().unwrap_or_default());
    for part in parts {
        out.push_str("/home/");
        match part.split_once('/') {
            Some((_user, rest)) => {
                out.push_str("<user>/");
                out.push_str(rest);
            }
            // No path component after the username, nothing to preserve.
            None => out.push_str(part),
        }
    }
    out
}

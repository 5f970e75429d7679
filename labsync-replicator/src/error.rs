use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use labsync::error::GatewayError;
use sqlx::migrate::MigrateError;

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Backtrace captured when an infrastructure error is wrapped.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the gateway service.
///
/// Wraps [`GatewayError`] for engine and sink errors, the other variants cover startup.
#[derive(Debug)]
pub enum ReplicatorError {
    Gateway(GatewayError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Migration(MigrateError, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl ReplicatorError {
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Gateway(_) => "gateway error",
            ReplicatorError::Config(_, _) => "configuration error",
            ReplicatorError::Migration(_, _) => "migration error",
            ReplicatorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ReplicatorError::Gateway(err) => Some(err.backtrace()),
            ReplicatorError::Config(_, cb) => Some(&cb.0),
            ReplicatorError::Migration(_, cb) => Some(&cb.0),
            ReplicatorError::Io(_, cb) => Some(&cb.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report for terminal output, with causes and, when `RUST_BACKTRACE` is set, the
    /// backtrace.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("gateway failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Gateway(err) => write!(f, "{err}"),
            ReplicatorError::Config(source, _) => write!(f, "configuration error: {source}"),
            ReplicatorError::Migration(source, _) => write!(f, "migration error: {source}"),
            ReplicatorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Gateway(err) => err.source(),
            ReplicatorError::Config(source, _) => Some(source.as_ref()),
            ReplicatorError::Migration(source, _) => Some(source),
            ReplicatorError::Io(source, _) => Some(source),
        }
    }
}

impl From<MigrateError> for ReplicatorError {
    fn from(err: MigrateError) -> Self {
        ReplicatorError::Migration(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<GatewayError> for ReplicatorError {
    fn from(err: GatewayError) -> Self {
        ReplicatorError::Gateway(err)
    }
}

#[cfg(test)]
mod tests {
    use labsync::error::ErrorKind;
    use labsync_config::shared::ValidationError;

    use super::*;

    #[test]
    fn report_lists_category_and_causes() {
        let err = ReplicatorError::config(ValidationError::Empty("broker.consumer"));
        let report = err.render_report();

        assert!(report.starts_with("gateway failed\ncategory: configuration error\n"));
        assert!(report.contains("cause 1: `broker.consumer` cannot be empty"));
    }

    #[test]
    fn gateway_errors_keep_their_kind() {
        let err = ReplicatorError::from(GatewayError::new(
            ErrorKind::BrokerConnectionFailed,
            "Could not connect to the broker",
        ));

        assert_eq!(err.category(), "gateway error");
        assert!(matches!(
            err,
            ReplicatorError::Gateway(inner) if inner.kind() == ErrorKind::BrokerConnectionFailed
        ));
    }
}

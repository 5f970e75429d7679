//! Shorthands for building [`crate::error::GatewayError`] values.

/// Builds a [`crate::error::GatewayError`] from a kind and a static description.
///
/// An optional third argument is rendered with [`ToString`] into the detail, and a trailing
/// `source: err` attaches the originating error.
///
/// ```ignore
/// gateway_error!(ErrorKind::QueueClosed, "Mailbox closed");
/// gateway_error!(ErrorKind::IoError, "Write failed", "bucket `requests`", source: err);
/// ```
#[macro_export]
macro_rules! gateway_error {
    ($kind:expr, $desc:expr $(,)?) => {
        $crate::error::GatewayError::new($kind, $desc)
    };
    ($kind:expr, $desc:expr, source: $source:expr $(,)?) => {
        $crate::error::GatewayError::new($kind, $desc).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr $(, source: $source:expr)?) => {
        $crate::error::GatewayError::new($kind, $desc)
            .with_detail($detail.to_string())
            $(.with_source($source))?
    };
}

/// Returns early with the error built by [`gateway_error!`] from the same arguments.
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::gateway_error!($($args)+))
    };
}

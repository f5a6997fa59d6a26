//! # Error Handling
//!
//! A hierarchical error type for the remote-desktop host, in the same shape
//! as a typical hand-rolled error system in this codebase's lineage: one
//! variant per failure domain, each carrying an [`ErrorContext`] with
//! timestamp, operation, severity, and retry/recovery metadata.
//!
//! ## Taxonomy
//!
//! Every [`HostError`] maps onto one of four failure classes (see
//! [`classify::failure_class`]):
//!
//! - **Fatal at init**: no GPU device, no AV1 encoder, HTTP bind failure.
//! - **Transient per-frame**: GPU wait timeout, codec submit failure,
//!   channel send exception, backpressure above threshold.
//! - **Connection-fatal**: ping liveness lost, sustained backpressure,
//!   data-channel closed, failed auth.
//! - **User error**: malformed SDP, malformed auth, invalid FPS/monitor.
//!
//! ```rust
//! use host::error::{HostError, ErrorSeverity, Retryable};
//!
//! let error = HostError::frame_pipeline("encode", "codec submit failed")
//!     .with_context("encoding frame 42")
//!     .retryable();
//!
//! if error.is_retryable() {
//!     // increment a counter and continue; never propagate across threads.
//! }
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

/// Metadata about when and where an error occurred.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub operation: Option<String>,
    pub context: Option<String>,
    pub recovery_suggestion: Option<String>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub recoverable: bool,
    pub metadata: std::collections::HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            recoverable: false,
            metadata: std::collections::HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Base error type for the host binary and library.
#[derive(Debug)]
pub enum HostError {
    /// Configuration validation failures (`HostConfig`/`AuthRecord`).
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Capture-source construction/rebind failures.
    CaptureInit {
        platform: String,
        reason: String,
        context: ErrorContext,
    },
    /// Codec construction failures (no AV1 backend available, GPU device init).
    EncoderInit {
        codec: String,
        reason: String,
        context: ErrorContext,
    },
    /// Per-frame pipeline failures: GPU wait timeout, codec submit failure.
    FramePipeline {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Peer transport failures: data-channel send, ICE negotiation, backpressure.
    Transport {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Authentication failures.
    Auth {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Signaling (SDP offer/answer) failures.
    Signaling {
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors (auth.json, HTTP bind).
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// Input router failures (unknown key code, malformed message).
    InputRouter {
        reason: String,
        context: ErrorContext,
    },
    /// Bounds/format validation errors (FPS, monitor index, message size).
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
    /// Invalid state transitions (e.g. send before authenticated).
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Timeout errors (ICE gathering, GPU wait).
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },
    /// Wrapped external-library errors.
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl HostError {
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn capture_init(platform: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CaptureInit {
            platform: platform.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    pub fn encoder_init(codec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EncoderInit {
            codec: codec.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    pub fn frame_pipeline(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FramePipeline {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new().retryable(),
        }
    }

    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Critical),
        }
    }

    pub fn auth(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Auth {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn signaling(reason: impl Into<String>) -> Self {
        Self::Signaling {
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn io_path(
        operation: impl Into<String>,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.into()),
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn input_router(reason: impl Into<String>) -> Self {
        Self::InputRouter {
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Debug),
        }
    }

    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
            context: ErrorContext::new().retryable(),
        }
    }

    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.context_mut().retryable = true;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.context_mut().recoverable = true;
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::CaptureInit { context, .. } => context,
            Self::EncoderInit { context, .. } => context,
            Self::FramePipeline { context, .. } => context,
            Self::Transport { context, .. } => context,
            Self::Auth { context, .. } => context,
            Self::Signaling { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::InputRouter { context, .. } => context,
            Self::Validation { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::CaptureInit { context, .. } => context,
            Self::EncoderInit { context, .. } => context,
            Self::FramePipeline { context, .. } => context,
            Self::Transport { context, .. } => context,
            Self::Auth { context, .. } => context,
            Self::Signaling { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::InputRouter { context, .. } => context,
            Self::Validation { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::CaptureInit { .. } => "capture_init",
            Self::EncoderInit { .. } => "encoder_init",
            Self::FramePipeline { .. } => "frame_pipeline",
            Self::Transport { .. } => "transport",
            Self::Auth { .. } => "auth",
            Self::Signaling { .. } => "signaling",
            Self::Io { .. } => "io",
            Self::InputRouter { .. } => "input_router",
            Self::Validation { .. } => "validation",
            Self::State { .. } => "state",
            Self::Timeout { .. } => "timeout",
            Self::External { .. } => "external",
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Config {
                field,
                value,
                reason,
                ..
            } => write!(f, "config error in '{field}': {reason} (value: {value})"),
            HostError::CaptureInit {
                platform, reason, ..
            } => write!(f, "failed to initialize capture on {platform}: {reason}"),
            HostError::EncoderInit { codec, reason, .. } => {
                write!(f, "failed to initialize encoder '{codec}': {reason}")
            }
            HostError::FramePipeline {
                operation, reason, ..
            } => write!(f, "frame pipeline failure during {operation}: {reason}"),
            HostError::Transport {
                operation, reason, ..
            } => write!(f, "transport failure during {operation}: {reason}"),
            HostError::Auth { operation, reason, .. } => {
                write!(f, "auth failure during {operation}: {reason}")
            }
            HostError::Signaling { reason, .. } => write!(f, "signaling failure: {reason}"),
            HostError::Io {
                operation,
                path,
                source,
                ..
            } => match path {
                Some(path) => write!(f, "I/O error during {operation} on '{path}': {source}"),
                None => write!(f, "I/O error during {operation}: {source}"),
            },
            HostError::InputRouter { reason, .. } => write!(f, "input router: {reason}"),
            HostError::Validation {
                field,
                constraint,
                value,
                ..
            } => write!(f, "validation failed for '{field}': {constraint} (value: {value})"),
            HostError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => write!(
                f,
                "invalid transition from '{current_state}' attempting '{attempted_operation}': {reason}"
            ),
            HostError::Timeout {
                operation,
                duration_ms,
                ..
            } => write!(f, "timeout during {operation} after {duration_ms}ms"),
            HostError::External { library, source, .. } => {
                write!(f, "external error in {library}: {source}")
            }
        }
    }
}

impl StdError for HostError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

pub trait Retryable {
    fn is_retryable(&self) -> bool;
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }
}

impl Retryable for HostError {
    fn is_retryable(&self) -> bool {
        self.context().retryable
            || matches!(
                self,
                Self::Timeout { .. } | Self::FramePipeline { .. } | Self::Io { .. }
            )
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Timeout { .. } => Some(1000),
            Self::FramePipeline { .. } => Some(0),
            Self::Io { .. } => Some(100),
            _ => None,
        }
    }
}

pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for HostError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable
            || matches!(
                self,
                Self::FramePipeline { .. } | Self::Timeout { .. } | Self::Validation { .. }
            )
    }
}

pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for HostError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// The four failure classes from SPEC_FULL §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    FatalAtInit,
    TransientPerFrame,
    ConnectionFatal,
    UserError,
}

pub mod classify {
    use super::*;

    /// Maps an error onto SPEC_FULL §7's taxonomy.
    pub fn failure_class(error: &HostError) -> FailureClass {
        match error {
            HostError::CaptureInit { .. } | HostError::EncoderInit { .. } => {
                FailureClass::FatalAtInit
            }
            HostError::Io { .. } if error.severity() == ErrorSeverity::Fatal => {
                FailureClass::FatalAtInit
            }
            HostError::FramePipeline { .. } => FailureClass::TransientPerFrame,
            HostError::Transport { .. } => FailureClass::ConnectionFatal,
            HostError::Auth { .. }
            | HostError::Signaling { .. }
            | HostError::Validation { .. } => FailureClass::UserError,
            _ => FailureClass::UserError,
        }
    }

    pub fn is_fatal(error: &HostError) -> bool {
        failure_class(error) == FailureClass::FatalAtInit || error.severity() == ErrorSeverity::Fatal
    }
}

impl From<std::io::Error> for HostError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for HostError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_init_is_fatal_at_init() {
        let error = HostError::capture_init("x11", "no display device");
        assert_eq!(classify::failure_class(&error), FailureClass::FatalAtInit);
        assert!(classify::is_fatal(&error));
    }

    #[test]
    fn frame_pipeline_is_transient_and_retryable() {
        let error = HostError::frame_pipeline("encode", "codec submit failed");
        assert_eq!(
            classify::failure_class(&error),
            FailureClass::TransientPerFrame
        );
        assert!(error.is_retryable());
    }

    #[test]
    fn auth_is_user_error_not_fatal() {
        let error = HostError::auth("handshake", "bad pin");
        assert_eq!(classify::failure_class(&error), FailureClass::UserError);
        assert!(!classify::is_fatal(&error));
    }

    #[test]
    fn transport_is_connection_fatal() {
        let error = HostError::transport("send", "data channel closed");
        assert_eq!(classify::failure_class(&error), FailureClass::ConnectionFatal);
    }
}

//! Error types for the ovftool post-processor.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

/// The main error type for post-processor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// The raw configuration could not be decoded into typed fields.
    #[error("Error decoding configuration: {message}")]
    Decode { message: String },

    /// One or more configuration checks failed.
    #[error("{0}")]
    Config(ValidationErrors),

    /// The artifact was produced by a builder other than VMware.
    #[error("ovftool post-processor can only be used on VMware boxes: {builder_id}")]
    UnsupportedArtifact { builder_id: String },

    /// None of the artifact files is a VMX descriptor.
    #[error("VMX file could not be located.")]
    DescriptorNotFound,

    /// Removing floppy and CD-ROM entries from the VMX failed.
    #[error("Couldn't strip floppy/DVD drives from VMX '{}': {source}", path.display())]
    StripDrives {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// A template could not be parsed or rendered.
    #[error("Template error: {message}")]
    Template { message: String },

    /// The conversion tool could not be started.
    #[error("Unable to execute ovftool '{}': {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        source: std::io::Error,
    },

    /// The conversion tool ran and reported failure.
    #[error("Unable to execute ovftool: {output}")]
    ToolFailed { status: ExitStatus, output: String },
}

/// A specialized Result type for post-processor operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create a configuration decoding error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a template error.
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Wrap a sanitizer failure for the given VMX path.
    pub fn strip_drives(path: impl Into<PathBuf>, source: Error) -> Self {
        Self::StripDrives {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}

/// A single failed configuration check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The conversion executable is not on the search path.
    #[error("Could not find {name} executable: {reason}")]
    ExecutableNotFound { name: String, reason: String },

    /// The target path template is malformed.
    #[error("Error parsing target template: {message}")]
    InvalidTemplate { message: String },

    /// The target type is neither `ovf` nor `ova`.
    #[error("Invalid target type '{value}'. Only 'ovf' or 'ova' are allowed.")]
    InvalidTargetType { value: String },

    /// The compression level is not a whole number in 0..=9.
    #[error("Invalid compression level {level}. Must be between 1 and 9, or 0 for no compression.")]
    InvalidCompression { level: String },
}

/// Accumulates independent configuration failures so they can be
/// reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no failure has been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the recorded failures in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Yield `value` if nothing failed, otherwise a single composite error.
    pub fn into_result<T>(self, value: T) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(Error::Config(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s) occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n* {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

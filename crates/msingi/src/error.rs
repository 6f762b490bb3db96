/// All kinds of failures a protocol operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The radio link timed out, rejected a command, or delivered a
    /// malformed frame.
    Transport,
    /// A cryptographic primitive failed or the secure hardware is
    /// unavailable.
    Crypto,
    /// A sensor reading lies outside its physical bounds.
    Validation,
    /// A control message or an enrollment step is unexpected or
    /// unparseable.
    Protocol,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport => "Transport",
            Self::Crypto => "Crypto",
            Self::Validation => "Validation",
            Self::Protocol => "Protocol",
        }
        .fmt(f)
    }
}

/// A protocol error.
///
/// Contains the [`ErrorKind`] and a static description of the failure.
/// Errors never carry secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: &'static str,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub const fn new(kind: ErrorKind, description: &'static str) -> Self {
        Self { kind, description }
    }

    /// Creates a [`ErrorKind::Transport`] error.
    #[must_use]
    #[inline]
    pub const fn transport(description: &'static str) -> Self {
        Self::new(ErrorKind::Transport, description)
    }

    /// Creates a [`ErrorKind::Crypto`] error.
    #[must_use]
    #[inline]
    pub const fn crypto(description: &'static str) -> Self {
        Self::new(ErrorKind::Crypto, description)
    }

    /// Creates a [`ErrorKind::Validation`] error.
    #[must_use]
    #[inline]
    pub const fn validation(description: &'static str) -> Self {
        Self::new(ErrorKind::Validation, description)
    }

    /// Creates a [`ErrorKind::Protocol`] error.
    #[must_use]
    #[inline]
    pub const fn protocol(description: &'static str) -> Self {
        Self::new(ErrorKind::Protocol, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    #[inline]
    pub const fn description(&self) -> &'static str {
        self.description
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl core::error::Error for Error {}

/// A specialized [`Result`](core::result::Result) type for protocol
/// operations.
pub type Result<T> = core::result::Result<T, Error>;

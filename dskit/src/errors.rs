use backtrace::Backtrace;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

use parking_lot::RwLock;

/// Error kinds for dskit operations.
///
/// Each kind describes one category of failure so callers can branch on it
/// without parsing messages. The store's distinguished "no such entity"
/// condition is [`ErrorKind::NoSuchEntity`]; per-row schema differences are
/// [`ErrorKind::FieldMismatch`].
///
/// # Examples
///
/// ```rust,ignore
/// use dskit::errors::{DsError, ErrorKind, DsResult};
///
/// fn example() -> DsResult<()> {
///     Err(DsError::new("key cannot be nil", ErrorKind::InvalidArgument))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Caller errors, raised before the store is touched
    /// A required argument is missing, empty or inconsistent
    InvalidArgument,
    /// The key is incomplete or otherwise unusable for the operation
    InvalidKey,
    /// The cursor string could not be decoded
    InvalidCursor,
    /// The client could not be configured from the environment
    ConfigurationError,

    // Store errors, surfaced unchanged
    /// The requested entity does not exist
    NoSuchEntity,
    /// Stored properties did not line up with the destination type
    FieldMismatch,
    /// An optimistic transaction lost a race with a concurrent writer
    TransactionConflict,
    /// The transaction was already committed or rolled back
    TransactionClosed,
    /// The operation was cancelled through its context
    Cancelled,
    /// The context deadline passed before the operation finished
    DeadlineExceeded,
    /// Error reported by the storage backend
    BackendError,
    /// The store handle has already been closed
    StoreAlreadyClosed,

    // Mapping errors
    /// Error mapping a record to or from properties
    ObjectMappingError,
    /// A value had a different type than the operation expected
    InvalidDataType,
    /// Error encoding or decoding data
    EncodingError,

    /// No constructor is registered for the kind
    NotRegistered,
    /// Generic IO error
    IOError,

    /// Invariant break inside the library
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::InvalidKey => write!(f, "Invalid key"),
            ErrorKind::InvalidCursor => write!(f, "Invalid cursor"),
            ErrorKind::ConfigurationError => write!(f, "Configuration error"),
            ErrorKind::NoSuchEntity => write!(f, "No such entity"),
            ErrorKind::FieldMismatch => write!(f, "Field mismatch"),
            ErrorKind::TransactionConflict => write!(f, "Transaction conflict"),
            ErrorKind::TransactionClosed => write!(f, "Transaction closed"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::DeadlineExceeded => write!(f, "Deadline exceeded"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::ObjectMappingError => write!(f, "Object mapping error"),
            ErrorKind::InvalidDataType => write!(f, "Invalid data type"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::NotRegistered => write!(f, "Not registered"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// The error type returned by every fallible dskit operation.
///
/// Carries a message, an [`ErrorKind`], an optional cause and the backtrace
/// captured where the error was created. `Debug` prints the cause chain, or
/// the backtrace for a root error.
#[derive(Clone)]
pub struct DsError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DsError>>,
    backtrace: Arc<RwLock<Backtrace>>,
}

impl DsError {
    /// Creates a new error with the given message and kind.
    ///
    /// # Arguments
    ///
    /// * `message` - Human readable description of the failure
    /// * `error_kind` - The category of the failure
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DsError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(RwLock::new(Backtrace::new())),
        }
    }

    /// Creates a new error that wraps an underlying cause.
    ///
    /// # Arguments
    ///
    /// * `message` - Human readable description of the failure
    /// * `error_kind` - The category of the failure
    /// * `cause` - The error that triggered this one
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DsError) -> Self {
        DsError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(RwLock::new(Backtrace::new())),
        }
    }

    /// Combines two failures into one error, neither message being dropped.
    ///
    /// The result keeps the kind of `primary`, carries a message naming both
    /// failures and holds `secondary` as its cause. Used when a rollback fails
    /// after the transactional function already failed.
    pub fn join(primary: DsError, secondary: DsError) -> Self {
        let message = format!("{}; {}", primary.message, secondary.message);
        DsError {
            message,
            error_kind: primary.error_kind,
            cause: Some(Box::new(secondary)),
            backtrace: primary.backtrace,
        }
    }

    /// Builds the error reported when stored properties do not fit the
    /// destination type. The destination is still populated with every
    /// property that did fit.
    pub fn field_mismatch(type_name: &str, fields: &[String]) -> Self {
        DsError::new(
            &format!(
                "cannot load field(s) {} into a {}: no such struct field or type mismatch",
                itertools::join(fields.iter().map(|f| format!("{:?}", f)), ", "),
                type_name
            ),
            ErrorKind::FieldMismatch,
        )
    }

    /// Prefixes the message with some context, keeping kind and cause.
    pub fn context(mut self, prefix: &str) -> Self {
        self.message = format!("{}: {}", prefix, self.message);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DsError> {
        self.cause.as_deref()
    }

    /// Returns true for the store's distinguished "no such entity" condition.
    pub fn is_not_found(&self) -> bool {
        self.error_kind == ErrorKind::NoSuchEntity
    }

    pub fn is_field_mismatch(&self) -> bool {
        self.error_kind == ErrorKind::FieldMismatch
    }
}

impl Display for DsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for DsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Result type used across dskit.
pub type DsResult<T> = Result<T, DsError>;

impl de::Error for DsError {
    fn custom<T: Display>(msg: T) -> Self {
        DsError::new(&msg.to_string(), ErrorKind::ObjectMappingError)
    }
}

impl ser::Error for DsError {
    fn custom<T: Display>(msg: T) -> Self {
        DsError::new(&msg.to_string(), ErrorKind::ObjectMappingError)
    }
}

impl From<std::io::Error> for DsError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::TimedOut => ErrorKind::DeadlineExceeded,
            _ => ErrorKind::IOError,
        };
        DsError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<base64::DecodeError> for DsError {
    fn from(err: base64::DecodeError) -> Self {
        DsError::new(
            &format!("Base64 decoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<std::string::FromUtf8Error> for DsError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DsError::new(
            &format!("UTF-8 encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<std::num::TryFromIntError> for DsError {
    fn from(err: std::num::TryFromIntError) -> Self {
        DsError::new(
            &format!("Integer conversion error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<ureq::Error> for DsError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => DsError::new(
                &format!(
                    "metadata server returned status {} for {}",
                    code,
                    response.get_url()
                ),
                ErrorKind::ConfigurationError,
            ),
            ureq::Error::Transport(transport) => DsError::new(
                &format!("metadata server unreachable: {}", transport),
                ErrorKind::ConfigurationError,
            ),
        }
    }
}

impl From<String> for DsError {
    fn from(msg: String) -> Self {
        DsError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DsError {
    fn from(msg: &str) -> Self {
        DsError::new(msg, ErrorKind::InternalError)
    }
}

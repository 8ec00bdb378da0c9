//! Error types for device management and the underlying netlink exchange.

use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing network devices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// No device is configured under this name.
    #[error("netdev not found: {name}")]
    NotFound {
        /// The interface name that was looked up.
        name: String,
    },

    /// A device with this name is already registered, or the kernel
    /// reported an interface index conflicting with the one on record.
    #[error("netdev already exists: {name}")]
    AlreadyExists {
        /// The interface name in conflict.
        name: String,
    },

    /// A definition is missing required fields or carries values a kind
    /// rejects.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A notification or reply did not have the expected shape.
    #[error("unexpected message: {0}")]
    ProtocolMismatch(String),

    /// The request could not be handed to the transport.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, etc.).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, 2 | 19), // ENOENT=2, ENODEV=19
            Self::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is an "already exists" error (EEXIST or a name/index
    /// conflict).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => *errno == 17, // EEXIST=17
            Self::AlreadyExists { .. } => true,
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

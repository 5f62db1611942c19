//! Logging trait for chat service operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log all API interactions passing through the [`MemChat`] client.
//!
//! [`MemChat`]: crate::MemChat

use crate::Error;

/// A trait for logging chat service operations.
///
/// Implement this trait to capture and record every call the client makes,
/// successful or not.
///
/// # Example
///
/// ```rust,ignore
/// use memchat::{ClientLogger, Error};
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_response(&self, endpoint: &str, body: &serde_json::Value) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{endpoint}: {body}").unwrap();
///     }
///
///     fn log_error(&self, endpoint: &str, error: &Error) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{endpoint} failed: {error}").unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log the decoded body of a successful (2xx) response.
    ///
    /// `endpoint` is the request path, e.g. `/api/chat`.
    fn log_response(&self, endpoint: &str, body: &serde_json::Value);

    /// Log a failed call, whether the transport failed or the service
    /// answered with a non-2xx status.
    fn log_error(&self, endpoint: &str, error: &Error) {
        _ = endpoint;
        _ = error;
    }
}

//! Route metadata.
//!
//! A route is the (method, path) pair a plugin handler answers on.

use crate::core::{Error, Result};
use axum::http::Method;
use serde::{Serialize, Serializer};

/// A method + path binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    /// HTTP method
    pub method: Method,
    /// Normalised request path
    pub path: String,
}

impl Route {
    /// Create a route, normalising the path.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path),
        }
    }

    /// GET route.
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST route.
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT route.
    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    /// DELETE route.
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Check that the path can be served by the router.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(Error::InvalidRoute(format!(
                "{}: path must start with '/'",
                self
            )));
        }
        if self
            .path
            .chars()
            .any(|c| c.is_whitespace() || c == '?' || c == '#')
        {
            return Err(Error::InvalidRoute(format!(
                "{}: path contains a forbidden character",
                self
            )));
        }
        Ok(())
    }

    /// Whether this route lives under a path prefix (segment-aware).
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = normalize_path(prefix);
        if prefix == "/" {
            return true;
        }
        self.path == prefix
            || self
                .path
                .strip_prefix(prefix.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl Serialize for Route {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Trim surrounding whitespace and trailing slashes; the root stays `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

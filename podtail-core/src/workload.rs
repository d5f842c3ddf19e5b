//! Workload identifiers and log requests

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// Longest identifier accepted (Kubernetes DNS subdomain limit)
pub const MAX_WORKLOAD_LEN: usize = 253;

/// Longest container name accepted (Kubernetes DNS label limit)
pub const MAX_CONTAINER_LEN: usize = 63;

/// RFC 1123 DNS subdomain: dot-separated labels
static SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("Subdomain regex is a compile-time constant and should always be valid")
});

/// RFC 1123 DNS label
static LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .expect("Label regex is a compile-time constant and should always be valid")
});

/// Validated name of the workload whose logs are streamed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadId(String);

impl WorkloadId {
    /// Parse and validate a workload identifier.
    ///
    /// Surrounding whitespace is trimmed. The result must be a lowercase
    /// RFC 1123 subdomain of at most [`MAX_WORKLOAD_LEN`] bytes, the rule
    /// Kubernetes applies to pod names. Path separators, option-like leading
    /// dashes and shell metacharacters never get through.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidWorkload(
                "workload identifier is required".to_string(),
            ));
        }
        if trimmed.len() > MAX_WORKLOAD_LEN {
            return Err(Error::InvalidWorkload(format!(
                "workload identifier exceeds {MAX_WORKLOAD_LEN} bytes"
            )));
        }
        if !SUBDOMAIN_REGEX.is_match(trimmed) {
            return Err(Error::InvalidWorkload(format!(
                "workload identifier must be lowercase alphanumerics, '-' or '.', \
                 starting and ending with an alphanumeric: {trimmed:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a log source is asked to produce for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub workload: WorkloadId,
    /// Container within the workload; `None` lets the source pick its default
    pub container: Option<String>,
    /// Keep tailing instead of returning a snapshot
    pub follow: bool,
}

impl LogRequest {
    /// Request that follows the workload's log
    #[must_use]
    pub fn follow(workload: WorkloadId, container: Option<String>) -> Self {
        Self {
            workload,
            container: container.filter(|c| !c.trim().is_empty()),
            follow: true,
        }
    }
}

/// Validate an optional container name.
///
/// Blank values mean "no container". Anything else must be an RFC 1123
/// label of at most [`MAX_CONTAINER_LEN`] bytes.
pub fn parse_container(raw: Option<&str>) -> Result<Option<String>> {
    let Some(name) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if name.len() > MAX_CONTAINER_LEN || !LABEL_REGEX.is_match(name) {
        return Err(Error::InvalidWorkload(format!(
            "container must be a lowercase RFC 1123 label of at most \
             {MAX_CONTAINER_LEN} bytes: {name:?}"
        )));
    }
    Ok(Some(name.to_string()))
}

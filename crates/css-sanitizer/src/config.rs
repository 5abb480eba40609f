use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SanitizerError, SanitizerResult};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_-][A-Za-z0-9_-]*$").unwrap();
    static ref HOSTNAME: Regex =
        Regex::new(r"(?i)^(\*\.)?[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$").unwrap();
}

/// Configuration for a stylesheet sanitization pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Id of the element every selector is scoped beneath (no leading `#`)
    pub container_id: String,
    /// Prefix prepended to every class and id token in selectors
    pub class_prefix: String,
    /// Whether absolute `http(s)://` targets are allowed in `url()`
    pub allow_remote: bool,
    /// Hosts remote `url()` targets may point at; empty means any host
    pub trusted_hosts: Vec<String>,
    /// Maximum nesting of group at-rules such as `@media`
    pub max_nesting_depth: usize,
    /// Maximum accepted stylesheet size in bytes
    pub max_css_size: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            container_id: String::new(),
            class_prefix: String::new(),
            allow_remote: false,
            trusted_hosts: Vec::new(),
            max_nesting_depth: 2,
            max_css_size: 512 * 1024, // 512KB
        }
    }
}

impl SanitizerConfig {
    /// Create a configuration scoping selectors under `container_id`
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            ..Default::default()
        }
    }

    /// Set the class/id prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefix = prefix.into();
        self
    }

    /// Allow or forbid remote `url()` targets
    pub fn with_remote(mut self, allow_remote: bool) -> Self {
        self.allow_remote = allow_remote;
        self
    }

    /// Restrict remote `url()` targets to the given hosts
    pub fn with_trusted_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Load a configuration from a JSON document
    pub fn from_json(json: &str) -> SanitizerResult<Self> {
        let config: SanitizerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every caller-supplied name is safe to splice into CSS
    pub fn validate(&self) -> SanitizerResult<()> {
        if !is_identifier(&self.container_id) {
            return Err(SanitizerError::InvalidContainerId(self.container_id.clone()));
        }
        if !is_identifier(&self.class_prefix) {
            return Err(SanitizerError::InvalidClassPrefix(self.class_prefix.clone()));
        }
        if let Some(host) = self.trusted_hosts.iter().find(|h| !HOSTNAME.is_match(h)) {
            return Err(SanitizerError::InvalidTrustedHost(host.clone()));
        }
        Ok(())
    }

    /// Check whether a remote host passes the trusted host list
    pub fn is_host_trusted(&self, host: &str) -> bool {
        if self.trusted_hosts.is_empty() {
            return true;
        }

        let host = host.to_ascii_lowercase();
        self.trusted_hosts.iter().any(|entry| {
            let entry = entry.to_ascii_lowercase();
            match entry.strip_prefix("*.") {
                Some(domain) => {
                    host == domain
                        || host
                            .strip_suffix(domain)
                            .map_or(false, |rest| rest.ends_with('.'))
                }
                None => host == entry,
            }
        })
    }
}

/// Empty strings count as identifiers: they mean "feature disabled".
fn is_identifier(name: &str) -> bool {
    name.is_empty() || IDENTIFIER.is_match(name)
}

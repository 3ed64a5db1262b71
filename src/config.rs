use crate::error::FlagError;
use crate::value::FlagSet;

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://happykit.dev/api/flags";

/// Validated engine configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    project_key: String,
    endpoint: String,
    default_flags: FlagSet,
    cache_disabled: bool,
}

impl Configuration {
    /// Rejects blank project keys and endpoints.
    pub fn new(
        project_key: &str,
        endpoint: &str,
        default_flags: FlagSet,
        cache_disabled: bool,
    ) -> Result<Self, FlagError> {
        if project_key.trim().is_empty() {
            return Err(FlagError::MissingProjectKey);
        }
        if endpoint.trim().is_empty() {
            return Err(FlagError::MissingEndpoint);
        }
        Ok(Self {
            project_key: project_key.to_string(),
            endpoint: endpoint.to_string(),
            default_flags,
            cache_disabled,
        })
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn default_flags(&self) -> &FlagSet {
        &self.default_flags
    }

    pub fn cache_disabled(&self) -> bool {
        self.cache_disabled
    }

    /// `POST` target: `{endpoint}/{project_key}`.
    pub fn request_url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.project_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_project_key() {
        let err = Configuration::new("  ", DEFAULT_ENDPOINT, FlagSet::new(), false).unwrap_err();
        assert_eq!(err, FlagError::MissingProjectKey);
    }

    #[test]
    fn test_rejects_blank_endpoint() {
        let err = Configuration::new("flags_pub_x", "", FlagSet::new(), false).unwrap_err();
        assert_eq!(err, FlagError::MissingEndpoint);
    }

    #[test]
    fn test_request_url_joins_endpoint_and_key() {
        let config = Configuration::new("flags_pub_x", "https://e/", FlagSet::new(), false).unwrap();
        assert_eq!(config.request_url(), "https://e/flags_pub_x");
        let config = Configuration::new("flags_pub_x", "https://e", FlagSet::new(), false).unwrap();
        assert_eq!(config.request_url(), "https://e/flags_pub_x");
    }
}

//! Relying party parameters
//!
//! Loaded once at process start and treated as immutable afterwards.

use url::Url;

use super::crypto;
use super::errors::ConfigurationError;

/// Relying party identity and the origins its clients may use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    id: String,
    name: String,
    origins: Vec<String>,
    rp_id_hash: [u8; 32],
}

impl RelyingParty {
    /// Validate relying party settings and pre-compute the RP ID hash
    ///
    /// # Errors
    /// Returns an error if:
    /// - The relying party ID is empty
    /// - No origin is configured
    /// - An origin is not a URL, doesn't use HTTPS (except for localhost), or
    ///   isn't the RP ID or one of its subdomains
    pub fn new<S: AsRef<str>>(id: &str, name: &str, origins: &[S]) -> Result<Self, ConfigurationError> {
        let id = id.trim().to_ascii_lowercase();
        if id.is_empty() {
            return Err(ConfigurationError(
                "Relying party ID cannot be empty".to_string(),
            ));
        }
        if origins.is_empty() {
            return Err(ConfigurationError(
                "At least one relying party origin is required".to_string(),
            ));
        }

        let origins = origins
            .iter()
            .map(|origin| normalize_origin(origin.as_ref(), &id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rp_id_hash: crypto::sha256(id.as_bytes()),
            name: if name.is_empty() { id.clone() } else { name.to_string() },
            id,
            origins,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// SHA-256 of the RP ID, as authenticators embed it in authenticator data
    #[must_use]
    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    /// Exact match against the configured, normalised origins
    #[must_use]
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|allowed| allowed == origin)
    }
}

fn normalize_origin(origin: &str, rp_id: &str) -> Result<String, ConfigurationError> {
    let url = Url::parse(origin.trim())
        .map_err(|e| ConfigurationError(format!("Invalid origin '{origin}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ConfigurationError(format!("Origin '{origin}' has no host")))?;

    let secure = url.scheme() == "https" || (url.scheme() == "http" && host == "localhost");
    if !secure {
        return Err(ConfigurationError(format!(
            "Origin '{origin}' must be https:// except for localhost"
        )));
    }

    if host != rp_id && !host.ends_with(&format!(".{rp_id}")) {
        return Err(ConfigurationError(format!(
            "Origin '{origin}' is not within relying party ID '{rp_id}'"
        )));
    }

    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origins_are_normalised() {
        let rp = RelyingParty::new("example.com", "Example", &["https://example.com:443/login"]).unwrap();
        assert_eq!(rp.origins(), &["https://example.com".to_string()]);
        assert!(rp.is_allowed_origin("https://example.com"));
        assert!(!rp.is_allowed_origin("https://evil.example"));
    }

    #[test]
    fn test_rp_id_hash_is_sha256_of_id() {
        let rp = RelyingParty::new("localhost", "", &["http://localhost:8080"]).unwrap();
        assert_eq!(rp.rp_id_hash(), &crypto::sha256(b"localhost"));
        assert_eq!(rp.name(), "localhost");
    }

    #[test]
    fn test_subdomain_origin_allowed() {
        assert!(RelyingParty::new("example.com", "Example", &["https://login.example.com"]).is_ok());
    }

    #[test]
    fn test_invalid_configurations_rejected() {
        let none: [&str; 0] = [];
        assert!(RelyingParty::new("", "Example", &["https://example.com"]).is_err());
        assert!(RelyingParty::new("example.com", "Example", &none).is_err());
        assert!(RelyingParty::new("example.com", "Example", &["http://example.com"]).is_err());
        assert!(RelyingParty::new("example.com", "Example", &["https://example.org"]).is_err());
        assert!(RelyingParty::new("example.com", "Example", &["not a url"]).is_err());
    }
}

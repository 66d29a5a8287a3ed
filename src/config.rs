use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Contents of the TOML config file, loaded once at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub credentials: SiteCredentials,
}

#[derive(Clone, Deserialize)]
pub struct SiteCredentials {
    pub base_url: String,
    pub collection_url: String,
    pub collection_href: String,
    pub account: String,
    pub password: String,
}

// Keeps the password out of logs and error chains.
impl fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("base_url", &self.base_url)
            .field("collection_url", &self.collection_url)
            .field("collection_href", &self.collection_href)
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(raw)?;
        config.credentials.normalize()?;
        Ok(config)
    }
}

impl SiteCredentials {
    fn normalize(&mut self) -> Result<()> {
        for (key, value) in [
            ("base_url", &self.base_url),
            ("collection_url", &self.collection_url),
            ("account", &self.account),
        ] {
            if value.trim().is_empty() {
                bail!("credentials.{key} must not be empty");
            }
        }

        self.base_url = self.base_url.trim_end_matches('/').to_string();
        if !self.collection_href.starts_with('/') {
            self.collection_href.insert(0, '/');
        }
        if !self.collection_href.ends_with('/') {
            self.collection_href.push('/');
        }
        Ok(())
    }

    pub fn login_url(&self) -> String {
        format!("{}/user/login", self.base_url)
    }

    pub fn item_url(&self, uuid: &str) -> String {
        format!("{}{}{}", self.base_url, self.collection_href, uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [credentials]
        base_url = "https://library.example.org/"
        collection_url = "https://library.example.org/collections/oral-histories"
        collection_href = "collections/items"
        account = "uploader"
        password = "hunter2"
    "#;

    #[test]
    fn parse_normalizes_urls_for_direct_item_links() {
        let config = AppConfig::parse(SAMPLE).expect("sample config should parse");
        let creds = &config.credentials;
        assert_eq!(creds.base_url, "https://library.example.org");
        assert_eq!(creds.login_url(), "https://library.example.org/user/login");
        assert_eq!(
            creds.item_url("8f2c"),
            "https://library.example.org/collections/items/8f2c"
        );
    }

    #[test]
    fn parse_rejects_missing_keys_and_empty_account() {
        assert!(AppConfig::parse("[credentials]\nbase_url = \"x\"\n").is_err());

        let empty_account = SAMPLE.replace("\"uploader\"", "\"  \"");
        let err = AppConfig::parse(&empty_account).expect_err("empty account rejected");
        assert!(err.to_string().contains("credentials.account"), "{err}");
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = AppConfig::parse(SAMPLE).expect("sample config should parse");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}

use std::{future::Future, time::Duration};

use reqwest::Url;

use crate::{config::GateConfig, FETCH_TIMEOUT_SECS};

/// Fetches the body of a single GET request as text. No retry, no caching;
/// retry policy belongs to the gate loop.
pub(crate) trait ResolverClient: Send + Sync {
    fn fetch_text(&self, url: &Url) -> impl Future<Output = Result<String, String>> + Send;
}

pub(crate) struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    pub(crate) fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|error| format!("Failed to build HTTP client: {error}"))?;
        Ok(Self { client })
    }
}

impl ResolverClient for HttpResolver {
    async fn fetch_text(&self, url: &Url) -> Result<String, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| format!("Resolver request failed: {error}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Resolver request failed (HTTP {})", status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|error| format!("Failed to read resolver response: {error}"))
    }
}

pub(crate) fn build_control_url(config: &GateConfig) -> Result<Url, String> {
    let mut url = Url::parse(&config.host_endpoint)
        .map_err(|error| format!("Invalid host endpoint: {error}"))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("p", &config.auth_secret)
            .append_pair("os", &os_description())
            .append_pair("lng", &locale_code())
            .append_pair("devicemodel", &device_model());
        if let Some(country) = region_code() {
            query.append_pair("country", &country);
        }
    }

    Ok(url)
}

pub(crate) fn os_description() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Hardware identifier: the DMI product name where the platform exposes one,
/// otherwise the target architecture.
pub(crate) fn device_model() -> String {
    if let Ok(product) = std::fs::read_to_string("/sys/devices/virtual/dmi/id/product_name") {
        let product = product.trim();
        if !product.is_empty() {
            return product.to_string();
        }
    }
    std::env::consts::ARCH.to_string()
}

/// Two-letter lowercase language code from the environment locale, `en` when
/// none is set.
pub(crate) fn locale_code() -> String {
    preferred_locale_tag()
        .as_deref()
        .and_then(normalize_language)
        .unwrap_or_else(|| "en".to_string())
}

pub(crate) fn region_code() -> Option<String> {
    preferred_locale_tag().as_deref().and_then(normalize_region)
}

fn preferred_locale_tag() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|value| !value.is_empty() && value != "C" && value != "POSIX")
}

fn normalize_language(tag: &str) -> Option<String> {
    let language = tag.split(['_', '-', '.']).next()?;
    if language.len() < 2 || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(language[..2].to_ascii_lowercase())
}

fn normalize_region(tag: &str) -> Option<String> {
    let without_encoding = tag.split('.').next()?;
    let region = without_encoding.split(['_', '-']).nth(1)?;
    if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(region.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn test_config() -> GateConfig {
        GateConfig {
            validation_token: "TOKEN123".to_string(),
            host_endpoint: "https://resolver.test/gate".to_string(),
            auth_secret: "shared-secret".to_string(),
            cached_url_key: "storedTrustedURL".to_string(),
            cached_token_key: "storedVerificationToken".to_string(),
        }
    }

    #[test]
    fn control_url_carries_required_query_parameters() {
        let url = build_control_url(&test_config()).unwrap();
        let pairs: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(pairs.get("p").map(String::as_str), Some("shared-secret"));
        assert_eq!(pairs.get("os").map(String::as_str), Some(os_description().as_str()));
        assert_eq!(pairs.get("lng").map(String::as_str), Some(locale_code().as_str()));
        assert_eq!(
            pairs.get("devicemodel").map(String::as_str),
            Some(device_model().as_str())
        );
        // country is optional; present only when the environment locale names
        // a region.
        assert_eq!(pairs.contains_key("country"), region_code().is_some());
    }

    #[test]
    fn control_url_rejects_malformed_endpoint() {
        let config = GateConfig {
            host_endpoint: "not a url".to_string(),
            ..test_config()
        };
        assert!(build_control_url(&config).is_err());
    }

    #[test]
    fn language_normalizes_to_two_lowercase_letters() {
        assert_eq!(normalize_language("en_US.UTF-8").as_deref(), Some("en"));
        assert_eq!(normalize_language("pt-BR").as_deref(), Some("pt"));
        assert_eq!(normalize_language("DE_DE").as_deref(), Some("de"));
        assert_eq!(normalize_language("zh_Hans_CN").as_deref(), Some("zh"));
        assert_eq!(normalize_language("1234"), None);
    }

    #[test]
    fn region_comes_from_the_second_segment() {
        assert_eq!(normalize_region("en_US.UTF-8").as_deref(), Some("US"));
        assert_eq!(normalize_region("pt-br").as_deref(), Some("BR"));
        assert_eq!(normalize_region("en"), None);
        assert_eq!(normalize_region("zh_Hans_CN"), None);
    }
}

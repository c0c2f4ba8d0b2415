//! Matching rules for exchanges

use flowsift_core::config::FilterSettings;
use flowsift_core::{Exchange, Response};

/// Which exchanges and socket sessions are projected
#[derive(Debug, Clone)]
pub struct FilterRules {
    /// Host whose WebSocket sessions are projected
    pub gateway_host: String,

    /// Host whose HTTP exchanges are projected
    pub api_host: String,

    /// Paths to drop (prefix match)
    pub excluded_path_prefixes: Vec<String>,

    /// Required response content type (exact match)
    pub content_type: String,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self::from(&FilterSettings::default())
    }
}

impl From<&FilterSettings> for FilterRules {
    fn from(settings: &FilterSettings) -> Self {
        Self {
            gateway_host: settings.gateway_host.clone(),
            api_host: settings.api_host.clone(),
            excluded_path_prefixes: settings.excluded_path_prefixes.clone(),
            content_type: settings.content_type.clone(),
        }
    }
}

impl FilterRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the exchange's socket messages should be projected
    pub fn is_gateway(&self, exchange: &Exchange) -> bool {
        exchange.host == self.gateway_host
    }

    /// Whether the exchange is a candidate for HTTP projection
    pub fn is_api(&self, exchange: &Exchange) -> bool {
        exchange.host == self.api_host
    }

    pub fn is_excluded_path(&self, path: &str) -> bool {
        self.excluded_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn accepts_content_type(&self, response: &Response) -> bool {
        response.content_type().as_deref() == Some(self.content_type.as_str())
    }
}

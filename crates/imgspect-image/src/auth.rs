//! Registry authentication challenges and token responses

use serde::Deserialize;
use std::collections::HashMap;

/// A parsed `WWW-Authenticate` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    /// Token authentication: fetch a bearer token from `realm`
    Bearer {
        realm: String,
        service: Option<String>,
    },
    /// HTTP basic authentication
    Basic,
}

impl Challenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for unsupported schemes and Bearer challenges without a realm.
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header
            .split_once(char::is_whitespace)
            .unwrap_or((header, ""));

        match scheme.to_ascii_lowercase().as_str() {
            "bearer" => {
                let mut params = parse_params(params);
                let realm = params.remove("realm")?;
                Some(Self::Bearer {
                    realm,
                    service: params.remove("service"),
                })
            }
            "basic" => Some(Self::Basic),
            _ => None,
        }
    }
}

/// Split `key="value", key2=value2` pairs; keys are lowercased
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq]
            .trim()
            .trim_start_matches(',')
            .trim()
            .to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            // Quoted values may contain commas (e.g. multi-action scopes)
            let end = quoted.find('"').unwrap_or(quoted.len());
            let value = &quoted[..end];
            rest = quoted.get(end + 1..).unwrap_or("");
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim();
            rest = &rest[end..];
            value
        };

        params.insert(key, value.to_string());
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }

    params
}

/// Body of a token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    /// The bearer token; `token` wins over the OAuth2-style `access_token`
    pub(crate) fn into_token(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.access_token.filter(|t| !t.is_empty()))
    }
}

/// Token scope for pulling from a repository path
pub(crate) fn pull_scope(path: &str) -> String {
    format!("repository:{}:pull", path)
}

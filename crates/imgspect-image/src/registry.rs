//! Registry transport: distribution API client
//!
//! Requests go out anonymously first. A `401` is answered by parsing the
//! `WWW-Authenticate` challenge, obtaining credentials for it and retrying the
//! request once; the resulting authorization is cached for the rest of the run.

use crate::auth::{pull_scope, Challenge, TokenResponse};
use crate::context::{ConnectionContext, Credentials};
use crate::digest::Digest;
use crate::error::{InspectError, Result};
use crate::manifest::{FetchedImage, RawManifest, ACCEPTED_MANIFEST_TYPES};
use crate::reference::{ImageReference, DEFAULT_REGISTRY};
use crate::staging::BlobStaging;
use crate::transport::{ImageSource, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace, warn};
use url::Url;

/// Host serving the API for `docker.io` repositories
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Page size requested when listing tags
const TAGS_PAGE_SIZE: &str = "1000";

/// Longest response body excerpt included in error messages
const MAX_ERROR_BODY: usize = 256;

/// How a request is authorized after a challenge was answered
#[derive(Clone)]
enum Authorization {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Authorization {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token),
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }
}

/// Client for OCI-compatible container registries
pub struct RegistryClient {
    client: reqwest::Client,
    ctx: Arc<ConnectionContext>,
    /// Authorization obtained from the last answered challenge
    authorization: RwLock<Option<Authorization>>,
}

impl RegistryClient {
    /// Create a client honouring the context's TLS settings
    pub fn new(ctx: Arc<ConnectionContext>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(ctx.user_agent());
        debug!("TLS verification setting: {:?}", ctx.tls_verify_setting());

        if !ctx.tls_verify() {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(dir) = ctx.cert_dir() {
            for cert in load_certificates(dir)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| InspectError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            ctx,
            authorization: RwLock::new(None),
        })
    }

    /// Scheme and API host for the reference's registry
    fn base_url(&self, reference: &ImageReference) -> String {
        let domain = reference.domain();
        let scheme = if self.ctx.uses_plain_http(domain) {
            "http"
        } else {
            "https"
        };
        format!("{}://{}", scheme, api_host(domain))
    }

    fn cached_authorization(&self) -> Option<Authorization> {
        self.authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cache_authorization(&self, authorization: Authorization) {
        *self
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(authorization);
    }

    async fn send_once(
        &self,
        url: &str,
        accept: Option<&str>,
        authorization: Option<&Authorization>,
    ) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(authorization) = authorization {
            request = authorization.apply(request);
        }

        request
            .send()
            .await
            .map_err(|e| InspectError::http(format!("Failed to connect to registry at {}", url), e))
    }

    /// GET `url`, answering one authentication challenge if needed
    async fn get(
        &self,
        reference: &ImageReference,
        url: &str,
        accept: Option<&str>,
    ) -> Result<Response> {
        let cached = self.cached_authorization();
        let response = self.send_once(url, accept, cached.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(reference, url, response).await;
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .and_then(Challenge::parse);
        debug!("Registry requested authentication: {:?}", challenge);

        let authorization = self.answer_challenge(reference, challenge).await?;
        let retry = self.send_once(url, accept, Some(&authorization)).await?;

        match retry.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(InspectError::authentication(
                reference.domain(),
                format!("credentials were rejected ({}) for {}", retry.status(), url),
            )),
            _ => {
                self.cache_authorization(authorization);
                check_status(reference, url, retry).await
            }
        }
    }

    async fn answer_challenge(
        &self,
        reference: &ImageReference,
        challenge: Option<Challenge>,
    ) -> Result<Authorization> {
        let registry = reference.domain();

        match challenge {
            Some(Challenge::Bearer { realm, service }) => {
                let token = match self.ctx.credentials() {
                    Some(Credentials::Token(token)) => token.clone(),
                    credentials => {
                        self.request_token(reference, &realm, service.as_deref(), credentials)
                            .await?
                    }
                };
                Ok(Authorization::Bearer(token))
            }
            Some(Challenge::Basic) => match self.ctx.credentials() {
                Some(Credentials::Basic { username, password }) => Ok(Authorization::Basic {
                    username: username.clone(),
                    password: password.clone(),
                }),
                Some(Credentials::Token(_)) => Err(InspectError::authentication(
                    registry,
                    "registry requires basic credentials, not a token",
                )),
                None => Err(InspectError::authentication(
                    registry,
                    "registry requires credentials and none were supplied",
                )),
            },
            None => Err(InspectError::authentication(
                registry,
                "registry returned 401 without a supported WWW-Authenticate challenge",
            )),
        }
    }

    /// Exchange (optional) basic credentials for a pull token at `realm`
    async fn request_token(
        &self,
        reference: &ImageReference,
        realm: &str,
        service: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<String> {
        let registry = reference.domain();

        let mut params = vec![("scope", pull_scope(&reference.path()))];
        if let Some(service) = service {
            params.insert(0, ("service", service.to_string()));
        }
        let token_url = Url::parse_with_params(realm, &params).map_err(|e| {
            InspectError::authentication(registry, format!("invalid token realm '{}': {}", realm, e))
        })?;

        debug!("Requesting token from: {}", token_url);

        let mut request = self.client.get(token_url.clone());
        if let Some(Credentials::Basic { username, password }) = credentials {
            debug!("Using authenticated token request");
            request = request.basic_auth(username, Some(password));
        } else {
            debug!("Using anonymous token request");
        }

        let response = request.send().await.map_err(|e| {
            InspectError::http(format!("Failed to request token from {}", token_url), e)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InspectError::authentication(
                registry,
                format!(
                    "token request to {} failed ({}){}",
                    token_url,
                    status,
                    body_excerpt(&body)
                ),
            ));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            InspectError::authentication(registry, format!("invalid token response: {}", e))
        })?;

        token_response
            .into_token()
            .ok_or_else(|| InspectError::authentication(registry, "token response contained no token"))
    }

    /// Fetch a manifest by tag or digest
    async fn get_manifest(
        &self,
        reference: &ImageReference,
        manifest_reference: &str,
    ) -> Result<RawManifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(reference),
            reference.path(),
            manifest_reference
        );

        debug!("Fetching manifest from: {}", url);

        let accept = ACCEPTED_MANIFEST_TYPES.join(", ");
        let response = self.get(reference, &url, Some(&accept)).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let reported_digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.parse::<Digest>().ok());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InspectError::http(format!("Failed to read manifest from {}", url), e))?;
        trace!("Manifest body: {}", String::from_utf8_lossy(&bytes));

        let manifest = RawManifest::new(bytes.to_vec(), content_type);
        if let Some(reported) = reported_digest {
            reported.verify(&format!("manifest at {}", url), manifest.bytes())?;
        }

        Ok(manifest)
    }

    /// Fetch a blob and check it against `digest`
    async fn get_blob(&self, reference: &ImageReference, digest: &Digest) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.base_url(reference),
            reference.path(),
            digest
        );

        debug!("Fetching blob from: {}", url);

        let response = self.get(reference, &url, None).await?;

        match self.ctx.tmp_dir() {
            Some(tmp_dir) => {
                let staging = BlobStaging::new_in(tmp_dir)?;
                let read_error = format!("Failed to read blob from {}", url);
                let chunks = response
                    .bytes_stream()
                    .map(move |chunk| chunk.map_err(|e| InspectError::http(read_error.clone(), e)));
                staging.stage("config blob", digest, chunks).await
            }
            None => {
                let bytes = response.bytes().await.map_err(|e| {
                    InspectError::http(format!("Failed to read blob from {}", url), e)
                })?;
                digest.verify("config blob", &bytes)?;
                Ok(bytes.to_vec())
            }
        }
    }
}

#[async_trait]
impl ImageSource for RegistryClient {
    fn transport(&self) -> Transport {
        Transport::Registry
    }

    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<RawManifest> {
        self.get_manifest(reference, &reference.manifest_reference())
            .await
    }

    async fn fetch(&self, reference: &ImageReference) -> Result<FetchedImage> {
        let top_level = self.fetch_manifest(reference).await?;
        // Nothing is decoded from the manifest until a pinned digest matches
        if let Some(pinned) = reference.digest() {
            pinned.verify(&format!("manifest for {}", reference), top_level.bytes())?;
        }

        let instance = if top_level.kind()?.is_list() {
            let entries = top_level.list_entries()?;
            let wanted = self.ctx.platform();
            let entry = wanted.select(&entries)?;
            debug!("Selected {} for platform {}", entry.digest, wanted);

            let child = self
                .get_manifest(reference, &entry.digest.to_string())
                .await?;
            entry
                .digest
                .verify(&format!("{} manifest", wanted), child.bytes())?;
            child
        } else {
            top_level.clone()
        };

        let manifest = instance.image_manifest()?;
        let config = self.get_blob(reference, &manifest.config.digest).await?;

        Ok(FetchedImage {
            top_level,
            instance,
            config,
        })
    }

    /// List all tags for a repository (handles pagination)
    async fn list_tags(&self, reference: &ImageReference) -> Result<Vec<String>> {
        let base_url = self.base_url(reference);
        let first_page = Url::parse_with_params(
            &format!("{}/v2/{}/tags/list", base_url, reference.path()),
            &[("n", TAGS_PAGE_SIZE)],
        )
        .map_err(|e| InspectError::transport(format!("Invalid tags URL: {}", e)))?;

        let mut all_tags = Vec::new();
        let mut url = first_page.to_string();

        loop {
            debug!("Listing tags from: {}", url);

            let response = self.get(reference, &url, None).await?;

            // Check for Link header for pagination
            let next_url = response
                .headers()
                .get("link")
                .and_then(|h| h.to_str().ok())
                .and_then(|link| parse_link_header(link, &base_url));

            let tags_response: TagsResponse = response.json().await.map_err(|e| {
                InspectError::decode("tags list", format!("{} ({})", e, url))
            })?;

            all_tags.extend(tags_response.tags.unwrap_or_default());

            match next_url {
                Some(next) => url = next,
                None => break,
            }
        }

        trace!("Found {} tags total", all_tags.len());
        Ok(all_tags)
    }

    fn canonical_name(&self, reference: &ImageReference) -> Option<String> {
        Some(reference.canonical_name())
    }

    fn can_list_tags(&self) -> bool {
        true
    }
}

/// Host serving the registry API for a repository domain
fn api_host(domain: &str) -> &str {
    if domain == DEFAULT_REGISTRY {
        DOCKER_HUB_API_HOST
    } else {
        domain
    }
}

/// Map non-success statuses to errors
async fn check_status(reference: &ImageReference, url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(InspectError::authentication(
            reference.domain(),
            format!("access denied ({}) for {}{}", status, url, body_excerpt(&body)),
        ));
    }

    Err(InspectError::transport(format!(
        "Registry returned {} for {}{}",
        status,
        url,
        body_excerpt(&body)
    )))
}

fn body_excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    format!(": {}", excerpt)
}

/// Read every `*.crt` PEM file in `dir` as an extra root certificate
fn load_certificates(dir: &Path) -> Result<Vec<reqwest::Certificate>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        InspectError::Config(format!(
            "cannot read certificate directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "crt"))
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| {
            debug!("Adding root certificate {}", path.display());
            let pem = fs::read(path).map_err(|e| {
                InspectError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            reqwest::Certificate::from_pem(&pem).map_err(|e| {
                InspectError::Config(format!("invalid certificate {}: {}", path.display(), e))
            })
        })
        .collect()
}

/// Parse Link header for pagination
/// Format: <https://ghcr.io/v2/repo/tags/list?n=100&last=tag>; rel="next"
fn parse_link_header(link: &str, base_url: &str) -> Option<String> {
    for part in link.split(',') {
        let part = part.trim();
        if part.contains("rel=\"next\"") || part.contains("rel=next") {
            let start = part.find('<')? + 1;
            let end = start + part[start..].find('>')?;
            let url = &part[start..end];
            // URL might be relative, make it absolute
            if url.starts_with('/') {
                return Some(format!("{}{}", base_url, url));
            }
            return Some(url.to_string());
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

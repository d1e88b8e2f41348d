use crate::{
    errors::RegistryError,
    image::ImageReference,
    manifest::{media_types, BearerToken, Manifest},
    registry::auth,
};
use reqwest::{
    header,
    header::{HeaderMap, HeaderValue},
    Url,
};
use std::{convert::TryInto, time::Duration};

/// Token server used when nothing else has been configured
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";
/// Registry server used when nothing else has been configured
pub const DEFAULT_REGISTRY_URL: &str = "https://registry-1.docker.io";
/// Service name the default token server expects
pub const DEFAULT_SERVICE: &str = "registry.docker.io";
/// Namespace for repositories named with a single path component
pub const DEFAULT_LIBRARY_PREFIX: &str = "library";

/// Builder for configuring custom [Client] instances
#[derive(Debug)]
pub struct ClientBuilder {
    req: reqwest::ClientBuilder,
    auth_url: String,
    registry_url: String,
    service: String,
    library_prefix: Option<String>,
}

impl ClientBuilder {
    /// Start constructing a custom registry client
    pub fn new() -> Self {
        let req = reqwest::Client::builder().user_agent(Client::default_user_agent());
        ClientBuilder {
            req,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            library_prefix: Some(DEFAULT_LIBRARY_PREFIX.to_string()),
        }
    }

    /// Change the token server
    ///
    /// Tokens are requested from this URL with `service` and `scope` query
    /// parameters and no credentials.
    pub fn auth_url<S: Into<String>>(mut self, url: S) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Change the registry server, given as a base URL like
    /// `https://registry-1.docker.io`
    pub fn registry<S: Into<String>>(mut self, url: S) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Change the `service` parameter sent to the token server
    pub fn service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = service.into();
        self
    }

    /// Change the prefix added to repositories with only a single path
    /// component, or disable it with `None`
    pub fn library_prefix(mut self, prefix: Option<&str>) -> Self {
        self.library_prefix = prefix.map(str::to_owned);
        self
    }

    /// Set a timeout for each network request
    ///
    /// This timeout applies from the beginning of a (GET) request until the
    /// last byte has been received. By default there is no timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.timeout(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each network request
    ///
    /// By default there is no timeout beyond those built into the networking
    /// stack.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.connect_timeout(timeout);
        self
    }

    /// Sets the `User-Agent` header used by this client
    ///
    /// By default, the value returned by [Client::default_user_agent()] is
    /// used, which identifies the version of `minibox` acting as a client.
    pub fn user_agent<V>(mut self, value: V) -> Self
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        self.req = self.req.user_agent(value);
        self
    }

    /// Set the default headers for every HTTP request
    pub fn default_request_headers(mut self, headers: HeaderMap) -> Self {
        self.req = self.req.default_headers(headers);
        self
    }

    /// Construct a Client using the parameters from this Builder
    pub fn build(self) -> Result<Client, RegistryError> {
        let auth_url = parse_url(&self.auth_url)?;
        let registry_url = parse_url(self.registry_url.trim_end_matches('/'))?;
        log::debug!(
            "registry client for {}, tokens from {}",
            registry_url,
            auth_url
        );
        Ok(Client {
            req: self.req.build().map_err(RegistryError::ClientSetup)?,
            auth_url,
            registry_url,
            service: self.service,
            library_prefix: self.library_prefix,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

fn parse_url(s: &str) -> Result<Url, RegistryError> {
    match s.parse::<Url>() {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(url),
        _ => Err(RegistryError::InvalidUrl(s.to_owned())),
    }
}

/// Registry clients fetch tokens and manifests from an image registry
///
/// Each call makes exactly one request. Nothing is cached, and tokens are
/// never refreshed; ask for a new one for each manifest.
#[derive(Clone, Debug)]
pub struct Client {
    req: reqwest::Client,
    auth_url: Url,
    registry_url: Url,
    service: String,
    library_prefix: Option<String>,
}

impl Client {
    /// Construct a new registry client with default options
    pub fn new() -> Result<Client, RegistryError> {
        Client::builder().build()
    }

    /// Construct a registry client with custom options, via ClientBuilder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    /// Path of a repository on the registry server
    ///
    /// Single-component names like `busybox` live under the library prefix,
    /// so they become `library/busybox`. Names that already have a `/` are
    /// used unchanged.
    pub fn repository_path(&self, repository: &str) -> String {
        match &self.library_prefix {
            Some(prefix) if !repository.contains('/') => format!("{}/{}", prefix, repository),
            _ => repository.to_owned(),
        }
    }

    /// Get a bearer token allowing pulls from the image's repository
    pub async fn acquire_token(&self, image: &str) -> Result<BearerToken, RegistryError> {
        let image = ImageReference::parse(image)?;
        let scope = auth::pull_scope(&self.repository_path(image.repository()));
        auth::request_token(&self.req, &self.auth_url, &self.service, &scope).await
    }

    /// Fetch the manifest for an image, which must include a tag
    ///
    /// A reference without a tag fails before any request is made.
    pub async fn fetch_manifest(
        &self,
        token: &BearerToken,
        image: &str,
    ) -> Result<Manifest, RegistryError> {
        let image = ImageReference::parse(image)?;
        let tag = image.require_tag()?;
        let manifest_url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url.as_str().trim_end_matches('/'),
            self.repository_path(image.repository()),
            tag
        );
        log::info!("{} <{}> downloading manifest...", image, manifest_url);

        let request = self.req.get(&manifest_url).header(
            header::ACCEPT,
            format!(
                "{}, {}",
                media_types::MANIFEST_V1_SIGNED,
                media_types::MANIFEST_V1
            ),
        );
        let body = auth::include_token(token, request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(RegistryError::ManifestUnavailable)?
            .bytes()
            .await
            .map_err(RegistryError::ManifestUnavailable)?;

        log::trace!("raw json manifest, {}", String::from_utf8_lossy(&body));
        let manifest: Manifest = serde_json::from_slice(&body)?;
        log::debug!(
            "manifest for {}: {} layers",
            image,
            manifest.fs_layers.len()
        );
        Ok(manifest)
    }

    /// Acquire a token and use it to fetch the image's manifest
    pub async fn pull_manifest(&self, image: &str) -> Result<Manifest, RegistryError> {
        // Checked here too so a bad reference never reaches the token server
        ImageReference::parse(image)?.require_tag()?;
        let token = self.acquire_token(image).await?;
        self.fetch_manifest(&token, image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_prefix() {
        let client = Client::new().unwrap();
        assert_eq!(client.repository_path("busybox"), "library/busybox");
        assert_eq!(client.repository_path("someone/tool"), "someone/tool");

        let client = Client::builder().library_prefix(None).build().unwrap();
        assert_eq!(client.repository_path("busybox"), "busybox");
    }

    #[test]
    fn bad_urls() {
        assert!(matches!(
            Client::builder().auth_url("not a url").build(),
            Err(RegistryError::InvalidUrl(_))
        ));
        assert!(matches!(
            Client::builder().registry("ftp://example.com").build(),
            Err(RegistryError::InvalidUrl(_))
        ));
    }

    #[test]
    fn user_agent_names_the_crate() {
        let agent = Client::default_user_agent();
        assert!(agent.to_str().unwrap().starts_with("minibox/"));
    }

    #[tokio::test]
    async fn untagged_reference_fails_first() {
        // Port 9 (discard) would fail to connect; we never get that far
        let client = Client::builder()
            .auth_url("http://127.0.0.1:9/token")
            .registry("http://127.0.0.1:9")
            .build()
            .unwrap();
        let err = client
            .fetch_manifest(&BearerToken::default(), "busybox")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidReference(_)));
        let err = client.pull_manifest("busybox").await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidReference(_)));
    }
}

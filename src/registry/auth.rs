use crate::{errors::RegistryError, manifest::BearerToken};
use reqwest::{RequestBuilder, Url};

/// Scope string asking for pull access to one repository
///
/// Reference: <https://docs.docker.com/registry/spec/auth/scope/>
pub(crate) fn pull_scope(repository_path: &str) -> String {
    format!("repository:{}:pull", repository_path)
}

/// Ask a token server for a bearer token, without presenting any credentials
///
/// A response without a token is not an error; the registry will decide
/// whether it needs one.
pub(crate) async fn request_token(
    req: &reqwest::Client,
    realm: &Url,
    service: &str,
    scope: &str,
) -> Result<BearerToken, RegistryError> {
    log::debug!("requesting token from {} for {:?}", realm, scope);
    let token: BearerToken = req
        .get(realm.clone())
        .query(&[("service", service), ("scope", scope)])
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(RegistryError::AuthUnavailable)?
        .json()
        .await
        .map_err(RegistryError::AuthUnavailable)?;
    if token.is_empty() {
        log::debug!("token server issued no token for {:?}", scope);
    } else {
        log::debug!(
            "received token for {:?}, expires_in={:?}",
            scope,
            token.expires_in
        );
    }
    Ok(token)
}

/// Attach the token to a request, if there is one
pub(crate) fn include_token(token: &BearerToken, req: RequestBuilder) -> RequestBuilder {
    if token.is_empty() {
        req
    } else {
        req.bearer_auth(token.value())
    }
}

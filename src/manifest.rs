//! Wire shapes for the registry's token and manifest responses

use serde::{Deserialize, Serialize};

/// Partial implementation of the image manifest v2 schema1 spec.
///
/// Reference: https://docs.docker.com/registry/spec/manifest-v2-1/
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Manifest {
    #[serde(rename = "schemaVersion", default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    pub name: String,
    pub tag: String,
    #[serde(rename = "fsLayers")]
    pub fs_layers: Vec<FsLayer>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: String,
}

impl Manifest {
    /// Content digests of each layer, in the order the manifest lists them
    pub fn layer_digests(&self) -> Vec<&str> {
        self.fs_layers.iter().map(|l| l.blob_sum.as_str()).collect()
    }
}

pub mod media_types {
    pub const MANIFEST_V1_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
}

/// Response from a registry token server
///
/// Reference: <https://docs.docker.com/registry/spec/auth/token/>
///
/// Every field is optional. Registries that don't need authentication may
/// hand back no token at all, which is fine.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct BearerToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub issued_at: Option<String>,
}

impl BearerToken {
    /// The credential to present, preferring `token` over `access_token`
    ///
    /// Empty if the server gave us neither.
    pub fn value(&self) -> &str {
        self.token
            .as_deref()
            .or_else(|| self.access_token.as_deref())
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.value().is_empty()
    }
}

//! Helm actions run against the same cluster as the instance's Kubernetes
//! clients. Helm stores one secret per release revision, labelled
//! `owner=helm` and typed `helm.sh/release.v1`; its `release` key holds a
//! base64 encoded gzipped JSON document.
use crate::{Error, Result, tools::base64_gz_decode};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Client,
    api::{Api, ListParams},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RELEASE_SECRET_TYPE: &str = "helm.sh/release.v1";
pub const RELEASE_LABEL_SELECTOR: &str = "owner=helm";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    pub name: String,
    pub namespace: String,
    pub revision: i64,
    pub status: String,
    pub chart: String,
    pub app_version: Option<String>,
    pub updated: Option<String>,
}

#[derive(Deserialize)]
struct RawRelease {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    info: Option<RawInfo>,
    #[serde(default)]
    chart: Option<RawChart>,
}
#[derive(Deserialize)]
struct RawInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    last_deployed: Option<String>,
}
#[derive(Deserialize)]
struct RawChart {
    metadata: Option<RawChartMeta>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChartMeta {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    app_version: Option<String>,
}

/// Decode the `release` payload of a Helm release secret
pub fn decode_release(payload: &[u8]) -> Result<HelmRelease> {
    let json = base64_gz_decode(payload)?;
    let raw: RawRelease = serde_json::from_slice(&json)?;
    let info = raw.info.unwrap_or(RawInfo {
        status: "unknown".to_string(),
        last_deployed: None,
    });
    let (chart, app_version) = match raw.chart.and_then(|c| c.metadata) {
        Some(meta) => (format!("{}-{}", meta.name, meta.version), meta.app_version),
        None => (String::new(), None),
    };
    Ok(HelmRelease {
        name: raw.name,
        namespace: raw.namespace,
        revision: raw.version,
        status: info.status,
        chart,
        app_version,
        updated: info.last_deployed,
    })
}

/// Keep the highest revision of each release, ordered by namespace then name
pub fn latest_revisions(releases: Vec<HelmRelease>) -> Vec<HelmRelease> {
    let mut latest: BTreeMap<(String, String), HelmRelease> = BTreeMap::new();
    for rel in releases {
        let key = (rel.namespace.clone(), rel.name.clone());
        match latest.get(&key) {
            Some(current) if current.revision >= rel.revision => {}
            _ => {
                latest.insert(key, rel);
            }
        }
    }
    latest.into_values().collect()
}

#[derive(Clone)]
pub struct HelmClient {
    client: Client,
}

impl HelmClient {
    #[must_use]
    pub fn new(client: Client) -> HelmClient {
        HelmClient { client }
    }

    pub async fn list_releases(&self, ns: Option<&str>) -> Result<Vec<HelmRelease>> {
        let api: Api<Secret> = match ns {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let secrets = api
            .list(&ListParams::default().labels(RELEASE_LABEL_SELECTOR))
            .await
            .map_err(Error::KubeError)?;
        let mut releases = Vec::new();
        for secret in secrets.items {
            if secret.type_.as_deref() != Some(RELEASE_SECRET_TYPE) {
                continue;
            }
            let Some(payload) = secret.data.as_ref().and_then(|d| d.get("release")) else {
                continue;
            };
            match decode_release(&payload.0) {
                Ok(rel) => releases.push(rel),
                Err(e) => tracing::warn!(
                    "skipping undecodable helm secret {:?}: {e}",
                    secret.metadata.name
                ),
            }
        }
        Ok(latest_revisions(releases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::encode_base64_gz;
    use serde_json::json;

    fn payload(name: &str, version: i64, status: &str) -> String {
        let doc = json!({
            "name": name,
            "namespace": "web",
            "version": version,
            "info": { "status": status, "last_deployed": "2024-05-01T10:00:00Z" },
            "chart": { "metadata": { "name": "redis", "version": "18.1.0", "appVersion": "7.2" } },
        });
        encode_base64_gz(doc.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_decode_release() {
        let rel = decode_release(payload("cache", 3, "deployed").as_bytes()).unwrap();
        assert_eq!(rel.name, "cache");
        assert_eq!(rel.revision, 3);
        assert_eq!(rel.status, "deployed");
        assert_eq!(rel.chart, "redis-18.1.0");
        assert_eq!(rel.app_version.as_deref(), Some("7.2"));
    }

    #[test]
    fn test_decode_garbage_release() {
        assert!(decode_release(b"aGVsbG8=").is_err());
    }

    #[test]
    fn test_latest_revisions() {
        let rels = vec![
            decode_release(payload("cache", 1, "superseded").as_bytes()).unwrap(),
            decode_release(payload("cache", 2, "deployed").as_bytes()).unwrap(),
            decode_release(payload("api", 1, "failed").as_bytes()).unwrap(),
        ];
        let latest = latest_revisions(rels);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].name, "api");
        assert_eq!(latest[1].revision, 2);
        assert_eq!(latest[1].status, "deployed");
    }
}

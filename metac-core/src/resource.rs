//! Resource identifiers: the `(apiVersion, kind)` / `(apiVersion, resource)` pairs that
//! every other component in this crate keys off of.
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single discovered API resource, as returned by the discovery cache (§4.A).
///
/// `resource` is always the plural, URL-path form (e.g. `pods`, `deployments`); `kind` is
/// the type name (e.g. `Pod`, `Deployment`). A resource of the form `parent/sub` (e.g.
/// `pods/status`) denotes a subresource, in which case `parent`'s [`ApiResource::subresources`]
/// gains `sub`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiResource {
    pub group: String,
    pub version: String,
    /// `group/version`, or just `version` when `group` is empty (the core group).
    pub api_version: String,
    pub kind: String,
    pub resource: String,
    pub namespaced: bool,
    pub subresources: Vec<String>,
}

impl ApiResource {
    pub fn new(group: &str, version: &str, kind: &str, resource: &str, namespaced: bool) -> Self {
        let api_version = if group.is_empty() {
            version.to_string()
        } else {
            format!("{group}/{version}")
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            api_version,
            kind: kind.to_string(),
            resource: resource.to_string(),
            namespaced,
            subresources: Vec::new(),
        }
    }

    pub fn has_subresource(&self, name: &str) -> bool {
        self.subresources.iter().any(|s| s == name)
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn gvr(&self) -> GroupVersionResource {
        GroupVersionResource {
            group: self.group.clone(),
            version: self.version.clone(),
            resource: self.resource.clone(),
        }
    }
}

/// Parses a bare `version` or `group/version` string into its parts.
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// `(apiVersion, kind)` — the key most of the engine (hooks, registries, configuration)
/// addresses resources by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn from_api_version_kind(api_version: &str, kind: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// `(apiVersion, resource)` — what the dynamic client and informer factory key off of,
/// since the wire API addresses collections by plural resource name, not kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bare_version() {
        assert_eq!(split_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn splits_group_version() {
        assert_eq!(
            split_api_version("apps/v1"),
            ("apps".to_string(), "v1".to_string())
        );
    }

    #[test]
    fn gvk_api_version_roundtrips_core_group() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        assert_eq!(gvk.api_version(), "v1");
        assert_eq!(gvk.to_string(), "v1/Pod");
    }

    #[test]
    fn gvk_api_version_roundtrips_named_group() {
        let gvk = GroupVersionKind::from_api_version_kind("apps/v1", "Deployment");
        assert_eq!(gvk.api_version(), "apps/v1");
    }

    #[test]
    fn subresource_detection() {
        let mut ar = ApiResource::new("", "v1", "Pod", "pods", true);
        ar.subresources.push("status".to_string());
        assert!(ar.has_subresource("status"));
        assert!(!ar.has_subresource("scale"));
    }
}

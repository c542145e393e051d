//! Controller Configuration
//!
//! Settings resolved once at startup: where the image server is reachable
//! and where exported data is written.

use crate::domain::ports::ObjectKey;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Configuration for the ClusterConfig controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name of the Service fronting the image server
    pub service_name: String,
    /// Namespace of that Service
    pub service_namespace: String,
    /// Optional port of that Service
    pub service_port: Option<String>,
    /// URL scheme (http or https)
    pub service_scheme: String,
    /// Root of the exported data
    pub data_dir: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            service_namespace: String::new(),
            service_port: None,
            service_scheme: String::new(),
            data_dir: PathBuf::from("/data"),
        }
    }
}

impl ControllerConfig {
    /// Reject configurations missing a mandatory setting
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("SERVICE_NAME", &self.service_name),
            ("SERVICE_NAMESPACE", &self.service_namespace),
            ("SERVICE_SCHEME", &self.service_scheme),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "{} must be set",
                missing.join(", ")
            )))
        }
    }

    /// Base address of the image server, e.g. `http://svc.ns:8000`
    pub fn service_url(&self) -> String {
        let mut host = format!("{}.{}", self.service_name, self.service_namespace);
        if let Some(port) = self.service_port.as_deref().filter(|p| !p.is_empty()) {
            host = format!("{}:{}", host, port);
        }
        format!("{}://{}", self.service_scheme, host)
    }

    /// Directory root of exported data
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// URL the image server exposes for a ClusterConfig's image
pub fn image_url(base_url: &str, key: &ObjectKey) -> String {
    format!(
        "{}/images/{}/{}.iso",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&key.namespace),
        urlencoding::encode(&key.name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: Option<&str>) -> ControllerConfig {
        ControllerConfig {
            service_name: "svc".into(),
            service_namespace: "svc-ns".into(),
            service_port: port.map(String::from),
            service_scheme: "http".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_image_url_without_port() {
        let base = config(None).service_url();
        assert_eq!(base, "http://svc.svc-ns");
        assert_eq!(
            image_url(&base, &ObjectKey::new("ns", "foo")),
            "http://svc.svc-ns/images/ns/foo.iso"
        );
    }

    #[test]
    fn test_image_url_with_port() {
        let base = config(Some("8000")).service_url();
        assert_eq!(
            image_url(&base, &ObjectKey::new("ns", "foo")),
            "http://svc.svc-ns:8000/images/ns/foo.iso"
        );
    }

    #[test]
    fn test_empty_port_is_ignored() {
        assert_eq!(config(Some("")).service_url(), "http://svc.svc-ns");
    }

    #[test]
    fn test_validate_names_missing_settings() {
        assert!(config(None).validate().is_ok());

        let cfg = ControllerConfig {
            service_name: "svc".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        match err {
            Error::Configuration(msg) => {
                assert!(msg.contains("SERVICE_NAMESPACE"));
                assert!(msg.contains("SERVICE_SCHEME"));
                assert!(!msg.contains("SERVICE_NAME,"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Reverse Event Mapper
//!
//! BareMetalHost events carry no owner reference back to the
//! ClusterConfig that points at them, so the owning configs are found by
//! scanning a snapshot for matching `bareMetalHostRef`s.

use crate::crd::{BareMetalHost, ClusterConfig};
use crate::domain::ports::{ClusterStoreRef, ObjectKey};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// ClusterConfigs that reference `host`.
///
/// `None` stands for a host that could not be resolved (deleted or stale),
/// which never maps to any request. Every match is returned; more than one
/// is logged since the reference is expected to be unique.
pub fn configs_for_host<I>(host: Option<&BareMetalHost>, configs: I) -> Vec<ObjectKey>
where
    I: IntoIterator,
    I::Item: Borrow<ClusterConfig>,
{
    let Some(host) = host else {
        return Vec::new();
    };
    let host_key = ObjectKey::of(host);

    let matches: Vec<ObjectKey> = configs
        .into_iter()
        .filter(|config| references(config.borrow(), &host_key))
        .map(|config| ObjectKey::of(config.borrow()))
        .collect();

    if matches.len() > 1 {
        warn!(
            host = %host_key,
            count = matches.len(),
            "found multiple ClusterConfigs referencing BareMetalHost"
        );
    }
    matches
}

/// Whether a watched host event describes an object that is gone
pub fn is_tombstone(host: &BareMetalHost) -> bool {
    host.metadata.deletion_timestamp.is_some()
        && host.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty())
}

fn references(config: &ClusterConfig, host: &ObjectKey) -> bool {
    config
        .spec
        .bare_metal_host_ref
        .as_ref()
        .is_some_and(|r| r.namespace == host.namespace && r.name == host.name)
}

/// Hosts referenced by more than one ClusterConfig, with their referrers
pub fn shared_host_references(configs: &[ClusterConfig]) -> BTreeMap<ObjectKey, Vec<ObjectKey>> {
    let mut by_host: BTreeMap<ObjectKey, Vec<ObjectKey>> = BTreeMap::new();
    for config in configs {
        if let Some(host_ref) = &config.spec.bare_metal_host_ref {
            by_host
                .entry(ObjectKey::from(host_ref))
                .or_default()
                .push(ObjectKey::of(config));
        }
    }
    by_host.retain(|_, referrers| referrers.len() > 1);
    by_host
}

/// Warn about every BareMetalHost shared between ClusterConfigs.
///
/// Runs once at startup; a listing failure is logged and ignored.
pub async fn audit_host_references(store: &ClusterStoreRef) {
    let configs = match store.list_configs().await {
        Ok(configs) => configs,
        Err(e) => {
            warn!(error = %e, "Failed to list ClusterConfigs for host reference audit");
            return;
        }
    };

    let shared = shared_host_references(&configs);
    for (host, referrers) in &shared {
        let referrers: Vec<String> = referrers.iter().map(ToString::to_string).collect();
        warn!(
            host = %host,
            configs = %referrers.join(", "),
            "BareMetalHost is referenced by multiple ClusterConfigs"
        );
    }
    info!(
        configs = configs.len(),
        shared_hosts = shared.len(),
        "Host reference audit complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BareMetalHostReference, BareMetalHostSpec, ClusterConfigSpec};
    use crate::store::MemoryStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::chrono::Utc;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.0.lock()).into_owned();
        (value, logs)
    }

    fn host(ns: &str, name: &str) -> BareMetalHost {
        let mut host = BareMetalHost::new(name, BareMetalHostSpec::default());
        host.metadata.namespace = Some(ns.into());
        host
    }

    fn config(ns: &str, name: &str, host: Option<(&str, &str)>) -> ClusterConfig {
        let mut spec = ClusterConfigSpec::with_domain("example.com");
        spec.bare_metal_host_ref = host.map(|(ns, name)| BareMetalHostReference {
            name: name.into(),
            namespace: ns.into(),
        });
        let mut config = ClusterConfig::new(name, spec);
        config.metadata.namespace = Some(ns.into());
        config
    }

    #[test]
    fn test_single_match() {
        let configs = vec![
            config("ns", "a", Some(("hosts", "h1"))),
            config("ns", "b", Some(("hosts", "h2"))),
            config("ns", "c", None),
        ];

        let keys = configs_for_host(Some(&host("hosts", "h1")), &configs);
        assert_eq!(keys, vec![ObjectKey::new("ns", "a")]);
    }

    #[test]
    fn test_every_match_is_returned() {
        let configs = vec![
            config("ns1", "a", Some(("hosts", "h1"))),
            config("ns2", "b", Some(("hosts", "h1"))),
        ];

        let keys = configs_for_host(Some(&host("hosts", "h1")), &configs);
        assert_eq!(keys, vec![ObjectKey::new("ns1", "a"), ObjectKey::new("ns2", "b")]);
    }

    #[test]
    fn test_namespace_must_match() {
        let configs = vec![config("ns", "a", Some(("other", "h1")))];
        assert!(configs_for_host(Some(&host("hosts", "h1")), &configs).is_empty());
    }

    #[test]
    fn test_unresolved_host_maps_to_nothing() {
        let configs = vec![config("ns", "a", Some(("hosts", "h1")))];
        assert!(configs_for_host(None, &configs).is_empty());
    }

    #[test]
    fn test_tombstone_detection() {
        let mut h = host("hosts", "h1");
        assert!(!is_tombstone(&h));

        h.metadata.deletion_timestamp = Some(Time(Utc::now()));
        h.metadata.finalizers = Some(vec!["metal3.io/baremetalhost".into()]);
        assert!(!is_tombstone(&h));

        h.metadata.finalizers = None;
        assert!(is_tombstone(&h));
    }

    #[test]
    fn test_shared_host_references() {
        let configs = vec![
            config("ns", "a", Some(("hosts", "h1"))),
            config("ns", "b", Some(("hosts", "h1"))),
            config("ns", "c", Some(("hosts", "h2"))),
        ];

        let shared = shared_host_references(&configs);
        assert_eq!(shared.len(), 1);
        assert_eq!(
            shared[&ObjectKey::new("hosts", "h1")],
            vec![ObjectKey::new("ns", "a"), ObjectKey::new("ns", "b")]
        );
    }

    #[test]
    fn test_multiple_matches_are_logged() {
        let shared = vec![
            config("ns1", "a", Some(("hosts", "h1"))),
            config("ns2", "b", Some(("hosts", "h1"))),
        ];
        let (keys, logs) = capture_logs(|| configs_for_host(Some(&host("hosts", "h1")), &shared));
        assert_eq!(keys.len(), 2);
        assert!(logs.contains("found multiple ClusterConfigs referencing BareMetalHost"));
        assert!(logs.contains("hosts/h1"));

        let unique = vec![config("ns1", "a", Some(("hosts", "h1")))];
        let (keys, logs) = capture_logs(|| configs_for_host(Some(&host("hosts", "h1")), &unique));
        assert_eq!(keys.len(), 1);
        assert!(!logs.contains("found multiple ClusterConfigs"));
    }

    #[test]
    fn test_audit_warns_once_per_shared_host() {
        let memory = Arc::new(MemoryStore::new());
        memory.insert_config(config("ns", "a", Some(("hosts", "h1"))));
        memory.insert_config(config("ns", "b", Some(("hosts", "h1"))));
        memory.insert_config(config("ns", "c", Some(("hosts", "h2"))));
        memory.insert_config(config("ns", "d", Some(("hosts", "h2"))));
        memory.insert_config(config("ns", "e", Some(("hosts", "h3"))));
        let store: ClusterStoreRef = memory;

        let ((), logs) = capture_logs(|| tokio_test::block_on(audit_host_references(&store)));
        let warning = "BareMetalHost is referenced by multiple ClusterConfigs";
        assert_eq!(logs.matches(warning).count(), 2);
        assert!(logs.contains("hosts/h1"));
        assert!(logs.contains("hosts/h2"));
        assert!(!logs.contains("hosts/h3"));
        assert!(logs.contains("Host reference audit complete"));
    }

    #[test]
    fn test_audit_quiet_without_sharing() {
        let memory = Arc::new(MemoryStore::new());
        memory.insert_config(config("ns", "a", Some(("hosts", "h1"))));
        memory.insert_config(config("ns", "b", None));
        let store: ClusterStoreRef = memory;

        let ((), logs) = capture_logs(|| tokio_test::block_on(audit_host_references(&store)));
        assert!(!logs.contains("referenced by multiple"));
        assert!(logs.contains("shared_hosts=0"));
    }
}

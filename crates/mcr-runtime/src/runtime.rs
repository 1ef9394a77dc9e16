//! Runtime entry point: privilege check and wiring of a launch.

use std::sync::Arc;

use mcr_common::config::RuntimeConfig;
use mcr_common::error::Result;
use mcr_common::types::ContainerSpec;
use mcr_core::namespace::{Namespace, NamespaceSet};
use mcr_core::privilege;

use crate::backend::{self, IsolationBackend};
use crate::events::{LifecycleObserver, TracingObserver};
use crate::supervisor::{RunReport, Supervisor};

/// The runtime that launches containers.
///
/// Holds the configuration snapshot plus the isolation backend and the
/// lifecycle observer handed to every supervisor it prepares.
pub struct Runtime {
    config: RuntimeConfig,
    backend: Arc<dyn IsolationBackend>,
    observer: Arc<dyn LifecycleObserver>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Creates a runtime for the calling process.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Privilege`](mcr_common::error::McrError::Privilege)
    /// unless the effective uid is 0.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_effective_uid(config, privilege::effective_uid())
    }

    /// Creates a runtime, checking `euid` instead of the real effective uid.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Privilege`](mcr_common::error::McrError::Privilege)
    /// unless `euid` is 0.
    pub fn with_effective_uid(config: RuntimeConfig, euid: u32) -> Result<Self> {
        privilege::require_root(euid)?;
        tracing::debug!(euid, cgroup_root = %config.cgroup_root.display(), "runtime initialized");
        Ok(Self {
            config,
            backend: Arc::from(backend::default_backend()),
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replaces the isolation backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn IsolationBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Replaces the lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The configuration snapshot.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Builds the supervisor for `spec` without launching anything.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::InvalidSpec`](mcr_common::error::McrError::InvalidSpec)
    /// if `spec` fails validation.
    pub fn prepare(&self, spec: ContainerSpec) -> Result<Supervisor> {
        spec.validate()?;
        let mut namespaces = NamespaceSet::container_default();
        if spec.network {
            namespaces = namespaces.with(Namespace::Network);
        }
        tracing::debug!(
            command = ?spec.command,
            rootfs = %spec.rootfs.display(),
            %namespaces,
            "prepared container launch"
        );
        Ok(Supervisor::new(
            spec,
            namespaces,
            self.config.cgroup_root.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.observer),
        )
        .with_deadline(self.config.default_timeout)
        .with_heartbeat(self.config.heartbeat_interval))
    }

    /// Prepares and runs `spec`, returning the supervisor's result as is.
    ///
    /// # Errors
    ///
    /// Any error from [`prepare`](Self::prepare) or [`Supervisor::run`].
    pub fn run_container(&self, spec: ContainerSpec) -> Result<RunReport> {
        self.prepare(spec)?.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use mcr_common::error::McrError;

    fn spec() -> ContainerSpec {
        ContainerSpec::new(vec!["/bin/echo".into(), "hello".into()], "/tmp/rootfs")
            .hostname("test-container")
    }

    #[test]
    fn unprivileged_uid_is_rejected() {
        let err = Runtime::with_effective_uid(RuntimeConfig::default(), 1000).unwrap_err();
        assert!(matches!(err, McrError::Privilege { euid: 1000 }));
    }

    #[test]
    fn root_uid_is_accepted() {
        assert!(Runtime::with_effective_uid(RuntimeConfig::default(), 0).is_ok());
    }

    #[test]
    fn prepare_keeps_spec_fields() {
        let runtime = Runtime::with_effective_uid(RuntimeConfig::default(), 0).unwrap();
        let supervisor = runtime.prepare(spec()).unwrap();
        assert_eq!(supervisor.spec().command, ["/bin/echo", "hello"]);
        assert_eq!(supervisor.spec().rootfs.as_os_str(), "/tmp/rootfs");
        assert_eq!(supervisor.spec().hostname, "test-container");
        assert_eq!(supervisor.namespaces(), NamespaceSet::container_default());
    }

    #[test]
    fn network_flag_adds_network_namespace() {
        let runtime = Runtime::with_effective_uid(RuntimeConfig::default(), 0).unwrap();
        let supervisor = runtime.prepare(spec().network(true)).unwrap();
        assert!(supervisor.namespaces().contains(Namespace::Network));
    }

    #[test]
    fn prepare_uses_configured_deadline() {
        let config = RuntimeConfig {
            default_timeout: Some(Duration::from_secs(3)),
            ..RuntimeConfig::default()
        };
        let runtime = Runtime::with_effective_uid(config, 0).unwrap();
        let supervisor = runtime.prepare(spec()).unwrap();
        assert_eq!(supervisor.deadline(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn prepare_rejects_empty_command() {
        let runtime = Runtime::with_effective_uid(RuntimeConfig::default(), 0).unwrap();
        let err = runtime
            .prepare(ContainerSpec::new(Vec::new(), "/tmp/rootfs"))
            .unwrap_err();
        assert!(matches!(err, McrError::InvalidSpec { .. }));
    }
}

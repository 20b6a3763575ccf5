//! Environment provisioning state machine
//!
//! Drives one run through the states
//!
//! ```text
//! Start -> NameResolved -> CacheChecked -> {Reused | Built} -> ShellRegistered -> Done
//! ```
//!
//! Ordering contract: the environment cache save happens after a
//! successful build and before shell registration or the success report,
//! so a crash in later steps never loses a completed build from the
//! cache's perspective. The cache outcome is computed exactly once per
//! run and never re-queried.

use crate::cache::{CacheGateway, CacheOutcome};
use crate::error::{SetupError, SetupResult};
use crate::fingerprint::{environment_key, NameResolver};
use crate::mamba::environment_path;
use crate::shell::ShellFlavor;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::path::Path;
use tracing::{debug, info, warn};

/// Materializes an environment under the root prefix on a cache miss
#[async_trait]
pub trait EnvironmentBuilder: Send + Sync {
    async fn build(&self, name: &str) -> SetupResult<()>;
}

/// Registers an environment for auto-activation in a shell flavor.
///
/// Must be idempotent per (environment, flavor) pair.
#[async_trait]
pub trait ActivationRegistrar: Send + Sync {
    async fn register(&self, environment_name: &str, flavor: ShellFlavor) -> SetupResult<()>;
}

/// Terminal report exposed to the caller for status reporting
#[derive(Debug)]
pub struct ProvisionReport {
    pub name: String,
    pub outcome: CacheOutcome,
    /// Non-fatal per-shell registration failures, accumulated
    pub shell_failures: Vec<SetupError>,
}

/// Resolved name, key and cache outcome ahead of the build decision.
///
/// Produced by [`EnvironmentOrchestrator::probe`] so the environment
/// lookup can run concurrently with the downloads keyspace lookup, then
/// be fed back through [`EnvironmentOrchestrator::run_from`].
#[derive(Debug)]
pub struct CacheProbe {
    name: String,
    key: String,
    outcome: CacheOutcome,
}

/// One provisioning run over trait collaborators
pub struct EnvironmentOrchestrator<'a> {
    resolver: &'a NameResolver,
    /// `None` disables environment caching: every run is a miss and
    /// nothing is saved
    cache: Option<&'a dyn CacheGateway>,
    builder: &'a dyn EnvironmentBuilder,
    registrar: &'a dyn ActivationRegistrar,
    shells: &'a [ShellFlavor],
    root_prefix: &'a Path,
}

/// Machine states, named for the transitions they enable
#[derive(Debug)]
enum Phase {
    Start,
    NameResolved {
        name: String,
    },
    CacheChecked {
        name: String,
        key: String,
        outcome: CacheOutcome,
    },
    Reused {
        name: String,
        outcome: CacheOutcome,
    },
    Built {
        name: String,
        outcome: CacheOutcome,
    },
    ShellRegistered {
        name: String,
        outcome: CacheOutcome,
        failures: Vec<SetupError>,
    },
}

impl<'a> EnvironmentOrchestrator<'a> {
    pub fn new(
        resolver: &'a NameResolver,
        cache: Option<&'a dyn CacheGateway>,
        builder: &'a dyn EnvironmentBuilder,
        registrar: &'a dyn ActivationRegistrar,
        shells: &'a [ShellFlavor],
        root_prefix: &'a Path,
    ) -> Self {
        Self {
            resolver,
            cache,
            builder,
            registrar,
            shells,
            root_prefix,
        }
    }

    /// Run the machine to completion
    pub async fn run(&self) -> SetupResult<ProvisionReport> {
        self.drive(Phase::Start).await
    }

    /// Resolve the name and query the environment cache, without acting
    /// on the outcome yet. The store is queried exactly once; feeding the
    /// result into [`run_from`](Self::run_from) never re-queries.
    pub async fn probe(&self) -> SetupResult<CacheProbe> {
        let name = self.resolve_name()?;
        self.check_cache(name).await
    }

    /// Continue a run from an already-completed cache probe
    pub async fn run_from(&self, probe: CacheProbe) -> SetupResult<ProvisionReport> {
        self.drive(Phase::CacheChecked {
            name: probe.name,
            key: probe.key,
            outcome: probe.outcome,
        })
        .await
    }

    async fn drive(&self, mut phase: Phase) -> SetupResult<ProvisionReport> {
        loop {
            phase = match phase {
                Phase::Start => {
                    let name = self.resolve_name()?;
                    Phase::NameResolved { name }
                }
                Phase::NameResolved { name } => {
                    let probe = self.check_cache(name).await?;
                    Phase::CacheChecked {
                        name: probe.name,
                        key: probe.key,
                        outcome: probe.outcome,
                    }
                }
                Phase::CacheChecked { name, key, outcome } => {
                    self.materialize(name, key, outcome).await?
                }
                Phase::Reused { name, outcome } | Phase::Built { name, outcome } => {
                    self.register_shells(name, outcome).await
                }
                Phase::ShellRegistered {
                    name,
                    outcome,
                    failures,
                } => {
                    info!("Environment `{}` ready ({})", name, outcome);
                    return Ok(ProvisionReport {
                        name,
                        outcome,
                        shell_failures: failures,
                    });
                }
            };
        }
    }

    /// Start -> NameResolved. Failure here is fatal: without an identity
    /// nothing else can proceed safely.
    fn resolve_name(&self) -> SetupResult<String> {
        let name = self.resolver.resolve_required()?.to_string();
        debug!("NameResolved: {}", name);
        Ok(name)
    }

    /// NameResolved -> CacheChecked. Store failures degrade to a miss.
    async fn check_cache(&self, name: String) -> SetupResult<CacheProbe> {
        let key = environment_key(&name, self.resolver.environment_file())?;

        let outcome = match self.cache {
            None => {
                debug!("Environment caching disabled");
                CacheOutcome::Miss
            }
            Some(cache) => match cache.restore(&key).await {
                Ok(Some(location)) => {
                    info!("Restored environment `{}` from cache ({})", name, location.display());
                    CacheOutcome::Hit(key.clone())
                }
                Ok(None) => CacheOutcome::Miss,
                Err(e) if !e.is_fatal() => {
                    warn!("{e}; treating as cache miss");
                    CacheOutcome::Miss
                }
                Err(e) => return Err(e),
            },
        };

        debug!("CacheChecked: {}", outcome);
        Ok(CacheProbe { name, key, outcome })
    }

    /// CacheChecked -> {Reused | Built}.
    ///
    /// On a hit the build is skipped entirely; the prior cache write is
    /// trusted to have materialized the environment at its root. On a
    /// miss the build runs once, then the save happens before anything
    /// downstream sees the environment. A failed save is logged and does
    /// not change the run's outcome.
    async fn materialize(
        &self,
        name: String,
        key: String,
        outcome: CacheOutcome,
    ) -> SetupResult<Phase> {
        if outcome.is_hit() {
            return Ok(Phase::Reused { name, outcome });
        }

        info!("Install environment `{}`", name);
        self.builder.build(&name).await?;

        if let Some(cache) = self.cache {
            let location = environment_path(self.root_prefix, &name);
            if let Err(e) = cache.save(&key, &location).await {
                warn!("Failed to save environment cache: {e}");
            }
        }

        Ok(Phase::Built { name, outcome })
    }

    /// {Reused | Built} -> ShellRegistered.
    ///
    /// Shells are registered concurrently; one flavor failing must not
    /// mask the others, so failures are accumulated and reported.
    async fn register_shells(&self, name: String, outcome: CacheOutcome) -> Phase {
        let registrations = self
            .shells
            .iter()
            .map(|flavor| self.registrar.register(&name, *flavor));

        let failures: Vec<SetupError> = join_all(registrations)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        for failure in &failures {
            warn!("{failure}");
        }

        Phase::ShellRegistered {
            name,
            outcome,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Shared event log so tests can assert cross-collaborator ordering
    type EventLog = Arc<Mutex<Vec<String>>>;

    struct MockCache {
        entries: Mutex<HashMap<String, PathBuf>>,
        unavailable: bool,
        fail_save: bool,
        events: EventLog,
    }

    impl MockCache {
        fn new(events: EventLog) -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                unavailable: false,
                fail_save: false,
                events,
            }
        }

        fn with_entry(self, key: &str) -> Self {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), PathBuf::from("/cached"));
            self
        }

        fn saved_keys(&self) -> Vec<String> {
            self.entries.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl CacheGateway for MockCache {
        async fn restore(&self, key: &str) -> SetupResult<Option<PathBuf>> {
            self.events.lock().unwrap().push(format!("restore:{key}"));
            if self.unavailable {
                return Err(SetupError::cache_unavailable("restoring", "store down"));
            }
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn save(&self, key: &str, path: &Path) -> SetupResult<()> {
            self.events.lock().unwrap().push(format!("save:{key}"));
            if self.fail_save {
                return Err(SetupError::cache_unavailable("saving", "store down"));
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), path.to_path_buf());
            Ok(())
        }
    }

    struct MockBuilder {
        builds: AtomicUsize,
        fail: bool,
        events: EventLog,
    }

    impl MockBuilder {
        fn new(events: EventLog) -> Self {
            Self {
                builds: AtomicUsize::new(0),
                fail: false,
                events,
            }
        }

        fn build_count(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EnvironmentBuilder for MockBuilder {
        async fn build(&self, name: &str) -> SetupResult<()> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("build:{name}"));
            if self.fail {
                return Err(SetupError::Build {
                    command: format!("micromamba create -n {name}"),
                    code: 1,
                    stderr: "solver failed".into(),
                });
            }
            Ok(())
        }
    }

    struct MockRegistrar {
        fail_for: Option<ShellFlavor>,
        events: EventLog,
    }

    impl MockRegistrar {
        fn new(events: EventLog) -> Self {
            Self {
                fail_for: None,
                events,
            }
        }
    }

    #[async_trait]
    impl ActivationRegistrar for MockRegistrar {
        async fn register(&self, environment_name: &str, flavor: ShellFlavor) -> SetupResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("register:{environment_name}:{flavor}"));
            if self.fail_for == Some(flavor) {
                return Err(SetupError::ShellRegistration {
                    shell: flavor.to_string(),
                    reason: "profile unwritable".into(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        events: EventLog,
        cache: MockCache,
        builder: MockBuilder,
        registrar: MockRegistrar,
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let events: EventLog = Arc::new(Mutex::new(Vec::new()));
            Self {
                cache: MockCache::new(events.clone()),
                builder: MockBuilder::new(events.clone()),
                registrar: MockRegistrar::new(events.clone()),
                root: TempDir::new().unwrap(),
                events,
            }
        }

        fn orchestrator<'a>(
            &'a self,
            resolver: &'a NameResolver,
            shells: &'a [ShellFlavor],
        ) -> EnvironmentOrchestrator<'a> {
            EnvironmentOrchestrator::new(
                resolver,
                Some(&self.cache),
                &self.builder,
                &self.registrar,
                shells,
                self.root.path(),
            )
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    fn env_file(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("environment.yml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    // Scenario 1: explicit name, no file, miss -> build, save, success
    #[tokio::test]
    async fn miss_builds_then_saves() {
        let fx = Fixture::new();
        let resolver = NameResolver::new(Some("testenv".into()), None);

        let report = fx
            .orchestrator(&resolver, &[])
            .run()
            .await
            .unwrap();

        assert_eq!(report.name, "testenv");
        assert!(!report.outcome.is_hit());
        assert_eq!(fx.builder.build_count(), 1);
        assert_eq!(fx.cache.saved_keys(), vec!["env-testenv".to_string()]);
    }

    // Scenario 2: name from file, hit -> no build, shells still registered
    #[tokio::test]
    async fn hit_skips_build_and_registers_shells() {
        let dir = TempDir::new().unwrap();
        let file = env_file(&dir, "name: foo\n");
        let key = environment_key("foo", Some(&file)).unwrap();

        let mut fx = Fixture::new();
        fx.cache = MockCache::new(fx.events.clone()).with_entry(&key);
        let resolver = NameResolver::new(None, Some(file));
        let shells = [ShellFlavor::Bash];

        let report = fx.orchestrator(&resolver, &shells).run().await.unwrap();

        assert_eq!(report.name, "foo");
        assert_eq!(report.outcome, CacheOutcome::Hit(key));
        assert!(report.shell_failures.is_empty());
        assert_eq!(fx.builder.build_count(), 0);
        assert!(fx.events().iter().any(|e| e == "register:foo:bash"));
    }

    // Scenario 3: changed file bytes force a miss on the second run
    #[tokio::test]
    async fn changed_file_forces_miss() {
        let dir = TempDir::new().unwrap();
        let file = env_file(&dir, "name: foo\ndependencies:\n  - python=3.11\n");

        let fx = Fixture::new();
        let resolver = NameResolver::new(None, Some(file.clone()));
        fx.orchestrator(&resolver, &[]).run().await.unwrap();
        assert_eq!(fx.builder.build_count(), 1);

        // Second run against the same cache, file edited in between
        std::fs::write(&file, "name: foo\ndependencies:\n  - python=3.12\n").unwrap();
        let resolver2 = NameResolver::new(None, Some(file));
        let report = fx.orchestrator(&resolver2, &[]).run().await.unwrap();

        assert!(!report.outcome.is_hit());
        assert_eq!(fx.builder.build_count(), 2);
        assert_eq!(fx.cache.saved_keys().len(), 2);
    }

    // Scenario 4: build failure aborts without a cache save
    #[tokio::test]
    async fn build_failure_aborts_without_save() {
        let mut fx = Fixture::new();
        fx.builder.fail = true;
        let resolver = NameResolver::new(Some("broken".into()), None);

        let err = fx.orchestrator(&resolver, &[]).run().await.unwrap_err();

        assert!(matches!(err, SetupError::Build { .. }));
        assert!(fx.cache.saved_keys().is_empty());
        assert!(!fx.events().iter().any(|e| e.starts_with("save:")));
    }

    // Scenario 5: one shell fails, the other succeeds, run still completes
    #[tokio::test]
    async fn shell_failure_is_accumulated_not_fatal() {
        let mut fx = Fixture::new();
        fx.registrar.fail_for = Some(ShellFlavor::Bash);
        let resolver = NameResolver::new(Some("env".into()), None);
        let shells = [ShellFlavor::Bash, ShellFlavor::Zsh];

        let report = fx.orchestrator(&resolver, &shells).run().await.unwrap();

        assert_eq!(report.shell_failures.len(), 1);
        assert!(report.shell_failures[0].to_string().contains("bash"));
        let events = fx.events();
        assert!(events.iter().any(|e| e == "register:env:bash"));
        assert!(events.iter().any(|e| e == "register:env:zsh"));
    }

    #[tokio::test]
    async fn save_failure_does_not_fail_the_run() {
        let mut fx = Fixture::new();
        fx.cache.fail_save = true;
        let resolver = NameResolver::new(Some("env".into()), None);

        let report = fx.orchestrator(&resolver, &[]).run().await.unwrap();

        assert!(!report.outcome.is_hit());
        assert_eq!(fx.builder.build_count(), 1);
    }

    #[tokio::test]
    async fn unavailable_cache_degrades_to_miss() {
        let mut fx = Fixture::new();
        fx.cache.unavailable = true;
        let resolver = NameResolver::new(Some("env".into()), None);

        let report = fx.orchestrator(&resolver, &[]).run().await.unwrap();

        assert!(!report.outcome.is_hit());
        assert_eq!(fx.builder.build_count(), 1);
    }

    #[tokio::test]
    async fn save_happens_before_shell_registration() {
        let fx = Fixture::new();
        let resolver = NameResolver::new(Some("ordered".into()), None);
        let shells = [ShellFlavor::Zsh];

        fx.orchestrator(&resolver, &shells).run().await.unwrap();

        let events = fx.events();
        let save_at = events.iter().position(|e| e.starts_with("save:")).unwrap();
        let register_at = events
            .iter()
            .position(|e| e.starts_with("register:"))
            .unwrap();
        let build_at = events.iter().position(|e| e.starts_with("build:")).unwrap();
        assert!(build_at < save_at);
        assert!(save_at < register_at);
    }

    #[tokio::test]
    async fn probe_then_run_from_queries_store_once() {
        let fx = Fixture::new();
        let resolver = NameResolver::new(Some("split".into()), None);
        let shells = [ShellFlavor::Bash];
        let orchestrator = fx.orchestrator(&resolver, &shells);

        let probe = orchestrator.probe().await.unwrap();
        let report = orchestrator.run_from(probe).await.unwrap();

        assert_eq!(report.name, "split");
        assert_eq!(fx.builder.build_count(), 1);
        let events = fx.events();
        assert_eq!(
            events.iter().filter(|e| e.starts_with("restore:")).count(),
            1
        );
        assert!(events.iter().any(|e| e == "register:split:bash"));
    }

    #[tokio::test]
    async fn run_from_hit_skips_build() {
        let mut fx = Fixture::new();
        fx.cache = MockCache::new(fx.events.clone()).with_entry("env-warm");
        let resolver = NameResolver::new(Some("warm".into()), None);
        let orchestrator = fx.orchestrator(&resolver, &[]);

        let probe = orchestrator.probe().await.unwrap();
        let report = orchestrator.run_from(probe).await.unwrap();

        assert!(report.outcome.is_hit());
        assert_eq!(fx.builder.build_count(), 0);
    }

    #[tokio::test]
    async fn unresolvable_name_is_fatal() {
        let fx = Fixture::new();
        let resolver = NameResolver::new(None, None);

        let err = fx.orchestrator(&resolver, &[]).run().await.unwrap_err();

        assert!(matches!(err, SetupError::Config { .. }));
        assert!(fx.events().is_empty());
    }

    #[tokio::test]
    async fn caching_disabled_builds_without_store_traffic() {
        let fx = Fixture::new();
        let resolver = NameResolver::new(Some("nocache".into()), None);
        let orchestrator = EnvironmentOrchestrator::new(
            &resolver,
            None,
            &fx.builder,
            &fx.registrar,
            &[],
            fx.root.path(),
        );

        let report = orchestrator.run().await.unwrap();

        assert!(!report.outcome.is_hit());
        assert_eq!(fx.builder.build_count(), 1);
        assert!(!fx.events().iter().any(|e| e.starts_with("restore:")));
        assert!(!fx.events().iter().any(|e| e.starts_with("save:")));
    }
}

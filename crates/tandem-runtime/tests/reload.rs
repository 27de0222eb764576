//! Staged reload against in-memory listeners

use rustls::NamedGroup;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_config::{ConfigFormat, ConfigSource};
use tandem_core::{
    AddressFamily, AuthState, Connection, ConnectionId, Directory, InMemoryDirectory,
    SecurityPolicy, Session, SessionId, SessionKind,
};
use parking_lot::Mutex;
use tandem_plugin_api::prelude::*;
use tandem_plugin_api::testing::{EventLog, PluginEvent, RecordingPlugin};
use tandem_plugin_runtime::StaticModuleSource;
use tandem_runtime::testing::MockListenerFactory;
use tandem_runtime::{ReloadEngine, ReloadError, RunOptions, ServerRun};
use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
use tandem_tls::offered_groups;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    log: EventLog,
    factory: MockListenerFactory,
    engine: ReloadEngine,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            log: EventLog::new(),
            factory: MockListenerFactory::new(),
            engine: ReloadEngine::new(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("documents")
    }

    fn options(&self) -> RunOptions {
        RunOptions::new()
            .with_listener_factory(self.factory.clone())
            .with_modules(
                StaticModuleSource::new()
                    .with_descriptor(RecordingPlugin::descriptor("a", &self.log))
                    .with_descriptor(
                        RecordingPlugin::descriptor("b", &self.log).with_session_type("text"),
                    )
                    .with_descriptor(RecordingPlugin::failing_descriptor("broken", &self.log)),
            )
    }

    /// YAML configuration with `extra` appended at the top level
    fn source(&self, port: u16, extra: &str) -> ConfigSource {
        let yaml = format!(
            "server:\n  port: {port}\nstorage:\n  root-directory: {}\nsecurity:\n  policy: no-tls\n{extra}",
            self.root().display()
        );
        ConfigSource::inline(yaml, ConfigFormat::Yaml)
    }

    fn start(&self, source: &ConfigSource) -> ServerRun<InMemoryDirectory> {
        let directory = InMemoryDirectory::new(
            FilesystemStorage::new(self.dir.path()),
            FilesystemAccountStorage::new(),
        );
        ServerRun::start(source, directory, self.options()).unwrap()
    }
}

fn connection(id: u64) -> Connection {
    Connection::new(ConnectionId(id), "192.0.2.10:50000".parse().unwrap())
}

fn fixture_file(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../tandem-tls/tests/fixtures")
        .join(name)
}

fn tls_section(dh_group: &str) -> String {
    format!(
        "  certificate-file: {}\n  key-file: {}\n  dh-group: {dh_group}\n",
        fixture_file("server.crt").display(),
        fixture_file("server.key").display()
    )
}

#[test]
fn test_start_listens_on_both_families() {
    let fx = Fixture::new();
    let run = fx.start(&fx.source(7000, "plugins:\n  load: [a, b]\n"));

    let families: Vec<_> = run.pool().endpoints().iter().map(|e| e.family()).collect();
    assert_eq!(families, vec![AddressFamily::Ipv6, AddressFamily::Ipv4]);
    assert_eq!(run.local_port(), Some(7000));
    assert_eq!(run.registry().active_plugins(), vec!["a", "b"]);
    assert_eq!(run.directory().storage_root(), fx.root());
}

#[test]
fn test_unchanged_port_keeps_listeners_and_connections() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, "plugins:\n  load: [a]\n"));
    run.add_connection(connection(1)).unwrap();
    run.add_connection(connection(2)).unwrap();
    let endpoints: Vec<_> = run.pool().endpoints().iter().map(|e| e.id()).collect();

    let summary = run
        .reload(
            &fx.engine,
            &fx.source(7000, "  password: s3cret\nplugins:\n  load: [a]\n"),
        )
        .unwrap();

    assert!(!summary.listeners_replaced);
    assert!(!summary.storage_replaced);
    assert_eq!(fx.factory.listeners().len(), 2);
    assert_eq!(fx.factory.open_listeners().len(), 2);

    let after: Vec<_> = run.pool().endpoints().iter().map(|e| e.id()).collect();
    assert_eq!(endpoints, after);
    assert!(run
        .pool()
        .endpoints()
        .iter()
        .all(|e| e.auth_context().is_some()));
    assert_eq!(run.directory().connections().len(), 2);

    // The reloaded plugin sees the existing connections again
    assert_eq!(run.registry().connection_entry_count(), 2);
    assert_eq!(
        fx.log.count(|e| *e == PluginEvent::Initialized("a")),
        2
    );
    assert_eq!(
        fx.log.count(|e| *e == PluginEvent::Deinitialized("a")),
        1
    );
}

#[test]
fn test_listen_address_change_is_refused() {
    let fx = Fixture::new();
    let mut run = fx.start(&with_server_lines(
        fx.source(7000, ""),
        "  listen-address: 0.0.0.0\n",
    ));
    let before = Arc::clone(run.snapshot());

    let err = run
        .reload(
            &fx.engine,
            &with_server_lines(fx.source(7000, ""), "  listen-address: 192.168.1.1\n"),
        )
        .unwrap_err();

    assert!(matches!(err, ReloadError::ListenAddressChangeUnsupported { .. }));
    assert!(Arc::ptr_eq(&before, run.snapshot()));
    assert_eq!(run.pool().len(), 1);
    assert_eq!(fx.factory.open_listeners().len(), 1);
    assert_eq!(fx.factory.listeners().len(), 1);
}

#[test]
fn test_port_change_with_both_binds_failing() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    fx.factory
        .fail_bind(AddressFamily::Ipv6, 7001)
        .fail_bind(AddressFamily::Ipv4, 7001);

    let err = run.reload(&fx.engine, &fx.source(7001, "")).unwrap_err();

    match err {
        ReloadError::ListenerBindFailed(message) => assert!(message.contains("IPv4")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(run.local_port(), Some(7000));
    let open = fx.factory.open_listeners();
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|r| r.port == 7000));
}

#[test]
fn test_port_change_with_only_ipv4_binding() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    run.add_connection(connection(1)).unwrap();
    fx.factory.fail_bind(AddressFamily::Ipv6, 7001);

    let summary = run.reload(&fx.engine, &fx.source(7001, "")).unwrap();
    assert!(summary.listeners_replaced);

    let endpoints = run.pool().endpoints();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].family(), AddressFamily::Ipv4);
    assert_eq!(endpoints[0].local_port(), Some(7001));

    let open = fx.factory.open_listeners();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].port, 7001);
    assert!(fx
        .factory
        .listeners()
        .iter()
        .filter(|r| r.port == 7000)
        .all(|r| r.closed));

    // Connections outlive their listener
    assert!(run.directory().connection(ConnectionId(1)).is_some());
}

#[test]
fn test_port_change_with_both_opens_failing() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    fx.factory
        .fail_open(AddressFamily::Ipv6, 7001)
        .fail_open(AddressFamily::Ipv4, 7001);

    let err = run.reload(&fx.engine, &fx.source(7001, "")).unwrap_err();

    match err {
        ReloadError::ListenerOpenFailed(message) => assert!(message.contains("IPv6")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(run.local_port(), Some(7000));
    assert_eq!(fx.factory.open_listeners().len(), 2);

    // Speculative listeners were released
    assert!(fx
        .factory
        .listeners()
        .iter()
        .filter(|r| r.port == 7001)
        .all(|r| !r.bound));
}

#[test]
fn test_failed_open_leaves_new_storage_root_untouched() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    fx.factory
        .fail_open(AddressFamily::Ipv6, 7001)
        .fail_open(AddressFamily::Ipv4, 7001);
    let new_root = fx.dir.path().join("elsewhere");

    let yaml = format!(
        "server:\n  port: 7001\nstorage:\n  root-directory: {}\nsecurity:\n  policy: no-tls\n",
        new_root.display()
    );
    let err = run
        .reload(&fx.engine, &ConfigSource::inline(yaml, ConfigFormat::Yaml))
        .unwrap_err();

    assert!(matches!(err, ReloadError::ListenerOpenFailed(_)));
    assert!(!new_root.exists());
    assert_eq!(run.directory().storage_root(), fx.root());
}

#[test]
fn test_one_open_failure_is_tolerated() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    fx.factory.fail_open(AddressFamily::Ipv4, 7001);

    run.reload(&fx.engine, &fx.source(7001, "")).unwrap();

    let families: Vec<_> = run.pool().endpoints().iter().map(|e| e.family()).collect();
    assert_eq!(families, vec![AddressFamily::Ipv6]);
    assert_eq!(run.local_port(), Some(7001));
}

#[test]
fn test_storage_attach_failure_releases_listeners() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    let blocker = fx.dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"").unwrap();

    let yaml = format!(
        "server:\n  port: 7001\nstorage:\n  root-directory: {}\nsecurity:\n  policy: no-tls\n",
        blocker.display()
    );
    let err = run
        .reload(&fx.engine, &ConfigSource::inline(yaml, ConfigFormat::Yaml))
        .unwrap_err();

    assert!(matches!(err, ReloadError::StorageAttachFailed(_)));
    assert_eq!(run.local_port(), Some(7000));
    assert_eq!(run.directory().storage_root(), fx.root());

    let open = fx.factory.open_listeners();
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|r| r.port == 7000));
}

#[test]
fn test_storage_root_change() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, "plugins:\n  load: [a]\n"));
    let new_root = fx.dir.path().join("elsewhere");

    let yaml = format!(
        "server:\n  port: 7000\nstorage:\n  root-directory: {}\nsecurity:\n  policy: no-tls\nplugins:\n  load: [a]\n",
        new_root.display()
    );
    let summary = run
        .reload(&fx.engine, &ConfigSource::inline(yaml, ConfigFormat::Yaml))
        .unwrap();

    assert!(summary.storage_replaced);
    assert!(!summary.listeners_replaced);
    assert_eq!(run.directory().storage_root(), new_root);
    assert!(run.directory().account_storage().is_attached());
    assert!(new_root.is_dir());
}

/// Notes what it sees of the storage roots while initialized
#[derive(Debug)]
struct RootWitness {
    watched: PathBuf,
    notes: Arc<Mutex<Vec<String>>>,
}

impl Plugin for RootWitness {
    fn on_initialize(&mut self, ctx: &PluginContext, _params: &PluginParams) -> Result<(), PluginError> {
        self.notes.lock().push(format!(
            "init in {} watched_exists={}",
            ctx.storage_root().display(),
            self.watched.exists()
        ));
        Ok(())
    }

    fn on_deinitialize(&mut self) {
        self.notes
            .lock()
            .push(format!("deinit watched_exists={}", self.watched.exists()));
    }
}

#[test]
fn test_old_plugins_unload_before_new_storage() {
    let fx = Fixture::new();
    let new_root = fx.dir.path().join("elsewhere");
    let notes = Arc::new(Mutex::new(Vec::new()));

    let (watched, shared) = (new_root.clone(), Arc::clone(&notes));
    let options = RunOptions::new()
        .with_listener_factory(fx.factory.clone())
        .with_modules(StaticModuleSource::new().with_descriptor(PluginDescriptor::new(
            "witness",
            "Notes storage roots",
            move || {
                Box::new(RootWitness {
                    watched: watched.clone(),
                    notes: Arc::clone(&shared),
                })
            },
        )));
    let directory = InMemoryDirectory::new(
        FilesystemStorage::new(fx.dir.path()),
        FilesystemAccountStorage::new(),
    );
    let mut run = ServerRun::start(
        &fx.source(7000, "plugins:\n  load: [witness]\n"),
        directory,
        options,
    )
    .unwrap();
    notes.lock().clear();

    let yaml = format!(
        "server:\n  port: 7000\nstorage:\n  root-directory: {}\nsecurity:\n  policy: no-tls\nplugins:\n  load: [witness]\n",
        new_root.display()
    );
    run.reload(&fx.engine, &ConfigSource::inline(yaml, ConfigFormat::Yaml))
        .unwrap();

    assert_eq!(
        *notes.lock(),
        vec![
            "deinit watched_exists=false".to_string(),
            format!("init in {} watched_exists=true", new_root.display()),
        ]
    );
}

#[test]
fn test_invalid_configuration_is_refused() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, "plugins:\n  load: [a]\n"));
    let before = Arc::clone(run.snapshot());
    fx.log.clear();

    let source = ConfigSource::inline("server: [not, a, map", ConfigFormat::Yaml);
    let err = run.reload(&fx.engine, &source).unwrap_err();

    assert!(matches!(err, ReloadError::ConfigParseFailed(_)));
    assert!(Arc::ptr_eq(&before, run.snapshot()));
    assert!(fx.log.events().is_empty());
    assert_eq!(fx.engine.generation(), 1);
}

#[test]
fn test_require_tls_without_certificate_is_refused() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));

    let yaml = format!(
        "storage:\n  root-directory: {}\nsecurity:\n  policy: require-tls\n",
        fx.root().display()
    );
    let err = run
        .reload(&fx.engine, &ConfigSource::inline(yaml, ConfigFormat::Yaml))
        .unwrap_err();
    assert!(matches!(err, ReloadError::ConfigParseFailed(_)));
    assert_eq!(run.snapshot().security_policy(), SecurityPolicy::NoTls);
}

#[test]
fn test_unknown_dh_group_is_security_failure() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));

    let yaml = format!(
        "server:\n  port: 7000\nstorage:\n  root-directory: {}\nsecurity:\n  policy: require-tls\n{}",
        fx.root().display(),
        tls_section("ffdhe1024")
    );
    let err = run
        .reload(&fx.engine, &ConfigSource::inline(yaml, ConfigFormat::Yaml))
        .unwrap_err();

    assert!(matches!(err, ReloadError::SecurityMaterial(_)));
    assert!(run.snapshot().credentials().is_none());
}

#[test]
fn test_tls_reload_updates_endpoints_and_reuses_dh_params() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));

    let yaml = format!(
        "server:\n  port: 7000\nstorage:\n  root-directory: {}\nsecurity:\n  policy: require-tls\n{}",
        fx.root().display(),
        tls_section("ffdhe3072")
    );
    let source = ConfigSource::inline(yaml, ConfigFormat::Yaml);

    run.reload(&fx.engine, &source).unwrap();
    let first = Arc::clone(run.snapshot().dh_params().unwrap());
    assert_eq!(first.bits(), 3072);
    for endpoint in run.pool().endpoints() {
        assert_eq!(endpoint.security_policy(), SecurityPolicy::RequireTls);
        assert!(endpoint.credentials().is_some());
    }

    run.reload(&fx.engine, &source).unwrap();
    assert!(Arc::ptr_eq(&first, run.snapshot().dh_params().unwrap()));
}

#[test]
fn test_dh_group_change_reaches_tls_configuration() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    let tls_source = |group: &str| {
        let yaml = format!(
            "server:\n  port: 7000\nstorage:\n  root-directory: {}\nsecurity:\n  policy: require-tls\n{}",
            fx.root().display(),
            tls_section(group)
        );
        ConfigSource::inline(yaml, ConfigFormat::Yaml)
    };
    let offered = |run: &ServerRun<InMemoryDirectory>| -> Vec<Vec<NamedGroup>> {
        run.pool()
            .endpoints()
            .iter()
            .map(|e| offered_groups(&e.credentials().unwrap().server_config()))
            .collect()
    };

    run.reload(&fx.engine, &tls_source("ffdhe2048")).unwrap();
    for groups in offered(&run) {
        assert_eq!(groups, [NamedGroup::X25519, NamedGroup::secp256r1, NamedGroup::secp384r1]);
    }

    run.reload(&fx.engine, &tls_source("ffdhe4096")).unwrap();
    assert_eq!(run.snapshot().dh_params().map(|p| p.bits()), Some(4096));
    let after = offered(&run);
    assert_eq!(after.len(), 2);
    for groups in after {
        assert_eq!(groups, [NamedGroup::secp384r1]);
    }
}

#[test]
fn test_failing_plugin_does_not_fail_reload() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));

    let summary = run
        .reload(
            &fx.engine,
            &fx.source(7000, "plugins:\n  load: [a, broken, missing, b]\n"),
        )
        .unwrap();

    assert_eq!(summary.plugins_loaded, 2);
    assert_eq!(summary.plugin_failures.len(), 2);
    assert_eq!(run.registry().active_plugins(), vec!["a", "b"]);
    assert_eq!(
        fx.log.count(|e| *e == PluginEvent::Deinitialized("broken")),
        1
    );
}

#[test]
fn test_plugin_parameters_from_configuration() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));

    let summary = run
        .reload(
            &fx.engine,
            &fx.source(
                7000,
                "plugins:\n  load: [a, b]\n  parameters:\n    b:\n      fail: \"true\"\n",
            ),
        )
        .unwrap();

    assert_eq!(run.registry().active_plugins(), vec!["a"]);
    assert_eq!(summary.plugin_failures[0].plugin_name(), "b");
}

#[test]
fn test_new_auth_context_aborts_handshakes() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, ""));
    for id in 1..=3 {
        run.add_connection(connection(id)).unwrap();
    }
    run.directory_mut()
        .for_each_connection_mut(&mut |c| match c.id().0 {
            1 => c.begin_authentication(),
            2 => {
                c.complete_authentication("anything");
            }
            _ => {}
        });

    let summary = run
        .reload(&fx.engine, &fx.source(7000, "  password: s3cret\n"))
        .unwrap();
    assert_eq!(summary.aborted_authentications, 1);

    let dir = run.directory();
    let state = |id| dir.connection(ConnectionId(id)).unwrap().auth_state();
    assert_eq!(state(1), AuthState::Unauthenticated);
    assert_eq!(state(2), AuthState::Authenticated);
    assert_eq!(state(3), AuthState::Unauthenticated);
    assert!(dir
        .connections()
        .iter()
        .all(|c| c.auth_context().is_some_and(|ctx| ctx.verify("s3cret"))));
    assert!(dir.security_context().is_some());
}

#[test]
fn test_side_entries_follow_plugins_across_reload() {
    let fx = Fixture::new();
    let mut run = fx.start(&fx.source(7000, "plugins:\n  load: [a, b]\n"));
    run.add_connection(connection(1)).unwrap();
    run.add_connection(connection(2)).unwrap();
    run.add_session(Session::new(SessionId(1), "notes", SessionKind::new("text")))
        .unwrap();

    // a: 2 connections + 1 session, b: 2 connections + 1 session
    assert_eq!(run.registry().connection_entry_count(), 4);
    assert_eq!(run.registry().session_entry_count(), 2);

    run.reload(&fx.engine, &fx.source(7000, "plugins:\n  load: [a]\n"))
        .unwrap();
    assert_eq!(run.registry().connection_entry_count(), 2);
    assert_eq!(run.registry().session_entry_count(), 1);
    assert_eq!(
        fx.log.count(|e| *e == PluginEvent::ConnectionRemoved("b", ConnectionId(1))),
        1
    );

    run.remove_connection(ConnectionId(1));
    assert_eq!(run.registry().connection_entry_count(), 1);
}

#[test]
fn test_strict_plugins_fail_startup() {
    let fx = Fixture::new();
    let directory = InMemoryDirectory::new(
        FilesystemStorage::new(fx.dir.path()),
        FilesystemAccountStorage::new(),
    );

    let err = ServerRun::start(
        &fx.source(7000, "plugins:\n  load: [a, broken]\n"),
        directory,
        fx.options().strict_plugins(true),
    )
    .unwrap_err();

    assert!(matches!(err, ReloadError::PluginInitFailed(_)));
    assert!(fx.factory.open_listeners().is_empty());
    assert_eq!(fx.log.count(|e| *e == PluginEvent::Deinitialized("a")), 1);
}

/// Add lines to the `server` section of an inline source
fn with_server_lines(source: ConfigSource, lines: &str) -> ConfigSource {
    match source {
        ConfigSource::Inline { content, format } => ConfigSource::Inline {
            content: content.replacen("server:\n", &format!("server:\n{lines}"), 1),
            format,
        },
        other => other,
    }
}

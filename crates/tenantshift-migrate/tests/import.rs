mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tenantshift_ccdb::memory::MemoryDatabase;
use tenantshift_core::{DomainMapping, InstanceType, OutcomeStatus, ServiceBinding, ServiceInstance};
use tenantshift_migrate::{
    run, BackupBackend, Direction, FileMarshaller, Location, MigrationContext, Result, Scope,
    YamlMarshaller,
};

use common::*;

const SALT: &str = "abcdefgh";

fn dev() -> Scope {
    Scope::Space {
        org: "acme".into(),
        space: "dev".into(),
    }
}

fn target_foundation() -> FakePlatform {
    FakePlatform::new()
        .org("t-o", "acme")
        .space("t-o", "t-s", "dev")
        .offering("off-redis", "p.redis")
        .plan("p-small", "small", "off-redis")
        .offering("off-smb", "smb")
        .plan("tp-1", "existing", "off-smb")
}

fn save(dir: &Path, instance: &ServiceInstance) {
    YamlMarshaller::new(dir)
        .save_instance("acme", "dev", instance)
        .unwrap();
}

fn redis(name: &str) -> ServiceInstance {
    ServiceInstance {
        name: name.into(),
        guid: format!("si-{}", name),
        service: "p.redis".into(),
        plan: "small".into(),
        tags: vec!["cache".into()],
        params: map(json!({ "url": format!("https://{}.apps.source.example.com", name) })),
        ..Default::default()
    }
}

fn smb_volume() -> ServiceInstance {
    let mut apps = BTreeMap::new();
    apps.insert("b-1".to_string(), "web".to_string());
    ServiceInstance {
        name: "vol".into(),
        guid: "si-1".into(),
        service: "smb".into(),
        plan: "existing".into(),
        space_guid: "s-1".into(),
        credentials: map(json!({ "share": "//fs/vol" })),
        bindings: vec![ServiceBinding {
            guid: "b-1".into(),
            app_guid: "app-1".into(),
            service_instance_guid: "si-1".into(),
            credentials: map(json!({ "share": "//fs/vol" })),
            ..Default::default()
        }],
        apps,
        ..Default::default()
    }
}

fn import_ctx(dir: &Path, target: &FakePlatform, target_db: &MemoryDatabase) -> Arc<MigrationContext> {
    let mut cfg = config(dir, &["smb"]);
    cfg.use_default_migrator = true;
    cfg.domains = vec![DomainMapping::new("apps.source.example.com", "apps.target.example.com")];
    context(cfg, &FakePlatform::new(), target, &MemoryDatabase::new(), target_db)
}

fn failure(ctx: &MigrationContext, instance: &str) -> String {
    ctx.summary
        .outcomes()
        .into_iter()
        .find_map(|o| match o.status {
            OutcomeStatus::Failed { error } if o.instance == instance => Some(error),
            _ => None,
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn existing_managed_instance_is_updated_not_created() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &redis("cache"));
    let target = target_foundation().managed("t-si-1", "cache", "t-s", "p-small");
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert!(target.created_managed().is_empty());
    let updates = target.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "t-si-1");
    let params = updates[0].1.parameters.clone().unwrap();
    assert_eq!(params["url"], "https://cache.apps.target.example.com");
    assert_eq!(updates[0].1.tags.as_deref(), Some(&["cache".to_string()][..]));
    assert_eq!(ctx.summary.success_count(), 1);
}

#[tokio::test]
async fn missing_managed_instance_is_created_not_updated() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &redis("queue"));
    let target = target_foundation();
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert!(target.updates().is_empty());
    let created = target.created_managed();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "queue");
    assert_eq!(created[0].space_guid, "t-s");
    assert_eq!(created[0].plan_guid, "p-small");
    assert_eq!(created[0].parameters["url"], "https://queue.apps.target.example.com");
    assert_eq!(ctx.summary.success_count(), 1);
}

#[tokio::test]
async fn plan_missing_on_target_fails_the_instance_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut huge = redis("big");
    huge.plan = "huge".into();
    save(dir.path(), &huge);
    save(dir.path(), &redis("queue"));
    let target = target_foundation();
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.failed_count(), 1);
    assert_eq!(ctx.summary.success_count(), 1);
    assert!(failure(&ctx, "big").contains("huge"));
    let created = target.created_managed();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "queue");
}

#[tokio::test]
async fn dry_run_import_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &redis("queue"));
    save(dir.path(), &smb_volume());
    let target = target_foundation();
    let db = MemoryDatabase::new()
        .with_salt("service_instances", SALT)
        .with_id("spaces", "t-s", 1)
        .with_id("service_plans", "tp-1", 2);
    let mut cfg = config(dir.path(), &["smb"]);
    cfg.use_default_migrator = true;
    cfg.dry_run = true;
    let ctx = context(cfg, &FakePlatform::new(), &target, &MemoryDatabase::new(), &db);

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.success_count(), 2);
    assert!(target.created_managed().is_empty());
    assert!(target.created_apps().is_empty());
    assert!(db.statements_starting_with("INSERT").is_empty());
}

#[tokio::test]
async fn managed_service_without_migrator_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &redis("queue"));
    let target = target_foundation();
    let ctx = context(
        config(dir.path(), &[]),
        &FakePlatform::new(),
        &target,
        &MemoryDatabase::new(),
        &MemoryDatabase::new(),
    );

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.skipped_count(), 1);
    assert!(target.created_managed().is_empty());
}

#[tokio::test]
async fn user_provided_instance_gets_target_domains() {
    let dir = tempfile::tempdir().unwrap();
    save(
        dir.path(),
        &ServiceInstance {
            name: "logs".into(),
            guid: "ups-1".into(),
            instance_type: InstanceType::UserProvided,
            credentials: map(json!({ "uri": "https://logs.apps.source.example.com/in" })),
            syslog_drain_url: Some("syslog://drain.apps.source.example.com:514".into()),
            ..Default::default()
        },
    );
    let target = target_foundation();
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    let created = target.created_user_provided();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].credentials["uri"], "https://logs.apps.target.example.com/in");
    assert_eq!(
        created[0].syslog_drain_url.as_deref(),
        Some("syslog://drain.apps.target.example.com:514")
    );
}

#[tokio::test]
async fn ccdb_import_with_unknown_plan_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &smb_volume());
    let target = target_foundation();
    let db = MemoryDatabase::new()
        .with_salt("service_instances", SALT)
        .with_id("spaces", "t-s", 1);
    let ctx = import_ctx(dir.path(), &target, &db);

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.failed_count(), 1);
    assert!(failure(&ctx, "vol").contains("service_plans"));
    assert!(db.statements_starting_with("INSERT").is_empty());
    assert_eq!(db.begins(), 0);
    assert_eq!(db.commits(), 0);
}

#[tokio::test]
async fn ccdb_import_creates_instance_binding_and_placeholder_app() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &smb_volume());
    let target = target_foundation();
    let db = MemoryDatabase::new()
        .with_salt("service_instances", SALT)
        .with_id("spaces", "t-s", 1)
        .with_id("service_plans", "tp-1", 2);
    let ctx = import_ctx(dir.path(), &target, &db);

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.success_count(), 1, "{}", ctx.summary);
    assert_eq!(db.statements_starting_with("INSERT INTO service_instances").len(), 1);
    assert_eq!(db.statements_starting_with("INSERT INTO service_usage_events").len(), 1);
    let bindings = db.statements_starting_with("INSERT INTO service_bindings");
    assert_eq!(bindings.len(), 1);
    assert!(bindings[0].in_transaction);
    assert_eq!(bindings[0].args[1].as_str(), Some("app-web"));
    assert_eq!(target.created_apps(), vec!["web"]);
    assert_eq!(db.commits(), 1);
}

#[tokio::test]
async fn ccdb_binding_failure_leaves_no_instance_behind() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &smb_volume());
    let target = target_foundation();
    let db = MemoryDatabase::new()
        .with_salt("service_instances", SALT)
        .with_id("spaces", "t-s", 1)
        .with_id("service_plans", "tp-1", 2)
        .failing_on("INSERT INTO service_bindings");
    let ctx = import_ctx(dir.path(), &target, &db);

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.failed_count(), 1);
    assert!(failure(&ctx, "vol").contains("injected failure"));
    let inserts = db.statements_starting_with("INSERT");
    assert_eq!(inserts.len(), 2);
    assert!(inserts.iter().all(|s| s.in_transaction));
    assert_eq!(db.begins(), 1);
    assert_eq!(db.commits(), 0);
    assert_eq!(db.rollbacks(), 1);
}

#[tokio::test]
async fn ccdb_instance_already_in_target_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &smb_volume());
    let target = target_foundation();
    let db = MemoryDatabase::new()
        .with_salt("service_instances", SALT)
        .with_id("service_instances", "si-1", 9);
    let ctx = import_ctx(dir.path(), &target, &db);

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.skipped_count(), 1);
    assert!(db.statements_starting_with("INSERT").is_empty());
}

#[tokio::test]
async fn ccdb_name_taken_by_other_instance_fails() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &smb_volume());
    let target = target_foundation().managed("other", "vol", "t-s", "tp-1");
    let db = MemoryDatabase::new().with_salt("service_instances", SALT);
    let ctx = import_ctx(dir.path(), &target, &db);

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.failed_count(), 1);
    assert!(failure(&ctx, "vol").contains("already exists"));
    assert!(db.statements_starting_with("INSERT").is_empty());
}

#[tokio::test]
async fn missing_target_space_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &redis("queue"));
    let target = FakePlatform::new().org("t-o", "acme");
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    let err = run(ctx, Direction::Import, &Scope::All).await.unwrap_err();
    assert!(err.to_string().contains("acme/dev"));
}

#[derive(Default)]
struct RecordingBackend {
    restored: Mutex<Vec<String>>,
}

#[async_trait]
impl BackupBackend for RecordingBackend {
    async fn backup(&self, _location: &Location, _instance: &ServiceInstance) -> Result<()> {
        Ok(())
    }

    async fn restore(&self, location: &Location, instance: &ServiceInstance) -> Result<()> {
        self.restored
            .lock()
            .push(format!("{}/{}", location, instance.name));
        Ok(())
    }
}

fn mysql(name: &str) -> ServiceInstance {
    ServiceInstance {
        name: name.into(),
        guid: format!("si-{}", name),
        service: "p.mysql".into(),
        plan: "db-small".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn relational_backup_without_backend_fails() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &mysql("orders"));
    let target = target_foundation()
        .offering("off-mysql", "p.mysql")
        .plan("p-db", "db-small", "off-mysql");
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.failed_count(), 1);
    assert!(failure(&ctx, "orders").contains("backup backend"));
}

#[tokio::test]
async fn relational_backup_restores_after_create() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), &mysql("orders"));
    let target = target_foundation()
        .offering("off-mysql", "p.mysql")
        .plan("p-db", "db-small", "off-mysql");
    let backend = Arc::new(RecordingBackend::default());
    let mut cfg = config(dir.path(), &[]);
    cfg.use_default_migrator = true;
    let marshaller = Arc::new(YamlMarshaller::new(dir.path()));
    let ctx = Arc::new(
        MigrationContext::new(
            cfg,
            Arc::new(FakePlatform::new()),
            Arc::new(target.clone()),
            marshaller,
            tokio_util::sync::CancellationToken::new(),
        )
        .with_backup_backend(backend.clone()),
    );

    run(ctx.clone(), Direction::Import, &dev()).await.unwrap();

    assert_eq!(ctx.summary.success_count(), 1);
    assert_eq!(target.created_managed().len(), 1);
    assert_eq!(*backend.restored.lock(), vec!["acme/dev/orders"]);
}

#[tokio::test]
async fn every_exported_space_is_imported() {
    let dir = tempfile::tempdir().unwrap();
    let marshaller = YamlMarshaller::new(dir.path());
    marshaller.save_instance("acme", "dev", &redis("a")).unwrap();
    marshaller.save_instance("acme", "prod", &redis("b")).unwrap();
    let target = target_foundation().space("t-o", "t-p", "prod");
    let ctx = import_ctx(dir.path(), &target, &MemoryDatabase::new());

    run(ctx.clone(), Direction::Import, &Scope::All).await.unwrap();

    let mut spaces: Vec<String> = target
        .created_managed()
        .into_iter()
        .map(|c| c.space_guid)
        .collect();
    spaces.sort();
    assert_eq!(spaces, vec!["t-p", "t-s"]);
}

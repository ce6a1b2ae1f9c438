//! End-to-end runs against the in-memory provider.

use keyfleet::core::audit_log::{self, Journal};
use keyfleet::core::flows::{self, FactoryRequest, IssueRequest, Session};
use keyfleet::core::pacing::RecordingSleeper;
use keyfleet::core::paths::WorkspacePaths;
use keyfleet::models::settings::Settings;
use keyfleet::provider::memory::{MemoryProvider, Op};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn discovery_run_writes_one_file_per_account_and_keeps_old_keys() {
    let dir = TempDir::new().unwrap();
    let paths = WorkspacePaths::from_root(dir.path().to_path_buf());
    let provider = MemoryProvider::new("demo")
        .with_account("sa-b", 2, 0)
        .with_account("sa-a", 2, 0)
        .with_account("sa-c", 2, 0)
        .with_account("web-1", 2, 0);
    let settings = Settings::default();
    let sleeper = RecordingSleeper::new();
    let journal = Journal::new(&paths.audit_log, &paths.audit_lock, "demo", "tester");
    let session = Session {
        provider: &provider,
        project: "demo",
        settings: &settings,
        sleeper: &sleeper,
        journal: Some(&journal),
    };

    let summary = flows::issue(
        &session,
        &IssueRequest {
            prefix: "sa".into(),
            output: paths.output.clone(),
        },
    )
    .unwrap();

    let names: Vec<_> = summary.accounts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["sa-a", "sa-b", "sa-c"]);
    assert_eq!(summary.saved.len(), 3);
    assert!(summary.failed.is_empty());

    for name in ["sa-a", "sa-b", "sa-c"] {
        let content = fs::read_to_string(paths.output.join(format!("{}.json", name))).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            doc["client_email"],
            format!("{}@demo.iam.gserviceaccount.com", name)
        );
        // two pre-existing keys plus the new one
        assert_eq!(provider.keys_of(name).len(), 3);
    }
    assert_eq!(provider.keys_of("web-1").len(), 2);
    assert_eq!(provider.calls(Op::DeleteKey), 0);
    assert!(sleeper.slept().is_empty());

    let (entries, errors) = audit_log::verify_chain(&paths.audit_log).unwrap();
    assert_eq!(entries, 3);
    assert!(errors.is_empty());
}

#[test]
fn factory_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("accounts");
    let provider = MemoryProvider::new("demo").with_account("sa-002", 3, 1);
    let settings = Settings::default();
    let request = FactoryRequest {
        prefix: "sa".into(),
        count: 6,
        output: output.clone(),
    };

    let sleeper = RecordingSleeper::new();
    let session = Session {
        provider: &provider,
        project: "demo",
        settings: &settings,
        sleeper: &sleeper,
        journal: None,
    };
    let first = flows::factory(&session, &request).unwrap();
    assert_eq!(first.reconcile.created, 5);
    assert_eq!(first.keys_deleted, 3);
    // account cooldown after the 4th create; key cooldown once in each key phase
    assert_eq!(sleeper.count(Duration::from_secs(20)), 1);
    assert_eq!(sleeper.count(Duration::from_secs(10)), 2);

    let sleeper = RecordingSleeper::new();
    let session = Session {
        sleeper: &sleeper,
        ..session
    };
    let second = flows::factory(&session, &request).unwrap();
    assert_eq!(second.reconcile.create_calls, 0);
    assert_eq!(second.keys_deleted, 6);
    assert!(second.failed.is_empty());
    assert_eq!(provider.calls(Op::CreateAccount), 5);

    for n in 1..=6 {
        assert!(output.join(format!("{}.json", n)).is_file());
        let name = format!("sa-{:03}", n);
        let user_keys = provider
            .keys_of(&name)
            .into_iter()
            .filter(|k| k.key_type == keyfleet::models::account::KeyType::UserManaged)
            .count();
        assert_eq!(user_keys, 1);
    }
}

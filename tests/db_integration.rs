use contract_registry::api::pagination::Pagination;
use contract_registry::db::error::DatabaseError;
use contract_registry::db::{
    ContractBundle, DeploymentFilter, PackageFilter, PgStore, PublishBundle, SqliteStore, Store,
};
use contract_registry::models::{Artifact, ArtifactType, Contract, Deployment, Package};
use contract_registry::util::{compute_hash, now};
use serial_test::serial;
use std::env;
use uuid::Uuid;

/// Note: the Postgres variants only run when TEST_DATABASE_URL points at a
/// database the tests may write to. Names are randomized so runs don't collide.

fn unique_name() -> String {
    format!("pkg-{}", Uuid::new_v4().simple())
}

fn unique_address() -> String {
    format!("0x{}", &Uuid::new_v4().simple().to_string().repeat(2)[..40])
}

fn mock_package(name: &str, version: &str, owner_id: &str) -> Package {
    Package {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        version: version.to_string(),
        chain: "evm".to_string(),
        builder: "foundry".to_string(),
        compiler_version: Some("0.8.24".to_string()),
        compiler_settings: Some(r#"{"optimizer":{"enabled":true}}"#.to_string()),
        metadata: r#"{"license":"MIT"}"#.to_string(),
        owner_id: owner_id.to_string(),
        created_at: now(),
    }
}

fn mock_contract(package: &Package, name: &str) -> ContractBundle {
    let contract_id = Uuid::new_v4().to_string();
    let artifacts = [
        (ArtifactType::Abi, b"[]".to_vec()),
        (ArtifactType::DeployedBytecode, b"0xabc".to_vec()),
    ]
    .into_iter()
    .map(|(kind, content)| Artifact {
        id: Uuid::new_v4().to_string(),
        contract_id: contract_id.clone(),
        artifact_type: kind.to_string(),
        content_hash: compute_hash(&content),
        content,
        created_at: now(),
    })
    .collect();

    ContractBundle {
        contract: Contract {
            id: contract_id,
            package_id: package.id.clone(),
            name: name.to_string(),
            source_path: format!("src/{name}.sol"),
            content_hash: compute_hash(b"0xabc"),
            created_at: now(),
        },
        artifacts,
    }
}

fn mock_deployment(package: &Package, chain_id: i64, address: &str) -> Deployment {
    Deployment {
        id: Uuid::new_v4().to_string(),
        package_id: package.id.clone(),
        contract_name: "Token".to_string(),
        chain: package.chain.clone(),
        chain_id,
        address: address.to_string(),
        deployer: None,
        tx_hash: Some("0xfeed".to_string()),
        block_number: Some(42),
        deployment_data: None,
        verified: false,
        verified_at: None,
        verified_on: None,
        created_at: now(),
    }
}

/// The behavior every backend must share.
fn exercise_store(store: &dyn Store) {
    // Migrations are idempotent.
    store.migrate().expect("migrate again");

    let name = unique_name();
    let v1 = mock_package(&name, "1.0.0", "owner-1");
    let bundle = PublishBundle {
        contracts: vec![mock_contract(&v1, "Token"), mock_contract(&v1, "Vault")],
        package: v1.clone(),
    };
    assert_eq!(store.publish(&bundle).expect("publish"), v1);

    assert_eq!(store.get_package(&name, "1.0.0").expect("get"), v1);
    assert_eq!(store.get_package_by_id(&v1.id).expect("get by id"), v1);
    assert!(store.package_exists(&name, "1.0.0").expect("exists"));
    assert!(!store.package_exists(&name, "2.0.0").expect("exists"));
    assert!(matches!(
        store.get_package(&name, "2.0.0"),
        Err(DatabaseError::NotFound(_))
    ));
    assert!(matches!(
        store.create_package(&mock_package(&name, "1.0.0", "owner-1")),
        Err(DatabaseError::AlreadyExists(_))
    ));

    // A failing publish leaves nothing behind.
    let broken = mock_package(&name, "1.5.0", "owner-1");
    let token = mock_contract(&broken, "Token");
    let broken_bundle = PublishBundle {
        contracts: vec![token.clone(), token],
        package: broken,
    };
    assert!(store.publish(&broken_bundle).is_err());
    assert!(!store.package_exists(&name, "1.5.0").expect("exists"));

    store
        .create_package(&mock_package(&name, "1.1.0", "owner-1"))
        .expect("create");
    store
        .create_package(&mock_package(&name, "2.0.0-rc.1", "owner-1"))
        .expect("create");
    assert_eq!(
        store.get_package_versions(&name, true).expect("versions"),
        vec!["2.0.0-rc.1", "1.1.0", "1.0.0"]
    );
    assert_eq!(
        store.get_package_versions(&name, false).expect("versions"),
        vec!["1.1.0", "1.0.0"]
    );

    // Ownership: first writer wins.
    assert_eq!(store.get_package_owner(&name).expect("owner"), None);
    assert!(store.set_package_owner(&name, "owner-1").expect("claim"));
    assert!(!store.set_package_owner(&name, "owner-2").expect("claim"));
    assert_eq!(
        store.get_package_owner(&name).expect("owner").as_deref(),
        Some("owner-1")
    );

    // Listing groups versions and filters.
    let filter = PackageFilter {
        search: Some(name.clone()),
        ..Default::default()
    };
    let page = store
        .list_packages(&filter, &Pagination::default())
        .expect("list");
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].versions, vec!["2.0.0-rc.1", "1.1.0", "1.0.0"]);
    assert_eq!(page.data[0].latest_version.as_deref(), Some("1.1.0"));

    let filter = PackageFilter {
        search: Some(name.clone()),
        contract: Some("vault".to_string()),
        ..Default::default()
    };
    let page = store
        .list_packages(&filter, &Pagination::default())
        .expect("list");
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].versions, vec!["1.0.0"]);

    let filter = PackageFilter {
        search: Some(name.clone()),
        project: Some("hardhat".to_string()),
        ..Default::default()
    };
    assert!(store
        .list_packages(&filter, &Pagination::default())
        .expect("list")
        .data
        .is_empty());

    // Contracts and artifacts.
    let contracts = store.list_contracts(&v1.id).expect("contracts");
    let names: Vec<&str> = contracts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Token", "Vault"]);
    let token = store.get_contract(&v1.id, "Token").expect("contract");
    assert!(matches!(
        store.get_contract(&v1.id, "Missing"),
        Err(DatabaseError::NotFound(_))
    ));

    let artifact = store
        .get_artifact(&token.id, ArtifactType::DeployedBytecode)
        .expect("artifact");
    assert_eq!(artifact.content, b"0xabc");
    assert_eq!(store.list_artifacts(&token.id).expect("artifacts").len(), 2);
    assert!(matches!(
        store.get_artifact(&token.id, ArtifactType::StorageLayout),
        Err(DatabaseError::NotFound(_))
    ));

    let content = format!("0x{}", Uuid::new_v4().simple()).into_bytes();
    let replacement = Artifact {
        id: Uuid::new_v4().to_string(),
        content_hash: compute_hash(&content),
        content: content.clone(),
        ..artifact.clone()
    };
    let stored = store.store_artifact(&replacement).expect("upsert");
    assert_eq!(stored.id, artifact.id);
    assert_eq!(stored.content, content);
    assert_eq!(
        store
            .get_artifact_by_hash(&compute_hash(&content))
            .expect("by hash")
            .contract_id,
        token.id
    );

    // Deployments.
    let address = unique_address();
    let deployment = store
        .record_deployment(&mock_deployment(&v1, 1, &address))
        .expect("record");
    assert!(matches!(
        store.record_deployment(&mock_deployment(&v1, 1, &address)),
        Err(DatabaseError::AlreadyExists(_))
    ));
    store
        .record_deployment(&mock_deployment(&v1, 10, &address))
        .expect("record");
    store
        .record_deployment(&mock_deployment(&v1, 137, &address))
        .expect("record");

    assert_eq!(
        store.get_deployment("evm", 1, &address).expect("get"),
        deployment
    );

    let filter = DeploymentFilter {
        package_id: Some(v1.id.clone()),
        ..Default::default()
    };
    let first = store
        .list_deployments(&filter, &Pagination::new(None, 2))
        .expect("list");
    assert_eq!(first.data.len(), 2);
    assert!(first.has_more);
    let second = store
        .list_deployments(&filter, &Pagination::new(first.next_cursor.clone(), 2))
        .expect("list");
    assert_eq!(second.data.len(), 1);
    assert!(!second.has_more);
    assert!(first.data.iter().all(|d| d.id != second.data[0].id));

    let by_name = DeploymentFilter {
        package_name: Some(name.clone()),
        chain_id: Some(10),
        ..Default::default()
    };
    assert_eq!(
        store
            .list_deployments(&by_name, &Pagination::default())
            .expect("list")
            .data
            .len(),
        1
    );

    let updated = store
        .update_verification_status(&deployment.id, true, Some("localhost".to_string()))
        .expect("update");
    assert!(updated.verified);
    assert!(updated.verified_at.is_some());
    let unverified = store
        .update_verification_status(&deployment.id, false, None)
        .expect("update");
    assert!(!unverified.verified);
    assert_eq!(unverified.verified_at, None);
    assert!(matches!(
        store.update_verification_status("missing", true, None),
        Err(DatabaseError::NotFound(_))
    ));

    // Deleting a version cascades to its contracts, artifacts and deployments.
    store.delete_package(&v1.id).expect("delete");
    assert!(!store.package_exists(&name, "1.0.0").expect("exists"));
    assert!(store.list_contracts(&v1.id).expect("contracts").is_empty());
    assert!(matches!(
        store.get_deployment("evm", 1, &address),
        Err(DatabaseError::NotFound(_))
    ));
    assert!(matches!(
        store.delete_package(&v1.id),
        Err(DatabaseError::NotFound(_))
    ));
    assert_eq!(
        store.get_package_owner(&name).expect("owner").as_deref(),
        Some("owner-1")
    );

    // API keys.
    let label = unique_name();
    let (api_key, secret) = store.create_api_key(&label).expect("create key");
    assert!(secret.starts_with("creg_"));
    assert_ne!(api_key.key_hash, secret.as_bytes());

    let validated = store.validate_api_key(&secret).expect("validate");
    assert_eq!(validated.id, api_key.id);
    assert!(validated.last_used_at.is_some());
    assert!(store
        .list_api_keys()
        .expect("list keys")
        .iter()
        .any(|key| key.id == api_key.id));

    assert!(matches!(
        store.validate_api_key("creg_wrong"),
        Err(DatabaseError::NotFound(_))
    ));
    store.revoke_api_key(&api_key.id).expect("revoke");
    store.revoke_api_key(&api_key.id).expect("revoke again");
    assert!(matches!(
        store.validate_api_key(&secret),
        Err(DatabaseError::NotFound(_))
    ));
    assert!(matches!(
        store.revoke_api_key("missing"),
        Err(DatabaseError::NotFound(_))
    ));
}

/// Listing pages by name, one entry per name, with a literal substring search.
fn exercise_listing(store: &dyn Store) {
    let prefix = Uuid::new_v4().simple().to_string();
    let search = |text: String| PackageFilter {
        search: Some(text),
        ..Default::default()
    };

    for suffix in ["d", "b", "a", "c"] {
        store
            .create_package(&mock_package(&format!("{prefix}-{suffix}"), "1.0.0", "owner-1"))
            .expect("create");
    }
    let first = store
        .list_packages(&search(prefix.clone()), &Pagination::new(None, 2))
        .expect("list");
    let names: Vec<&str> = first.data.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec![format!("{prefix}-a"), format!("{prefix}-b")]);
    assert!(first.has_more);
    assert_eq!(first.next_cursor, Some(format!("{prefix}-b")));

    let second = store
        .list_packages(&search(prefix.clone()), &Pagination::new(first.next_cursor, 2))
        .expect("list");
    let names: Vec<&str> = second.data.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec![format!("{prefix}-c"), format!("{prefix}-d")]);
    assert!(!second.has_more);
    assert_eq!(second.next_cursor, None);

    // Versions of one name built with different tools stay one entry.
    let prefix = Uuid::new_v4().simple().to_string();
    let mixed = format!("{prefix}-aa");
    store
        .create_package(&mock_package(&mixed, "1.0.0", "owner-1"))
        .expect("create");
    store
        .create_package(&Package {
            builder: "hardhat".to_string(),
            ..mock_package(&mixed, "1.1.0", "owner-1")
        })
        .expect("create");
    store
        .create_package(&mock_package(&format!("{prefix}-bb"), "1.0.0", "owner-1"))
        .expect("create");

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = store
            .list_packages(&search(prefix.clone()), &Pagination::new(cursor, 1))
            .expect("list");
        seen.extend(page.data);
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].name, mixed);
    assert_eq!(seen[0].versions, vec!["1.1.0", "1.0.0"]);
    assert_eq!(seen[0].builders, vec!["foundry", "hardhat"]);
    assert_eq!(seen[0].chains, vec!["evm"]);
    assert_eq!(seen[1].name, format!("{prefix}-bb"));

    let hardhat = PackageFilter {
        project: Some("hardhat".to_string()),
        ..search(prefix.clone())
    };
    let page = store
        .list_packages(&hardhat, &Pagination::default())
        .expect("list");
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].versions, vec!["1.1.0"]);

    // `_` and `%` are plain characters in the search text.
    let prefix = Uuid::new_v4().simple().to_string();
    store
        .create_package(&mock_package(&format!("{prefix}abc"), "1.0.0", "owner-1"))
        .expect("create");
    for pattern in ["a_c", "a%", "_"] {
        assert!(store
            .list_packages(&search(format!("{prefix}{pattern}")), &Pagination::default())
            .expect("list")
            .data
            .is_empty());
    }
    assert_eq!(
        store
            .list_packages(&search(format!("{}ABC", prefix.to_uppercase())), &Pagination::default())
            .expect("list")
            .data
            .len(),
        1
    );
}

#[test]
fn test_sqlite_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("registry.db"), 5000, 4).expect("open");
    exercise_store(&store);
    exercise_listing(&store);
}

#[test]
fn test_sqlite_reopen_keeps_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("registry.db");
    let package = mock_package("persisted", "1.0.0", "owner-1");
    {
        let store = SqliteStore::open(&path, 5000, 1).expect("open");
        store.create_package(&package).expect("create");
    }

    let store = SqliteStore::open(&path, 5000, 1).expect("reopen");
    assert_eq!(store.get_package("persisted", "1.0.0").expect("get"), package);
}

#[test]
#[serial]
fn test_postgres_store() {
    let Ok(url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = PgStore::connect(&url, 4, Some(30_000)).expect("connect");
    exercise_store(&store);
    exercise_listing(&store);
}

// Shared by the SQLite and Postgres migrations: only column types both backends
// understand are used here.

diesel::table! {
    api_keys (id) {
        id -> Text,
        label -> Text,
        key_hash -> Binary,
        created_at -> Timestamp,
        last_used_at -> Nullable<Timestamp>,
        revoked_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    packages (id) {
        id -> Text,
        name -> Text,
        version -> Text,
        chain -> Text,
        builder -> Text,
        compiler_version -> Nullable<Text>,
        compiler_settings -> Nullable<Text>,
        metadata -> Text,
        owner_id -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    package_owners (name) {
        name -> Text,
        owner_id -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    contracts (id) {
        id -> Text,
        package_id -> Text,
        name -> Text,
        source_path -> Text,
        content_hash -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    artifacts (id) {
        id -> Text,
        contract_id -> Text,
        artifact_type -> Text,
        content -> Binary,
        content_hash -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    deployments (id) {
        id -> Text,
        package_id -> Text,
        contract_name -> Text,
        chain -> Text,
        chain_id -> BigInt,
        address -> Text,
        deployer -> Nullable<Text>,
        tx_hash -> Nullable<Text>,
        block_number -> Nullable<BigInt>,
        deployment_data -> Nullable<Text>,
        verified -> Bool,
        verified_at -> Nullable<Timestamp>,
        verified_on -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::joinable!(contracts -> packages (package_id));
diesel::joinable!(artifacts -> contracts (contract_id));
diesel::joinable!(deployments -> packages (package_id));

diesel::allow_tables_to_appear_in_same_query!(
    api_keys,
    packages,
    package_owners,
    contracts,
    artifacts,
    deployments,
);

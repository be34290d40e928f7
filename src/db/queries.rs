/// Implements [Store](super::Store) for a diesel adapter over the shared schema.
///
/// The adapter supplies `connection()`, its embedded `MIGRATIONS` and the
/// backend specific `LIST_PACKAGES_SQL`. All other statements are built with the
/// query builder and are rendered by diesel for the adapter's backend.
macro_rules! impl_store {
    ($store:ty, $conn:ty) => {
        const _: () = {
            use $crate::api::pagination::{PaginatedResponse, Pagination};
            use $crate::db::api_key::{generate_secret, hash_secret};
            use $crate::db::error::DatabaseError;
            use $crate::db::{
                deployment_cursor, parse_deployment_cursor, DeploymentFilter, PackageFilter,
                PublishBundle, Store,
            };
            use $crate::models::{
                ApiKey, Artifact, ArtifactType, Contract, Deployment, Package, PackageGroupRow,
                PackageOwner, PackageSummary,
            };
            use $crate::schema::{api_keys, artifacts, contracts, deployments, package_owners, packages};
            use $crate::util::now;
            use $crate::validation;
            use diesel::prelude::*;
            use diesel::sql_types::{BigInt, Nullable, Text};
            use diesel::upsert::excluded;
            use diesel_migrations::MigrationHarness;

            fn upsert_artifact(
                conn: &mut $conn,
                artifact: &Artifact,
            ) -> Result<usize, DatabaseError> {
                diesel::insert_into(artifacts::table)
                    .values(artifact)
                    .on_conflict((artifacts::contract_id, artifacts::artifact_type))
                    .do_update()
                    .set((
                        artifacts::content.eq(excluded(artifacts::content)),
                        artifacts::content_hash.eq(excluded(artifacts::content_hash)),
                    ))
                    .execute(conn)
                    .map_err(|err| {
                        DatabaseError::query(
                            format!(
                                "artifact {} of contract {}",
                                artifact.artifact_type, artifact.contract_id
                            ),
                            err,
                        )
                    })
            }

            fn insert_contract(conn: &mut $conn, contract: &Contract) -> Result<(), DatabaseError> {
                diesel::insert_into(contracts::table)
                    .values(contract)
                    .execute(conn)
                    .map_err(|err| {
                        DatabaseError::query(
                            format!("contract {} ({})", contract.name, contract.source_path),
                            err,
                        )
                    })?;
                Ok(())
            }

            fn insert_package(conn: &mut $conn, package: &Package) -> Result<(), DatabaseError> {
                diesel::insert_into(packages::table)
                    .values(package)
                    .execute(conn)
                    .map_err(|err| {
                        DatabaseError::query(
                            format!("package {}@{}", package.name, package.version),
                            err,
                        )
                    })?;
                Ok(())
            }

            impl Store for $store {
                fn migrate(&self) -> Result<(), DatabaseError> {
                    let mut conn = self.connection()?;
                    let migrations = conn
                        .run_pending_migrations(Self::MIGRATIONS)
                        .map_err(|err| DatabaseError::Migration(err.to_string()))?;
                    tracing::info!("Ran {} migrations", migrations.len());
                    Ok(())
                }

                fn create_package(&self, package: &Package) -> Result<Package, DatabaseError> {
                    let conn = &mut self.connection()?;
                    insert_package(conn, package)?;
                    Ok(package.clone())
                }

                fn get_package(&self, name: &str, version: &str) -> Result<Package, DatabaseError> {
                    let conn = &mut self.connection()?;
                    packages::table
                        .filter(packages::name.eq(name))
                        .filter(packages::version.eq(version))
                        .select(Package::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("package {name}@{version}"), err))
                }

                fn get_package_by_id(&self, id: &str) -> Result<Package, DatabaseError> {
                    let conn = &mut self.connection()?;
                    packages::table
                        .find(id)
                        .select(Package::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("package {id}"), err))
                }

                fn get_package_versions(
                    &self,
                    name: &str,
                    include_prerelease: bool,
                ) -> Result<Vec<String>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    let mut versions = packages::table
                        .filter(packages::name.eq(name))
                        .select(packages::version)
                        .load::<String>(conn)
                        .map_err(|err| DatabaseError::query(format!("versions of {name}"), err))?;

                    if !include_prerelease {
                        versions.retain(|version| !validation::is_prerelease(version));
                    }
                    validation::sort_versions_desc(&mut versions);
                    Ok(versions)
                }

                fn list_packages(
                    &self,
                    filter: &PackageFilter,
                    pagination: &Pagination,
                ) -> Result<PaginatedResponse<PackageSummary>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    let limit = pagination.limit();

                    let rows = diesel::sql_query(Self::LIST_PACKAGES_SQL)
                        .bind::<Nullable<Text>, _>(pagination.cursor().map(str::to_string))
                        .bind::<Nullable<Text>, _>(filter.search.as_deref().map(str::to_lowercase))
                        .bind::<Nullable<Text>, _>(filter.chain.clone())
                        .bind::<Nullable<Text>, _>(filter.project.clone())
                        .bind::<Nullable<Text>, _>(filter.version.clone())
                        .bind::<Nullable<Text>, _>(filter.contract.clone())
                        .bind::<BigInt, _>(limit + 1)
                        .load::<PackageGroupRow>(conn)
                        .map_err(|err| DatabaseError::query("list packages", err))?;

                    let summaries: Vec<PackageSummary> =
                        rows.into_iter().map(PackageSummary::from).collect();
                    Ok(PaginatedResponse::from_overfetch(summaries, limit, |summary| {
                        summary.name.clone()
                    }))
                }

                fn delete_package(&self, id: &str) -> Result<(), DatabaseError> {
                    let conn = &mut self.connection()?;
                    conn.transaction::<_, DatabaseError, _>(|conn| {
                        let contract_ids = contracts::table
                            .filter(contracts::package_id.eq(id))
                            .select(contracts::id);
                        diesel::delete(artifacts::table.filter(artifacts::contract_id.eq_any(contract_ids)))
                            .execute(conn)?;
                        diesel::delete(contracts::table.filter(contracts::package_id.eq(id)))
                            .execute(conn)?;
                        diesel::delete(deployments::table.filter(deployments::package_id.eq(id)))
                            .execute(conn)?;
                        let deleted = diesel::delete(packages::table.find(id)).execute(conn)?;
                        if deleted == 0 {
                            return Err(DatabaseError::NotFound(format!("package {id}")));
                        }
                        Ok(())
                    })
                }

                fn package_exists(&self, name: &str, version: &str) -> Result<bool, DatabaseError> {
                    let conn = &mut self.connection()?;
                    diesel::select(diesel::dsl::exists(
                        packages::table
                            .filter(packages::name.eq(name))
                            .filter(packages::version.eq(version)),
                    ))
                    .get_result::<bool>(conn)
                    .map_err(|err| DatabaseError::query(format!("package {name}@{version}"), err))
                }

                fn get_package_owner(&self, name: &str) -> Result<Option<String>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    package_owners::table
                        .find(name)
                        .select(package_owners::owner_id)
                        .first::<String>(conn)
                        .optional()
                        .map_err(|err| DatabaseError::query(format!("owner of {name}"), err))
                }

                fn set_package_owner(&self, name: &str, owner_id: &str) -> Result<bool, DatabaseError> {
                    let conn = &mut self.connection()?;
                    let owner = PackageOwner {
                        name: name.to_string(),
                        owner_id: owner_id.to_string(),
                        created_at: now(),
                    };
                    let inserted = diesel::insert_into(package_owners::table)
                        .values(&owner)
                        .on_conflict(package_owners::name)
                        .do_nothing()
                        .execute(conn)
                        .map_err(|err| DatabaseError::query(format!("owner of {name}"), err))?;
                    Ok(inserted == 1)
                }

                fn publish(&self, bundle: &PublishBundle) -> Result<Package, DatabaseError> {
                    let conn = &mut self.connection()?;
                    conn.transaction::<_, DatabaseError, _>(|conn| {
                        insert_package(conn, &bundle.package)?;
                        for entry in &bundle.contracts {
                            insert_contract(conn, &entry.contract)?;
                            for artifact in &entry.artifacts {
                                upsert_artifact(conn, artifact)?;
                            }
                        }
                        Ok(bundle.package.clone())
                    })
                }

                fn create_contract(&self, contract: &Contract) -> Result<Contract, DatabaseError> {
                    let conn = &mut self.connection()?;
                    insert_contract(conn, contract)?;
                    Ok(contract.clone())
                }

                fn get_contract(&self, package_id: &str, name: &str) -> Result<Contract, DatabaseError> {
                    let conn = &mut self.connection()?;
                    contracts::table
                        .filter(contracts::package_id.eq(package_id))
                        .filter(contracts::name.eq(name))
                        .order(contracts::source_path.asc())
                        .select(Contract::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("contract {name}"), err))
                }

                fn list_contracts(&self, package_id: &str) -> Result<Vec<Contract>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    contracts::table
                        .filter(contracts::package_id.eq(package_id))
                        .order((contracts::name.asc(), contracts::source_path.asc()))
                        .select(Contract::as_select())
                        .load(conn)
                        .map_err(|err| DatabaseError::query(format!("contracts of {package_id}"), err))
                }

                fn store_artifact(&self, artifact: &Artifact) -> Result<Artifact, DatabaseError> {
                    let conn = &mut self.connection()?;
                    upsert_artifact(conn, artifact)?;
                    artifacts::table
                        .filter(artifacts::contract_id.eq(&artifact.contract_id))
                        .filter(artifacts::artifact_type.eq(&artifact.artifact_type))
                        .select(Artifact::as_select())
                        .first(conn)
                        .map_err(|err| {
                            DatabaseError::query(format!("artifact {}", artifact.artifact_type), err)
                        })
                }

                fn get_artifact(
                    &self,
                    contract_id: &str,
                    kind: ArtifactType,
                ) -> Result<Artifact, DatabaseError> {
                    let conn = &mut self.connection()?;
                    artifacts::table
                        .filter(artifacts::contract_id.eq(contract_id))
                        .filter(artifacts::artifact_type.eq(kind.as_str()))
                        .select(Artifact::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("artifact {kind}"), err))
                }

                fn get_artifact_by_hash(&self, content_hash: &str) -> Result<Artifact, DatabaseError> {
                    let conn = &mut self.connection()?;
                    artifacts::table
                        .filter(artifacts::content_hash.eq(content_hash))
                        .order((artifacts::created_at.asc(), artifacts::id.asc()))
                        .select(Artifact::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("artifact {content_hash}"), err))
                }

                fn list_artifacts(&self, contract_id: &str) -> Result<Vec<Artifact>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    artifacts::table
                        .filter(artifacts::contract_id.eq(contract_id))
                        .order(artifacts::artifact_type.asc())
                        .select(Artifact::as_select())
                        .load(conn)
                        .map_err(|err| DatabaseError::query(format!("artifacts of {contract_id}"), err))
                }

                fn record_deployment(&self, deployment: &Deployment) -> Result<Deployment, DatabaseError> {
                    let conn = &mut self.connection()?;
                    diesel::insert_into(deployments::table)
                        .values(deployment)
                        .execute(conn)
                        .map_err(|err| {
                            DatabaseError::query(
                                format!(
                                    "deployment {}:{}:{}",
                                    deployment.chain, deployment.chain_id, deployment.address
                                ),
                                err,
                            )
                        })?;
                    Ok(deployment.clone())
                }

                fn get_deployment(
                    &self,
                    chain: &str,
                    chain_id: i64,
                    address: &str,
                ) -> Result<Deployment, DatabaseError> {
                    let conn = &mut self.connection()?;
                    deployments::table
                        .filter(deployments::chain.eq(chain))
                        .filter(deployments::chain_id.eq(chain_id))
                        .filter(deployments::address.eq(address))
                        .select(Deployment::as_select())
                        .first(conn)
                        .map_err(|err| {
                            DatabaseError::query(format!("deployment {chain}:{chain_id}:{address}"), err)
                        })
                }

                fn list_deployments(
                    &self,
                    filter: &DeploymentFilter,
                    pagination: &Pagination,
                ) -> Result<PaginatedResponse<Deployment>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    let limit = pagination.limit();

                    let mut query = deployments::table
                        .select(Deployment::as_select())
                        .into_boxed::<<$conn as diesel::Connection>::Backend>();
                    if let Some(chain) = &filter.chain {
                        query = query.filter(deployments::chain.eq(chain.clone()));
                    }
                    if let Some(chain_id) = filter.chain_id {
                        query = query.filter(deployments::chain_id.eq(chain_id));
                    }
                    if let Some(package_id) = &filter.package_id {
                        query = query.filter(deployments::package_id.eq(package_id.clone()));
                    }
                    if let Some(package_name) = &filter.package_name {
                        let package_ids = packages::table
                            .filter(packages::name.eq(package_name.clone()))
                            .select(packages::id);
                        query = query.filter(deployments::package_id.eq_any(package_ids));
                    }
                    if let Some(verified) = filter.verified {
                        query = query.filter(deployments::verified.eq(verified));
                    }
                    if let Some(cursor) = pagination.cursor() {
                        let (created_at, id) = parse_deployment_cursor(cursor)?;
                        query = query.filter(
                            deployments::created_at.gt(created_at).or(deployments::created_at
                                .eq(created_at)
                                .and(deployments::id.gt(id))),
                        );
                    }

                    let rows: Vec<Deployment> = query
                        .order((deployments::created_at.asc(), deployments::id.asc()))
                        .limit(limit + 1)
                        .load(conn)
                        .map_err(|err| DatabaseError::query("list deployments", err))?;

                    Ok(PaginatedResponse::from_overfetch(rows, limit, deployment_cursor))
                }

                fn update_verification_status(
                    &self,
                    deployment_id: &str,
                    verified: bool,
                    verified_on: Option<String>,
                ) -> Result<Deployment, DatabaseError> {
                    let conn = &mut self.connection()?;
                    let verified_at = verified.then(now);
                    let updated = diesel::update(deployments::table.find(deployment_id))
                        .set((
                            deployments::verified.eq(verified),
                            deployments::verified_at.eq(verified_at),
                            deployments::verified_on.eq(verified_on),
                        ))
                        .execute(conn)
                        .map_err(|err| DatabaseError::query(format!("deployment {deployment_id}"), err))?;
                    if updated == 0 {
                        return Err(DatabaseError::NotFound(format!("deployment {deployment_id}")));
                    }

                    deployments::table
                        .find(deployment_id)
                        .select(Deployment::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("deployment {deployment_id}"), err))
                }

                fn create_api_key(&self, label: &str) -> Result<(ApiKey, String), DatabaseError> {
                    let conn = &mut self.connection()?;
                    let secret = generate_secret();
                    let api_key = ApiKey {
                        id: uuid::Uuid::new_v4().to_string(),
                        label: label.to_string(),
                        key_hash: hash_secret(&secret),
                        created_at: now(),
                        last_used_at: None,
                        revoked_at: None,
                    };

                    diesel::insert_into(api_keys::table)
                        .values(&api_key)
                        .execute(conn)
                        .map_err(|err| DatabaseError::query(format!("api key {label}"), err))?;

                    Ok((api_key, secret))
                }

                fn validate_api_key(&self, secret: &str) -> Result<ApiKey, DatabaseError> {
                    let conn = &mut self.connection()?;
                    let mut api_key = api_keys::table
                        .filter(api_keys::key_hash.eq(hash_secret(secret)))
                        .filter(api_keys::revoked_at.is_null())
                        .select(ApiKey::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query("api key", err))?;

                    let used_at = now();
                    diesel::update(api_keys::table.find(&api_key.id))
                        .set(api_keys::last_used_at.eq(Some(used_at)))
                        .execute(conn)
                        .map_err(|err| DatabaseError::query(format!("api key {}", api_key.id), err))?;
                    api_key.last_used_at = Some(used_at);

                    Ok(api_key)
                }

                fn list_api_keys(&self) -> Result<Vec<ApiKey>, DatabaseError> {
                    let conn = &mut self.connection()?;
                    api_keys::table
                        .order((api_keys::created_at.asc(), api_keys::id.asc()))
                        .select(ApiKey::as_select())
                        .load(conn)
                        .map_err(|err| DatabaseError::query("api keys", err))
                }

                fn revoke_api_key(&self, id: &str) -> Result<(), DatabaseError> {
                    let conn = &mut self.connection()?;
                    let api_key = api_keys::table
                        .find(id)
                        .select(ApiKey::as_select())
                        .first(conn)
                        .map_err(|err| DatabaseError::query(format!("api key {id}"), err))?;

                    if !api_key.is_revoked() {
                        diesel::update(api_keys::table.find(id))
                            .set(api_keys::revoked_at.eq(Some(now())))
                            .execute(conn)
                            .map_err(|err| DatabaseError::query(format!("api key {id}"), err))?;
                    }
                    Ok(())
                }
            }
        };
    };
}

pub(crate) use impl_store;

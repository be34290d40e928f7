#[macro_use]
extern crate rocket;

use contract_registry::api::{
    api_key::{ApiKey, ApiKeysResponse, CreateApiKeyRequest},
    deployment::{
        DeploymentQuery, DeploymentResponse, RecordDeploymentRequest, VerificationStatusRequest,
    },
    package::{
        ContractResponse, PackageQuery, PackageResponse, PackageSummaryResponse, PublishRequest,
        VersionsResponse, DEFAULT_CHAIN,
    },
    pagination::{PaginatedResponse, Pagination},
    verify::VerifyRequest,
    ApiError, ApiResult, EmptyResponse, ErrorResponse,
};
use contract_registry::chain::ChainRegistry;
use contract_registry::config::Config;
use contract_registry::db::{self, Store};
use contract_registry::handlers::verification::VerificationResult;
use contract_registry::handlers::{DeploymentService, PackageService, VerificationService};
use contract_registry::middleware::token_auth::{AdminAuth, TokenAuth};
use contract_registry::models::ArtifactType;
use contract_registry::util::load_env;
use rocket::data::{Limits, ToByteUnit};
use rocket::http::{ContentType, Header};
use rocket::serde::json::Json;
use rocket::{Request, State};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Responder)]
struct ArtifactResponse {
    data: Vec<u8>,
    content_type: ContentType,
}

#[derive(Responder)]
#[response(content_type = "application/gzip")]
struct ArchiveResponse {
    data: Vec<u8>,
    disposition: Header<'static>,
}

#[get("/packages?<query..>")]
fn list_packages(
    packages: &State<PackageService>,
    query: PackageQuery,
) -> ApiResult<PaginatedResponse<PackageSummaryResponse>> {
    let page = packages.list(&query.filter(), &query.pagination())?;
    Ok(Json(page.map(PackageSummaryResponse::from)))
}

#[get("/packages/<name>?<prerelease>")]
fn package_versions(
    packages: &State<PackageService>,
    name: &str,
    prerelease: Option<bool>,
) -> ApiResult<VersionsResponse> {
    let versions = packages.get_versions(name, prerelease.unwrap_or(false))?;
    Ok(Json(VersionsResponse {
        name: name.to_string(),
        versions,
    }))
}

#[get("/packages/<name>/<version>?<prerelease>")]
fn get_package(
    packages: &State<PackageService>,
    name: &str,
    version: &str,
    prerelease: Option<bool>,
) -> ApiResult<PackageResponse> {
    let package = packages.get_resolved(name, version, prerelease.unwrap_or(false))?;
    Ok(Json(package.into()))
}

#[post("/packages/<name>/<version>", data = "<request>")]
fn publish(
    auth: TokenAuth,
    packages: &State<PackageService>,
    name: &str,
    version: &str,
    request: Json<PublishRequest>,
) -> ApiResult<PackageResponse> {
    let package = packages.publish(name, version, auth.owner_id(), &request)?;
    Ok(Json(package.into()))
}

#[delete("/packages/<name>/<version>")]
fn delete_package(
    auth: TokenAuth,
    packages: &State<PackageService>,
    name: &str,
    version: &str,
) -> ApiResult<EmptyResponse> {
    packages.delete(name, version, auth.owner_id())?;
    Ok(Json(EmptyResponse))
}

#[get("/packages/<name>/<version>/contracts")]
fn package_contracts(
    packages: &State<PackageService>,
    name: &str,
    version: &str,
) -> ApiResult<Vec<ContractResponse>> {
    let contracts = packages.get_contracts(name, version)?;
    Ok(Json(contracts.into_iter().map(ContractResponse::from).collect()))
}

#[get("/packages/<name>/<version>/contracts/<contract>")]
fn package_contract(
    packages: &State<PackageService>,
    name: &str,
    version: &str,
    contract: &str,
) -> ApiResult<ContractResponse> {
    let contract = packages.get_contract(name, version, contract)?;
    Ok(Json(contract.into()))
}

#[get("/packages/<name>/<version>/contracts/<contract>/artifacts/<kind>")]
fn contract_artifact(
    packages: &State<PackageService>,
    name: &str,
    version: &str,
    contract: &str,
    kind: &str,
) -> Result<ArtifactResponse, ApiError> {
    let kind: ArtifactType = kind.parse().map_err(ApiError::BadRequest)?;
    let artifact = packages.get_artifact(name, version, contract, kind)?;
    Ok(ArtifactResponse {
        data: artifact.content,
        content_type: if kind.is_json() {
            ContentType::JSON
        } else {
            ContentType::Plain
        },
    })
}

#[get("/packages/<name>/<version>/archive")]
fn package_archive(
    packages: &State<PackageService>,
    name: &str,
    version: &str,
) -> Result<ArchiveResponse, ApiError> {
    let (package, data) = packages.get_archive(name, version)?;
    let file_name = format!("{}-{}.tar.gz", package.name, package.version);
    Ok(ArchiveResponse {
        data,
        disposition: Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{file_name}\""),
        ),
    })
}

#[get("/packages/<name>/<version>/deployments?<pagination..>")]
fn package_deployments(
    deployments: &State<DeploymentService>,
    name: &str,
    version: &str,
    pagination: Pagination,
) -> ApiResult<PaginatedResponse<DeploymentResponse>> {
    let page = deployments.list_by_package(name, version, &pagination)?;
    Ok(Json(page.map(DeploymentResponse::from)))
}

#[post("/deployments", data = "<request>")]
fn record_deployment(
    _auth: TokenAuth,
    deployments: &State<DeploymentService>,
    request: Json<RecordDeploymentRequest>,
) -> ApiResult<DeploymentResponse> {
    let deployment = deployments.record(&request)?;
    Ok(Json(deployment.into()))
}

#[get("/deployments?<query..>")]
fn list_deployments(
    deployments: &State<DeploymentService>,
    query: DeploymentQuery,
) -> ApiResult<PaginatedResponse<DeploymentResponse>> {
    let page = deployments.list(&query, &query.pagination())?;
    Ok(Json(page.map(DeploymentResponse::from)))
}

#[get("/deployments/<chain_id>/<address>?<chain>")]
fn get_deployment(
    deployments: &State<DeploymentService>,
    chain_id: i64,
    address: &str,
    chain: Option<&str>,
) -> ApiResult<DeploymentResponse> {
    let deployment = deployments.get(chain.unwrap_or(DEFAULT_CHAIN), chain_id, address)?;
    Ok(Json(deployment.into()))
}

#[put("/deployments/<chain_id>/<address>/verification?<chain>", data = "<request>")]
fn update_verification_status(
    _auth: TokenAuth,
    deployments: &State<DeploymentService>,
    chain_id: i64,
    address: &str,
    chain: Option<&str>,
    request: Json<VerificationStatusRequest>,
) -> ApiResult<DeploymentResponse> {
    let request = request.into_inner();
    let deployment = deployments.update_verification_status(
        chain.unwrap_or(DEFAULT_CHAIN),
        chain_id,
        address,
        request.verified,
        request.verified_on,
    )?;
    Ok(Json(deployment.into()))
}

#[post("/verify", data = "<request>")]
async fn verify(
    verification: &State<VerificationService>,
    request: Json<VerifyRequest>,
) -> ApiResult<VerificationResult> {
    let result = verification.verify(&request).await?;
    Ok(Json(result))
}

#[post("/api_keys", data = "<request>")]
fn create_api_key(
    _admin: AdminAuth,
    store: &State<Arc<dyn Store>>,
    request: Json<CreateApiKeyRequest>,
) -> ApiResult<ApiKey> {
    let (api_key, secret) = store.create_api_key(&request.label)?;
    info!("Created API key {} ({})", api_key.id, api_key.label);
    Ok(Json(ApiKey {
        secret: Some(secret),
        ..api_key.into()
    }))
}

#[get("/api_keys")]
fn list_api_keys(_admin: AdminAuth, store: &State<Arc<dyn Store>>) -> ApiResult<ApiKeysResponse> {
    let api_keys = store.list_api_keys()?;
    Ok(Json(ApiKeysResponse {
        api_keys: api_keys.into_iter().map(ApiKey::from).collect(),
    }))
}

#[delete("/api_keys/<id>")]
fn revoke_api_key(
    _admin: AdminAuth,
    store: &State<Arc<dyn Store>>,
    id: &str,
) -> ApiResult<EmptyResponse> {
    store.revoke_api_key(id)?;
    info!("Revoked API key {}", id);
    Ok(Json(EmptyResponse))
}

/// Catch 401 from the auth guards.
#[catch(401)]
fn unauthorized() -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: "Missing or invalid API key".to_string(),
    })
}

/// Catch 403 from the admin guard when no admin token is configured.
#[catch(403)]
fn forbidden() -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: "Forbidden".to_string(),
    })
}

/// Catch 404 not founds.
#[catch(404)]
fn not_found(request: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: format!("No route for {}", request.uri()),
    })
}

// Indicates the service is running
#[get("/health")]
fn health() -> String {
    "true".to_string()
}

// Launch the rocket server.
#[launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    load_env();

    let config = Config::from_env().expect("Invalid configuration");
    let store = db::connect(&config.database).expect("Failed to open database");
    let chains = ChainRegistry::with_defaults();
    info!("Chain verifiers: {:?}", chains.chains());

    let figment = rocket::Config::figment().merge((
        "limits",
        Limits::default()
            .limit("json", 32.mebibytes())
            .limit("data-form", 32.mebibytes()),
    ));

    rocket::custom(figment)
        .manage(PackageService::new(store.clone()))
        .manage(DeploymentService::new(store.clone()))
        .manage(VerificationService::new(store.clone(), chains))
        .manage(store)
        .manage(config)
        .mount(
            "/",
            routes![
                list_packages,
                package_versions,
                get_package,
                publish,
                delete_package,
                package_contracts,
                package_contract,
                contract_artifact,
                package_archive,
                package_deployments,
                record_deployment,
                list_deployments,
                get_deployment,
                update_verification_status,
                verify,
                create_api_key,
                list_api_keys,
                revoke_api_key,
                health,
            ],
        )
        .register("/", catchers![unauthorized, forbidden, not_found])
}

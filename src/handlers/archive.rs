use crate::models::{Artifact, Contract, Package};
use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use std::io;
use tar::{Builder, Header};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ArchiveManifest<'a> {
    name: &'a str,
    version: &'a str,
    chain: &'a str,
    builder: &'a str,
    contracts: Vec<&'a str>,
    created_at: DateTime<Utc>,
}

/// Root directory of a package archive, e.g. `my-pkg-1.0.0`.
pub fn archive_root(package: &Package) -> String {
    format!("{}-{}", package.name, package.version)
}

/// Builds a gzip-compressed tarball of a package version in memory.
///
/// The archive holds `manifest.json` followed by one directory per contract
/// containing each of its artifacts, all under [archive_root].
pub fn build_archive(
    package: &Package,
    contracts: &[(Contract, Vec<Artifact>)],
) -> io::Result<Vec<u8>> {
    let root = archive_root(package);
    let mtime = package.created_at.and_utc().timestamp().max(0) as u64;

    let manifest = ArchiveManifest {
        name: &package.name,
        version: &package.version,
        chain: &package.chain,
        builder: &package.builder,
        contracts: contracts.iter().map(|(contract, _)| contract.name.as_str()).collect(),
        created_at: package.created_at.and_utc(),
    };
    let manifest = serde_json::to_vec_pretty(&manifest).map_err(io::Error::other)?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = Builder::new(encoder);
    append_file(&mut tar, &format!("{root}/{MANIFEST_FILE}"), &manifest, mtime)?;

    for (contract, artifacts) in contracts {
        for artifact in artifacts {
            let Some(kind) = artifact.kind() else {
                continue;
            };
            let path = format!("{root}/{}/{}", contract.name, kind.file_name());
            append_file(&mut tar, &path, &artifact.content, mtime)?;
        }
    }

    tar.into_inner()?.finish()
}

fn append_file(
    tar: &mut Builder<GzEncoder<Vec<u8>>>,
    path: &str,
    data: &[u8],
    mtime: u64,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    tar.append_data(&mut header, path, data)
}

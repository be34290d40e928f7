use regex::Regex;
use semver::{Version, VersionReq};
use std::cmp::Ordering;
use std::sync::LazyLock;

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{0,62}[a-z0-9]$").expect("valid package name pattern")
});

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address pattern"));

/// Package names are 2-64 lowercase letters, digits and single hyphens, starting
/// with a letter and never ending with a hyphen.
pub fn is_valid_package_name(name: &str) -> bool {
    PACKAGE_NAME.is_match(name) && !name.contains("--") && !name.contains("..")
}

/// Returns the normalized form of a semantic version (no leading `v`), or
/// `None` if it isn't a full major.minor.patch version.
pub fn validate_or_format_semver(version: &str) -> Option<String> {
    let version_trimmed = version.strip_prefix('v').unwrap_or(version);

    match Version::parse(version_trimmed) {
        Ok(parsed_version) => Some(parsed_version.to_string()),
        Err(_) => None,
    }
}

pub fn is_valid_address(address: &str) -> bool {
    ADDRESS.is_match(address)
}

pub fn is_valid_chain_id(chain_id: i64) -> bool {
    chain_id > 0
}

pub fn is_prerelease(version: &str) -> bool {
    Version::parse(version).is_ok_and(|parsed| !parsed.pre.is_empty())
}

/// Orders by semver precedence. Unparseable versions sort below every valid one.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

pub fn sort_versions_desc(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(b, a));
}

/// Picks the highest version, skipping prereleases unless asked for them.
pub fn resolve_latest(versions: &[String], include_prerelease: bool) -> Option<String> {
    versions
        .iter()
        .filter_map(|version| Version::parse(version).ok())
        .filter(|version| include_prerelease || version.pre.is_empty())
        .max()
        .map(|version| version.to_string())
}

/// Picks the highest version satisfying a requirement such as `^1.2` or `>=1, <2`.
pub fn resolve_requirement(versions: &[String], requirement: &str) -> Option<String> {
    let requirement = VersionReq::parse(requirement).ok()?;
    versions
        .iter()
        .filter_map(|version| Version::parse(version).ok())
        .filter(|version| requirement.matches(version))
        .max()
        .map(|version| version.to_string())
}

/// Decodes a stored bytecode artifact. Artifacts hold hex text (with or without
/// `0x`); anything that isn't hex is returned untouched.
pub fn decode_bytecode(content: &[u8]) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(content) else {
        return content.to_vec();
    };
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };

    hex::decode(padded).unwrap_or_else(|_| content.to_vec())
}

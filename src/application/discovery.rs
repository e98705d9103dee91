//! Remote module discovery.
//!
//! Finds the upstream directory holding a prebuilt module for the running
//! OS version, falling back to the codename table when upstream is unreachable.

use crate::domain::{
    AppError, CodenameTable, ModuleLocation, ModuleSource, OsVersion, Result,
};
use crate::infrastructure::GithubClient;

/// Module location from the fallback table, if the series is known.
#[must_use]
pub fn fallback_location(
    module_root: &str,
    version: &OsVersion,
    table: &CodenameTable,
) -> Option<ModuleLocation> {
    table.codename_for(version).map(|codename| {
        ModuleLocation::new(module_root, codename, version.as_str(), ModuleSource::Fallback)
    })
}

/// Find `version` in an already fetched listing of `(codename, versions)`.
#[must_use]
pub fn locate_in_listing(
    module_root: &str,
    version: &OsVersion,
    listing: &[(String, Vec<String>)],
) -> Option<ModuleLocation> {
    listing.iter().find_map(|(codename, versions)| {
        versions
            .iter()
            .any(|v| v == version.as_str())
            .then(|| ModuleLocation::new(module_root, codename, version.as_str(), ModuleSource::Remote))
    })
}

/// Codename directories ordered so the table's guess is listed first.
fn search_order(mut codenames: Vec<String>, preferred: Option<&str>) -> Vec<String> {
    codenames.retain(|c| c.starts_with("TrueNAS"));
    if let Some(pref) = preferred {
        if let Some(pos) = codenames.iter().position(|c| c == pref) {
            let first = codenames.remove(pos);
            codenames.insert(0, first);
        }
    }
    codenames
}

fn manual_build_hint(version: &OsVersion) -> String {
    format!(
        "No prebuilt led-ugreen module is available for TrueNAS {version}. \
         Build the module manually (see build-scripts/truenas in the upstream repository) \
         and place led-ugreen.ko in the persistent directory"
    )
}

/// Query upstream for the module matching `version`.
///
/// # Errors
/// Returns a network error when upstream is unreachable and the series has
/// no fallback entry, and an invalid-data error when upstream has no build
/// for this version.
pub async fn discover_module(
    client: &GithubClient,
    version: &OsVersion,
    table: &CodenameTable,
) -> Result<ModuleLocation> {
    let module_root = client.repository().module_root.clone();

    match fetch_listing(client, version, table).await {
        Ok(listing) => {
            if let Some(location) = locate_in_listing(&module_root, version, &listing) {
                tracing::info!(
                    codename = %location.codename,
                    version = %location.version,
                    "Found prebuilt module upstream"
                );
                return Ok(location);
            }
            Err(AppError::InvalidData {
                message: manual_build_hint(version),
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "Upstream listing unavailable, using fallback table");
            fallback_location(&module_root, version, table).ok_or_else(|| AppError::Network {
                message: format!(
                    "{e}; no fallback entry for series {}. {}",
                    version.series(),
                    manual_build_hint(version)
                ),
                source: None,
            })
        }
    }
}

/// List codename directories and their version subdirectories.
///
/// Stops early once the version has been found.
async fn fetch_listing(
    client: &GithubClient,
    version: &OsVersion,
    table: &CodenameTable,
) -> Result<Vec<(String, Vec<String>)>> {
    let module_root = client.repository().module_root.clone();
    let codenames = client.list_directories(&module_root).await?;
    let ordered = search_order(codenames, table.codename_for(version));

    let mut listing = Vec::with_capacity(ordered.len());
    for codename in ordered {
        let versions = client
            .list_directories(&format!("{}/{codename}", module_root.trim_end_matches('/')))
            .await?;
        let found = versions.iter().any(|v| v == version.as_str());
        listing.push((codename, versions));
        if found {
            break;
        }
    }
    Ok(listing)
}

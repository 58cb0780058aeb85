//! Reconciles a user parameter file against the release template.
//!
//! The merged store always spans exactly the release template's key set:
//! user values override release defaults, release-only keys keep their
//! default, user-only keys are dropped.

use crate::error::ParamsResult;
use crate::store::{ParamEntry, ParamStore};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Key-set differences found while merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeDiagnostics {
    /// Keys the release defines but the user file lacks (kept at default).
    pub missing: BTreeSet<String>,
    /// Keys the user file defines but the release no longer knows (dropped).
    pub obsolete: BTreeSet<String>,
}

impl MergeDiagnostics {
    /// Returns true if both templates had identical key sets.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.obsolete.is_empty()
    }
}

/// Result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Release template rows with user values applied.
    pub merged: ParamStore,
    /// Drift between the two templates.
    pub diagnostics: MergeDiagnostics,
}

/// Merges `user` into `release`.
///
/// Row order, namespace grouping, comments and header of the release
/// template are preserved exactly; the order of the user file is irrelevant.
#[must_use]
pub fn merge(user: &ParamStore, release: &ParamStore) -> MergeOutcome {
    let user_values: HashMap<&str, &ParamEntry> =
        user.scoped_data().map(|(_, e)| (e.key.as_str(), e)).collect();
    let release_keys: BTreeSet<&str> = release.data_keys().into_iter().collect();

    let missing = release_keys
        .iter()
        .filter(|k| !user_values.contains_key(*k))
        .map(|k| (*k).to_string())
        .collect();
    let obsolete = user_values
        .keys()
        .filter(|k| !release_keys.contains(*k))
        .map(|k| (*k).to_string())
        .collect();

    let entries = release
        .entries()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            if !row.is_namespace() {
                if let Some(user_row) = user_values.get(row.key.as_str()) {
                    row.value.clone_from(&user_row.value);
                }
            }
            row
        })
        .collect();

    MergeOutcome {
        merged: ParamStore::from_parts(
            release.comments().to_vec(),
            release.header().to_vec(),
            entries,
        ),
        diagnostics: MergeDiagnostics { missing, obsolete },
    }
}

/// Loads both templates, merges them, logs the drift and writes the merged
/// store to `output`.
pub fn merge_files(
    user_path: impl AsRef<Path>,
    release_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> ParamsResult<MergeOutcome> {
    let user = ParamStore::load(user_path.as_ref())?;
    let release = ParamStore::load(release_path.as_ref())?;
    let outcome = merge(&user, &release);

    for key in &outcome.diagnostics.missing {
        warn!(key = %key, "parameter missing from user file, using release default");
    }
    for key in &outcome.diagnostics.obsolete {
        warn!(key = %key, "parameter no longer part of the release, dropping it");
    }

    outcome.merged.save(output.as_ref())?;
    info!(
        path = %output.as_ref().display(),
        keys = outcome.merged.data_keys().len(),
        "merged user parameters into release template"
    );
    Ok(outcome)
}

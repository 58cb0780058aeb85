//! Embedding of a signed license into a parameter store.

use crate::store::{Encoding, ParamStore};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Namespace reserved for the installed license.
pub const LICENSE_NAMESPACE: &str = "license";
/// Key of the license blob inside [`LICENSE_NAMESPACE`].
pub const LICENSE_KEY: &str = "db_lic_key";

/// Writes `record` (base64 encoded) into the reserved license slot,
/// creating the namespace if absent and replacing any previous value.
///
/// Embedding the same record twice leaves the store unchanged.
pub fn embed_license(config: &mut ParamStore, record: &[u8]) {
    config.upsert(
        LICENSE_NAMESPACE,
        LICENSE_KEY,
        Encoding::Base64,
        BASE64.encode(record),
    );
}

/// Returns the decoded license blob currently embedded in `config`, if any.
#[must_use]
pub fn embedded_license(config: &ParamStore) -> Option<Vec<u8>> {
    let entry = config.get_in(LICENSE_NAMESPACE, LICENSE_KEY)?;
    BASE64.decode(entry.value.trim()).ok()
}

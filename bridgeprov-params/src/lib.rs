//! Parameter files for fleet provisioning.
//!
//! This crate handles:
//! - Loading and rewriting the comma-separated parameter format while
//!   keeping leading comments, row order and namespace grouping intact
//! - Merging a user parameter file into a release template, reporting
//!   missing and obsolete keys
//! - Assigning a unique per-device IP, hostname and SSID from a running index
//! - Embedding a signed license into the reserved license namespace

mod embed;
mod error;
mod index;
mod merge;
mod store;

pub use embed::{embed_license, embedded_license, LICENSE_KEY, LICENSE_NAMESPACE};
pub use error::{ParamsError, ParamsResult};
pub use index::{
    assign_index, indexed_name, IndexOverrides, IndexReport, KEY_AP_SSID, KEY_HOSTNAME,
    KEY_STATION_IP,
};
pub use merge::{merge, merge_files, MergeDiagnostics, MergeOutcome};
pub use store::{EntryKind, Encoding, ParamEntry, ParamStore, REQUIRED_COLUMNS};

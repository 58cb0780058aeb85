//! Ordered key/value parameter store backed by the comma-separated
//! partition description format.
//!
//! ```text
//! # leading comment lines are kept verbatim
//! key,type,encoding,value
//! settings,namespace,,
//! wifi_hostname,data,string,Drone
//! ip_sta,data,string,192.168.50.10
//! ```
//!
//! A `namespace` row opens a scope that every following `data` row belongs
//! to until the next `namespace` row. Data rows that precede the first
//! namespace row belong to the implicit default namespace.

use crate::error::{ParamsError, ParamsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Column names every parameter file must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["key", "type", "encoding", "value"];

/// Row type of a parameter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Opens a namespace scope; carries no value.
    Namespace,
    /// A key/value pair inside the current namespace.
    Data,
}

impl EntryKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "namespace" => Some(Self::Namespace),
            "data" => Some(Self::Data),
            _ => None,
        }
    }

    /// Returns the textual form used in parameter files.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Data => "data",
        }
    }
}

/// Value encoding of a data row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    String,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Binary,
    Base64,
    Hex2bin,
    /// Any encoding this tool does not interpret; kept verbatim.
    Other(String),
}

impl Encoding {
    /// Parses an encoding column. An empty column yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let encoding = match raw {
            "" => return None,
            "string" => Self::String,
            "u8" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "u64" => Self::U64,
            "i64" => Self::I64,
            "binary" => Self::Binary,
            "base64" => Self::Base64,
            "hex2bin" => Self::Hex2bin,
            other => Self::Other(other.to_string()),
        };
        Some(encoding)
    }

    /// Returns the textual form used in parameter files.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::Hex2bin => "hex2bin",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a parameter file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Key (or namespace name for namespace rows).
    pub key: String,
    /// Row type.
    pub kind: EntryKind,
    /// Value encoding; `None` for namespace rows.
    pub encoding: Option<Encoding>,
    /// Raw value text.
    pub value: String,
}

impl ParamEntry {
    /// Creates a namespace row.
    pub fn namespace(name: impl Into<String>) -> Self {
        Self {
            key: name.into(),
            kind: EntryKind::Namespace,
            encoding: None,
            value: String::new(),
        }
    }

    /// Creates a data row.
    pub fn data(key: impl Into<String>, encoding: Encoding, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: EntryKind::Data,
            encoding: Some(encoding),
            value: value.into(),
        }
    }

    /// Returns true if this row opens a namespace.
    #[must_use]
    pub fn is_namespace(&self) -> bool {
        self.kind == EntryKind::Namespace
    }

    fn column(&self, name: &str) -> &str {
        match name {
            "key" => &self.key,
            "type" => self.kind.as_str(),
            "encoding" => self.encoding.as_ref().map_or("", Encoding::as_str),
            _ => &self.value,
        }
    }
}

/// An ordered parameter file: leading comments, header and rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamStore {
    comments: Vec<String>,
    header: Vec<String>,
    entries: Vec<ParamEntry>,
}

impl ParamStore {
    /// Creates an empty store with the canonical header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            comments: Vec::new(),
            header: REQUIRED_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            entries: Vec::new(),
        }
    }

    /// Reads and parses a parameter file.
    pub fn load(path: impl AsRef<Path>) -> ParamsResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Parses parameter file text.
    pub fn parse(text: &str) -> ParamsResult<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut comments = Vec::new();
        let mut body_offset = 0;
        for line in text.split_inclusive('\n') {
            if !line.trim_start().starts_with('#') {
                break;
            }
            comments.push(line.trim_end_matches(['\r', '\n']).to_string());
            body_offset += line.len();
        }
        let comment_lines = comments.len() as u64;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text[body_offset..].as_bytes());

        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if header.iter().all(String::is_empty) {
            return Err(ParamsError::InvalidHeader("missing header line".to_string()));
        }
        for required in REQUIRED_COLUMNS {
            if !header.iter().any(|h| h == required) {
                return Err(ParamsError::InvalidHeader(format!(
                    "missing column '{required}'"
                )));
            }
        }
        if let Some(unknown) = header.iter().find(|h| !REQUIRED_COLUMNS.contains(&h.as_str())) {
            return Err(ParamsError::InvalidHeader(format!("unknown column '{unknown}'")));
        }
        let position = |name: &str| header.iter().position(|h| h == name).unwrap_or(0);
        let (key_at, type_at, enc_at, value_at) = (
            position("key"),
            position("type"),
            position("encoding"),
            position("value"),
        );

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line()) + comment_lines;
            let field = |at: usize| record.get(at).unwrap_or("");

            let key = field(key_at).trim().to_string();
            if key.is_empty() {
                return Err(ParamsError::InvalidRow {
                    line,
                    reason: "empty key".to_string(),
                });
            }
            let kind = EntryKind::parse(field(type_at)).ok_or_else(|| ParamsError::InvalidRow {
                line,
                reason: format!("unknown row type '{}'", field(type_at)),
            })?;
            let encoding = match kind {
                EntryKind::Namespace => None,
                EntryKind::Data => Encoding::parse(field(enc_at)),
            };
            entries.push(ParamEntry {
                key,
                kind,
                encoding,
                value: field(value_at).to_string(),
            });
        }

        Ok(Self {
            comments,
            header,
            entries,
        })
    }

    /// Serializes the store back to parameter file text.
    pub fn to_csv_string(&self) -> ParamsResult<String> {
        let mut out = String::new();
        for comment in &self.comments {
            out.push_str(comment);
            out.push('\n');
        }

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for entry in &self.entries {
            writer.write_record(self.header.iter().map(|column| entry.column(column)))?;
        }
        let body = writer
            .into_inner()
            .map_err(|e| ParamsError::Io(e.into_error()))?;
        out.push_str(&String::from_utf8_lossy(&body));
        Ok(out)
    }

    /// Writes the store to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> ParamsResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_csv_string()?)?;
        Ok(())
    }

    /// Leading comment lines, verbatim and without line terminators.
    #[must_use]
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Column names in file order.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// All rows in file order.
    #[must_use]
    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    /// Number of rows (namespace rows included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over data rows together with the namespace they belong to
    /// (`None` for the implicit default namespace).
    pub fn scoped_data(&self) -> impl Iterator<Item = (Option<&str>, &ParamEntry)> {
        let mut current: Option<&str> = None;
        self.entries.iter().filter_map(move |entry| {
            if entry.is_namespace() {
                current = Some(entry.key.as_str());
                None
            } else {
                Some((current, entry))
            }
        })
    }

    /// Keys of all data rows in file order.
    #[must_use]
    pub fn data_keys(&self) -> Vec<&str> {
        self.scoped_data().map(|(_, e)| e.key.as_str()).collect()
    }

    /// Names of all namespace rows in file order.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_namespace())
            .map(|e| e.key.as_str())
            .collect()
    }

    /// Returns the first data row with the given key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| !e.is_namespace() && e.key == key)
    }

    /// Returns the value of the first data row with the given key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|e| e.value.as_str())
    }

    /// Returns the data row `key` inside `namespace`.
    #[must_use]
    pub fn get_in(&self, namespace: &str, key: &str) -> Option<&ParamEntry> {
        self.scoped_data()
            .find(|(ns, e)| *ns == Some(namespace) && e.key == key)
            .map(|(_, e)| e)
    }

    /// Returns the namespace the first data row with `key` belongs to.
    #[must_use]
    pub fn namespace_of(&self, key: &str) -> Option<&str> {
        self.scoped_data()
            .find(|(_, e)| e.key == key)
            .and_then(|(ns, _)| ns)
    }

    /// Replaces the value of the first data row with the given key.
    /// Returns false if no such row exists.
    pub fn set_value(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| !e.is_namespace() && e.key == key)
        {
            Some(entry) => {
                entry.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Appends a row at the end of the store.
    pub fn push(&mut self, entry: ParamEntry) {
        self.entries.push(entry);
    }

    /// Sets `key` inside `namespace`, creating the namespace at the end of
    /// the store if absent and appending the row at the end of the
    /// namespace block if the key is new.
    pub fn upsert(&mut self, namespace: &str, key: &str, encoding: Encoding, value: impl Into<String>) {
        let value = value.into();

        let Some(ns_at) = self
            .entries
            .iter()
            .position(|e| e.is_namespace() && e.key == namespace)
        else {
            self.entries.push(ParamEntry::namespace(namespace));
            self.entries.push(ParamEntry::data(key, encoding, value));
            return;
        };

        let block_end = self.entries[ns_at + 1..]
            .iter()
            .position(ParamEntry::is_namespace)
            .map_or(self.entries.len(), |offset| ns_at + 1 + offset);

        match self.entries[ns_at + 1..block_end]
            .iter_mut()
            .find(|e| e.key == key)
        {
            Some(existing) => {
                existing.encoding = Some(encoding);
                existing.value = value;
            }
            None => self
                .entries
                .insert(block_end, ParamEntry::data(key, encoding, value)),
        }
    }

    pub(crate) fn from_parts(comments: Vec<String>, header: Vec<String>, entries: Vec<ParamEntry>) -> Self {
        Self {
            comments,
            header,
            entries,
        }
    }
}

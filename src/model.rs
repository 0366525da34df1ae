// Shared data model, per spec §3.
//
// These types are the currency the readers (journal.rs, files/) and the
// formatters (formatter.rs) pass between each other. None of them carry
// behavior of their own beyond small accessors; the logic that produces and
// consumes them lives in the reader and formatter modules.

use std::collections::BTreeMap;

/// One systemd journal record, already translated out of the native
/// `JournalRecord` (a bare field map) into the cursor/timestamp-aware shape
/// the formatters need.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub fields: BTreeMap<String, String>,
    pub cursor: String,
    pub monotonic_ts: u64,
    pub realtime_ts: u64,
}

impl JournalEntry {
    pub fn message(&self) -> Option<&str> {
        self.fields.get("MESSAGE").map(String::as_str)
    }
}

/// One line read out of a sandbox file by the files-API reader.
///
/// `offset` is the byte offset of the first character of `message` in the
/// source file; `size` is the byte length of `message`, excluding the
/// trailing newline that terminated it in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub message: String,
    pub offset: i64,
    pub size: i64,
}

impl Line {
    /// The offset one past this line's trailing newline - where the next
    /// line (if any) begins.
    pub fn next_offset(&self) -> i64 {
        self.offset + self.size + 1
    }
}

/// Context a files-API formatter needs beyond the `Line` itself, since the
/// JSON shape for files records embeds the task identity (§4.1).
#[derive(Debug, Clone, Default)]
pub struct FilesContext {
    pub agent_id: String,
    pub framework_id: String,
    pub executor_id: String,
    pub container_id: String,
    pub file: String,
}

/// Canonical identity of a task, resolved by the Task-ID Resolver (§4.4).
#[derive(Debug, Clone)]
pub struct CanonicalTaskId {
    pub id: String,
    pub agent_id: String,
    pub framework_id: String,
    pub executor_id: String,
    /// Outermost to innermost container id in the nesting chain.
    pub container_ids: Vec<String>,
    pub is_pod: bool,
}

impl CanonicalTaskId {
    pub fn innermost_container_id(&self) -> Option<&str> {
        self.container_ids.last().map(String::as_str)
    }
}

/// The raw upstream files-API reply shape: `{data, offset}`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FilesChunk {
    pub data: String,
    pub offset: i64,
}

/// One entry of a sandbox directory listing, as returned by
/// `/files/browse` (§4.3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BrowseEntry {
    pub gid: String,
    pub mode: String,
    #[serde(deserialize_with = "deserialize_mtime")]
    pub mtime: u64,
    pub nlink: u64,
    pub path: String,
    pub size: u64,
}

/// The upstream encodes `mtime` as a float-looking integer, e.g.
/// `1513020278.0` (§9). Strip the `.0` and parse the remainder as `u64`
/// rather than round-tripping through `f64`, which would silently lose
/// precision for timestamps beyond 2^53.
fn deserialize_mtime<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let raw = serde_json::Value::deserialize(deserializer)?;
    let as_str = match &raw {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "mtime must be a number or string, got {other}"
            )))
        }
    };

    let stripped = as_str.strip_suffix(".0").unwrap_or(&as_str);

    stripped
        .parse()
        .map_err(|e| serde::de::Error::custom(format!("mtime {as_str:?} is not an integer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtime_strips_trailing_dot_zero() {
        let entry: BrowseEntry = serde_json::from_str(
            r#"{"gid":"root","mode":"rw","mtime":1513020278.0,"nlink":1,"path":"/a","size":0}"#,
        )
        .unwrap();

        assert_eq!(entry.mtime, 1513020278);
    }

    #[test]
    fn mtime_accepts_plain_integer_string() {
        let entry: BrowseEntry = serde_json::from_str(
            r#"{"gid":"root","mode":"rw","mtime":"42","nlink":1,"path":"/a","size":0}"#,
        )
        .unwrap();

        assert_eq!(entry.mtime, 42);
    }
}

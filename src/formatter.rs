// Wire formatters, per spec §4.1.
//
// Formatters are stateless and total over well-formed input: they never
// fail to produce *some* bytes for a record, except that a missing
// `MESSAGE` field yields zero bytes for that one record (§4.1, text
// format). A record for which marshaling genuinely panics (e.g. `serde_json`
// refusing non-finite floats, which can't happen with the field types we
// use) is the caller's problem to catch, not this module's - see §4.1's
// "fatal for that record" note, implemented by the streaming handler
// logging and skipping rather than by this module returning `Result`.

use serde::Serialize;
use serde_json::json;

use crate::model::{FilesContext, JournalEntry, Line};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
    Sse,
}

impl Format {
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Text => "text/plain;charset=utf-8",
            Format::Json => "application/json",
            Format::Sse => "text/event-stream",
        }
    }
}

/// Select a `Format` from an `Accept` header value, per the table in §4.1.
/// Returns `None` if none of the recognized media types are present, which
/// the Request Binder turns into a 400.
pub fn negotiate(accept: &str) -> Option<Format> {
    // A real `Accept` header can list several media ranges with quality
    // values; we only need to recognize the few types this gateway speaks,
    // so a substring scan in priority order is enough and avoids pulling in
    // a full media-type parser for four fixed alternatives.
    let accept = accept.to_ascii_lowercase();

    if accept.contains("text/event-stream") {
        Some(Format::Sse)
    } else if accept.contains("application/json") {
        Some(Format::Json)
    } else if accept.contains("text/plain")
        || accept.contains("text/html")
        || accept.contains("*/*")
        || accept.is_empty()
    {
        Some(Format::Text)
    } else {
        None
    }
}

#[derive(Serialize)]
struct JournalJson<'a> {
    fields: &'a std::collections::BTreeMap<String, String>,
    cursor: &'a str,
    monotonic_timestamp: u64,
    realtime_timestamp: u64,
}

/// Format one journal entry. `with_id` controls whether an SSE `id:` line
/// is emitted - per §4.1, always true for streaming endpoints, and
/// otherwise driven by whether the client asked to resume via
/// `Last-Event-ID` semantics.
pub fn format_journal_entry(entry: &JournalEntry, format: Format, with_id: bool) -> Vec<u8> {
    match format {
        Format::Text => match entry.message() {
            Some(msg) => format_journal_text(entry.realtime_ts, msg).into_bytes(),
            None => Vec::new(),
        },
        Format::Json => {
            let mut buf = journal_json(entry);
            buf.push(b'\n');
            buf
        }
        Format::Sse => {
            let json = String::from_utf8(journal_json(entry)).expect("serde_json emits utf-8");
            format_sse(with_id.then_some(entry.cursor.as_str()), &json)
        }
    }
}

fn journal_json(entry: &JournalEntry) -> Vec<u8> {
    let payload = JournalJson {
        fields: &entry.fields,
        cursor: &entry.cursor,
        monotonic_timestamp: entry.monotonic_ts,
        realtime_timestamp: entry.realtime_ts,
    };

    serde_json::to_vec(&payload).expect("JournalJson always serializes")
}

fn format_journal_text(realtime_ts_micros: u64, message: &str) -> String {
    use chrono::{Local, TimeZone};

    let secs = (realtime_ts_micros / 1_000_000) as i64;
    let nanos = ((realtime_ts_micros % 1_000_000) * 1_000) as u32;

    let formatted = match Local.timestamp_opt(secs, nanos) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "0000-00-00 00:00:00".to_string(),
    };

    format!("{formatted}: {message}\n")
}

/// Format one files-API line. `ctx` supplies the task identity embedded in
/// the JSON shape (§4.1); it is unused for text/SSE.
pub fn format_line(line: &Line, ctx: &FilesContext, format: Format) -> Vec<u8> {
    match format {
        Format::Text => format!("{}\n", line.message).into_bytes(),
        Format::Json => {
            let payload = json!({
                "fields": {
                    "MESSAGE": line.message,
                    "AGENT_ID": ctx.agent_id,
                    "EXECUTOR_ID": ctx.executor_id,
                    "FRAMEWORK_ID": ctx.framework_id,
                    "CONTAINER_ID": ctx.container_id,
                    "FILE": ctx.file,
                }
            });

            let mut buf = serde_json::to_vec(&payload).expect("json! payload always serializes");
            buf.push(b'\n');
            buf
        }
        Format::Sse => {
            let id = (line.offset > 0 && line.size > 0)
                .then(|| (line.offset + line.size).to_string());
            format_sse(id.as_deref(), &line.message)
        }
    }
}

/// `id: <id>\ndata: <data>\n\n`, omitting the `id:` line when `id` is
/// `None`, per §4.1/§8 (invariant 5).
fn format_sse(id: Option<&str>, data: &str) -> Vec<u8> {
    let mut out = String::new();

    if let Some(id) = id {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }

    // SSE forbids a literal newline inside a `data:` line; a multi-line
    // payload has to repeat the `data:` prefix per line. Our `data` is
    // always either a fully-escaped JSON document or a raw log line that
    // may itself contain newlines if the source mixed binary content into
    // text output, so guard against both.
    for chunk in data.split('\n') {
        out.push_str("data: ");
        out.push_str(chunk);
        out.push('\n');
    }

    out.push('\n');
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(message: Option<&str>) -> JournalEntry {
        let mut fields = BTreeMap::new();
        if let Some(m) = message {
            fields.insert("MESSAGE".to_string(), m.to_string());
        }

        JournalEntry {
            fields,
            cursor: "s=1;i=2;b=3;m=4;t=5;x=6".to_string(),
            monotonic_ts: 42,
            realtime_ts: 1_700_000_000_000_000,
        }
    }

    #[test]
    fn text_without_message_is_empty() {
        assert!(format_journal_entry(&entry(None), Format::Text, false).is_empty());
    }

    #[test]
    fn text_with_message_has_trailing_newline() {
        let out = format_journal_entry(&entry(Some("hi")), Format::Text, false);
        let s = String::from_utf8(out).unwrap();
        assert!(s.ends_with("hi\n"));
        assert_eq!(s.matches('\n').count(), 1);
    }

    #[test]
    fn sse_journal_has_id_when_requested() {
        let out = format_journal_entry(&entry(Some("hi")), Format::Sse, true);
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("id: s=1;i=2;b=3;m=4;t=5;x=6\n"));
        assert!(s.ends_with("\n\n"));
    }

    #[test]
    fn sse_journal_omits_id_when_not_requested() {
        let out = format_journal_entry(&entry(Some("hi")), Format::Sse, false);
        let s = String::from_utf8(out).unwrap();
        assert!(!s.starts_with("id:"));
        assert!(s.starts_with("data:"));
    }

    #[test]
    fn sse_files_id_only_when_offset_and_size_positive() {
        let ctx = FilesContext::default();

        let first_line = Line {
            message: "hello".to_string(),
            offset: 0,
            size: 5,
        };
        let out = format_line(&first_line, &ctx, Format::Sse);
        assert!(!String::from_utf8(out).unwrap().starts_with("id:"));

        let later_line = Line {
            message: "world".to_string(),
            offset: 6,
            size: 5,
        };
        let out = format_line(&later_line, &ctx, Format::Sse);
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("id: 11\n"));
    }

    #[test]
    fn json_files_message_matches_raw_line() {
        let ctx = FilesContext {
            agent_id: "a".to_string(),
            framework_id: "f".to_string(),
            executor_id: "e".to_string(),
            container_id: "c".to_string(),
            file: "stdout".to_string(),
        };
        let line = Line {
            message: "a log line".to_string(),
            offset: 0,
            size: 10,
        };

        let out = format_line(&line, &ctx, Format::Json);
        let s = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(s.trim_end()).unwrap();
        assert_eq!(value["fields"]["MESSAGE"], "a log line");
    }

    #[test]
    fn negotiate_prefers_sse_then_json_then_text() {
        assert_eq!(negotiate("text/event-stream"), Some(Format::Sse));
        assert_eq!(negotiate("application/json"), Some(Format::Json));
        assert_eq!(negotiate("text/plain"), Some(Format::Text));
        assert_eq!(negotiate("text/html"), Some(Format::Text));
        assert_eq!(negotiate("*/*"), Some(Format::Text));
        assert_eq!(negotiate("application/xml"), None);
    }
}

// Request Binder, per spec §4.5.
//
// Turns query parameters, the `Accept`/`Last-Event-ID`/`Authorization`
// headers, and the legacy `Range: entries=...` header into the option sets
// the journal and files readers are built from, rejecting malformed input
// or forbidden combinations before any reader is constructed.

use crate::cursor::CursorRef;
use crate::error::{GatewayError, Result};
use crate::filters::Match;
use crate::formatter::{self, Format};

/// Options common to both readers once parsed off the wire, before either
/// `journal::JournalReaderBuilder` or `files::FilesReaderBuilder` turns
/// them into a concrete reader.
#[derive(Debug, Clone, Default)]
pub struct JournalOptions {
    pub cursor: Option<String>,
    pub limit: u64,
    pub skip_next: u64,
    pub skip_prev: u64,
    pub read_reverse: bool,
    pub filters: Vec<Match>,
    pub with_sse_id: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FilesOptions {
    pub offset: i64,
    pub read_from_end: bool,
    pub skip: i64,
    pub limit: Option<u64>,
    pub read_reverse: bool,
    pub postfix: Option<String>,
}

/// Select a `Format` from an `Accept` header value, per §4.1/§4.5. A
/// missing header is treated the same as `*/*`.
pub fn negotiate_format(accept: Option<&str>) -> Result<Format> {
    formatter::negotiate(accept.unwrap_or(""))
        .ok_or_else(|| GatewayError::ClientInput(format!("unsupported Accept: {accept:?}")))
}

/// Pull a single query parameter's first occurrence, if present.
fn query_param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn query_all<'a>(pairs: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    pairs
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

fn parse_u64(raw: &str, name: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| GatewayError::ClientInput(format!("{name} must be an unsigned integer")))
}

fn parse_i64(raw: &str, name: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| GatewayError::ClientInput(format!("{name} must be an integer")))
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw, "1" | "true" | "yes" | "on")
}

/// Legacy `Range: entries=<cursor>:<skip>:<num>` header, per §4.5. Exactly
/// three colon-separated fields; `skip` may be negative.
pub struct EntriesRange {
    pub cursor: String,
    pub skip: i64,
    pub num: u64,
}

pub fn parse_entries_range(raw: &str) -> Result<EntriesRange> {
    let triplet = raw
        .strip_prefix("entries=")
        .ok_or_else(|| GatewayError::ClientInput("Range header must start with entries=".into()))?;

    let fields: Vec<&str> = triplet.split(':').collect();
    if fields.len() != 3 {
        return Err(GatewayError::ClientInput(
            "Range: entries=<cursor>:<skip>:<num> requires exactly three fields".into(),
        ));
    }

    Ok(EntriesRange {
        cursor: fields[0].to_string(),
        skip: parse_i64(fields[1], "Range skip")?,
        num: parse_u64(fields[2], "Range num")?,
    })
}

/// Parse the journal-facing option set. `is_stream` rejects `limit` and
/// `read_reverse`, per §4.2/§4.5/§8 (invariant 7).
pub fn parse_journal_options(
    pairs: &[(String, String)],
    range_header: Option<&str>,
    last_event_id: Option<&str>,
    is_stream: bool,
) -> Result<JournalOptions> {
    let mut opts = JournalOptions::default();

    if let Some(raw) = query_param(pairs, "limit") {
        opts.limit = parse_u64(raw, "limit")?;
    }
    if let Some(raw) = query_param(pairs, "skip_next") {
        opts.skip_next = parse_u64(raw, "skip_next")?;
    }
    if let Some(raw) = query_param(pairs, "skip_prev") {
        opts.skip_prev = parse_u64(raw, "skip_prev")?;
    }
    if let Some(raw) = query_param(pairs, "read_reverse") {
        opts.read_reverse = parse_bool(raw);
    }
    if let Some(raw) = query_param(pairs, "cursor") {
        match CursorRef::parse(raw)? {
            CursorRef::Literal(s) => opts.cursor = Some(s),
            // `BEG` needs no translation: no cursor and no skip is already
            // the journal's head position.
            CursorRef::Beginning => {}
            // Per §9's design note, `END` translates to `skip_prev(1)`
            // rather than a literal cursor seek - `JournalReaderBuilder`
            // already seeks to tail first when a skip_prev is requested
            // without a cursor, landing the reader just before the last
            // entry.
            CursorRef::End => {
                if opts.skip_prev == 0 {
                    opts.skip_prev = 1;
                }
            }
        }
    }

    for raw in query_all(pairs, "filter") {
        if let Some(m) = crate::filters::parse_filter_param(raw) {
            opts.filters.push(m);
        } else {
            return Err(GatewayError::ClientInput(format!(
                "filter {raw:?} must have the form key:value"
            )));
        }
    }

    if let Some(raw) = range_header {
        let legacy = parse_entries_range(raw)?;
        opts.cursor = Some(legacy.cursor);
        if legacy.skip < 0 {
            opts.skip_prev = (-legacy.skip) as u64;
            opts.skip_next = 0;
        } else {
            opts.skip_next = legacy.skip as u64;
            opts.skip_prev = 0;
        }
        opts.limit = legacy.num;
    }

    // `Last-Event-ID` overrides `cursor` and nulls the skip counters, per
    // §4.3/§8 (invariant 6). It's stream-only; a client sending it on a
    // range request is harmless to honor the same way, so we don't special
    // case that.
    if let Some(id) = last_event_id {
        opts.cursor = Some(id.to_string());
        opts.skip_next = 0;
        opts.skip_prev = 0;
    }

    opts.with_sse_id = is_stream || last_event_id.is_some();

    validate_journal_options(&opts, is_stream)?;

    Ok(opts)
}

fn validate_journal_options(opts: &JournalOptions, is_stream: bool) -> Result<()> {
    if opts.skip_next > 0 && opts.skip_prev > 0 {
        return Err(GatewayError::ClientInput(
            "skip_next and skip_prev cannot both be set".into(),
        ));
    }

    if is_stream && opts.limit > 0 {
        return Err(GatewayError::ClientInput(
            "limit is forbidden on streaming endpoints".into(),
        ));
    }

    if is_stream && opts.read_reverse {
        return Err(GatewayError::ClientInput(
            "read_reverse is forbidden on streaming endpoints".into(),
        ));
    }

    Ok(())
}

/// Parse the files-API-facing option set. `BEG`/`END` cursor sentinels
/// resolve to `offset=0` / `read_from_end`, per §9.
pub fn parse_files_options(
    pairs: &[(String, String)],
    last_event_id: Option<&str>,
    is_stream: bool,
) -> Result<FilesOptions> {
    let mut opts = FilesOptions::default();

    if let Some(raw) = query_param(pairs, "cursor") {
        match CursorRef::parse(raw)? {
            CursorRef::Beginning => opts.offset = 0,
            CursorRef::End => opts.read_from_end = true,
            CursorRef::Literal(s) => {
                opts.offset = parse_i64(&s, "cursor")?;
            }
        }
    }

    if let Some(raw) = query_param(pairs, "skip") {
        opts.skip = parse_i64(raw, "skip")?;
    }

    if let Some(raw) = query_param(pairs, "limit") {
        let n = parse_u64(raw, "limit")?;
        opts.limit = (n > 0).then_some(n);
    }

    if let Some(raw) = query_param(pairs, "read_reverse") {
        opts.read_reverse = parse_bool(raw);
    }

    if opts.skip < 0 {
        opts.read_reverse = true;
    }

    opts.postfix = query_param(pairs, "postfix").map(str::to_string);

    if let Some(id) = last_event_id {
        let offset = parse_i64(id, "Last-Event-ID")?;
        opts.offset = offset;
        opts.read_from_end = false;
        opts.skip = 0;
    }

    if is_stream && opts.limit.is_some() {
        return Err(GatewayError::ClientInput(
            "limit is forbidden on streaming endpoints".into(),
        ));
    }

    if is_stream && opts.read_reverse {
        return Err(GatewayError::ClientInput(
            "reverse reads are forbidden on streaming endpoints".into(),
        ));
    }

    Ok(opts)
}

/// `Authorization: token=...` or `Cookie: dcos-acs-auth-cookie=token=...`,
/// per §4.5's token table. Returns the raw `token=a.b.c` value, unparsed -
/// callers that need a validated `BearerToken` call `auth::BearerToken::parse`
/// on it.
pub fn extract_raw_token(authorization: Option<&str>, cookie: Option<&str>) -> Option<String> {
    if let Some(raw) = authorization {
        return Some(raw.to_string());
    }

    let cookie = cookie?;
    cookie.split(';').map(str::trim).find_map(|kv| {
        kv.strip_prefix("dcos-acs-auth-cookie=")
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(kvs: &[(&str, &str)]) -> Vec<(String, String)> {
        kvs.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rejects_both_skip_directions() {
        let p = pairs(&[("skip_next", "1"), ("skip_prev", "1")]);
        assert!(parse_journal_options(&p, None, None, false).is_err());
    }

    #[test]
    fn journal_end_cursor_translates_to_skip_prev_one() {
        let p = pairs(&[("cursor", "END")]);
        let opts = parse_journal_options(&p, None, None, false).unwrap();
        assert_eq!(opts.cursor, None);
        assert_eq!(opts.skip_prev, 1);
    }

    #[test]
    fn journal_beg_cursor_is_a_no_op() {
        let p = pairs(&[("cursor", "BEG")]);
        let opts = parse_journal_options(&p, None, None, false).unwrap();
        assert_eq!(opts.cursor, None);
        assert_eq!(opts.skip_prev, 0);
        assert_eq!(opts.skip_next, 0);
    }

    #[test]
    fn limit_forbidden_on_stream() {
        let p = pairs(&[("limit", "5")]);
        assert!(parse_journal_options(&p, None, None, true).is_err());
    }

    #[test]
    fn read_reverse_forbidden_on_stream() {
        let p = pairs(&[("read_reverse", "true")]);
        assert!(parse_journal_options(&p, None, None, true).is_err());
    }

    #[test]
    fn last_event_id_overrides_cursor_and_nulls_skip() {
        let p = pairs(&[
            ("cursor", "s=1;i=1;b=1;m=1;t=1;x=1"),
            ("skip_next", "3"),
        ]);
        let opts = parse_journal_options(&p, None, Some("s=2;i=2;b=2;m=2;t=2;x=2"), true).unwrap();
        assert_eq!(opts.cursor.as_deref(), Some("s=2;i=2;b=2;m=2;t=2;x=2"));
        assert_eq!(opts.skip_next, 0);
    }

    #[test]
    fn negative_skip_flips_files_reader_to_reverse() {
        let p = pairs(&[("skip", "-2")]);
        let opts = parse_files_options(&p, None, false).unwrap();
        assert!(opts.read_reverse);
    }

    #[test]
    fn files_cursor_sentinels_resolve() {
        let beg = parse_files_options(&pairs(&[("cursor", "BEG")]), None, false).unwrap();
        assert_eq!(beg.offset, 0);
        assert!(!beg.read_from_end);

        let end = parse_files_options(&pairs(&[("cursor", "END")]), None, false).unwrap();
        assert!(end.read_from_end);
    }

    #[test]
    fn entries_range_overrides_query_params() {
        let legacy = parse_entries_range("entries=s=1;i=1;b=1;m=1;t=1;x=1:-3:10").unwrap();
        assert_eq!(legacy.skip, -3);
        assert_eq!(legacy.num, 10);
    }

    #[test]
    fn token_prefers_authorization_header() {
        let token = extract_raw_token(Some("token=a.b.c"), Some("dcos-acs-auth-cookie=token=x.y.z"));
        assert_eq!(token.as_deref(), Some("token=a.b.c"));
    }

    #[test]
    fn token_falls_back_to_cookie() {
        let token = extract_raw_token(None, Some("other=1; dcos-acs-auth-cookie=token=x.y.z"));
        assert_eq!(token.as_deref(), Some("token=x.y.z"));
    }
}

// Journal cursor handling, per spec §3 (Data model / Cursor) and §9
// (sentinel cursors).
//
// A cursor is opaque to us except for its shape: six `;`-separated
// `key=hexvalue` fields with keys `s`, `i`, `b`, `m`, `t`, `x` in that
// order. We never construct one ourselves (the journal library hands them
// out via `Journal::cursor()`); we only validate what the client sends back
// to us and reverse the percent-encoding a browser/curl will have applied.

use percent_encoding::percent_decode_str;

use crate::error::{GatewayError, Result};

const CURSOR_FIELDS: [&str; 6] = ["s", "i", "b", "m", "t", "x"];

/// A cursor as understood by the Request Binder: either a literal journal
/// cursor string, or one of the two sentinel aliases from §9/§4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorRef {
    Literal(String),
    Beginning,
    End,
}

impl CursorRef {
    /// Percent-decode `raw` and classify it. An empty string is not a valid
    /// `CursorRef` — callers treat "no cursor parameter" as `None` before
    /// reaching here.
    pub fn parse(raw: &str) -> Result<Self> {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|e| GatewayError::ClientInput(format!("cursor is not valid utf-8: {e}")))?
            .into_owned();

        match decoded.as_str() {
            "BEG" => Ok(CursorRef::Beginning),
            "END" => Ok(CursorRef::End),
            _ => {
                validate_shape(&decoded)?;
                Ok(CursorRef::Literal(decoded))
            }
        }
    }
}

/// Validate that `cursor` has the shape `s=..;i=..;b=..;m=..;t=..;x=..`
/// without attempting to interpret the hex payloads themselves - the
/// journal library is the authority on whether the values are meaningful.
pub fn validate_shape(cursor: &str) -> Result<()> {
    let fields: Vec<&str> = cursor.split(';').collect();

    if fields.len() != CURSOR_FIELDS.len() {
        return Err(GatewayError::ClientInput(format!(
            "cursor must have {} fields, found {}",
            CURSOR_FIELDS.len(),
            fields.len()
        )));
    }

    for (field, expected_key) in fields.iter().zip(CURSOR_FIELDS.iter()) {
        let (key, value) = field.split_once('=').ok_or_else(|| {
            GatewayError::ClientInput(format!("cursor field {field:?} is not key=value"))
        })?;

        if key != *expected_key {
            return Err(GatewayError::ClientInput(format!(
                "cursor field {field:?} has key {key:?}, expected {expected_key:?}"
            )));
        }

        if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GatewayError::ClientInput(format!(
                "cursor field {field:?} has a non-hex value"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        "s=1234;i=5678;b=deadbeef;m=1;t=2;x=3".to_string()
    }

    #[test]
    fn accepts_well_formed_cursor() {
        assert!(validate_shape(&sample()).is_ok());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(validate_shape("s=1;i=2").is_err());
    }

    #[test]
    fn rejects_out_of_order_keys() {
        assert!(validate_shape("i=1;s=2;b=3;m=4;t=5;x=6").is_err());
    }

    #[test]
    fn rejects_non_hex_value() {
        assert!(validate_shape("s=zz;i=1;b=2;m=3;t=4;x=5").is_err());
    }

    #[test]
    fn percent_decode_round_trips() {
        let raw = sample();
        let encoded: String = percent_encoding::utf8_percent_encode(
            &raw,
            percent_encoding::NON_ALPHANUMERIC,
        )
        .to_string();

        let parsed = CursorRef::parse(&encoded).unwrap();
        assert_eq!(parsed, CursorRef::Literal(raw));
    }

    #[test]
    fn sentinels_are_recognized() {
        assert_eq!(CursorRef::parse("BEG").unwrap(), CursorRef::Beginning);
        assert_eq!(CursorRef::parse("END").unwrap(), CursorRef::End);
    }
}

// Download decoration, per spec §4.8.
//
// Wraps a reader's bytes with a `Content-Disposition` filename and
// gzip-encodes the body. Downloads are always bounded (a single sandbox
// file, or a browse listing already materialized in memory), so encoding
// eagerly into a `Vec<u8>` is simpler than a streaming encoder and still
// keeps the whole response in one write to the client.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{GatewayError, Result};

/// `<prefix>-<var1>-<var2>-…-<postfix>.log.gz`, per §4.8. `postfix` is the
/// optional user-supplied suffix; omitted when empty.
pub fn filename(prefix: &str, vars: &[&str], postfix: Option<&str>) -> String {
    let mut parts: Vec<&str> = std::iter::once(prefix).chain(vars.iter().copied()).collect();

    if let Some(postfix) = postfix.filter(|p| !p.is_empty()) {
        parts.push(postfix);
    }

    format!("{}.log.gz", parts.join("-"))
}

pub fn content_disposition(filename: &str) -> String {
    format!("attachment; filename={filename}")
}

pub fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body)
        .map_err(|e| GatewayError::Internal(format!("gzip encode failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| GatewayError::Internal(format!("gzip encode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_joins_prefix_vars_and_postfix() {
        let name = filename("nodelogd", &["fw", "exec"], Some("extra"));
        assert_eq!(name, "nodelogd-fw-exec-extra.log.gz");
    }

    #[test]
    fn filename_omits_empty_postfix() {
        let name = filename("nodelogd", &["fw"], Some(""));
        assert_eq!(name, "nodelogd-fw.log.gz");
    }

    #[test]
    fn gzip_round_trips_via_flate2_decoder() {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let compressed = gzip(b"hello world").unwrap();
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();

        assert_eq!(out, "hello world");
    }
}

// Streaming HTTP Handler, per spec §4.6.
//
// Two response shapes share this module: a bounded "range" response (pull
// the reader to completion, write one body) and an open-ended "stream"
// response (pump the reader on a timer, writing chunks as they arrive,
// until the client disconnects). Journal reads are synchronous pulls;
// files-API reads are async upstream calls, so the stream pump for each is
// its own small loop rather than one generic driver - but both converge on
// the same channel-backed `tide::Body` so `http_server.rs` doesn't need to
// care which reader it's looking at.

use std::time::Duration;

use async_std::channel::bounded;
use async_std::task;
use futures::stream::TryStreamExt;
use log::warn;
use tide::{Body, Response, StatusCode};

use crate::error::GatewayError;
use crate::files::FilesReader;
use crate::formatter::{format_journal_entry, format_line, Format};
use crate::journal::JournalReader;
use crate::model::FilesContext;

/// Journal streaming endpoints poll at most this often when idle, per §4.6
/// ("≤1 s for journal").
const JOURNAL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Files-API streaming endpoints poll much faster, per §4.6 ("~100 µs for
/// files") - the upstream calls themselves are the real rate limiter.
const FILES_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// How many unsent chunks the channel backing a stream response may hold
/// before the pump task blocks. Small on purpose: back-pressure from a slow
/// client should stall the pump rather than let it run unbounded ahead.
const CHANNEL_DEPTH: usize = 16;

pub fn base_headers(resp: &mut Response, format: Format) {
    resp.insert_header("Content-Type", format.content_type());
    resp.insert_header("Cache-Control", "no-cache");
    resp.insert_header("Connection", "keep-alive");
    resp.insert_header("Access-Control-Allow-Origin", "*");
    resp.insert_header("Transfer-Encoding", "chunked");
}

/// Drain a journal reader to completion and build the bounded response,
/// per §4.6 ("Range"). 204 on an empty body, per §7 (NotFound/"no matching
/// content" convention read onto range responses).
pub fn journal_range_response(
    mut reader: JournalReader,
    format: Format,
    with_id: bool,
) -> crate::error::Result<Response> {
    let mut body = Vec::new();

    loop {
        match reader.next()? {
            Some(entry) => body.extend(format_journal_entry(&entry, format, with_id)),
            None => break,
        }
    }

    let mut resp = if body.is_empty() {
        Response::new(StatusCode::NoContent)
    } else {
        let mut r = Response::new(StatusCode::Ok);
        r.set_body(body);
        r
    };

    base_headers(&mut resp, format);
    resp.insert_header("X-Journal-Skip-Next", reader.actual_skipped_next().to_string());
    resp.insert_header("X-Journal-Skip-Prev", reader.actual_skipped_prev().to_string());

    Ok(resp)
}

/// Drain a files reader to completion, per §4.6 ("Range"). The files
/// reader's `next_line` is async (it may need upstream fetches), unlike
/// the journal's synchronous pull.
///
/// The whole body is built in memory before any of it is attached to the
/// `Response`, so a missing remote file is still "before any byte is
/// written" even if it's only discovered partway through the loop (e.g.
/// the sandbox file is removed between two chunk fetches). Per §7, a
/// read endpoint turns that into 204 with whatever was read so far,
/// rather than a 404 - 404 is reserved for browse/download.
pub async fn files_range_response(
    mut reader: FilesReader,
    ctx: FilesContext,
    format: Format,
) -> crate::error::Result<Response> {
    let mut body = Vec::new();

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => body.extend(format_line(&line, &ctx, format)),
            Ok(None) => break,
            Err(GatewayError::NotFound(_)) => break,
            Err(e) => return Err(e),
        }
    }

    let mut resp = if body.is_empty() {
        Response::new(StatusCode::NoContent)
    } else {
        let mut r = Response::new(StatusCode::Ok);
        r.set_body(body);
        r
    };

    base_headers(&mut resp, format);
    Ok(resp)
}

/// Build a streaming (live-follow) response over a journal reader, per
/// §4.6 ("Stream"). `X-Journal-Skip-*` reflect only the pre-stream skip,
/// per §9's Open Question resolution - they're computed once here and
/// never touched again.
pub fn journal_stream_response(mut reader: JournalReader, format: Format) -> Response {
    let (tx, rx) = bounded::<Result<Vec<u8>, std::io::Error>>(CHANNEL_DEPTH);

    let skip_next = reader.actual_skipped_next().to_string();
    let skip_prev = reader.actual_skipped_prev().to_string();

    task::spawn(async move {
        loop {
            match reader.next() {
                Ok(Some(entry)) => {
                    let chunk = format_journal_entry(&entry, format, true);
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Client disconnected; the receiver (and the Body
                        // reading from it) was dropped.
                        return;
                    }
                }
                Ok(None) => task::sleep(JOURNAL_POLL_INTERVAL).await,
                Err(e) => {
                    // Per §7: mid-stream journal errors are logged and the
                    // stream continues, unless the reader itself is
                    // unusable - a plain I/O error on one pull doesn't
                    // make the handle unusable, so keep going.
                    warn!("journal stream: {e}, continuing");
                    task::sleep(JOURNAL_POLL_INTERVAL).await;
                }
            }
        }
    });

    let body = Body::from_reader(rx.into_async_read(), None);

    let mut resp = Response::new(StatusCode::Ok);
    resp.set_body(body);
    base_headers(&mut resp, format);
    resp.insert_header("X-Accel-Buffering", "no");
    resp.insert_header("X-Journal-Skip-Next", skip_next);
    resp.insert_header("X-Journal-Skip-Prev", skip_prev);
    resp
}

/// Build a streaming response over a files reader, per §4.6. Unlike the
/// journal case, a files-API error mid-stream is fatal (§7: "logged and
/// continue... in which case the connection closes" - the files reader has
/// no local fallback once the upstream call itself fails) so the pump task
/// exits and the channel closes, ending the response body.
pub fn files_stream_response(mut reader: FilesReader, ctx: FilesContext, format: Format) -> Response {
    let (tx, rx) = bounded::<Result<Vec<u8>, std::io::Error>>(CHANNEL_DEPTH);

    task::spawn(async move {
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    let chunk = format_line(&line, &ctx, format);
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => task::sleep(FILES_POLL_INTERVAL).await,
                Err(GatewayError::NotFound(_)) => {
                    // The sandbox file disappeared out from under a live
                    // follow (task exited and its sandbox got reaped).
                    // Nothing more will ever arrive.
                    return;
                }
                Err(e) => {
                    warn!("files stream: {e}, closing connection");
                    return;
                }
            }
        }
    });

    let body = Body::from_reader(rx.into_async_read(), None);

    let mut resp = Response::new(StatusCode::Ok);
    resp.set_body(body);
    base_headers(&mut resp, format);
    resp.insert_header("X-Accel-Buffering", "no");
    resp
}

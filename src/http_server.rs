// HTTP routing and handlers, per spec §6.
//
// Every handler shares the same shape: Request Binder parses options,
// builds a reader (journal or files), then hands it to `streaming.rs` to
// drive into a response. Routes that touch per-task sandbox data run
// behind the Authorization Gate; the `/v2/task/...` family only resolves
// identity and redirects, it never reads bytes itself.

use std::collections::HashSet;

use tide::http::Method;
use tide::{Body, Next, Request, Response, StatusCode};

use crate::auth::{self, BearerToken};
use crate::binder::{self, FilesOptions, JournalOptions};
use crate::context::AppState;
use crate::download;
use crate::error::{GatewayError, Result as GwResult};
use crate::files::FilesReaderBuilder;
use crate::filters::Match;
use crate::formatter::Format;
use crate::journal::{JournalReader, JournalReaderBuilder};
use crate::model::FilesContext;
use crate::streaming;
use crate::task_resolver::{self, TaskRouteVariant};

pub struct HttpServer {
    pub server: tide::Server<AppState>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let mut server = tide::with_state(state);
        server.with(Cors);
        mount_routes(&mut server);
        Self { server }
    }

    pub async fn listen(self, port: u16) -> std::io::Result<()> {
        self.server.listen(format!("[::]:{port}")).await
    }
}

fn mount_routes(server: &mut tide::Server<AppState>) {
    server.at("/v1/health").get(health);

    server.at("/v1/range/").get(|req| journal_range(req, false));
    server.at("/v1/range/download").get(|req| journal_range_download(req, false));

    server
        .at("/v1/range/framework/:framework_id/executor/:executor_id/container/:container_id")
        .with(AuthGate)
        .get(|req| journal_range(req, true));
    server
        .at("/v1/range/framework/:framework_id/executor/:executor_id/container/:container_id/download")
        .with(AuthGate)
        .get(|req| journal_range_download(req, true));

    server.at("/v1/stream/").get(|req| journal_stream(req, false));
    server
        .at("/v1/stream/framework/:framework_id/executor/:executor_id/container/:container_id")
        .with(AuthGate)
        .get(|req| journal_stream(req, true));

    server.at("/v1/fields/:field").get(fields);

    server.at("/v2/component").get(|req| component(req, None));
    server
        .at("/v2/component/:name")
        .get(|req| component(req, Some(())));

    server.at("/v2/task/:task_id").get(|req| task_redirect(req, None));
    server
        .at("/v2/task/:task_id/file/:file")
        .get(|req| task_redirect(req, Some(TaskRedirectKind::File)));
    server
        .at("/v2/task/:task_id/browse")
        .get(|req| task_redirect(req, Some(TaskRedirectKind::Browse)));
    server
        .at("/v2/task/:task_id/file/:file/download")
        .get(|req| task_redirect(req, Some(TaskRedirectKind::Download)));

    const FILES_BASE: &str =
        "/system/v1/agent/:agent_id/logs/v2/task/frameworks/:framework_id/executors/:executor_id/runs/:container_id";

    server.at(FILES_BASE).get(files_tail);
    server.at(&format!("{FILES_BASE}/*tail")).get(files_tail);
}

async fn health(req: Request<AppState>) -> tide::Result {
    let config = req.state().config();
    let body = serde_json::json!({
        "role": format!("{:?}", config.role),
        "version": env!("CARGO_PKG_VERSION"),
    });
    Ok(Response::builder(StatusCode::Ok)
        .body(Body::from_json(&body)?)
        .build())
}

// ---------------------------------------------------------------------
// CORS, per SPEC_FULL §11.
// ---------------------------------------------------------------------

struct Cors;

#[async_trait::async_trait]
impl tide::Middleware<AppState> for Cors {
    async fn handle(&self, req: Request<AppState>, next: Next<'_, AppState>) -> tide::Result {
        if req.method() == Method::Options {
            let mut resp = Response::new(StatusCode::NoContent);
            resp.insert_header("Access-Control-Allow-Origin", "*");
            resp.insert_header("Access-Control-Allow-Methods", "GET, OPTIONS");
            return Ok(resp);
        }

        let mut resp = next.run(req).await;
        resp.insert_header("Access-Control-Allow-Origin", "*");
        Ok(resp)
    }
}

// ---------------------------------------------------------------------
// Authorization Gate, per spec §4.7.
// ---------------------------------------------------------------------

struct AuthGate;

#[async_trait::async_trait]
impl tide::Middleware<AppState> for AuthGate {
    async fn handle(&self, req: Request<AppState>, next: Next<'_, AppState>) -> tide::Result {
        let state = req.state().clone();

        if !state.config().auth {
            return Ok(next.run(req).await);
        }

        let raw_token = binder::extract_raw_token(
            req.header("Authorization").map(|v| v.as_str()),
            req.header("Cookie").map(|v| v.as_str()),
        )
        .ok_or_else(|| GatewayError::Unauthorized("missing bearer token".into()))?;

        let token = BearerToken::parse(&raw_token)?;

        let mesos_id = state
            .node_id()
            .ok_or_else(|| GatewayError::Internal("node id was not resolved at startup".into()))?;

        let framework_id = req.param("framework_id").unwrap_or("");
        let executor_id = req.param("executor_id").unwrap_or("");
        let container_id = req.param("container_id").unwrap_or("");

        let sandbox = auth::sandbox_path(mesos_id, framework_id, executor_id, container_id);
        let client = state.local_files_client(Some(token.as_header_value().to_string()));

        auth::authorize(&client, &sandbox).await?;

        Ok(next.run(req).await)
    }
}

// ---------------------------------------------------------------------
// §6 journal routes.
// ---------------------------------------------------------------------

fn accept_header(req: &Request<AppState>) -> Option<String> {
    req.header("Accept").map(|v| v.as_str().to_string())
}

fn range_header(req: &Request<AppState>) -> Option<String> {
    req.header("Range").map(|v| v.as_str().to_string())
}

fn last_event_id(req: &Request<AppState>) -> Option<String> {
    req.header("Last-Event-ID").map(|v| v.as_str().to_string())
}

fn query_pairs(req: &Request<AppState>) -> Vec<(String, String)> {
    req.url()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn scoped_filters(req: &Request<AppState>) -> Vec<Match> {
    let mut filters = Vec::new();
    if let Ok(v) = req.param("framework_id") {
        filters.push(Match::new("FRAMEWORK_ID", v));
    }
    if let Ok(v) = req.param("executor_id") {
        filters.push(Match::new("EXECUTOR_ID", v));
    }
    if let Ok(v) = req.param("container_id") {
        filters.push(Match::new("CONTAINER_ID", v));
    }
    filters
}

fn build_journal_reader(
    opts: &JournalOptions,
    extra_filters: Vec<Match>,
    extra_or: Vec<Match>,
) -> GwResult<JournalReader> {
    let mut builder = JournalReaderBuilder::new();

    let mut filters = opts.filters.clone();
    filters.extend(extra_filters);
    if !filters.is_empty() {
        builder = builder.filters(filters);
    }
    if !extra_or.is_empty() {
        builder = builder.filters_or(extra_or);
    }
    if let Some(cursor) = &opts.cursor {
        builder = builder.seek_cursor(cursor.clone());
    }
    builder = builder
        .limit(opts.limit)
        .skip_next(opts.skip_next)
        .skip_prev(opts.skip_prev)
        .read_reverse(opts.read_reverse);

    builder.build()
}

async fn journal_range(req: Request<AppState>, scoped: bool) -> tide::Result {
    let format = binder::negotiate_format(accept_header(&req).as_deref())?;
    let pairs = query_pairs(&req);
    let opts = binder::parse_journal_options(
        &pairs,
        range_header(&req).as_deref(),
        last_event_id(&req).as_deref(),
        false,
    )?;

    let extra = if scoped { scoped_filters(&req) } else { Vec::new() };
    let reader = build_journal_reader(&opts, extra, Vec::new())?;

    let resp = streaming::journal_range_response(reader, format, opts.with_sse_id)?;
    Ok(resp)
}

async fn journal_range_download(req: Request<AppState>, scoped: bool) -> tide::Result {
    let format = Format::Text;
    let pairs = query_pairs(&req);
    let opts = binder::parse_journal_options(&pairs, range_header(&req).as_deref(), None, false)?;

    let extra = if scoped { scoped_filters(&req) } else { Vec::new() };
    let reader = build_journal_reader(&opts, extra, Vec::new())?;

    let mut resp = streaming::journal_range_response(reader, format, false)?;
    let body = resp
        .take_body()
        .into_bytes()
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to read journal body: {e}")))?;
    let compressed = download::gzip(&body)?;

    let vars: Vec<&str> = vec!["journal"];
    let postfix = query_param(&pairs, "postfix");
    let filename = download::filename("nodelogd", &vars, postfix.as_deref());

    let mut out = Response::new(StatusCode::Ok);
    out.set_body(compressed);
    out.insert_header("Content-Disposition", download::content_disposition(&filename));
    out.insert_header("Content-Encoding", "gzip");
    out.insert_header("Content-Type", format.content_type());
    Ok(out)
}

fn query_param(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

async fn journal_stream(req: Request<AppState>, scoped: bool) -> tide::Result {
    let format = binder::negotiate_format(accept_header(&req).as_deref())?;
    let pairs = query_pairs(&req);
    let opts = binder::parse_journal_options(
        &pairs,
        None,
        last_event_id(&req).as_deref(),
        true,
    )?;

    let extra = if scoped { scoped_filters(&req) } else { Vec::new() };
    let reader = build_journal_reader(&opts, extra, Vec::new())?;

    Ok(streaming::journal_stream_response(reader, format))
}

/// `/v1/fields/{field}`, per §6: enumerate distinct values of one of a
/// fixed set of journal fields by scanning the whole journal once.
const ALLOWED_FIELDS: &[&str] = &["FRAMEWORK_ID", "AGENT_ID", "EXECUTOR_ID", "CONTAINER_ID", "STREAM"];

async fn fields(req: Request<AppState>) -> tide::Result {
    let field = req.param("field")?.to_uppercase();

    if !ALLOWED_FIELDS.contains(&field.as_str()) {
        return Err(GatewayError::ClientInput(format!(
            "field {field} is not one of {ALLOWED_FIELDS:?}"
        ))
        .into());
    }

    let mut reader = JournalReaderBuilder::new().build()?;
    let mut seen = HashSet::new();
    let mut values = Vec::new();

    while let Some(entry) = reader.next()? {
        if let Some(v) = entry.fields.get(&field) {
            if seen.insert(v.clone()) {
                values.push(v.clone());
            }
        }
    }

    Ok(Response::builder(StatusCode::Ok)
        .body(Body::from_json(&values)?)
        .build())
}

/// `/v2/component` and `/v2/component/{name}`, per §6: journal filtered by
/// systemd unit, ORing `UNIT` and `_SYSTEMD_UNIT` when a name is given.
async fn component(req: Request<AppState>, named: Option<()>) -> tide::Result {
    let format = binder::negotiate_format(accept_header(&req).as_deref())?;
    let pairs = query_pairs(&req);
    let opts = binder::parse_journal_options(&pairs, None, last_event_id(&req).as_deref(), false)?;

    let or_filters = if named.is_some() {
        let name = req.param("name")?.to_string();
        vec![Match::new("UNIT", name.clone()), Match::new("_SYSTEMD_UNIT", name)]
    } else {
        Vec::new()
    };

    let reader = build_journal_reader(&opts, Vec::new(), or_filters)?;
    let resp = streaming::journal_range_response(reader, format, opts.with_sse_id)?;
    Ok(resp)
}

// ---------------------------------------------------------------------
// §6 task redirect routes, per spec §4.4.
// ---------------------------------------------------------------------

enum TaskRedirectKind {
    File,
    Browse,
    Download,
}

async fn task_redirect(req: Request<AppState>, kind: Option<TaskRedirectKind>) -> tide::Result {
    let task_id = req.param("task_id")?.to_string();
    let state = req.state();

    let task = task_resolver::resolve(state.cluster_state(), &task_id)
        .await
        .map_err(|_| GatewayError::Internal(format!("could not resolve task {task_id}")))?;

    let variant = match kind {
        None => TaskRouteVariant::File("stdout".to_string()),
        Some(TaskRedirectKind::File) => {
            TaskRouteVariant::File(req.param("file").unwrap_or("stdout").to_string())
        }
        Some(TaskRedirectKind::Browse) => TaskRouteVariant::Browse,
        Some(TaskRedirectKind::Download) => {
            TaskRouteVariant::Download(req.param("file").unwrap_or("stdout").to_string())
        }
    };

    let query = req.url().query().unwrap_or("");
    let location = task_resolver::redirect_target(&task, &variant, query);

    let mut resp = Response::new(StatusCode::SeeOther);
    resp.insert_header("Location", location);
    Ok(resp)
}

// ---------------------------------------------------------------------
// §6 files-API routes.
// ---------------------------------------------------------------------

/// Parsed shape of the wildcard tail after `.../runs/{container_id}`:
/// an optional `tasks/{id}` segment, then one of a bare file name, a
/// `.../download` suffix, or `files/browse`.
enum FilesTail {
    Browse,
    Download(String),
    Read(String),
}

fn parse_tail(tail: &str) -> Option<(Option<String>, FilesTail)> {
    let tail = tail.trim_start_matches('/');

    let (task_path, rest) = if let Some(after) = tail.strip_prefix("tasks/") {
        let (id, rest) = after.split_once('/')?;
        (Some(id.to_string()), rest)
    } else {
        (None, tail)
    };

    let parsed = if rest == "files/browse" {
        FilesTail::Browse
    } else if let Some(file) = rest.strip_suffix("/download") {
        FilesTail::Download(file.to_string())
    } else if rest.is_empty() {
        return None;
    } else {
        FilesTail::Read(rest.to_string())
    };

    Some((task_path, parsed))
}

fn sandbox_path_for(req: &Request<AppState>, task_path: Option<&str>) -> String {
    let agent_id = req.param("agent_id").unwrap_or("");
    let framework_id = req.param("framework_id").unwrap_or("");
    let executor_id = req.param("executor_id").unwrap_or("");
    let container_id = req.param("container_id").unwrap_or("");

    let base = auth::sandbox_path(agent_id, framework_id, executor_id, container_id);

    match task_path {
        Some(task) => format!("{base}/tasks/{task}"),
        None => base,
    }
}

fn caller_token(req: &Request<AppState>) -> Option<String> {
    binder::extract_raw_token(
        req.header("Authorization").map(|v| v.as_str()),
        req.header("Cookie").map(|v| v.as_str()),
    )
}

async fn files_tail(req: Request<AppState>) -> tide::Result {
    let tail = req.param("tail").unwrap_or("").to_string();

    let (task_path, parsed) = parse_tail(&tail)
        .ok_or_else(|| GatewayError::ClientInput("a file name is required".into()))?;

    match parsed {
        FilesTail::Browse => files_browse(req, task_path.as_deref()).await,
        FilesTail::Download(file) => files_download(req, task_path.as_deref(), &file).await,
        FilesTail::Read(file) => files_read(req, task_path.as_deref(), &file).await,
    }
}

async fn files_read(
    req: Request<AppState>,
    task_path: Option<&str>,
    file: &str,
) -> tide::Result {
    let format = binder::negotiate_format(accept_header(&req).as_deref())?;
    let pairs = query_pairs(&req);
    let is_stream = pairs
        .iter()
        .any(|(k, v)| k == "stream" && (v == "true" || v == "1"));
    let opts = binder::parse_files_options(&pairs, last_event_id(&req).as_deref(), is_stream)?;

    let sandbox = sandbox_path_for(&req, task_path);
    let path = format!("{sandbox}/{file}");

    let state = req.state();
    let client = state.local_files_client(caller_token(&req));

    let reader = FilesReaderBuilder::new(path)
        .offset(opts.offset)
        .read_from_end(opts.read_from_end)
        .skip(opts.skip)
        .limit(opts.limit)
        .read_reverse(opts.read_reverse)
        .build(client)
        .await?;

    let ctx = FilesContext {
        agent_id: req.param("agent_id").unwrap_or("").to_string(),
        framework_id: req.param("framework_id").unwrap_or("").to_string(),
        executor_id: req.param("executor_id").unwrap_or("").to_string(),
        container_id: req.param("container_id").unwrap_or("").to_string(),
        file: file.to_string(),
    };

    if is_stream {
        Ok(streaming::files_stream_response(reader, ctx, format))
    } else {
        let resp = streaming::files_range_response(reader, ctx, format).await?;
        Ok(resp)
    }
}

async fn files_browse(req: Request<AppState>, task_path: Option<&str>) -> tide::Result {
    let sandbox = sandbox_path_for(&req, task_path);
    let state = req.state();
    let client = state.local_files_client(caller_token(&req));

    let entries = client.browse(&sandbox).await?;

    Ok(Response::builder(StatusCode::Ok)
        .body(Body::from_json(&entries)?)
        .build())
}

async fn files_download(
    req: Request<AppState>,
    task_path: Option<&str>,
    file: &str,
) -> tide::Result {
    let sandbox = sandbox_path_for(&req, task_path);
    let path = format!("{sandbox}/{file}");

    let state = req.state();
    let client = state.local_files_client(caller_token(&req));

    let mut upstream_resp = client.download(&path).await?;
    let body = upstream_resp
        .take_body()
        .into_bytes()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to read download body: {e}")))?;

    let mut resp = Response::new(StatusCode::Ok);
    if let Some(ct) = upstream_resp.content_type() {
        resp.set_content_type(ct);
    }
    resp.set_body(body);
    Ok(resp)
}

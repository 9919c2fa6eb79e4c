//! In-memory fake record store for integration tests.
//!
//! Implements the `Transport` trait directly, so the full client stack —
//! request building, multipart encoding, codec, cache resolution, polling,
//! error classification — runs against a store with real semantics: schemas,
//! not-null/unique/foreign-key enforcement, a domain rule gated by the
//! validation tier, staged job lifecycles, and a data-version-keyed export
//! cache.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Map, Value};

use bulklift_rs::config::{ClientConfig, PollOptions};
use bulklift_rs::error::BulkError;
use bulklift_rs::table::{ColumnType, FieldSchema, ModelSchema};
use bulklift_rs::transport::{ApiRequest, ApiResponse, Method, RequestBody, Transport};
use bulklift_rs::BulkClient;

/// Number of polls a job answers as pending/running before turning terminal.
const DEFAULT_STAGE_POLLS: u32 = 2;

/// Poll options fast enough for tests.
pub fn fast_poll() -> PollOptions {
    PollOptions::default()
        .initial_interval(Duration::from_millis(1))
        .max_interval(Duration::from_millis(5))
        .timeout(Duration::from_secs(5))
}

/// A client wired to the given fake store.
pub fn client_for(store: &Arc<FakeStore>) -> BulkClient {
    let config = ClientConfig::new("http://records.test", "nbt_test_token");
    BulkClient::with_transport(config, store.clone())
}

/// Domain legality rule applied under the `auto` and `full` tiers.
struct DomainRule {
    field: String,
    allowed: Vec<String>,
}

struct ModelState {
    schema: ModelSchema,
    /// Named constraint → conflict field set.
    constraint_fields: HashMap<String, Vec<String>>,
    unique_fields: Vec<String>,
    domain_rule: Option<DomainRule>,
    rows: Vec<Map<String, Value>>,
    data_version: u64,
}

struct FakeJob {
    /// Terminal report, revealed once the staging polls are spent.
    terminal: bulklift_rs::Job,
    polls_remaining: u32,
}

struct ServerCacheEntry {
    cache_key: String,
    created_at: String,
    row_count: u64,
    file_size_bytes: u64,
    download_path: String,
    data_version: u64,
}

#[derive(Default)]
struct StoreState {
    models: HashMap<String, ModelState>,
    jobs: HashMap<String, FakeJob>,
    export_cache: HashMap<String, ServerCacheEntry>,
    files: HashMap<String, Vec<u8>>,
    branches: Vec<String>,
    unready_branches: Vec<String>,
    next_job: u64,
    next_row_id: i64,
    jobs_created: u64,
}

/// The fake store.
pub struct FakeStore {
    state: Mutex<StoreState>,
    requests: AtomicUsize,
    stage_polls: u32,
}

fn field(
    name: &str,
    logical: &str,
    wire: ColumnType,
    nullable: bool,
    primary_key: bool,
) -> FieldSchema {
    FieldSchema {
        name: name.to_string(),
        logical_type: logical.to_string(),
        wire_type: wire,
        nullable,
        primary_key,
        foreign_key: None,
        max_length: None,
        default: None,
    }
}

impl FakeStore {
    /// A store seeded with `dcim.site` and `dcim.device`.
    ///
    /// Sites are unique on `slug`; devices are unique on `name` and carry a
    /// non-nullable foreign key to their site. Both have a `status` field
    /// whose legal values are a domain rule, not a hard constraint.
    pub fn seeded() -> Arc<Self> {
        Self::seeded_with_stage_polls(DEFAULT_STAGE_POLLS)
    }

    /// Same as [`seeded`](Self::seeded) with a custom number of
    /// pending/running polls before jobs turn terminal.
    pub fn seeded_with_stage_polls(stage_polls: u32) -> Arc<Self> {
        let mut state = StoreState {
            next_row_id: 1,
            ..StoreState::default()
        };

        let site_fields = vec![
            field("id", "AutoField", ColumnType::BigInt, false, true),
            {
                let mut f = field("name", "CharField", ColumnType::Text, false, false);
                f.max_length = Some(100);
                f
            },
            field("slug", "SlugField", ColumnType::Text, false, false),
            {
                let mut f = field("status", "CharField", ColumnType::Text, true, false);
                f.default = Some(json!("active"));
                f
            },
            {
                let mut f = field("description", "TextField", ColumnType::Text, true, false);
                f.default = Some(json!(""));
                f
            },
            {
                let mut f = field(
                    "custom_field_data",
                    "JSONField",
                    ColumnType::Json,
                    true,
                    false,
                );
                f.default = Some(json!({}));
                f
            },
        ];
        state.models.insert(
            "dcim.site".to_string(),
            ModelState {
                schema: ModelSchema {
                    model: "dcim.site".to_string(),
                    fields: site_fields,
                    constraints: vec!["unique_site_slug".to_string()],
                },
                constraint_fields: HashMap::from([(
                    "unique_site_slug".to_string(),
                    vec!["slug".to_string()],
                )]),
                unique_fields: vec!["slug".to_string()],
                domain_rule: Some(DomainRule {
                    field: "status".to_string(),
                    allowed: vec![
                        "active".to_string(),
                        "planned".to_string(),
                        "retired".to_string(),
                    ],
                }),
                rows: Vec::new(),
                data_version: 1,
            },
        );

        let device_fields = vec![
            field("id", "AutoField", ColumnType::BigInt, false, true),
            field("name", "CharField", ColumnType::Text, false, false),
            {
                let mut f = field("site", "ForeignKey", ColumnType::BigInt, false, false);
                f.foreign_key = Some("dcim.site".to_string());
                f
            },
            {
                let mut f = field("status", "CharField", ColumnType::Text, true, false);
                f.default = Some(json!("active"));
                f
            },
        ];
        state.models.insert(
            "dcim.device".to_string(),
            ModelState {
                schema: ModelSchema {
                    model: "dcim.device".to_string(),
                    fields: device_fields,
                    constraints: vec!["unique_device_name".to_string()],
                },
                constraint_fields: HashMap::from([(
                    "unique_device_name".to_string(),
                    vec!["name".to_string()],
                )]),
                unique_fields: vec!["name".to_string()],
                domain_rule: Some(DomainRule {
                    field: "status".to_string(),
                    allowed: vec![
                        "active".to_string(),
                        "offline".to_string(),
                        "staged".to_string(),
                    ],
                }),
                rows: Vec::new(),
                data_version: 1,
            },
        );

        state.branches.push("maintenance".to_string());

        Arc::new(Self {
            state: Mutex::new(state),
            requests: AtomicUsize::new(0),
            stage_polls,
        })
    }

    /// Register an isolation branch that exists but is not ready.
    pub fn add_unready_branch(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.branches.push(name.to_string());
        state.unready_branches.push(name.to_string());
    }

    /// Current rows of a model.
    pub fn rows(&self, model: &str) -> Vec<Map<String, Value>> {
        self.state.lock().unwrap().models[model].rows.clone()
    }

    /// Number of jobs ever created.
    pub fn jobs_created(&self) -> u64 {
        self.state.lock().unwrap().jobs_created
    }

    /// Number of transport requests served.
    pub fn requests_served(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Request handling
    // ------------------------------------------------------------------

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match (request.method, request.path.as_str()) {
            (Method::Post, "load/") => self.handle_mutation(request, false),
            (Method::Post, "delete/") => self.handle_mutation(request, true),
            (Method::Post, "export/") => self.handle_export(request),
            (Method::Get, "models/") => self.handle_models(),
            (Method::Get, path) if path.starts_with("jobs/") => {
                self.handle_job_status(path.trim_start_matches("jobs/").trim_end_matches('/'))
            }
            (Method::Get, path) if path.starts_with("models/") => {
                self.handle_model_schema(path.trim_start_matches("models/").trim_end_matches('/'))
            }
            (Method::Get, path) if path.starts_with("/api/bulk/downloads/") => {
                self.handle_download(path)
            }
            (method, path) => error_response(
                404,
                "schema",
                format!("no such endpoint: {method} {path}"),
                None,
                None,
            ),
        }
    }

    fn handle_models(&self) -> ApiResponse {
        let state = self.state.lock().unwrap();
        let list: Vec<Value> = state
            .models
            .keys()
            .map(|model| {
                let (app_label, model_name) = model.split_once('.').unwrap_or((model, ""));
                json!({"model": model, "app_label": app_label, "model_name": model_name})
            })
            .collect();
        json_response(200, Value::Array(list))
    }

    fn handle_model_schema(&self, model: &str) -> ApiResponse {
        let state = self.state.lock().unwrap();
        match state.models.get(model) {
            Some(m) => json_response(200, serde_json::to_value(&m.schema).unwrap()),
            None => error_response(400, "schema", format!("unknown model '{model}'"), None, None),
        }
    }

    fn handle_download(&self, path: &str) -> ApiResponse {
        let state = self.state.lock().unwrap();
        match state.files.get(path) {
            Some(bytes) => ApiResponse {
                status: 200,
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/octet-stream".to_string(),
                )],
                body: Bytes::from(bytes.clone()),
            },
            None => error_response(404, "schema", format!("no such file: {path}"), None, None),
        }
    }

    fn handle_job_status(&self, job_id: &str) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return error_response(404, "schema", format!("unknown job '{job_id}'"), None, None);
        };
        if job.polls_remaining > 0 {
            let status = if job.polls_remaining >= 2 {
                "pending"
            } else {
                "running"
            };
            job.polls_remaining -= 1;
            let staged = json!({
                "job_id": job.terminal.job_id,
                "operation": job.terminal.operation,
                "model": job.terminal.model,
                "status": status,
                "created": job.terminal.created,
            });
            return json_response(200, staged);
        }
        json_response(200, serde_json::to_value(&job.terminal).unwrap())
    }

    fn handle_mutation(&self, request: &ApiRequest, is_delete: bool) -> ApiResponse {
        let Some(RequestBody::Multipart(body)) = &request.body else {
            return error_response(400, "corrupt_data", "expected multipart body".to_string(), None, None);
        };
        let parts = parse_multipart(body.boundary(), body.as_bytes());
        let Some(file) = parts.file else {
            return error_response(400, "corrupt_data", "missing file part".to_string(), None, None);
        };

        let model_name = parts.fields.get("model").cloned().unwrap_or_default();
        let dry_run = parts.fields.get("dry_run").map(String::as_str) == Some("true");
        let mode = parts
            .fields
            .get("mode")
            .cloned()
            .unwrap_or_else(|| "insert".to_string());
        let tier = parts
            .fields
            .get("validation_mode")
            .cloned()
            .unwrap_or_else(|| "auto".to_string());

        let mut state = self.state.lock().unwrap();

        if let Some(branch) = parts.fields.get("branch") {
            if !state.branches.contains(branch) {
                return error_response(
                    400,
                    "branch_not_found",
                    format!("branch '{branch}' does not exist"),
                    None,
                    Some(branch.clone()),
                );
            }
            if state.unready_branches.contains(branch) {
                return error_response(
                    400,
                    "branch_not_ready",
                    format!("branch '{branch}' is still provisioning"),
                    None,
                    Some(branch.clone()),
                );
            }
        }

        if !state.models.contains_key(&model_name) {
            return error_response(
                400,
                "schema",
                format!("unknown model '{model_name}'"),
                None,
                None,
            );
        }

        let table = match bulklift_rs::decode(&file) {
            Ok(table) => table,
            Err(e) => {
                return error_response(400, "corrupt_data", e.to_string(), None, None);
            }
        };
        let rows: Vec<Map<String, Value>> =
            (0..table.row_count()).map(|i| table.row_json(i)).collect();

        let operation = if is_delete { "delete" } else { "load" };
        let outcome = if is_delete {
            let key_fields: Option<Vec<String>> = parts
                .fields
                .get("key_fields")
                .map(|v| v.split(',').map(str::to_string).collect());
            run_delete(&mut state, &model_name, &rows, key_fields, dry_run)
        } else {
            let conflict = resolve_conflict(&state, &model_name, &parts.fields);
            run_load(&mut state, &model_name, &rows, &mode, &conflict, &tier, dry_run)
        };

        let job_id = format!("job-{:04}", state.next_job);
        state.next_job += 1;
        state.jobs_created += 1;

        let (status, data, error) = outcome;
        let terminal = bulklift_rs::Job {
            job_id: job_id.clone(),
            operation: serde_json::from_value(json!(operation)).ok(),
            model: Some(model_name),
            status,
            created: Some(Utc::now()),
            started: Some(Utc::now()),
            completed: Some(Utc::now()),
            data,
            error,
            duration_seconds: Some(0.1),
            download_url: None,
        };
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                terminal,
                polls_remaining: self.stage_polls,
            },
        );

        json_response(
            202,
            json!({
                "job_id": job_id,
                "status": "pending",
                "status_url": format!("/api/bulk/jobs/{job_id}/"),
                "dry_run": dry_run,
            }),
        )
    }

    fn handle_export(&self, request: &ApiRequest) -> ApiResponse {
        let Some(RequestBody::Json(body)) = &request.body else {
            return error_response(400, "corrupt_data", "expected JSON body".to_string(), None, None);
        };
        let model_name = body["model"].as_str().unwrap_or_default().to_string();
        let format = body["format"].as_str().unwrap_or("jsonl").to_string();
        let filters = body
            .get("filters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let fields: Vec<String> = body
            .get("fields")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let include_custom_fields = body
            .get("include_custom_fields")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let include_tags = body
            .get("include_tags")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let force_refresh = body.get("force_refresh").and_then(Value::as_bool) == Some(true);
        let check_cache_only = body.get("check_cache_only").and_then(Value::as_bool) == Some(true);
        let client_cache_key = body
            .get("client_cache_key")
            .and_then(Value::as_str)
            .map(str::to_string);

        let selection = format!(
            "{model_name}|{}|{}|{include_custom_fields}|{include_tags}|{format}",
            Value::Object(filters.clone()),
            fields.join(",")
        );

        let mut state = self.state.lock().unwrap();
        let Some(model) = state.models.get(&model_name) else {
            return error_response(
                400,
                "schema",
                format!("unknown model '{model_name}'"),
                None,
                None,
            );
        };
        let data_version = model.data_version;

        let valid_entry = state
            .export_cache
            .get(&selection)
            .filter(|entry| entry.data_version == data_version);

        if check_cache_only {
            // No valid entry means either a stale one (data changed) or none
            // at all; both report data_changed so callers re-export.
            let (cached, data_changed, cache_key) = match valid_entry {
                Some(entry) => (true, false, Some(entry.cache_key.clone())),
                None => (false, true, None),
            };
            return json_response(
                200,
                json!({"cached": cached, "data_changed": data_changed, "cache_key": cache_key}),
            );
        }

        if !force_refresh {
            if let Some(entry) = valid_entry {
                if client_cache_key.as_deref() == Some(entry.cache_key.as_str()) {
                    return ApiResponse {
                        status: 304,
                        headers: vec![],
                        body: Bytes::new(),
                    };
                }
                return json_response(
                    200,
                    json!({
                        "status": "completed",
                        "cached": true,
                        "cache_key": entry.cache_key,
                        "cache_created_at": entry.created_at,
                        "download_url": entry.download_path,
                        "file_size_bytes": entry.file_size_bytes,
                        "row_count": entry.row_count,
                    }),
                );
            }
        }

        // Miss (or forced refresh): build the export now, reveal it through a
        // staged job.
        let matched: Vec<Map<String, Value>> = state.models[&model_name]
            .rows
            .iter()
            .filter(|row| {
                filters
                    .iter()
                    .all(|(key, expected)| row.get(key) == Some(expected))
            })
            .cloned()
            .collect();
        let projected: Vec<Map<String, Value>> = matched
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(key, _)| {
                        (fields.is_empty() || fields.contains(key) || key == "id")
                            && (include_custom_fields || key != "custom_field_data")
                            && (include_tags || key != "tags")
                    })
                    .collect()
            })
            .collect();

        let file_bytes = render_export(&projected, &format);
        let row_count = projected.len() as u64;
        let file_size_bytes = file_bytes.len() as u64;

        let mut hasher = DefaultHasher::new();
        selection.hash(&mut hasher);
        let cache_key = format!("v{data_version}-{:08x}", hasher.finish() as u32);
        let download_path = format!("/api/bulk/downloads/{cache_key}");
        let created_at = Utc::now().to_rfc3339();

        state.files.insert(download_path.clone(), file_bytes);
        state.export_cache.insert(
            selection,
            ServerCacheEntry {
                cache_key: cache_key.clone(),
                created_at: created_at.clone(),
                row_count,
                file_size_bytes,
                download_path: download_path.clone(),
                data_version,
            },
        );

        let job_id = format!("job-{:04}", state.next_job);
        state.next_job += 1;
        state.jobs_created += 1;
        let terminal = bulklift_rs::Job {
            job_id: job_id.clone(),
            operation: serde_json::from_value(json!("export")).ok(),
            model: Some(model_name),
            status: bulklift_rs::JobStatus::Completed,
            created: Some(Utc::now()),
            started: Some(Utc::now()),
            completed: Some(Utc::now()),
            data: Some(json!({
                "download_url": download_path,
                "row_count": row_count,
                "file_size_bytes": file_size_bytes,
                "cache_key": cache_key,
                "cache_created_at": created_at,
            })),
            error: None,
            duration_seconds: Some(0.2),
            download_url: None,
        };
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                terminal,
                polls_remaining: self.stage_polls,
            },
        );

        json_response(
            202,
            json!({
                "job_id": job_id,
                "status": "pending",
                "status_url": format!("/api/bulk/jobs/{job_id}/"),
            }),
        )
    }
}

#[async_trait]
impl Transport for FakeStore {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, BulkError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        Ok(self.handle(&request))
    }
}

// ----------------------------------------------------------------------
// Load / delete semantics
// ----------------------------------------------------------------------

type Outcome = (bulklift_rs::JobStatus, Option<Value>, Option<Value>);

fn resolve_conflict(
    state: &StoreState,
    model_name: &str,
    fields: &HashMap<String, String>,
) -> Vec<String> {
    if let Some(constraint) = fields.get("conflict_constraint") {
        if let Some(resolved) = state.models[model_name].constraint_fields.get(constraint) {
            return resolved.clone();
        }
    }
    if let Some(joined) = fields.get("conflict_fields") {
        return joined.split(',').map(str::to_string).collect();
    }
    vec!["id".to_string()]
}

fn issue(
    error_type: &str,
    message: String,
    column: Option<&str>,
    value: Option<String>,
    suggestion: Option<&str>,
    row: usize,
) -> Value {
    json!({
        "error_type": error_type,
        "message": message,
        "column": column,
        "value": value,
        "suggestion": suggestion,
        "row": row,
    })
}

fn validate_load(
    state: &StoreState,
    model_name: &str,
    rows: &[Map<String, Value>],
    mode: &str,
    conflict: &[String],
    tier: &str,
) -> Vec<Value> {
    let model = &state.models[model_name];
    let mut issues = Vec::new();
    let mut batch_seen: HashMap<String, Vec<Value>> = HashMap::new();

    for (idx, row) in rows.iter().enumerate() {
        for key in row.keys() {
            if model.schema.field_by_wire_name(key).is_none() {
                issues.push(issue(
                    "schema",
                    format!("model '{model_name}' has no column '{key}'"),
                    Some(key),
                    None,
                    None,
                    idx,
                ));
            }
        }

        for field in &model.schema.fields {
            if field.primary_key {
                continue;
            }
            let wire = field.wire_name();
            let value = row.get(&wire);
            let is_null = value.map(Value::is_null).unwrap_or(true);

            if is_null && !field.nullable && field.default.is_none() {
                issues.push(issue(
                    "not_null",
                    format!("column '{wire}' must not be null"),
                    Some(&wire),
                    None,
                    None,
                    idx,
                ));
                continue;
            }
            let Some(value) = value.filter(|v| !v.is_null()) else {
                continue;
            };

            if let Some(max) = field.max_length {
                if let Some(text) = value.as_str() {
                    if text.len() > max as usize {
                        issues.push(issue(
                            "string_too_long",
                            format!("column '{wire}' exceeds {max} characters"),
                            Some(&wire),
                            Some(text.to_string()),
                            Some("shorten the value"),
                            idx,
                        ));
                    }
                }
            }

            if field.wire_type == ColumnType::BigInt && !value.is_number() {
                issues.push(issue(
                    "data_type",
                    format!("column '{wire}' expects an integer"),
                    Some(&wire),
                    Some(value.to_string()),
                    None,
                    idx,
                ));
            }

            if let Some(target) = &field.foreign_key {
                let exists = state
                    .models
                    .get(target)
                    .map(|parent| parent.rows.iter().any(|r| r.get("id") == Some(value)))
                    .unwrap_or(false);
                if !exists {
                    issues.push(issue(
                        "foreign_key",
                        format!("{target} id {value} does not exist"),
                        Some(&wire),
                        Some(value.to_string()),
                        Some("load the parent object first"),
                        idx,
                    ));
                }
            }

            if model.unique_fields.contains(&wire) {
                let conflicts_allowed = mode == "upsert" && conflict.contains(&wire);
                let exists = model.rows.iter().any(|r| r.get(&wire) == Some(value));
                let in_batch = batch_seen
                    .get(&wire)
                    .map(|seen| seen.contains(value))
                    .unwrap_or(false);
                if (exists || in_batch) && !conflicts_allowed {
                    issues.push(issue(
                        "unique",
                        format!("duplicate value for unique column '{wire}'"),
                        Some(&wire),
                        Some(value.to_string()),
                        Some("use upsert mode to update existing rows"),
                        idx,
                    ));
                }
                batch_seen.entry(wire.clone()).or_default().push(value.clone());
            }
        }

        if tier != "none" {
            if let Some(rule) = &model.domain_rule {
                if let Some(value) = row.get(&rule.field).and_then(Value::as_str) {
                    if !rule.allowed.iter().any(|allowed| allowed == value) {
                        issues.push(issue(
                            "check",
                            format!("'{value}' is not a legal {} value", rule.field),
                            Some(&rule.field),
                            Some(value.to_string()),
                            Some("use one of the documented values"),
                            idx,
                        ));
                    }
                }
            }
        }
    }
    issues
}

fn run_load(
    state: &mut StoreState,
    model_name: &str,
    rows: &[Map<String, Value>],
    mode: &str,
    conflict: &[String],
    tier: &str,
    dry_run: bool,
) -> Outcome {
    let issues = validate_load(state, model_name, rows, mode, conflict, tier);

    if dry_run {
        return (
            bulklift_rs::JobStatus::Completed,
            Some(json!({
                "valid": issues.is_empty(),
                "rows": rows.len(),
                "errors": issues,
                "warnings": [],
            })),
            None,
        );
    }

    if let Some(first) = issues.first() {
        // All-or-nothing: nothing below mutates when any row is bad.
        return (bulklift_rs::JobStatus::Errored, None, Some(first.clone()));
    }

    let mut inserted = 0u64;
    let mut updated = 0u64;
    let model = state.models.get_mut(model_name).unwrap();
    for row in rows {
        let existing = if mode == "upsert" {
            model.rows.iter().position(|candidate| {
                conflict
                    .iter()
                    .all(|key| candidate.get(key) == row.get(key) && row.get(key).is_some())
            })
        } else {
            None
        };
        match existing {
            Some(idx) => {
                let candidate = &mut model.rows[idx];
                for (key, value) in row {
                    candidate.insert(key.clone(), value.clone());
                }
                updated += 1;
            }
            None => {
                let mut stored = row.clone();
                stored.insert("id".to_string(), json!(state.next_row_id));
                state.next_row_id += 1;
                // Fill server-side defaults so exports see complete rows.
                for field in &model.schema.fields {
                    let wire = field.wire_name();
                    if !stored.contains_key(&wire) {
                        if let Some(default) = &field.default {
                            stored.insert(wire, default.clone());
                        }
                    }
                }
                model.rows.push(stored);
                inserted += 1;
            }
        }
    }
    model.data_version += 1;

    (
        bulklift_rs::JobStatus::Completed,
        Some(json!({
            "rows_affected": inserted + updated,
            "rows_inserted": inserted,
            "rows_updated": updated,
        })),
        None,
    )
}

fn run_delete(
    state: &mut StoreState,
    model_name: &str,
    keys: &[Map<String, Value>],
    key_fields: Option<Vec<String>>,
    dry_run: bool,
) -> Outcome {
    let key_fields = key_fields.unwrap_or_else(|| vec!["id".to_string()]);
    let model = state.models.get_mut(model_name).unwrap();

    let matches: Vec<usize> = model
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            keys.iter().any(|key_row| {
                key_fields
                    .iter()
                    .all(|field| key_row.get(field).is_some() && key_row.get(field) == row.get(field))
            })
        })
        .map(|(idx, _)| idx)
        .collect();

    if dry_run {
        return (
            bulklift_rs::JobStatus::Completed,
            Some(json!({
                "valid": true,
                "rows": matches.len(),
                "errors": [],
                "warnings": [],
            })),
            None,
        );
    }

    for idx in matches.iter().rev() {
        model.rows.remove(*idx);
    }
    model.data_version += 1;

    (
        bulklift_rs::JobStatus::Completed,
        Some(json!({
            "rows_affected": matches.len(),
            "rows_deleted": matches.len(),
        })),
        None,
    )
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn render_export(rows: &[Map<String, Value>], format: &str) -> Vec<u8> {
    if rows.is_empty() {
        return Vec::new();
    }
    let jsonl: String = rows
        .iter()
        .map(|row| Value::Object(row.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let table = bulklift_rs::decode(jsonl.as_bytes()).expect("export rows decode");
    let wire = match format {
        "parquet" => bulklift_rs::WireFormat::Parquet,
        _ => bulklift_rs::WireFormat::JsonlGz,
    };
    bulklift_rs::encode(&table, wire).expect("export rows encode")
}

fn json_response(status: u16, body: Value) -> ApiResponse {
    ApiResponse {
        status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body: Bytes::from(body.to_string()),
    }
}

fn error_response(
    status: u16,
    error_type: &str,
    message: String,
    column: Option<&str>,
    value: Option<String>,
) -> ApiResponse {
    json_response(
        status,
        json!({
            "error_type": error_type,
            "message": message,
            "column": column,
            "value": value,
        }),
    )
}

struct MultipartParts {
    fields: HashMap<String, String>,
    file: Option<Vec<u8>>,
}

/// Minimal parser for the multipart bodies the client renders.
fn parse_multipart(boundary: &str, data: &[u8]) -> MultipartParts {
    let delimiter = format!("--{boundary}");
    let mut fields = HashMap::new();
    let mut file = None;

    let mut rest = data;
    while let Some(start) = find(rest, delimiter.as_bytes()) {
        rest = &rest[start + delimiter.len()..];
        if rest.starts_with(b"--") {
            break;
        }
        rest = rest.strip_prefix(b"\r\n").unwrap_or(rest);
        let Some(header_end) = find(rest, b"\r\n\r\n") else {
            break;
        };
        let headers = String::from_utf8_lossy(&rest[..header_end]).to_string();
        rest = &rest[header_end + 4..];
        let Some(body_end) = find(rest, format!("\r\n--{boundary}").as_bytes()) else {
            break;
        };
        let body = &rest[..body_end];
        rest = &rest[body_end..];

        let name = extract_quoted(&headers, "name=\"");
        let filename = extract_quoted(&headers, "filename=\"");
        match (name, filename) {
            (_, Some(_)) => file = Some(body.to_vec()),
            (Some(name), None) => {
                fields.insert(name, String::from_utf8_lossy(body).to_string());
            }
            _ => {}
        }
    }

    MultipartParts { fields, file }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn extract_quoted(headers: &str, prefix: &str) -> Option<String> {
    let start = headers.find(prefix)? + prefix.len();
    let end = headers[start..].find('"')? + start;
    Some(headers[start..end].to_string())
}

//! Model registry client (Hugging Face Hub API).
//!
//! POST {endpoint}/api/repos/create                       create the model repo
//! POST {endpoint}/api/models/{repo_id}/preupload/main    ask how each file must travel
//! POST {endpoint}/{repo_id}.git/info/lfs/objects/batch   LFS upload targets
//! PUT  <href from the batch response>                    streamed LFS object
//! POST {endpoint}/api/models/{repo_id}/commit/main       NDJSON commit of the folder
//!
//! The token comes from process-wide settings, never from a request.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use merge_control_types::{sys_debug, sys_info, ControlError, ControlResult};

const COMMIT_SUMMARY: &str = "Upload folder using merge control";

/// Largest file ever sent inline in the commit body. Bigger files always go
/// through LFS, whatever the preupload answer says.
pub const INLINE_LIMIT: u64 = 10 * 1024 * 1024;

/// Bytes of each file sent to preupload for content sniffing.
const SAMPLE_LEN: u64 = 512;

/// Files per preupload or LFS batch request.
const BATCH_SIZE: usize = 256;

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// The two registry operations publishing needs.
pub trait ModelRegistry: Send + Sync {
    /// Create a model repository. An already existing repository is not an error.
    fn create_repo(&self, repo_id: &str) -> ControlResult<()>;
    /// Upload every file under `folder` to the repository root.
    fn upload_folder(&self, repo_id: &str, folder: &Path) -> ControlResult<()>;
}

/// One file of the folder being published.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub path_in_repo: String,
    pub local_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Regular,
    Lfs,
    Ignore,
}

/// How a file appears in the commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOp {
    Inline,
    Lfs { oid: String },
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadEntry {
    path: String,
    upload_mode: String,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    #[serde(default)]
    objects: Vec<LfsBatchObject>,
}

#[derive(Debug, Deserialize)]
struct LfsBatchObject {
    oid: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    #[serde(default)]
    upload: Option<LfsAction>,
    #[serde(default)]
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

pub struct HubClient {
    endpoint: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HubClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            agent,
        }
    }

    fn bearer(&self) -> ControlResult<String> {
        self.token
            .as_deref()
            .map(|t| format!("Bearer {t}"))
            .ok_or_else(|| ControlError::Registry("no registry token configured".to_string()))
    }

    /// Authenticated POST of a text body; returns the response body.
    fn post(&self, url: &str, headers: &[(&str, &str)], body: &str, operation: &str) -> ControlResult<String> {
        let mut request = self.agent.post(url).set("Authorization", &self.bearer()?);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = request
            .send_string(body)
            .map_err(|e| registry_error(operation, e))?;
        response
            .into_string()
            .map_err(|e| ControlError::Registry(format!("{operation}: unreadable response: {e}")))
    }

    fn preupload(&self, repo_id: &str, files: &[LocalFile]) -> ControlResult<HashMap<String, UploadMode>> {
        let url = format!("{}/api/models/{}/preupload/main", self.endpoint, repo_id);
        let mut modes = HashMap::new();
        for batch in files.chunks(BATCH_SIZE) {
            let body = preupload_body(batch)?;
            let response = self.post(&url, &[("Content-Type", "application/json")], &body, "preupload")?;
            modes.extend(parse_upload_modes(&response)?);
        }
        Ok(modes)
    }

    fn upload_lfs(&self, repo_id: &str, files: &[(&LocalFile, String)]) -> ControlResult<()> {
        let url = format!("{}/{}.git/info/lfs/objects/batch", self.endpoint, repo_id);
        let headers = [("Content-Type", LFS_MEDIA_TYPE), ("Accept", LFS_MEDIA_TYPE)];

        for batch in files.chunks(BATCH_SIZE) {
            let response = self.post(&url, &headers, &lfs_batch_body(batch), "LFS batch")?;
            let parsed: LfsBatchResponse = serde_json::from_str(&response).map_err(|e| {
                ControlError::Registry(format!("LFS batch: unexpected response: {e}"))
            })?;

            for object in parsed.objects {
                if let Some(err) = object.error {
                    return Err(ControlError::Registry(format!(
                        "LFS object {} rejected ({}): {}",
                        object.oid, err.code, err.message
                    )));
                }
                // No upload action means the registry already has the object
                let Some(LfsActions { upload: Some(upload), verify }) = object.actions else {
                    sys_debug!("[HUB] LFS object {} already stored", object.oid);
                    continue;
                };
                let file = batch
                    .iter()
                    .find(|(_, oid)| *oid == object.oid)
                    .map(|(file, _)| *file)
                    .ok_or_else(|| {
                        ControlError::Registry(format!("LFS batch returned unknown object {}", object.oid))
                    })?;

                self.put_lfs_object(file, &upload)?;
                if let Some(verify) = verify {
                    self.verify_lfs_object(&object.oid, object.size, &verify)?;
                }
            }
        }
        Ok(())
    }

    /// Stream one file to its LFS upload target.
    fn put_lfs_object(&self, file: &LocalFile, action: &LfsAction) -> ControlResult<()> {
        if action.header.contains_key("chunk_size") {
            return Err(ControlError::Registry(format!(
                "multipart LFS upload requested for {}; only single-part uploads are supported",
                file.path_in_repo
            )));
        }

        let reader = File::open(&file.local_path)?;
        let mut request = self.agent.put(&action.href);
        for (name, value) in &action.header {
            request = request.set(name, value);
        }
        request
            .set("Content-Length", &file.size.to_string())
            .send(reader)
            .map_err(|e| registry_error("LFS upload", e))?;

        sys_info!("[HUB] Uploaded LFS object {} ({} bytes)", file.path_in_repo, file.size);
        Ok(())
    }

    fn verify_lfs_object(&self, oid: &str, size: u64, action: &LfsAction) -> ControlResult<()> {
        let body = serde_json::json!({ "oid": oid, "size": size }).to_string();
        let mut request = self
            .agent
            .post(&action.href)
            .set("Content-Type", LFS_MEDIA_TYPE)
            .set("Accept", LFS_MEDIA_TYPE);
        for (name, value) in &action.header {
            request = request.set(name, value);
        }
        request
            .send_string(&body)
            .map_err(|e| registry_error("LFS verify", e))?;
        Ok(())
    }
}

impl ModelRegistry for HubClient {
    fn create_repo(&self, repo_id: &str) -> ControlResult<()> {
        let (namespace, name) = split_repo_id(repo_id)?;
        let body = serde_json::json!({
            "type": "model",
            "name": name,
            "organization": namespace,
        });

        let result = self
            .agent
            .post(&format!("{}/api/repos/create", self.endpoint))
            .set("Authorization", &self.bearer()?)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());

        match result {
            Ok(_) => {
                sys_info!("[HUB] Created repo {}", repo_id);
                Ok(())
            }
            Err(ureq::Error::Status(409, _)) => {
                sys_info!("[HUB] Repo {} already exists", repo_id);
                Ok(())
            }
            Err(e) => Err(registry_error("create repo", e)),
        }
    }

    fn upload_folder(&self, repo_id: &str, folder: &Path) -> ControlResult<()> {
        let files = scan_folder(folder)?;
        let modes = self.preupload(repo_id, &files)?;

        let mut ops = Vec::with_capacity(files.len());
        let mut lfs = Vec::new();
        for file in &files {
            match resolve_mode(file, &modes) {
                UploadMode::Ignore => sys_debug!("[HUB] Registry ignores {}", file.path_in_repo),
                UploadMode::Regular => ops.push((file, CommitOp::Inline)),
                UploadMode::Lfs => {
                    let oid = sha256_file(&file.local_path)?;
                    lfs.push((file, oid.clone()));
                    ops.push((file, CommitOp::Lfs { oid }));
                }
            }
        }

        if !lfs.is_empty() {
            self.upload_lfs(repo_id, &lfs)?;
        }

        let payload = build_commit_payload(&ops, COMMIT_SUMMARY)?;
        self.post(
            &format!("{}/api/models/{}/commit/main", self.endpoint, repo_id),
            &[("Content-Type", "application/x-ndjson")],
            &payload,
            "commit",
        )?;

        sys_info!(
            "[HUB] Uploaded {} to {} ({} files, {} through LFS)",
            folder.display(),
            repo_id,
            ops.len(),
            lfs.len()
        );
        Ok(())
    }
}

fn registry_error(operation: &str, err: ureq::Error) -> ControlError {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            ControlError::Registry(format!("{operation} failed with HTTP {code}: {body}"))
        }
        other => ControlError::Registry(format!("{operation} failed: {other}")),
    }
}

/// Split `namespace/name`.
pub fn split_repo_id(repo_id: &str) -> ControlResult<(&str, &str)> {
    match repo_id.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((ns, name))
        }
        _ => Err(ControlError::invalid_request(format!("Invalid repo id: {repo_id}"))),
    }
}

/// Every regular file under `folder`, in path order. `.git` directories are skipped.
pub fn scan_folder(folder: &Path) -> ControlResult<Vec<LocalFile>> {
    let walker = WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(folder)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let path_in_repo = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry.metadata().map_err(io::Error::from)?.len();

        files.push(LocalFile {
            path_in_repo,
            local_path: entry.path().to_path_buf(),
            size,
        });
    }
    Ok(files)
}

fn preupload_body(files: &[LocalFile]) -> ControlResult<String> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let mut sample = Vec::new();
        File::open(&file.local_path)?
            .take(SAMPLE_LEN)
            .read_to_end(&mut sample)?;
        entries.push(serde_json::json!({
            "path": file.path_in_repo,
            "sample": STANDARD.encode(&sample),
            "size": file.size,
        }));
    }
    Ok(serde_json::json!({ "files": entries }).to_string())
}

fn parse_upload_modes(body: &str) -> ControlResult<HashMap<String, UploadMode>> {
    let response: PreuploadResponse = serde_json::from_str(body)
        .map_err(|e| ControlError::Registry(format!("preupload: unexpected response: {e}")))?;

    Ok(response
        .files
        .into_iter()
        .map(|entry| {
            let mode = if entry.should_ignore {
                UploadMode::Ignore
            } else if entry.upload_mode == "lfs" {
                UploadMode::Lfs
            } else {
                UploadMode::Regular
            };
            (entry.path, mode)
        })
        .collect())
}

fn resolve_mode(file: &LocalFile, modes: &HashMap<String, UploadMode>) -> UploadMode {
    match modes.get(&file.path_in_repo) {
        Some(UploadMode::Ignore) => UploadMode::Ignore,
        _ if file.size > INLINE_LIMIT => UploadMode::Lfs,
        Some(mode) => *mode,
        None => UploadMode::Regular,
    }
}

/// Hex SHA-256 of a file, read in chunks.
fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn lfs_batch_body(files: &[(&LocalFile, String)]) -> String {
    let objects: Vec<_> = files
        .iter()
        .map(|(file, oid)| serde_json::json!({ "oid": oid, "size": file.size }))
        .collect();
    serde_json::json!({
        "operation": "upload",
        "transfers": ["basic"],
        "objects": objects,
        "hash_algo": "sha256",
    })
    .to_string()
}

/// Build the NDJSON commit body: one header line, then one line per file.
/// Inline files carry base64 content; LFS files only their object id.
pub fn build_commit_payload(ops: &[(&LocalFile, CommitOp)], summary: &str) -> ControlResult<String> {
    let mut lines = vec![serde_json::json!({
        "key": "header",
        "value": { "summary": summary, "description": "" },
    })
    .to_string()];

    for (file, op) in ops {
        let line = match op {
            CommitOp::Inline => {
                if file.size > INLINE_LIMIT {
                    return Err(ControlError::Registry(format!(
                        "{} is too large to commit inline ({} bytes)",
                        file.path_in_repo, file.size
                    )));
                }
                let bytes = std::fs::read(&file.local_path)?;
                serde_json::json!({
                    "key": "file",
                    "value": {
                        "content": STANDARD.encode(&bytes),
                        "path": file.path_in_repo,
                        "encoding": "base64",
                    },
                })
            }
            CommitOp::Lfs { oid } => serde_json::json!({
                "key": "lfsFile",
                "value": {
                    "path": file.path_in_repo,
                    "algo": "sha256",
                    "oid": oid,
                },
            }),
        };
        lines.push(line.to_string());
    }

    Ok(lines.join("\n"))
}

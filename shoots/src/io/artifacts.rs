//! Content-addressed artifact store: `artifacts/<hash>/{plan.txt,result.json,resolution.json}`.
//!
//! Directories are keyed by plan hash and reused across runs. Every file is
//! replaced atomically (temp file + rename), so concurrent identical runs
//! never tear a file; the last writer wins.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::core::classifier::classify;
use crate::core::plan::Plan;
use crate::core::resolution::Resolution;
use crate::core::types::{RunState, RuntimeError, RuntimeResult};

pub const PLAN_FILE: &str = "plan.txt";
pub const RESULT_FILE: &str = "result.json";
pub const RESOLUTION_FILE: &str = "resolution.json";

/// File locations for one artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub result_path: PathBuf,
    pub resolution_path: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path, hash: &str) -> Self {
        let dir = root.join(hash);
        Self {
            plan_path: dir.join(PLAN_FILE),
            result_path: dir.join(RESULT_FILE),
            resolution_path: dir.join(RESOLUTION_FILE),
            dir,
        }
    }
}

/// On-disk shape of `result.json`.
///
/// `error` holds the error record encoded as a compact JSON string, which
/// keeps the field a plain string while staying decodable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub ok: bool,
    pub error: Option<String>,
    pub output: Option<Value>,
}

impl StoredResult {
    pub fn from_result(result: &RuntimeResult) -> Result<Self> {
        let error = result
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("encode error record")?;
        Ok(Self {
            ok: result.ok,
            error,
            output: result.output.clone(),
        })
    }

    pub fn to_result(&self) -> Result<RuntimeResult> {
        let error = self
            .error
            .as_deref()
            .map(serde_json::from_str::<RuntimeError>)
            .transpose()
            .context("decode error record")?;
        Ok(RuntimeResult {
            ok: self.ok,
            output: self.output.clone(),
            error,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn paths(&self, hash: &str) -> ArtifactPaths {
        ArtifactPaths::new(&self.root, hash)
    }

    /// Create (or reuse) the directory for `plan` and write `plan.txt`.
    #[instrument(skip_all, fields(hash = %plan.hash))]
    pub fn prepare(&self, plan: &Plan) -> Result<ArtifactPaths> {
        let paths = self.paths(&plan.hash);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create artifact dir {}", paths.dir.display()))?;
        write_atomic(&paths.plan_path, plan.text.as_bytes())?;
        debug!(dir = %paths.dir.display(), "plan written");
        Ok(paths)
    }

    pub fn write_result(&self, paths: &ArtifactPaths, result: &RuntimeResult) -> Result<()> {
        let stored = StoredResult::from_result(result)?;
        write_json(&paths.result_path, &stored)
    }

    pub fn load_result(&self, paths: &ArtifactPaths) -> Result<StoredResult> {
        let contents = fs::read_to_string(&paths.result_path)
            .with_context(|| format!("read {}", paths.result_path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", paths.result_path.display()))
    }

    /// Write `resolution.json` for a non-success state, or remove a stale one
    /// left by an earlier run when the state is `Success`.
    pub fn write_resolution(
        &self,
        paths: &ArtifactPaths,
        resolution: Option<&Resolution>,
    ) -> Result<()> {
        match resolution {
            Some(resolution) => write_json(&paths.resolution_path, resolution),
            None => remove_if_present(&paths.resolution_path),
        }
    }

    pub fn load_resolution(&self, paths: &ArtifactPaths) -> Result<Option<Resolution>> {
        let contents = match fs::read_to_string(&paths.resolution_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read {}", paths.resolution_path.display()));
            }
        };
        let resolution = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", paths.resolution_path.display()))?;
        Ok(Some(resolution))
    }

    /// Rebuild `resolution.json` for `hash` from its stored `result.json`
    /// without re-running anything. Returns the recomputed state.
    #[instrument(skip(self))]
    pub fn regenerate_resolution(&self, hash: &str) -> Result<RunState> {
        let paths = self.paths(hash);
        let result = self.load_result(&paths)?.to_result()?;
        let state = classify(&result);
        let resolution = (state != RunState::Success).then(|| Resolution::build(state, &result));
        self.write_resolution(&paths, resolution.as_ref())?;
        debug!(state = state.as_str(), "resolution regenerated");
        Ok(state)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    write_atomic(path, payload.as_bytes())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale file");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::taxonomy::ErrorCode;
    use serde_json::json;

    fn missing_file_result() -> RuntimeResult {
        RuntimeResult::fail(
            RuntimeError::new(ErrorCode::MissingFile, "input not found").with_details("/tmp/x.txt"),
        )
    }

    #[test]
    fn prepare_is_idempotent_and_writes_exact_plan_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path().join("artifacts"));
        let plan = Plan::from_input("core.ping").expect("plan");

        let first = store.prepare(&plan).expect("prepare");
        let second = store.prepare(&plan).expect("prepare again");

        assert_eq!(first, second);
        assert_eq!(
            fs::read(&first.plan_path).expect("read plan"),
            b"COMMAND:\ncore.ping\n"
        );
        let entries = fs::read_dir(temp.path().join("artifacts"))
            .expect("list")
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn result_json_has_stable_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let paths = store
            .prepare(&Plan::from_input("core.ping").expect("plan"))
            .expect("prepare");

        store
            .write_result(&paths, &RuntimeResult::success("pong"))
            .expect("write");

        let contents = fs::read_to_string(&paths.result_path).expect("read");
        assert_eq!(
            contents,
            "{\n  \"ok\": true,\n  \"error\": null,\n  \"output\": \"pong\"\n}"
        );
    }

    #[test]
    fn error_is_stored_as_decodable_string() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let paths = store
            .prepare(&Plan::from_input("fs.read").expect("plan"))
            .expect("prepare");

        store
            .write_result(&paths, &missing_file_result())
            .expect("write");

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(&paths.result_path).expect("read"))
                .expect("parse");
        assert_eq!(raw["ok"], json!(false));
        assert_eq!(raw["output"], Value::Null);
        assert_eq!(
            raw["error"],
            json!(r#"{"code":"missing_file","message":"input not found","details":"/tmp/x.txt"}"#)
        );

        let stored = store.load_result(&paths).expect("load");
        assert_eq!(stored.to_result().expect("decode"), missing_file_result());
    }

    #[test]
    fn regenerate_rebuilds_resolution_from_result_alone() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let plan = Plan::from_input("fs.read").expect("plan");
        let paths = store.prepare(&plan).expect("prepare");
        let result = missing_file_result();
        store.write_result(&paths, &result).expect("write");

        let state = store.regenerate_resolution(&plan.hash).expect("regenerate");

        assert_eq!(state, RunState::Blocked);
        let resolution = store
            .load_resolution(&paths)
            .expect("load")
            .expect("resolution present");
        assert_eq!(resolution, Resolution::build(RunState::Blocked, &result));
    }

    #[test]
    fn success_removes_stale_resolution() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let plan = Plan::from_input("core.ping").expect("plan");
        let paths = store.prepare(&plan).expect("prepare");
        let failed = missing_file_result();
        store
            .write_resolution(&paths, Some(&Resolution::build(RunState::Blocked, &failed)))
            .expect("write");
        assert!(paths.resolution_path.exists());

        store
            .write_result(&paths, &RuntimeResult::success("pong"))
            .expect("write");
        let state = store.regenerate_resolution(&plan.hash).expect("regenerate");

        assert_eq!(state, RunState::Success);
        assert!(!paths.resolution_path.exists());
        assert!(store.load_resolution(&paths).expect("load").is_none());
    }

    #[test]
    fn regenerate_without_result_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        assert!(store.regenerate_resolution("deadbeef").is_err());
    }
}

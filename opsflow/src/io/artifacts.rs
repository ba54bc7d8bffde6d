//! Per-stage artifact files under the run output directory.
//!
//! Every write goes through [`write_atomic`], so a reader never observes a
//! partially written artifact and a failed stage leaves no file behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::error::{FailureRecord, PipelineError};
use crate::core::stage::Stage;
use crate::core::state::WorkflowState;
use crate::core::types::{HistoryEntry, RejectedHandoff, RoutingAssignment, TransitionOutcome};

/// Run summary file written at every terminal stage.
pub const RUN_SUMMARY_FILE: &str = "run.json";

/// Atomically write `contents` to `path` (temp file + rename).
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    let written = fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))
        .and_then(|()| {
            fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))
        });
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub stage: Stage,
    pub failure: Option<&'a FailureRecord>,
    pub history: &'a [HistoryEntry],
    pub rejected_handoffs: &'a [RejectedHandoff],
    /// Artifact file names written during the run, in stage order.
    pub artifacts: Vec<&'static str>,
    pub skus_selected: usize,
    pub orders_unrouted: &'a [String],
}

/// Writes stage artifacts into one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    out_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn path_for(&self, stage: Stage) -> Option<PathBuf> {
        stage.artifact_name().map(|name| self.out_dir.join(name))
    }

    /// Write the artifact owned by `stage`, rendered from the validated state.
    ///
    /// `report_text` is only used for `Reporting`, where it is required.
    pub fn write_stage(
        &self,
        stage: Stage,
        state: &WorkflowState,
        report_text: Option<&str>,
    ) -> Result<(), PipelineError> {
        let Some(path) = self.path_for(stage) else {
            return Ok(());
        };
        let contents = match stage {
            Stage::Sourcing => to_json(&state.selected_items),
            Stage::Listing => to_json(&state.listings),
            Stage::Pricing => to_json(&state.prices),
            Stage::Routing => to_json(&RoutingArtifact {
                assignments: &state.routing,
                unrouted_orders: &state.unrouted_orders,
            }),
            Stage::Reporting => report_text
                .map(str::to_string)
                .context("reporting produced no document"),
            Stage::Init | Stage::Done | Stage::Failed => return Ok(()),
        };
        contents
            .and_then(|contents| write_atomic(&path, &contents))
            .map_err(|err| PipelineError::ArtifactWrite {
                stage,
                reason: format!("{err:#}"),
            })?;
        debug!(stage = %stage, path = %path.display(), "artifact written");
        Ok(())
    }

    /// Write `run.json` for a terminal state.
    pub fn write_summary(&self, state: &WorkflowState) -> Result<PathBuf> {
        let summary = RunSummary {
            stage: state.stage,
            failure: state.failure.as_ref(),
            history: &state.history,
            rejected_handoffs: &state.rejected_handoffs,
            artifacts: written_artifacts(state),
            skus_selected: state.selected_items.len(),
            orders_unrouted: &state.unrouted_orders,
        };
        let path = self.out_dir.join(RUN_SUMMARY_FILE);
        write_atomic(&path, &to_json(&summary)?)?;
        debug!(path = %path.display(), "run summary written");
        Ok(path)
    }
}

#[derive(Serialize)]
struct RoutingArtifact<'a> {
    assignments: &'a BTreeMap<String, RoutingAssignment>,
    unrouted_orders: &'a [String],
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize artifact")?;
    buf.push('\n');
    Ok(buf)
}

/// Artifacts implied by the passed stages recorded in history.
fn written_artifacts(state: &WorkflowState) -> Vec<&'static str> {
    state
        .history
        .iter()
        .filter(|entry| entry.outcome == TransitionOutcome::Passed)
        .filter_map(|entry| entry.stage.artifact_name())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::test_support::{catalog, selected};

    #[test]
    fn write_atomic_creates_parent_and_leaves_no_temp_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("selection.json");
        write_atomic(&path, "[]\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "[]\n");
        assert!(!temp.path().join("nested").join("selection.json.tmp").exists());
    }

    #[test]
    fn failed_replace_removes_temp_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        // A directory at the target path makes the rename fail after the write.
        let path = temp.path().join("report.md");
        fs::create_dir(&path).expect("mkdir");
        fs::write(path.join("keep"), "x").expect("write");

        assert!(write_atomic(&path, "# Report\n").is_err());
        assert!(!temp.path().join("report.md.tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn report_without_document_is_artifact_write_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let state = WorkflowState::new(catalog(1, 20), Vec::new());

        let err = store
            .write_stage(Stage::Reporting, &state, None)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ArtifactWrite {
                stage: Stage::Reporting,
                ..
            }
        ));
        assert!(err.to_string().contains("reporting produced no document"));
        assert!(!temp.path().join("report.md").exists());
    }

    #[test]
    fn selection_artifact_uses_catalog_field_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let mut state = WorkflowState::new(catalog(3, 20), Vec::new());
        state.selected_items = selected(&state.catalog_records);

        store
            .write_stage(Stage::Sourcing, &state, None)
            .expect("write");
        let written = fs::read_to_string(temp.path().join("selection.json")).expect("read");
        let value: serde_json::Value = serde_json::from_str(&written).expect("json");
        assert_eq!(value[0]["supplier_sku"], "SKU001");
        assert_eq!(value.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn unwritable_directory_is_artifact_write_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "file, not a directory").expect("write");
        let store = ArtifactStore::new(&blocker);
        let state = WorkflowState::new(catalog(1, 20), Vec::new());

        let err = store
            .write_stage(Stage::Pricing, &state, None)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ArtifactWrite {
                stage: Stage::Pricing,
                ..
            }
        ));
    }

    #[test]
    fn summary_lists_artifacts_of_passed_stages() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let mut state = WorkflowState::new(catalog(1, 20), Vec::new());
        let now = Utc::now();
        state.record_transition(Stage::Init, TransitionOutcome::Started, now);
        state.record_transition(Stage::Sourcing, TransitionOutcome::Passed, now);
        state.record_transition(Stage::Listing, TransitionOutcome::Passed, now);

        let path = store.write_summary(&state).expect("summary");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json");
        assert_eq!(
            value["artifacts"],
            serde_json::json!(["selection.json", "listings.json"])
        );
        assert_eq!(value["stage"], "init");
        assert!(value["failure"].is_null());
    }
}

//! The pluggable rendering step a worker performs once it has claimed a
//! job. Real worker binaries shell out to the notebook/diagram tooling
//! (outside this crate's scope); `SimulatedRenderBackend` stands in for
//! tests and local demos.

use async_trait::async_trait;
use clm_common::{execution_requirement, ExecutionRequirement, StructuredError, WorkerPayload};

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub output_written: bool,
    /// Set only for cache-populating operations (spec.md §4.8); carried back
    /// through `report_success` into the result cache.
    pub cell_outputs: Option<serde_json::Value>,
}

#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, payload: &WorkerPayload) -> Result<RenderOutcome, StructuredError>;
}

/// Writes a placeholder file at `output_path` and always succeeds, unless
/// `input_path`'s file name contains `"fail"`, in which case it returns a
/// synthetic `StructuredError` — useful for exercising the failure path in
/// tests without a real renderer.
///
/// An implicit operation (`payload.implicit`) never writes under a target's
/// `output_root`; it only produces the cell outputs the cache needs.
pub struct SimulatedRenderBackend;

#[async_trait]
impl RenderBackend for SimulatedRenderBackend {
    async fn render(&self, payload: &WorkerPayload) -> Result<RenderOutcome, StructuredError> {
        let name = payload
            .input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if name.contains("fail") {
            return Err(StructuredError {
                error_class: "SimulatedRenderError".to_string(),
                message: format!("simulated failure rendering {name}"),
                category_hint: Some("user".to_string()),
                ..Default::default()
            });
        }

        let populates_cache = execution_requirement(payload.format, payload.kind)
            == ExecutionRequirement::PopulatesCache;
        let cell_outputs = populates_cache.then(|| {
            serde_json::json!([{"cell": 0, "output": "simulated"}])
        });

        let output_written = if payload.implicit {
            false
        } else {
            if let Some(parent) = payload.output_path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let body: &[u8] = if payload.fallback_execute {
                b"simulated output (from cache)"
            } else {
                b"simulated output"
            };
            tokio::fs::write(&payload.output_path, body)
                .await
                .map_err(|err| StructuredError {
                    error_class: "IoError".to_string(),
                    message: err.to_string(),
                    category_hint: Some("infrastructure".to_string()),
                    ..Default::default()
                })?;
            true
        };

        Ok(RenderOutcome {
            output_written,
            cell_outputs,
        })
    }
}

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vigil_common::error::PipelineError;

/// Opaque handle to a loaded compute resource, issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle(pub u64);

/// Placement constraints for a load.
#[derive(Debug, Clone, Default)]
pub struct LoadParams {
    pub device: Option<String>,
    pub max_memory_mb: Option<u64>,
}

/// One stage's resource requirement: candidate identities in preference
/// order. The first candidate that loads wins.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub candidates: Vec<String>,
    pub params: LoadParams,
}

impl ResourceSpec {
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            params: LoadParams::default(),
        }
    }
}

/// Loads and releases the heavy compute resource. `release` must not return
/// until backing memory and device caches are actually reclaimed; the next
/// load assumes the capacity is free.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn load(&self, name: &str, params: &LoadParams) -> Result<ResourceHandle>;
    async fn release(&self, handle: ResourceHandle) -> Result<()>;
}

struct Resident {
    name: String,
    handle: ResourceHandle,
}

/// Single-slot arena for the exclusive heavy compute resource. At most one
/// resource is resident; load, unload, and residency checks all serialize on
/// the slot lock, so a load can never race an in-flight unload.
pub struct ResourceManager {
    backend: Arc<dyn ResourceBackend>,
    slot: Mutex<Option<Resident>>,
}

impl ResourceManager {
    pub fn new(backend: Arc<dyn ResourceBackend>) -> Self {
        Self {
            backend,
            slot: Mutex::new(None),
        }
    }

    /// Make one of the requested candidates resident, evicting any
    /// different resource first. Returns the identity that loaded. Fails
    /// with `ResourceExhaustion` only when every candidate fails; the slot
    /// is left empty in that case.
    pub async fn load(&self, spec: &ResourceSpec) -> Result<String, PipelineError> {
        let mut slot = self.slot.lock().await;

        if let Some(resident) = slot.as_ref() {
            if spec.candidates.iter().any(|c| c == &resident.name) {
                debug!(resource = %resident.name, "Resource already resident, reusing");
                return Ok(resident.name.clone());
            }
        }
        if let Some(previous) = slot.take() {
            self.release_resident(previous).await;
        }

        let mut failures = Vec::new();
        for candidate in &spec.candidates {
            info!(resource = %candidate, "Loading compute resource");
            match self.backend.load(candidate, &spec.params).await {
                Ok(handle) => {
                    info!(resource = %candidate, "Compute resource loaded");
                    *slot = Some(Resident {
                        name: candidate.clone(),
                        handle,
                    });
                    return Ok(candidate.clone());
                }
                Err(e) => {
                    warn!(resource = %candidate, error = %e, "Load failed, trying next fallback");
                    failures.push(format!("{candidate}: {e}"));
                }
            }
        }

        Err(PipelineError::ResourceExhaustion(format!(
            "no candidate loaded ({})",
            failures.join("; ")
        )))
    }

    /// Release whatever is resident. Idempotent; the slot is empty on
    /// return even if the backend's release fails.
    pub async fn unload(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(resident) = slot.take() {
            self.release_resident(resident).await;
        }
    }

    /// Current residency, optionally scoped to one identity.
    pub async fn is_loaded(&self, name: Option<&str>) -> bool {
        let slot = self.slot.lock().await;
        match (slot.as_ref(), name) {
            (Some(resident), Some(expected)) => resident.name == expected,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    async fn release_resident(&self, resident: Resident) {
        info!(resource = %resident.name, "Unloading compute resource");
        if let Err(e) = self.backend.release(resident.handle).await {
            warn!(resource = %resident.name, error = %e, "Release failed; slot cleared anyway");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::RecordingBackend;

    fn manager_with(backend: RecordingBackend) -> (ResourceManager, Arc<RecordingBackend>) {
        let backend = Arc::new(backend);
        (ResourceManager::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn load_makes_the_first_candidate_resident() {
        let (manager, backend) = manager_with(RecordingBackend::new());
        let spec = ResourceSpec::new(vec!["mistral-7b".to_string(), "phi-2".to_string()]);

        let loaded = manager.load(&spec).await.unwrap();
        assert_eq!(loaded, "mistral-7b");
        assert!(manager.is_loaded(None).await);
        assert!(manager.is_loaded(Some("mistral-7b")).await);
        assert!(!manager.is_loaded(Some("phi-2")).await);
        assert_eq!(backend.events(), vec!["load:mistral-7b"]);
    }

    #[tokio::test]
    async fn load_falls_back_in_order() {
        let (manager, backend) = manager_with(RecordingBackend::new().failing_for("mistral-7b"));
        let spec = ResourceSpec::new(vec!["mistral-7b".to_string(), "phi-2".to_string()]);

        let loaded = manager.load(&spec).await.unwrap();
        assert_eq!(loaded, "phi-2");
        assert_eq!(backend.events(), vec!["load:mistral-7b", "load:phi-2"]);
    }

    #[tokio::test]
    async fn exhausted_fallbacks_leave_the_slot_empty() {
        let (manager, _backend) = manager_with(
            RecordingBackend::new()
                .failing_for("mistral-7b")
                .failing_for("phi-2"),
        );
        let spec = ResourceSpec::new(vec!["mistral-7b".to_string(), "phi-2".to_string()]);

        let err = manager.load(&spec).await.unwrap_err();
        assert!(matches!(err, PipelineError::ResourceExhaustion(_)));
        assert!(!manager.is_loaded(None).await);
    }

    #[tokio::test]
    async fn loading_a_different_resource_evicts_the_resident() {
        let (manager, backend) = manager_with(RecordingBackend::new());
        manager
            .load(&ResourceSpec::new(vec!["mistral-7b".to_string()]))
            .await
            .unwrap();
        manager
            .load(&ResourceSpec::new(vec!["llama-3-8b".to_string()]))
            .await
            .unwrap();

        assert_eq!(
            backend.events(),
            vec!["load:mistral-7b", "release:mistral-7b", "load:llama-3-8b"]
        );
        assert!(manager.is_loaded(Some("llama-3-8b")).await);
    }

    #[tokio::test]
    async fn reloading_the_resident_resource_is_a_noop() {
        let (manager, backend) = manager_with(RecordingBackend::new());
        let spec = ResourceSpec::new(vec!["mistral-7b".to_string()]);
        manager.load(&spec).await.unwrap();
        manager.load(&spec).await.unwrap();

        assert_eq!(backend.events(), vec!["load:mistral-7b"]);
    }

    #[tokio::test]
    async fn double_unload_is_idempotent() {
        let (manager, backend) = manager_with(RecordingBackend::new());
        manager
            .load(&ResourceSpec::new(vec!["mistral-7b".to_string()]))
            .await
            .unwrap();

        manager.unload().await;
        assert!(!manager.is_loaded(None).await);
        manager.unload().await;
        assert!(!manager.is_loaded(None).await);
        assert_eq!(
            backend.events(),
            vec!["load:mistral-7b", "release:mistral-7b"]
        );
    }

    #[tokio::test]
    async fn failed_release_still_empties_the_slot() {
        let (manager, _backend) =
            manager_with(RecordingBackend::new().failing_release("mistral-7b"));
        manager
            .load(&ResourceSpec::new(vec!["mistral-7b".to_string()]))
            .await
            .unwrap();

        manager.unload().await;
        assert!(!manager.is_loaded(None).await);
    }
}

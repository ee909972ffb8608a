//! The certificate and policy networks bundled for training and checkpoints

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use super::certificate::{CertificateConfig, CertificateNet};
use super::policy::{PolicyConfig, PolicyNet};
use crate::error::SwarmError;

/// Which networks a checkpoint load restores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointScope {
    All,
    Certificate,
    Policy,
}

/// Both networks under their own parameter namespaces, `cbf` and `action`
#[derive(Module, Debug)]
pub struct SwarmModel<B: Backend> {
    pub cbf: CertificateNet<B>,
    pub action: PolicyNet<B>,
}

impl<B: Backend> SwarmModel<B> {
    pub fn new(device: &B::Device, certificate: &CertificateConfig, policy: &PolicyConfig) -> Self {
        Self {
            cbf: CertificateNet::new(device, certificate),
            action: PolicyNet::new(device, policy),
        }
    }

    /// Save both networks to `path` (the recorder adds the extension)
    pub fn save_checkpoint(&self, path: &str) -> Result<(), SwarmError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.clone()
            .save_file(path, &recorder)
            .map_err(|source| SwarmError::Checkpoint {
                path: path.to_string(),
                source,
            })?;
        tracing::info!("Saved checkpoint to {}", path);
        Ok(())
    }

    /// Restore the networks selected by `scope` from `path`, keeping the rest
    pub fn load_checkpoint(
        self,
        path: &str,
        scope: CheckpointScope,
        device: &B::Device,
    ) -> Result<Self, SwarmError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let loaded = self
            .clone()
            .load_file(path, &recorder, device)
            .map_err(|source| SwarmError::Checkpoint {
                path: path.to_string(),
                source,
            })?;

        let model = match scope {
            CheckpointScope::All => loaded,
            CheckpointScope::Certificate => Self {
                cbf: loaded.cbf,
                action: self.action,
            },
            CheckpointScope::Policy => Self {
                cbf: self.cbf,
                action: loaded.action,
            },
        };
        tracing::info!("Loaded {:?} checkpoint from {}", scope, path);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn fresh(device: &<B as Backend>::Device) -> SwarmModel<B> {
        SwarmModel::new(device, &CertificateConfig::default(), &PolicyConfig::default())
    }

    #[test]
    fn test_checkpoint_scopes() {
        let device = Default::default();
        let dir = std::env::temp_dir().join(format!("swarm_cbf_model_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model_iter_0");
        let path = path.to_str().unwrap();

        let saved = fresh(&device);
        saved.save_checkpoint(path).unwrap();

        let other = fresh(&device);
        let restored = other
            .clone()
            .load_checkpoint(path, CheckpointScope::Certificate, &device)
            .unwrap();
        assert_eq!(restored.cbf.flat_parameters(), saved.cbf.flat_parameters());
        assert_eq!(restored.action.flat_parameters(), other.action.flat_parameters());

        let restored = other
            .clone()
            .load_checkpoint(path, CheckpointScope::Policy, &device)
            .unwrap();
        assert_eq!(restored.action.flat_parameters(), saved.action.flat_parameters());
        assert_eq!(restored.cbf.flat_parameters(), other.cbf.flat_parameters());

        let restored = other.load_checkpoint(path, CheckpointScope::All, &device).unwrap();
        assert_eq!(restored.cbf.flat_parameters(), saved.cbf.flat_parameters());
        assert_eq!(restored.action.flat_parameters(), saved.action.flat_parameters());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let device = Default::default();
        let result = fresh(&device).load_checkpoint(
            "/nonexistent/swarm_cbf/model_iter_0",
            CheckpointScope::All,
            &device,
        );
        assert!(matches!(result, Err(SwarmError::Checkpoint { .. })));
    }
}

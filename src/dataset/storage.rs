//! Dataset locations on disk.

use std::path::{Path, PathBuf};

use crate::dataset::network::RoadNetwork;
use crate::dataset::{DatasetError, GenerationId};

/// File holding the serialized road network.
pub const NETWORK_FILE: &str = "network.json";

/// Every file a dataset directory must contain.
pub const REQUIRED_FILES: &[&str] = &[NETWORK_FILE];

/// Directory of generation `id` below a shared root.
pub fn generation_dir(root: &Path, id: GenerationId) -> PathBuf {
    root.join(format!("gen-{}", id))
}

/// Parse a `gen-<id>` directory name.
pub fn parse_generation_dir(name: &str) -> Option<GenerationId> {
    name.strip_prefix("gen-")?
        .parse::<u64>()
        .ok()
        .and_then(GenerationId::new)
}

/// Location of one dataset.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    base: PathBuf,
}

impl StorageConfig {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn network_path(&self) -> PathBuf {
        self.base.join(NETWORK_FILE)
    }

    /// The location is a directory holding every required file.
    pub fn is_valid(&self) -> bool {
        self.base.is_dir() && REQUIRED_FILES.iter().all(|f| self.base.join(f).is_file())
    }

    /// Read and validate the network stored here.
    pub fn load_network(&self) -> Result<RoadNetwork, DatasetError> {
        if !self.is_valid() {
            return Err(DatasetError::InvalidLocation(self.base.clone()));
        }
        let network = RoadNetwork::read_from(&self.network_path())?;
        network.validate()?;
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_invalid() {
        let storage = StorageConfig::new("/no/such/dataset");
        assert!(!storage.is_valid());
        assert!(matches!(
            storage.load_network(),
            Err(DatasetError::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_directory_without_network_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!StorageConfig::new(dir.path()).is_valid());

        std::fs::write(dir.path().join(NETWORK_FILE), "{\"nodes\":[],\"edges\":[]}").unwrap();
        let storage = StorageConfig::new(dir.path());
        assert!(storage.is_valid());
        assert!(storage.load_network().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_generation_dir_names() {
        let id = GenerationId::new(7).unwrap();
        let dir = generation_dir(Path::new("/srv/region"), id);
        assert_eq!(dir, PathBuf::from("/srv/region/gen-7"));
        assert_eq!(parse_generation_dir("gen-7"), Some(id));
        assert_eq!(parse_generation_dir("gen-0"), None);
        assert_eq!(parse_generation_dir("region"), None);
    }
}

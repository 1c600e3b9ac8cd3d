//! Loading of the external build's output: server bundle, client manifest
//! and page template.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use tokio::fs;

use crate::{
    application::{
        error::AppError,
        render::{BundleRenderer, RendererOptions, create_renderer},
    },
    cache::FragmentCacheConfig,
    domain::{Bundle, CLIENT_MANIFEST_FILE, PageTemplate, SERVER_BUNDLE_FILE},
};

use super::error::InfraError;

/// Where the build collaborator writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output_dir: PathBuf,
    pub template: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: impl Into<PathBuf>, template: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            template: template.into(),
        }
    }

    pub fn server_bundle(&self) -> PathBuf {
        self.output_dir.join(SERVER_BUNDLE_FILE)
    }

    pub fn client_manifest(&self) -> PathBuf {
        self.output_dir.join(CLIENT_MANIFEST_FILE)
    }

    fn watched(&self) -> [PathBuf; 3] {
        [
            self.server_bundle(),
            self.client_manifest(),
            self.template.clone(),
        ]
    }
}

/// One complete build read from disk.
#[derive(Debug, Clone)]
pub struct LoadedBuild {
    pub bundle: Bundle,
    pub template: PageTemplate,
}

impl LoadedBuild {
    pub fn into_renderer(
        self,
        fragment_cache: FragmentCacheConfig,
    ) -> Result<BundleRenderer, AppError> {
        let options = RendererOptions {
            template: self.template,
            fragment_cache,
        };
        Ok(create_renderer(self.bundle, &options)?)
    }
}

pub async fn load_build(paths: &ArtifactPaths) -> Result<LoadedBuild, AppError> {
    let server = read_artifact(&paths.server_bundle()).await?;
    let manifest = read_artifact(&paths.client_manifest()).await?;
    let template = read_artifact(&paths.template).await?;

    let bundle = Bundle::from_json(&server, &manifest)?;
    let template = String::from_utf8(template).map_err(|err| {
        InfraError::artifact(
            &paths.template,
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })?;
    let template = PageTemplate::parse(&template)?;

    Ok(LoadedBuild { bundle, template })
}

pub(crate) async fn read_artifact(path: &Path) -> Result<Vec<u8>, InfraError> {
    fs::read(path)
        .await
        .map_err(|err| InfraError::artifact(path, err))
}

/// Size and modification time of every watched artifact. `None` while any
/// of them is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Vec<(u64, Option<SystemTime>)>);

pub async fn fingerprint(paths: &ArtifactPaths) -> Option<Fingerprint> {
    let mut parts = Vec::with_capacity(3);
    for path in paths.watched() {
        let metadata = fs::metadata(&path).await.ok()?;
        parts.push((metadata.len(), metadata.modified().ok()));
    }
    Some(Fingerprint(parts))
}

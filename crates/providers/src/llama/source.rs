//! Where a GGUF model file comes from.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A file already on disk
    Local(PathBuf),
    /// An `http(s)://` URL, downloaded once into the cache directory
    Remote(String),
    /// `hf://<owner>/<repo>/<file>`, fetched through the HuggingFace Hub cache
    Hub { repo: String, file: String },
}

impl ModelSource {
    pub fn parse(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            return ModelSource::Remote(url.to_string());
        }
        if let Some(rest) = url.strip_prefix("hf://") {
            // Repos are always owner/name; everything after is the file path
            let mut parts = rest.splitn(3, '/');
            if let (Some(owner), Some(name), Some(file)) = (parts.next(), parts.next(), parts.next()) {
                return ModelSource::Hub {
                    repo: format!("{owner}/{name}"),
                    file: file.to_string(),
                };
            }
        }
        ModelSource::Local(ada_config::expand_home(url))
    }

    /// File name a remote download is cached under.
    pub fn cache_file_name(url: &str) -> String {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        without_query
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("model.gguf")
            .to_string()
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "{}", path.display()),
            ModelSource::Remote(url) => f.write_str(url),
            ModelSource::Hub { repo, file } => write!(f, "hf://{repo}/{file}"),
        }
    }
}

#[cfg(feature = "local")]
pub(crate) mod fetch {
    use super::ModelSource;
    use ada_core::error::BackendError;
    use futures::StreamExt;
    use std::path::{Path, PathBuf};
    use tokio::io::AsyncWriteExt;
    use tracing::info;

    impl ModelSource {
        /// Make the model available on disk and return its path.
        pub async fn fetch(&self, cache_dir: &Path) -> Result<PathBuf, BackendError> {
            match self {
                ModelSource::Local(path) => {
                    if path.is_file() {
                        Ok(path.clone())
                    } else {
                        Err(BackendError::NotConfigured(format!(
                            "Model file not found: {}",
                            path.display()
                        )))
                    }
                }
                ModelSource::Remote(url) => {
                    let target = cache_dir.join(Self::cache_file_name(url));
                    if target.is_file() {
                        info!(path = %target.display(), "Using cached model file");
                        return Ok(target);
                    }
                    download(url, cache_dir, &target).await?;
                    Ok(target)
                }
                ModelSource::Hub { repo, file } => {
                    let (repo, file) = (repo.clone(), file.clone());
                    tokio::task::spawn_blocking(move || hub_get(&repo, &file))
                        .await
                        .map_err(|e| BackendError::Engine(format!("Download task failed: {e}")))?
                }
            }
        }
    }

    pub(crate) fn hub_get(repo: &str, file: &str) -> Result<PathBuf, BackendError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            BackendError::Network(format!("Failed to initialize HuggingFace Hub API: {e}"))
        })?;
        api.model(repo.to_string()).get(file).map_err(|e| {
            BackendError::Network(format!("Failed to download '{file}' from '{repo}': {e}"))
        })
    }

    async fn download(url: &str, cache_dir: &Path, target: &Path) -> Result<(), BackendError> {
        let io_err = |e: std::io::Error| BackendError::Engine(format!("Model cache error: {e}"));
        tokio::fs::create_dir_all(cache_dir).await.map_err(io_err)?;

        info!(url, path = %target.display(), "Downloading model");
        let response = reqwest::get(url)
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::Api {
                status_code: response.status().as_u16(),
                message: format!("Model download failed: {url}"),
            });
        }

        // Write to a side file so an interrupted download is never mistaken for a model
        let partial = target.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await.map_err(io_err)?;
        let mut byte_stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| BackendError::Network(e.to_string()))?;
            file.write_all(&bytes).await.map_err(io_err)?;
            written += bytes.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        tokio::fs::rename(&partial, target).await.map_err(io_err)?;

        info!(bytes = written, path = %target.display(), "Model downloaded");
        Ok(())
    }
}

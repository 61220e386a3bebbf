use crate::features::feature_utils::{manifest_path, FeatureManifest, FEATURE_COUNT, FEATURE_NAMES};
use crate::model::backends::onnx::regressor_onnx::RegressorONNX;
use crate::model::model_utils::{Backend, Regressor};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Anything smaller is a placeholder or a truncated download.
pub const MIN_MODEL_BYTES: u64 = 100;
/// Leading bytes echoed back when an artifact fails to deserialize.
pub const DIAGNOSTIC_BYTES: u64 = 32;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Model file missing or too small: {}", path.display())]
    MissingOrTooSmall { path: PathBuf },

    #[error("Failed to read feature manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error(
        "Feature manifest {} does not match the served schema: expected [{expected}], found [{found}]",
        path.display()
    )]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Failed to deserialize {}. First bytes: {first_bytes}", path.display())]
    Deserialize {
        path: PathBuf,
        first_bytes: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model at {} expects {found} features per row, but requests carry {expected}", path.display())]
    FeatureCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

pub async fn load_model(
    model_path: &Path,
    backend: Backend,
) -> Result<Arc<dyn Regressor>, LoadError> {
    match backend {
        Backend::ONNX => load_model_into(model_path, RegressorONNX::new()).await,
    }
}

/// Validates the artifact at `model_path` and deserializes it into `model`.
pub async fn load_model_into<M>(
    model_path: &Path,
    mut model: M,
) -> Result<Arc<dyn Regressor>, LoadError>
where
    M: Regressor + 'static,
{
    let size = check_artifact(model_path)?;
    check_manifest(model_path)?;

    let start = Instant::now();
    if let Err(e) = model.load_model(model_path).await {
        return Err(LoadError::Deserialize {
            path: model_path.to_path_buf(),
            first_bytes: first_bytes(model_path),
            source: e.into(),
        });
    }

    if let Some(found) = model.input_width() {
        if found != FEATURE_COUNT {
            return Err(LoadError::FeatureCountMismatch {
                path: model_path.to_path_buf(),
                expected: FEATURE_COUNT,
                found,
            });
        }
    }

    info!(
        "Model loaded from {} ({} bytes) in {:?}",
        model_path.display(),
        size,
        start.elapsed()
    );
    Ok(Arc::new(model))
}

fn check_artifact(model_path: &Path) -> Result<u64, LoadError> {
    match fs::metadata(model_path) {
        Ok(meta) if meta.is_file() && meta.len() >= MIN_MODEL_BYTES => Ok(meta.len()),
        _ => Err(LoadError::MissingOrTooSmall {
            path: model_path.to_path_buf(),
        }),
    }
}

fn check_manifest(model_path: &Path) -> Result<(), LoadError> {
    let path = manifest_path(model_path);
    if !path.exists() {
        warn!(
            "No feature manifest at {}, assuming columns [{}]",
            path.display(),
            FEATURE_NAMES.join(", ")
        );
        return Ok(());
    }

    let manifest = FeatureManifest::from_file(&path).map_err(|e| LoadError::Manifest {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    if !manifest.matches_schema() {
        return Err(LoadError::SchemaMismatch {
            path,
            expected: FEATURE_NAMES.join(", "),
            found: manifest.features.join(", "),
        });
    }

    debug!("feature manifest {} matches", path.display());
    Ok(())
}

/// Leading bytes of the file as an escaped byte-string literal, so an HTML
/// error page saved in place of a model is obvious in the logs.
pub fn first_bytes(path: &Path) -> String {
    let mut buf = Vec::new();
    match File::open(path).and_then(|f| f.take(DIAGNOSTIC_BYTES).read_to_end(&mut buf)) {
        Ok(_) => render_bytes(&buf),
        Err(e) => format!("<unreadable: {e}>"),
    }
}

fn render_bytes(bytes: &[u8]) -> String {
    let escaped: String = bytes
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect();
    format!("b'{escaped}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_utils::ModelTrait;
    use anyhow::bail;
    use async_trait::async_trait;
    use ndarray::Array2;

    struct FakeModel {
        accept: bool,
        width: Option<usize>,
    }

    #[async_trait]
    impl ModelTrait for FakeModel {
        async fn load_model(&mut self, _model_path: &Path) -> anyhow::Result<()> {
            if !self.accept {
                bail!("unsupported model format");
            }
            Ok(())
        }

        fn input_width(&self) -> Option<usize> {
            self.width
        }

        async fn predict(&self, _features: Array2<f64>) -> anyhow::Result<f64> {
            Ok(0.0)
        }
    }

    fn accepting() -> FakeModel {
        FakeModel {
            accept: true,
            width: Some(FEATURE_COUNT),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "taxifare-loader-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_artifact(dir: &Path, contents: &[u8]) -> PathBuf {
        let path = dir.join("model.onnx");
        fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_file_is_reported_with_its_path() {
        let dir = scratch_dir("missing");
        let path = dir.join("absent.onnx");
        let err = load_model_into(&path, accepting()).await.err().unwrap();
        assert!(matches!(err, LoadError::MissingOrTooSmall { .. }));
        assert_eq!(
            err.to_string(),
            format!("Model file missing or too small: {}", path.display())
        );
    }

    #[tokio::test]
    async fn tiny_file_is_rejected_before_deserializing() {
        let dir = scratch_dir("tiny");
        let path = write_artifact(&dir, &[0u8; 99]);
        let err = load_model_into(&path, accepting()).await.err().unwrap();
        assert!(matches!(err, LoadError::MissingOrTooSmall { .. }));
    }

    #[tokio::test]
    async fn deserialize_failure_echoes_leading_bytes() {
        let dir = scratch_dir("html");
        let mut page = b"<!DOCTYPE html>\n<html><head><title>404</title></head>".to_vec();
        page.resize(256, b' ');
        let path = write_artifact(&dir, &page);

        let err = load_model_into(
            &path,
            FakeModel {
                accept: false,
                width: None,
            },
        )
        .await
        .err()
        .unwrap();

        let message = err.to_string();
        assert!(matches!(err, LoadError::Deserialize { .. }));
        assert!(message.starts_with(&format!("Failed to deserialize {}", path.display())));
        assert!(message.ends_with("First bytes: b'<!DOCTYPE html>\\n<html><head><tit'"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "unsupported model format");
    }

    #[tokio::test]
    async fn manifest_with_wrong_order_is_rejected() {
        let dir = scratch_dir("order");
        let path = write_artifact(&dir, &[1u8; 128]);
        let mut manifest = FeatureManifest::default();
        manifest.features.swap(0, 1);
        fs::write(
            manifest_path(&path),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        let err = load_model_into(&path, accepting()).await.err().unwrap();
        match err {
            LoadError::SchemaMismatch { found, .. } => {
                assert!(found.starts_with("trip_distance, passenger_count"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_manifest_is_rejected() {
        let dir = scratch_dir("malformed");
        let path = write_artifact(&dir, &[1u8; 128]);
        fs::write(manifest_path(&path), "[\"passenger_count\"]").unwrap();

        let err = load_model_into(&path, accepting()).await.err().unwrap();
        assert!(matches!(err, LoadError::Manifest { .. }));
    }

    #[tokio::test]
    async fn input_width_must_match_feature_count() {
        let dir = scratch_dir("width");
        let path = write_artifact(&dir, &[1u8; 128]);
        let err = load_model_into(
            &path,
            FakeModel {
                accept: true,
                width: Some(9),
            },
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(
            err,
            LoadError::FeatureCountMismatch {
                expected: 8,
                found: 9,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn loads_with_matching_manifest_or_dynamic_width() {
        let dir = scratch_dir("ok");
        let path = write_artifact(&dir, &[1u8; 128]);
        fs::write(
            manifest_path(&path),
            serde_json::to_string(&FeatureManifest::default()).unwrap(),
        )
        .unwrap();
        assert!(load_model_into(&path, accepting()).await.is_ok());

        let dynamic = FakeModel {
            accept: true,
            width: None,
        };
        assert!(load_model_into(&path, dynamic).await.is_ok());
    }

    #[cfg(feature = "heavyweight")]
    #[tokio::test]
    async fn onnx_backend_rejects_html_saved_as_model() {
        let dir = scratch_dir("onnx-html");
        let mut page = b"<!DOCTYPE html>\n<html><body>Not Found</body></html>".to_vec();
        page.resize(512, b' ');
        let path = write_artifact(&dir, &page);

        let err = load_model(&path, Backend::ONNX).await.err().unwrap();
        assert!(matches!(err, LoadError::Deserialize { .. }));
        assert!(err
            .to_string()
            .ends_with("First bytes: b'<!DOCTYPE html>\\n<html><body>Not '"));
    }

    #[test]
    fn renders_bytes_as_escaped_literal() {
        assert_eq!(render_bytes(b"PK\x03\x04'"), "b'PK\\x03\\x04\\''");
    }
}

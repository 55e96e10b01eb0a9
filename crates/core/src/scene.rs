//! Vector scene JSON
//!
//! The scene holds every committed annotation plus the view transform that
//! was active when it was written. It is the engine's own reload format.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::document::PageViewport;
use crate::error::{EngineError, EngineResult};
use crate::store::AnnotationStore;

pub const SCENE_VERSION: u32 = 1;

/// View transform at export time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneView {
    pub page: u32,
    pub scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<PageViewport>,
}

impl Default for SceneView {
    fn default() -> Self {
        Self {
            page: 0,
            scale: 1.0,
            viewport: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub version: u32,
    #[serde(default)]
    pub view: SceneView,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Scene {
    pub fn from_store(store: &AnnotationStore, view: SceneView) -> Self {
        Self {
            version: SCENE_VERSION,
            view,
            annotations: store.all().into_iter().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a scene, rejecting versions this build does not understand
    ///
    /// Records are not validated here; the store does that on import.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let scene: Scene = serde_json::from_str(json)?;
        if scene.version != SCENE_VERSION {
            return Err(EngineError::UnsupportedSceneVersion(scene.version));
        }
        Ok(scene)
    }

    /// Write atomically through a sibling temporary file
    pub fn write(&self, path: &Path) -> EngineResult<()> {
        let json = self.to_json()?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> EngineResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationType, Color, DocPoint, DocRect};

    fn sample_store() -> AnnotationStore {
        let mut store = AnnotationStore::new();
        store
            .add(Annotation::new(
                AnnotationType::Circle,
                0,
                DocRect::from([10.0, 10.0, 50.0, 40.0]),
                Color::MAGENTA,
                "User",
            ))
            .unwrap();
        let path = vec![DocPoint::new(1.0, 1.0), DocPoint::new(9.0, 4.0)];
        store
            .add(
                Annotation::new(
                    AnnotationType::Ink,
                    2,
                    DocRect::bounding(&path).unwrap(),
                    Color::RED,
                    "User",
                )
                .with_vertices(path),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.json");
        let view = SceneView {
            page: 2,
            scale: 1.5,
            viewport: Some(PageViewport {
                width: 612.0,
                height: 792.0,
            }),
        };
        let scene = Scene::from_store(&sample_store(), view);
        scene.write(&path).expect("write scene");

        let loaded = Scene::read(&path).expect("read scene");
        assert_eq!(loaded, scene);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_minimal_scene_defaults() {
        let scene = Scene::from_json(r#"{"version":1}"#).unwrap();
        assert!(scene.annotations.is_empty());
        assert_eq!(scene.view, SceneView::default());
    }

    #[test]
    fn test_unknown_version_rejected() {
        assert!(matches!(
            Scene::from_json(r#"{"version":7}"#),
            Err(EngineError::UnsupportedSceneVersion(7))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            Scene::from_json("{not json"),
            Err(EngineError::Scene(_))
        ));
    }
}

//! Source-entity snapshots supplied by upstream collaborators.
//!
//! The engine indexes four categories of already-persisted records: room
//! geometry extracted from floor plans, per-room visual analyses, whole-plan
//! spatial analyses, and home-level attribute sheets. Their producers (the
//! structural record store, the analysis pipelines, the image and floor-plan
//! registries) are reached through the `SourceRegistry` and `MediaRegistry`
//! traits; the engine never talks to their storage directly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::errors::KnowledgeError;

/// Category of the entity a document was synthesized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    StructuralRecord,
    VisualAnalysis,
    SpatialAnalysis,
    AttributeRecord,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::StructuralRecord => "structural-record",
            SourceType::VisualAnalysis => "visual-analysis",
            SourceType::SpatialAnalysis => "spatial-analysis",
            SourceType::AttributeRecord => "attribute-record",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "structural-record" => Some(SourceType::StructuralRecord),
            "visual-analysis" => Some(SourceType::VisualAnalysis),
            "spatial-analysis" => Some(SourceType::SpatialAnalysis),
            "attribute-record" => Some(SourceType::AttributeRecord),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural scope narrowing a build pass or a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFilter {
    #[serde(default)]
    pub home_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub floor_level: Option<i64>,
}

impl ScopeFilter {
    pub fn is_empty(&self) -> bool {
        self.home_id.is_none() && self.room_id.is_none() && self.floor_level.is_none()
    }

    /// Post-filter predicate over a document's scope references.
    pub fn matches(
        &self,
        home_id: Option<&str>,
        room_id: Option<&str>,
        floor_level: Option<i64>,
    ) -> bool {
        if let Some(want) = &self.home_id {
            if home_id != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(want) = &self.room_id {
            if room_id != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(want) = self.floor_level {
            if floor_level != Some(want) {
                return false;
            }
        }
        true
    }
}

/// Room geometry extracted from a floor plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: String,
    pub home_id: String,
    pub floor_plan_id: String,
    pub floor_level: i64,
    pub room_type: String,
    pub area_sqm: f64,
    pub length_m: Option<f64>,
    pub width_m: Option<f64>,
    pub floor_material: Option<String>,
    pub wall_material: Option<String>,
    pub window_count: u32,
    pub door_count: u32,
}

/// AI image analysis of a single room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualAnalysis {
    pub id: String,
    pub home_id: String,
    pub room_id: String,
    pub detected_materials: Vec<String>,
    pub detected_fixtures: Vec<String>,
    pub style: Option<String>,
    pub condition_notes: Option<String>,
}

/// Whole-floor-plan spatial summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialAnalysis {
    pub id: String,
    pub home_id: String,
    pub floor_plan_id: String,
    pub floor_level: i64,
    pub total_area_sqm: f64,
    pub room_count: u32,
    pub adjacency_notes: Vec<String>,
}

/// Home-level attribute sheet (year built, heating, and so on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub id: String,
    pub home_id: String,
    pub attributes: BTreeMap<String, String>,
}

/// Typed per-source metadata persisted with each document.
///
/// A tagged union instead of a free-form JSON map, so the field set of each
/// source category survives storage round-trips intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceDetail {
    StructuralRecord {
        room_type: String,
        area_sqm: f64,
        window_count: u32,
        door_count: u32,
    },
    VisualAnalysis {
        detected_materials: Vec<String>,
        detected_fixtures: Vec<String>,
        style: Option<String>,
    },
    SpatialAnalysis {
        total_area_sqm: f64,
        room_count: u32,
    },
    AttributeRecord {
        attributes: BTreeMap<String, String>,
    },
}

/// Read access to the upstream record stores, narrowed by scope.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    async fn structural_records(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<RoomRecord>, KnowledgeError>;

    async fn visual_analyses(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<VisualAnalysis>, KnowledgeError>;

    async fn spatial_analyses(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<SpatialAnalysis>, KnowledgeError>;

    async fn attribute_records(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<AttributeRecord>, KnowledgeError>;
}

/// A media reference attached to a context bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    RoomImage,
    FloorPlan,
}

/// Read access to the image and floor-plan registries.
#[async_trait]
pub trait MediaRegistry: Send + Sync {
    async fn media_for_home(
        &self,
        home_id: &str,
        limit: usize,
    ) -> Result<Vec<MediaRef>, KnowledgeError>;
}

/// In-memory registry used for wiring and tests. The production platform
/// substitutes adapters over its own record stores.
#[derive(Default)]
pub struct InMemorySourceRegistry {
    rooms: RwLock<Vec<RoomRecord>>,
    visuals: RwLock<Vec<VisualAnalysis>>,
    spatials: RwLock<Vec<SpatialAnalysis>>,
    attributes: RwLock<Vec<AttributeRecord>>,
}

impl InMemorySourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_room(&self, record: RoomRecord) {
        self.rooms.write().await.push(record);
    }

    pub async fn add_visual(&self, record: VisualAnalysis) {
        self.visuals.write().await.push(record);
    }

    pub async fn add_spatial(&self, record: SpatialAnalysis) {
        self.spatials.write().await.push(record);
    }

    pub async fn add_attributes(&self, record: AttributeRecord) {
        self.attributes.write().await.push(record);
    }
}

#[async_trait]
impl SourceRegistry for InMemorySourceRegistry {
    async fn structural_records(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<RoomRecord>, KnowledgeError> {
        Ok(self
            .rooms
            .read()
            .await
            .iter()
            .filter(|r| {
                scope.matches(Some(r.home_id.as_str()), Some(r.id.as_str()), Some(r.floor_level))
            })
            .cloned()
            .collect())
    }

    async fn visual_analyses(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<VisualAnalysis>, KnowledgeError> {
        Ok(self
            .visuals
            .read()
            .await
            .iter()
            .filter(|v| scope.matches(Some(v.home_id.as_str()), Some(v.room_id.as_str()), None))
            .cloned()
            .collect())
    }

    async fn spatial_analyses(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<SpatialAnalysis>, KnowledgeError> {
        Ok(self
            .spatials
            .read()
            .await
            .iter()
            .filter(|s| scope.matches(Some(s.home_id.as_str()), None, Some(s.floor_level)))
            .cloned()
            .collect())
    }

    async fn attribute_records(
        &self,
        scope: &ScopeFilter,
    ) -> Result<Vec<AttributeRecord>, KnowledgeError> {
        Ok(self
            .attributes
            .read()
            .await
            .iter()
            .filter(|a| scope.matches(Some(a.home_id.as_str()), None, None))
            .cloned()
            .collect())
    }
}

/// In-memory media registry for wiring and tests.
#[derive(Default)]
pub struct InMemoryMediaRegistry {
    media: RwLock<Vec<(String, MediaRef)>>,
}

impl InMemoryMediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_media(&self, home_id: &str, media: MediaRef) {
        self.media
            .write()
            .await
            .push((home_id.to_string(), media));
    }
}

#[async_trait]
impl MediaRegistry for InMemoryMediaRegistry {
    async fn media_for_home(
        &self,
        home_id: &str,
        limit: usize,
    ) -> Result<Vec<MediaRef>, KnowledgeError> {
        Ok(self
            .media
            .read()
            .await
            .iter()
            .filter(|(home, _)| home == home_id)
            .map(|(_, media)| media.clone())
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_matches_narrowing() {
        let scope = ScopeFilter {
            home_id: Some("h1".into()),
            room_id: None,
            floor_level: Some(2),
        };

        assert!(scope.matches(Some("h1"), Some("r9"), Some(2)));
        assert!(!scope.matches(Some("h2"), Some("r9"), Some(2)));
        assert!(!scope.matches(Some("h1"), None, Some(1)));
        assert!(!scope.matches(None, None, None));
    }

    #[test]
    fn empty_scope_matches_everything() {
        let scope = ScopeFilter::default();
        assert!(scope.is_empty());
        assert!(scope.matches(None, None, None));
        assert!(scope.matches(Some("h1"), Some("r1"), Some(0)));
    }

    #[test]
    fn source_detail_round_trips() {
        let detail = SourceDetail::VisualAnalysis {
            detected_materials: vec!["ceramic tile".into()],
            detected_fixtures: vec!["double vanity".into()],
            style: Some("modern".into()),
        };

        let raw = serde_json::to_string(&detail).unwrap();
        assert!(raw.contains("\"kind\":\"visual-analysis\""));

        match serde_json::from_str::<SourceDetail>(&raw).unwrap() {
            SourceDetail::VisualAnalysis {
                detected_fixtures, ..
            } => assert_eq!(detected_fixtures, vec!["double vanity".to_string()]),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn in_memory_registry_filters_by_scope() {
        let registry = InMemorySourceRegistry::new();
        registry
            .add_room(RoomRecord {
                id: "r1".into(),
                home_id: "h1".into(),
                floor_plan_id: "fp1".into(),
                floor_level: 1,
                room_type: "kitchen".into(),
                area_sqm: 14.0,
                length_m: None,
                width_m: None,
                floor_material: Some("hardwood".into()),
                wall_material: None,
                window_count: 2,
                door_count: 1,
            })
            .await;

        let all = registry
            .structural_records(&ScopeFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        let other_home = registry
            .structural_records(&ScopeFilter {
                home_id: Some("h2".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(other_home.is_empty());
    }
}

//! Document builder: turns source-entity snapshots into indexed knowledge.
//!
//! For every entity in scope it synthesizes a descriptive text from the
//! salient fields, chunks it, embeds each chunk, and persists the result as
//! one unit. Entity failures are isolated: the pass logs, counts them, and
//! moves on. Cancellation is honored at per-entity boundaries, after the
//! previous entity committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::chunker;
use crate::core::errors::KnowledgeError;
use crate::embedding::EmbeddingService;
use crate::sources::{
    AttributeRecord, RoomRecord, ScopeFilter, SourceDetail, SourceRegistry, SourceType,
    SpatialAnalysis, VisualAnalysis,
};
use crate::store::{KnowledgeStore, NewDocument};

/// Outcome of one build pass. `failures` counts entities that were skipped
/// after an isolated error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub failures: usize,
}

/// Cooperative cancellation flag checked between entities.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct IndexBuilder {
    store: Arc<KnowledgeStore>,
    embedder: Arc<EmbeddingService>,
    sources: Arc<dyn SourceRegistry>,
    chunk_max_chars: usize,
}

impl IndexBuilder {
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Arc<EmbeddingService>,
        sources: Arc<dyn SourceRegistry>,
        chunk_max_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            sources,
            chunk_max_chars,
        }
    }

    /// Index every source entity in scope. Returns the partial report when
    /// the token is cancelled between entities.
    pub async fn build_index(
        &self,
        scope: &ScopeFilter,
        cancel: &CancelToken,
    ) -> Result<BuildReport, KnowledgeError> {
        let mut report = BuildReport::default();

        let rooms = self.sources.structural_records(scope).await?;
        for room in rooms {
            if self.checkpoint(cancel, &report) {
                return Ok(report);
            }
            self.index_entity(describe_room(&room), &mut report).await;
        }

        let visuals = self.sources.visual_analyses(scope).await?;
        for visual in visuals {
            if self.checkpoint(cancel, &report) {
                return Ok(report);
            }
            self.index_entity(describe_visual(&visual), &mut report).await;
        }

        let spatials = self.sources.spatial_analyses(scope).await?;
        for spatial in spatials {
            if self.checkpoint(cancel, &report) {
                return Ok(report);
            }
            self.index_entity(describe_spatial(&spatial), &mut report)
                .await;
        }

        let attributes = self.sources.attribute_records(scope).await?;
        for record in attributes {
            if self.checkpoint(cancel, &report) {
                return Ok(report);
            }
            self.index_entity(describe_attributes(&record), &mut report)
                .await;
        }

        tracing::info!(
            "Build pass complete: {} documents, {} chunks, {} failures",
            report.documents,
            report.chunks,
            report.failures
        );
        Ok(report)
    }

    fn checkpoint(&self, cancel: &CancelToken, report: &BuildReport) -> bool {
        if cancel.is_cancelled() {
            tracing::info!(
                "Build pass cancelled after {} documents ({} chunks)",
                report.documents,
                report.chunks
            );
            return true;
        }
        false
    }

    async fn index_entity(&self, document: NewDocument, report: &mut BuildReport) {
        let source_type = document.source_type;
        let source_id = document.source_id.clone();

        match self.index_document(document).await {
            Ok(chunk_count) => {
                report.documents += 1;
                report.chunks += chunk_count;
            }
            Err(err) => {
                tracing::warn!(
                    "Skipping {} {}: {}",
                    source_type,
                    source_id,
                    err
                );
                report.failures += 1;
            }
        }
    }

    async fn index_document(&self, document: NewDocument) -> Result<usize, KnowledgeError> {
        let spans = chunker::chunk(&document.body, self.chunk_max_chars);

        let mut chunks = Vec::with_capacity(spans.len());
        for span in spans {
            let vector = self.embedder.embed(&span).await?;
            chunks.push((span, vector));
        }

        self.store
            .upsert_document(
                &document,
                &chunks,
                self.embedder.model_id(),
                self.embedder.dim(),
            )
            .await?;
        Ok(chunks.len())
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn describe_room(room: &RoomRecord) -> NewDocument {
    let mut text = format!(
        "{} on floor {} measuring {:.1} square meters.",
        capitalize(&room.room_type),
        room.floor_level,
        room.area_sqm
    );
    if let (Some(length), Some(width)) = (room.length_m, room.width_m) {
        text.push_str(&format!(" Dimensions: {length:.1} m by {width:.1} m."));
    }
    if let Some(floor) = &room.floor_material {
        text.push_str(&format!(" Flooring: {floor}."));
    }
    if let Some(wall) = &room.wall_material {
        text.push_str(&format!(" Walls: {wall}."));
    }
    text.push_str(&format!(
        " {} windows and {} doors.",
        room.window_count, room.door_count
    ));

    NewDocument {
        source_type: SourceType::StructuralRecord,
        source_id: room.id.clone(),
        home_id: Some(room.home_id.clone()),
        room_id: Some(room.id.clone()),
        floor_plan_id: Some(room.floor_plan_id.clone()),
        floor_level: Some(room.floor_level),
        title: format!("{} (floor {})", capitalize(&room.room_type), room.floor_level),
        body: text,
        detail: SourceDetail::StructuralRecord {
            room_type: room.room_type.clone(),
            area_sqm: room.area_sqm,
            window_count: room.window_count,
            door_count: room.door_count,
        },
    }
}

fn describe_visual(visual: &VisualAnalysis) -> NewDocument {
    let mut text = String::new();
    if !visual.detected_materials.is_empty() {
        text.push_str(&format!(
            "Detected materials: {}.",
            visual.detected_materials.join(", ")
        ));
    }
    if !visual.detected_fixtures.is_empty() {
        text.push_str(&format!(
            " Fixtures: {}.",
            visual.detected_fixtures.join(", ")
        ));
    }
    if let Some(style) = &visual.style {
        text.push_str(&format!(" Style: {style}."));
    }
    if let Some(notes) = &visual.condition_notes {
        text.push_str(&format!(" Condition: {notes}."));
    }
    if text.is_empty() {
        text = "Room image analyzed; nothing notable detected.".to_string();
    }

    NewDocument {
        source_type: SourceType::VisualAnalysis,
        source_id: visual.id.clone(),
        home_id: Some(visual.home_id.clone()),
        room_id: Some(visual.room_id.clone()),
        floor_plan_id: None,
        floor_level: None,
        title: "Room visual analysis".to_string(),
        body: text.trim().to_string(),
        detail: SourceDetail::VisualAnalysis {
            detected_materials: visual.detected_materials.clone(),
            detected_fixtures: visual.detected_fixtures.clone(),
            style: visual.style.clone(),
        },
    }
}

fn describe_spatial(spatial: &SpatialAnalysis) -> NewDocument {
    let mut text = format!(
        "Floor {} layout: {} rooms over {:.1} square meters.",
        spatial.floor_level, spatial.room_count, spatial.total_area_sqm
    );
    for note in &spatial.adjacency_notes {
        text.push_str(&format!(" {note}."));
    }

    NewDocument {
        source_type: SourceType::SpatialAnalysis,
        source_id: spatial.id.clone(),
        home_id: Some(spatial.home_id.clone()),
        room_id: None,
        floor_plan_id: Some(spatial.floor_plan_id.clone()),
        floor_level: Some(spatial.floor_level),
        title: format!("Floor {} layout", spatial.floor_level),
        body: text,
        detail: SourceDetail::SpatialAnalysis {
            total_area_sqm: spatial.total_area_sqm,
            room_count: spatial.room_count,
        },
    }
}

fn describe_attributes(record: &AttributeRecord) -> NewDocument {
    let mut parts: Vec<String> = record
        .attributes
        .iter()
        .map(|(key, value)| format!("{}: {value}", key.replace('_', " ")))
        .collect();
    if parts.is_empty() {
        parts.push("no recorded attributes".to_string());
    }
    let text = format!("Home attributes. {}.", parts.join(". "));

    NewDocument {
        source_type: SourceType::AttributeRecord,
        source_id: record.id.clone(),
        home_id: Some(record.home_id.clone()),
        room_id: None,
        floor_plan_id: None,
        floor_level: None,
        title: "Home attribute sheet".to_string(),
        body: text,
        detail: SourceDetail::AttributeRecord {
            attributes: record.attributes.clone(),
        },
    }
}

//! GraphRAG core: entity/relationship extraction, entity resolution,
//! label-propagation community detection, and community summarization.
//!
//! The teacher ships no knowledge-graph subsystem; this module is new,
//! built in the teacher's `async_trait` + bounded-concurrency idiom seen in
//! `llm/coordinator.rs` (batched LLM calls, per-item failure isolation) and
//! over the [`crate::adapters::graph_store::GraphStore`] capability
//! enriched from `llmspell-graph`'s trait shape.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;

use crate::adapters::embedder::Embedder;
use crate::adapters::graph_store::GraphStore;
use crate::adapters::llm::LlmClient;
use crate::error::Result;
use crate::types::{Community, Entity, Relationship};

/// Entity types an extraction prompt is allowed to emit.
pub const ALLOWED_ENTITY_TYPES: &[&str] = &[
    "Module",
    "Class",
    "Function",
    "Variable",
    "Concept",
    "Person",
    "Organization",
    "Other",
];

/// Relationship types an extraction prompt is allowed to emit.
pub const ALLOWED_RELATIONSHIP_TYPES: &[&str] = &[
    "CALLS",
    "USES",
    "EXTENDS",
    "IMPLEMENTS",
    "CONTAINS",
    "DEPENDS_ON",
    "RELATED_TO",
    "CREATED_BY",
];

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub max_concurrency: usize,
    pub rate_limit: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            rate_limit: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source: Option<String>,
    target: Option<String>,
    #[serde(rename = "type")]
    relationship_type: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

fn extraction_system_prompt() -> String {
    format!(
        "You extract entities and relationships from text for a knowledge graph.\n\
         Allowed entity types: {}.\n\
         Allowed relationship types: {}.\n\
         Respond with a single JSON object: {{\"entities\": [{{\"name\", \"type\", \"description\"}}], \
         \"relationships\": [{{\"source\", \"target\", \"type\", \"description\"}}]}}.",
        ALLOWED_ENTITY_TYPES.join(", "),
        ALLOWED_RELATIONSHIP_TYPES.join(", ")
    )
}

/// Finds the first balanced `{...}` region in `text`, tolerating prose
/// before or after it.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_extraction(response: &str) -> (Vec<Entity>, Vec<Relationship>) {
    let Some(object) = first_balanced_object(response) else {
        return (Vec::new(), Vec::new());
    };
    let Ok(raw) = serde_json::from_str::<RawExtraction>(object) else {
        return (Vec::new(), Vec::new());
    };

    let entities: Vec<Entity> = raw
        .entities
        .into_iter()
        .filter_map(|e| {
            let name = e.name?;
            if name.trim().is_empty() {
                return None;
            }
            let mut entity = Entity::new(name, e.entity_type.unwrap_or_else(|| "Other".to_string()));
            entity.description = e.description;
            Some(entity)
        })
        .collect();

    let relationships: Vec<Relationship> = raw
        .relationships
        .into_iter()
        .filter_map(|r| {
            let source = r.source?;
            let target = r.target?;
            if source.trim().is_empty() || target.trim().is_empty() {
                return None;
            }
            Some(Relationship {
                source,
                target,
                relationship_type: r.relationship_type.unwrap_or_else(|| "RELATED_TO".to_string()),
                description: r.description,
            })
        })
        .collect();

    (entities, relationships)
}

/// Extracts entities and relationships from one chunk of text.
pub async fn extract_entities(llm: &dyn LlmClient, text: &str) -> Result<(Vec<Entity>, Vec<Relationship>)> {
    let response = llm.generate_with_system(&extraction_system_prompt(), text).await?;
    Ok(parse_extraction(&response))
}

/// Extracts over many chunks with bounded concurrency and an inter-batch
/// sleep. A failure on an individual chunk is swallowed (logged by the
/// caller's telemetry layer) and does not fail the batch.
pub async fn extract_batch(llm: &dyn LlmClient, texts: &[String], opts: &ExtractionOptions) -> (Vec<Entity>, Vec<Relationship>) {
    let results: Vec<(Vec<Entity>, Vec<Relationship>)> = stream::iter(texts.iter())
        .map(|text| async move { extract_entities(llm, text).await.unwrap_or_default() })
        .buffer_unordered(opts.max_concurrency.max(1))
        .collect()
        .await;

    if !opts.rate_limit.is_zero() {
        tokio::time::sleep(opts.rate_limit).await;
    }

    let mut entities = Vec::new();
    let mut relationships = Vec::new();
    for (e, r) in results {
        entities.extend(e);
        relationships.extend(r);
    }
    (entities, relationships)
}

/// Jaccard similarity over the sets of characters of the lowercased names.
fn name_jaccard(a: &str, b: &str) -> f32 {
    let set_a: HashSet<char> = a.to_lowercase().chars().collect();
    let set_b: HashSet<char> = b.to_lowercase().chars().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Merges entities whose lowercased-name Jaccard similarity meets
/// `threshold` (default 0.85). The merged entity keeps the earlier-seen
/// entity's `name`/`type`, and the longer of the two descriptions.
pub fn resolve_entities(entities: Vec<Entity>, threshold: f32) -> Vec<Entity> {
    let mut resolved: Vec<Entity> = Vec::new();
    for entity in entities {
        let existing = resolved.iter_mut().find(|e: &&mut Entity| name_jaccard(&e.name, &entity.name) >= threshold);
        match existing {
            Some(existing) => {
                let merged_description = match (&existing.description, &entity.description) {
                    (Some(a), Some(b)) if b.len() > a.len() => Some(b.clone()),
                    (None, Some(b)) => Some(b.clone()),
                    (existing_desc, _) => existing_desc.clone(),
                };
                existing.description = merged_description;
            }
            None => resolved.push(entity),
        }
    }
    resolved
}

#[derive(Debug, Clone)]
pub struct CommunityDetectionOptions {
    pub max_iterations: usize,
    pub convergence_threshold: f32,
}

impl Default for CommunityDetectionOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 0.01,
        }
    }
}

/// Synchronous label propagation (§4.8). Nodes are visited in sorted-id
/// order each round rather than randomly shuffled, and ties are broken by
/// the smallest label value, so detection is fully deterministic — see the
/// open-question decision recorded for this module.
pub fn detect_communities(entities: &[Entity], relationships: &[Relationship], opts: &CommunityDetectionOptions) -> Vec<Community> {
    if entities.is_empty() {
        return Vec::new();
    }

    let mut sorted_ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    sorted_ids.sort_unstable();

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for r in relationships {
        adjacency.entry(r.source.as_str()).or_default().push(r.target.as_str());
        adjacency.entry(r.target.as_str()).or_default().push(r.source.as_str());
    }

    let mut labels: HashMap<&str, usize> = sorted_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    for _ in 0..opts.max_iterations {
        let mut changed = 0usize;
        for &id in &sorted_ids {
            let Some(neighbors) = adjacency.get(id) else { continue };
            if neighbors.is_empty() {
                continue;
            }
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for neighbor in neighbors {
                let label = labels[neighbor];
                *counts.entry(label).or_insert(0) += 1;
            }
            let max_count = *counts.values().max().unwrap_or(&0);
            let current_label = labels[id];
            if counts.get(&current_label).copied().unwrap_or(0) == max_count {
                continue; // tie includes current label: keep it
            }
            let winner = counts
                .iter()
                .filter(|(_, count)| **count == max_count)
                .map(|(label, _)| *label)
                .min()
                .unwrap_or(current_label);
            if winner != current_label {
                labels.insert(id, winner);
                changed += 1;
            }
        }
        let fraction_changed = changed as f32 / sorted_ids.len() as f32;
        if fraction_changed < opts.convergence_threshold {
            break;
        }
    }

    let mut by_label: HashMap<usize, Vec<String>> = HashMap::new();
    for &id in &sorted_ids {
        by_label.entry(labels[id]).or_default().push(id.to_string());
    }
    let mut label_keys: Vec<usize> = by_label.keys().copied().collect();
    label_keys.sort_unstable();

    label_keys
        .into_iter()
        .enumerate()
        .map(|(index, label)| Community {
            id: format!("community_{index}"),
            level: 0,
            member_entity_ids: by_label.remove(&label).unwrap_or_default(),
            summary: None,
            embedding: None,
        })
        .collect()
}

/// Merges communities whose size is below `2^level` into larger siblings,
/// one level at a time, emitting `community_l<level>_<index>` ids. Returns
/// every level from 1 up to `max_level` inclusive (level 0 is the input).
pub fn build_hierarchy(base: &[Community], max_level: usize) -> Vec<Community> {
    let mut hierarchy = Vec::new();
    let mut current = base.to_vec();

    for level in 1..=max_level {
        let threshold = 1usize << level;
        let (small, mut large): (Vec<Community>, Vec<Community>) =
            current.into_iter().partition(|c| c.member_entity_ids.len() < threshold);

        if small.is_empty() {
            current = large;
            continue;
        }

        let mut merged_members: Vec<String> = small.iter().flat_map(|c| c.member_entity_ids.clone()).collect();
        merged_members.sort_unstable();
        merged_members.dedup();

        large.push(Community {
            id: String::new(),
            level,
            member_entity_ids: merged_members,
            summary: None,
            embedding: None,
        });

        current = large
            .into_iter()
            .enumerate()
            .map(|(index, mut c)| {
                c.id = format!("community_l{level}_{index}");
                c.level = level;
                c
            })
            .collect();
        hierarchy.extend(current.clone());
    }

    hierarchy
}

/// Builds a summarization prompt for one community from its members and
/// the relationships among them.
fn summarization_prompt(members: &[Entity], relationships: &[Relationship]) -> String {
    let member_lines: Vec<String> = members
        .iter()
        .map(|e| format!("- {} ({}): {}", e.name, e.entity_type, e.description.clone().unwrap_or_default()))
        .collect();
    let member_ids: HashSet<&str> = members.iter().map(|e| e.id.as_str()).collect();
    let relationship_lines: Vec<String> = relationships
        .iter()
        .filter(|r| member_ids.contains(r.source.as_str()) && member_ids.contains(r.target.as_str()))
        .map(|r| format!("- {} {} {}", r.source, r.relationship_type, r.target))
        .collect();
    format!(
        "Summarize this cluster of related entities in a few sentences.\n\nEntities:\n{}\n\nRelationships:\n{}",
        member_lines.join("\n"),
        relationship_lines.join("\n")
    )
}

/// Summarizes every community in `communities`: builds a prompt from its
/// members, generates a prose summary, embeds it, and persists both on the
/// graph store. Bounded concurrency like extraction.
pub async fn summarize_communities(
    llm: &dyn LlmClient,
    embedder: &dyn Embedder,
    graph_store: &dyn GraphStore,
    graph: &str,
    communities: &[Community],
    relationships: &[Relationship],
    opts: &ExtractionOptions,
) -> Result<()> {
    let tasks = stream::iter(communities.iter()).map(|community| async move {
        let members = graph_store.get_community_members(graph, &community.id).await?;
        let prompt = summarization_prompt(&members, relationships);
        let summary = llm.generate(&prompt).await?;
        let embedding = embedder.embed(&summary).await?;
        graph_store
            .update_community_summary(graph, &community.id, summary, embedding.vector)
            .await
    });

    let results: Vec<Result<()>> = tasks.buffer_unordered(opts.max_concurrency.max(1)).collect().await;
    for result in results {
        result?;
    }
    Ok(())
}

//! The graph store capability backing GraphRAG: entities, relationships,
//! communities, and the traversal/vector-search operations the local/global
//! retrievers need.
//!
//! The teacher ships no graph store; this is new, enriched from
//! `llmspell-graph`'s trait shape (`traits/knowledge_graph.rs`) for the async
//! entities/relationships contract, generalized to the community/label-
//! propagation operations the expanded specification calls for, in the
//! teacher's `async_trait` + `thiserror` + `tracing` idiom rather than
//! llmspell's bi-temporal model (out of scope here).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{RagError, Result};
use crate::types::{Community, Entity, Relationship};

/// Search-by-embedding hit against entities or community summaries.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Stores entities, relationships, and communities for one or more named
/// graphs, and answers the traversal/vector-search queries GraphRAG needs.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_graph(&self, graph: &str) -> Result<()>;
    async fn delete_graph(&self, graph: &str) -> Result<()>;

    async fn create_entity(&self, graph: &str, entity: Entity) -> Result<()>;
    async fn get_entity(&self, graph: &str, id: &str) -> Result<Option<Entity>>;
    async fn list_entities(&self, graph: &str) -> Result<Vec<Entity>>;
    async fn delete_entity(&self, graph: &str, id: &str) -> Result<bool>;

    async fn create_relationship(&self, graph: &str, relationship: Relationship) -> Result<()>;
    async fn list_relationships(&self, graph: &str) -> Result<Vec<Relationship>>;

    /// Direct neighbors of `entity_id`, in either direction.
    async fn get_neighbors(&self, graph: &str, entity_id: &str) -> Result<Vec<Entity>>;

    /// Breadth-first search outward from `entity_id` up to `depth` hops,
    /// returning entities in distance order (closest first).
    async fn bfs(&self, graph: &str, entity_id: &str, depth: usize) -> Result<Vec<Entity>>;

    /// Entities whose embedding is most similar to `vector`.
    async fn search_entities_by_vector(&self, graph: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    async fn create_community(&self, graph: &str, community: Community) -> Result<()>;
    async fn list_communities(&self, graph: &str, level: Option<usize>) -> Result<Vec<Community>>;
    async fn get_community_members(&self, graph: &str, community_id: &str) -> Result<Vec<Entity>>;
    async fn update_community_summary(
        &self,
        graph: &str,
        community_id: &str,
        summary: String,
        embedding: Vec<f32>,
    ) -> Result<()>;
    async fn delete_community(&self, graph: &str, community_id: &str) -> Result<bool>;

    /// Community summaries most similar to `vector`, used by global search.
    async fn search_communities_by_vector(&self, graph: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Replace every community at every level for `graph` in one shot —
    /// community detection always regenerates from scratch rather than
    /// updating incrementally.
    async fn replace_communities(&self, graph: &str, communities: Vec<Community>) -> Result<()>;
}

#[derive(Default)]
struct GraphData {
    entities: HashMap<String, Entity>,
    relationships: Vec<Relationship>,
    communities: HashMap<String, Community>,
}

/// In-memory graph store, good enough to exercise every GraphRAG operation
/// and the round-trip scenarios in tests. Single-writer discipline per
/// graph is enforced by the caller, matching the concurrency model's
/// community-detector note; this store only guards its own maps.
#[derive(Default)]
pub struct InMemoryGraphStore {
    graphs: RwLock<HashMap<String, GraphData>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_graph(&self, graph: &str) -> Result<()> {
        self.graphs.write().entry(graph.to_string()).or_default();
        Ok(())
    }

    async fn delete_graph(&self, graph: &str) -> Result<()> {
        self.graphs.write().remove(graph);
        Ok(())
    }

    async fn create_entity(&self, graph: &str, entity: Entity) -> Result<()> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        data.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn get_entity(&self, graph: &str, id: &str) -> Result<Option<Entity>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        Ok(data.entities.get(id).cloned())
    }

    async fn list_entities(&self, graph: &str) -> Result<Vec<Entity>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        Ok(data.entities.values().cloned().collect())
    }

    async fn delete_entity(&self, graph: &str, id: &str) -> Result<bool> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        Ok(data.entities.remove(id).is_some())
    }

    async fn create_relationship(&self, graph: &str, relationship: Relationship) -> Result<()> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        data.relationships.push(relationship);
        Ok(())
    }

    async fn list_relationships(&self, graph: &str) -> Result<Vec<Relationship>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        Ok(data.relationships.clone())
    }

    async fn get_neighbors(&self, graph: &str, entity_id: &str) -> Result<Vec<Entity>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        let neighbor_ids: HashSet<&str> = data
            .relationships
            .iter()
            .filter_map(|r| {
                if r.source == entity_id {
                    Some(r.target.as_str())
                } else if r.target == entity_id {
                    Some(r.source.as_str())
                } else {
                    None
                }
            })
            .collect();
        Ok(neighbor_ids
            .into_iter()
            .filter_map(|id| data.entities.get(id).cloned())
            .collect())
    }

    async fn bfs(&self, graph: &str, entity_id: &str, depth: usize) -> Result<Vec<Entity>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        let adjacency = build_adjacency(&data.relationships);

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(entity_id.to_string());
        let mut frontier = vec![entity_id.to_string()];
        let mut ordered = Vec::new();

        for _ in 0..depth {
            let mut next_frontier = Vec::new();
            for node in &frontier {
                if let Some(neighbors) = adjacency.get(node.as_str()) {
                    let mut sorted_neighbors: Vec<&str> = neighbors.iter().copied().collect();
                    sorted_neighbors.sort_unstable();
                    for neighbor in sorted_neighbors {
                        if visited.insert(neighbor.to_string()) {
                            ordered.push(neighbor.to_string());
                            next_frontier.push(neighbor.to_string());
                        }
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(ordered.into_iter().filter_map(|id| data.entities.get(&id).cloned()).collect())
    }

    async fn search_entities_by_vector(&self, graph: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        let mut hits: Vec<VectorHit> = data
            .entities
            .values()
            .filter_map(|e| {
                e.embedding.as_ref().map(|emb| VectorHit {
                    id: e.id.clone(),
                    score: cosine(vector, emb),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn create_community(&self, graph: &str, community: Community) -> Result<()> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        data.communities.insert(community.id.clone(), community);
        Ok(())
    }

    async fn list_communities(&self, graph: &str, level: Option<usize>) -> Result<Vec<Community>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        Ok(data
            .communities
            .values()
            .filter(|c| level.map(|l| c.level == l).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_community_members(&self, graph: &str, community_id: &str) -> Result<Vec<Entity>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        let community = data
            .communities
            .get(community_id)
            .ok_or_else(|| RagError::NotFound(community_id.to_string()))?;
        Ok(community
            .member_entity_ids
            .iter()
            .filter_map(|id| data.entities.get(id).cloned())
            .collect())
    }

    async fn update_community_summary(
        &self,
        graph: &str,
        community_id: &str,
        summary: String,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        let community = data
            .communities
            .get_mut(community_id)
            .ok_or_else(|| RagError::NotFound(community_id.to_string()))?;
        community.summary = Some(summary);
        community.embedding = Some(embedding);
        Ok(())
    }

    async fn delete_community(&self, graph: &str, community_id: &str) -> Result<bool> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        Ok(data.communities.remove(community_id).is_some())
    }

    async fn search_communities_by_vector(&self, graph: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let graphs = self.graphs.read();
        let data = graphs.get(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        let mut hits: Vec<VectorHit> = data
            .communities
            .values()
            .filter_map(|c| {
                c.embedding.as_ref().map(|emb| VectorHit {
                    id: c.id.clone(),
                    score: cosine(vector, emb),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn replace_communities(&self, graph: &str, communities: Vec<Community>) -> Result<()> {
        let mut graphs = self.graphs.write();
        let data = graphs.get_mut(graph).ok_or_else(|| RagError::NotFound(graph.to_string()))?;
        data.communities = communities.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(())
    }
}

fn build_adjacency(relationships: &[Relationship]) -> HashMap<&str, HashSet<&str>> {
    let mut adjacency: HashMap<&str, HashSet<&str>> = HashMap::new();
    for r in relationships {
        adjacency.entry(r.source.as_str()).or_default().insert(r.target.as_str());
        adjacency.entry(r.target.as_str()).or_default().insert(r.source.as_str());
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn triangle_graph() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store.create_graph("g").await.unwrap();
        for name in ["A", "B", "C"] {
            let mut e = Entity::new(name, "Concept");
            e.id = name.to_string();
            store.create_entity("g", e).await.unwrap();
        }
        for (source, target) in [("A", "B"), ("B", "C"), ("A", "C")] {
            store
                .create_relationship(
                    "g",
                    Relationship {
                        source: source.to_string(),
                        target: target.to_string(),
                        relationship_type: "RELATED_TO".to_string(),
                        description: None,
                    },
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn neighbors_are_bidirectional() {
        let store = triangle_graph().await;
        let neighbors = store.get_neighbors("g", "A").await.unwrap();
        let names: HashSet<String> = neighbors.into_iter().map(|e| e.name).collect();
        assert_eq!(names, HashSet::from(["B".to_string(), "C".to_string()]));
    }

    #[tokio::test]
    async fn bfs_depth_one_reaches_direct_neighbors_only() {
        let store = InMemoryGraphStore::new();
        store.create_graph("g").await.unwrap();
        for name in ["A", "B", "C"] {
            let mut e = Entity::new(name, "Concept");
            e.id = name.to_string();
            store.create_entity("g", e).await.unwrap();
        }
        store
            .create_relationship(
                "g",
                Relationship {
                    source: "A".into(),
                    target: "B".into(),
                    relationship_type: "RELATED_TO".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        store
            .create_relationship(
                "g",
                Relationship {
                    source: "B".into(),
                    target: "C".into(),
                    relationship_type: "RELATED_TO".into(),
                    description: None,
                },
            )
            .await
            .unwrap();

        let one_hop = store.bfs("g", "A", 1).await.unwrap();
        assert_eq!(one_hop.len(), 1);
        assert_eq!(one_hop[0].name, "B");

        let two_hop = store.bfs("g", "A", 2).await.unwrap();
        assert_eq!(two_hop.len(), 2);
    }

    #[tokio::test]
    async fn community_round_trip() {
        let store = triangle_graph().await;
        store
            .create_community(
                "g",
                Community {
                    id: "community_0".into(),
                    level: 0,
                    member_entity_ids: vec!["A".into(), "B".into(), "C".into()],
                    summary: None,
                    embedding: None,
                },
            )
            .await
            .unwrap();

        let members = store.get_community_members("g", "community_0").await.unwrap();
        assert_eq!(members.len(), 3);

        store
            .update_community_summary("g", "community_0", "a tightly connected trio".into(), vec![1.0, 0.0])
            .await
            .unwrap();
        let communities = store.list_communities("g", Some(0)).await.unwrap();
        assert_eq!(communities[0].summary.as_deref(), Some("a tightly connected trio"));
    }
}

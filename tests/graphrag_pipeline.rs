//! End-to-end GraphRAG sweep: extraction from scripted LLM responses,
//! entity resolution, and label-propagation community detection chained
//! together the way an ingestion-time graph build would run them.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use ragforge::adapters::llm::{LlmClient, Role};
use ragforge::error::Result;
use ragforge::graphrag::{detect_communities, extract_batch, resolve_entities, CommunityDetectionOptions, ExtractionOptions};
use ragforge::types::Relationship;

struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
        }
    }

    fn next(&self) -> String {
        self.responses.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.next())
    }
    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        Ok(self.next())
    }
    async fn generate_with_history(&self, _messages: &[(Role, String)]) -> Result<String> {
        Ok(self.next())
    }
    fn model_name(&self) -> &str {
        "scripted-graphrag-test-llm"
    }
}

#[tokio::test]
async fn extraction_resolution_and_community_detection_chain_together() {
    let llm = ScriptedLlm::new(vec![
        r#"{"entities": [{"name": "Widget", "type": "Class", "description": "core class"}, {"name": "Gadget", "type": "Class", "description": "helper class"}], "relationships": [{"source": "Widget", "target": "Gadget", "type": "USES", "description": "Widget uses Gadget"}]}"#,
        r#"{"entities": [{"name": "widget", "type": "Class", "description": "core class, alternate casing"}], "relationships": []}"#,
    ]);

    let texts = vec![
        "class Widget { fn render(&self) { Gadget::draw(); } }".to_string(),
        "the widget subsystem is the entry point for rendering".to_string(),
    ];

    let (entities, relationships) = extract_batch(&llm, &texts, &ExtractionOptions::default()).await;
    assert_eq!(entities.len(), 3);
    assert_eq!(relationships.len(), 1);

    let resolved = resolve_entities(entities, 0.85);
    // "Widget" and "widget" collapse (same character set once lowercased);
    // "Gadget" stays distinct.
    assert_eq!(resolved.len(), 2);

    let widget = resolved.iter().find(|e| e.name.eq_ignore_ascii_case("widget")).expect("widget present");
    let gadget = resolved.iter().find(|e| e.name.eq_ignore_ascii_case("gadget")).expect("gadget present");

    let graph_relationships: Vec<Relationship> = relationships
        .into_iter()
        .map(|mut r| {
            r.source = widget.id.clone();
            r.target = gadget.id.clone();
            r
        })
        .collect();

    let communities = detect_communities(&resolved, &graph_relationships, &CommunityDetectionOptions::default());
    assert_eq!(communities.len(), 1, "one edge between two nodes forms a single community");
    let member_ids = &communities[0].member_entity_ids;
    assert!(member_ids.contains(&widget.id));
    assert!(member_ids.contains(&gadget.id));
}

#[tokio::test]
async fn unrelated_entities_form_separate_communities() {
    let llm = ScriptedLlm::new(vec![
        r#"{"entities": [{"name": "Alpha", "type": "Module", "description": null}], "relationships": []}"#,
        r#"{"entities": [{"name": "Omega", "type": "Module", "description": null}], "relationships": []}"#,
    ]);

    let texts = vec!["module Alpha".to_string(), "module Omega".to_string()];
    let (entities, relationships) = extract_batch(&llm, &texts, &ExtractionOptions::default()).await;
    assert_eq!(entities.len(), 2);
    assert!(relationships.is_empty());

    let communities = detect_communities(&entities, &relationships, &CommunityDetectionOptions::default());
    assert_eq!(communities.len(), 2, "entities with no edges each form their own singleton community");
}

#[tokio::test]
async fn a_malformed_extraction_response_is_swallowed_without_failing_the_batch() {
    let llm = ScriptedLlm::new(vec![
        "not json at all",
        r#"{"entities": [{"name": "Recovered", "type": "Concept", "description": null}], "relationships": []}"#,
    ]);

    let texts = vec!["garbled chunk".to_string(), "a clean chunk".to_string()];
    let (entities, _relationships) = extract_batch(&llm, &texts, &ExtractionOptions::default()).await;
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name, "Recovered");
}

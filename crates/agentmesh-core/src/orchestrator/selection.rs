use crate::agent::{type_name, AgentInfo, Request};
use crate::constants::{defaults, keys};
use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// How the selected agents are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Single,
    /// Independent agents, invoked at the same time.
    Concurrent,
    /// Sequential; each stage sees the previous stages' data.
    Pipeline,
}

/// Ordered agent names plus the dispatch mode. Names are de-duplicated
/// and a one-agent selection is always `Single`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    names: Vec<String>,
    mode: DispatchMode,
}

impl Selection {
    pub fn new(names: Vec<String>, mode: DispatchMode) -> Self {
        let mut seen = HashSet::new();
        let names: Vec<String> = names
            .into_iter()
            .filter(|n| seen.insert(n.clone()))
            .collect();
        let mode = if names.len() == 1 {
            DispatchMode::Single
        } else {
            mode
        };
        Self { names, mode }
    }

    pub fn empty() -> Self {
        Self {
            names: Vec::new(),
            mode: DispatchMode::Single,
        }
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self::new(vec![name.into()], DispatchMode::Single)
    }

    pub fn concurrent(names: Vec<String>) -> Self {
        Self::new(names, DispatchMode::Concurrent)
    }

    pub fn pipeline(names: Vec<String>) -> Self {
        Self::new(names, DispatchMode::Pipeline)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Maps a request and the registered `(name, capabilities)` pairs to the
/// agents that should handle it. Implementations must be pure.
pub trait SelectionPolicy: Send + Sync {
    fn select(&self, request: &Request, agents: &[AgentInfo]) -> Result<Selection>;
}

// ── Explicit routing ────────────────────────────────────────

/// Honours the routing fields a caller can set on a request:
/// `"agent"` (name or array), `"agents"` (array, concurrent) and
/// `"pipeline"` (array, sequential). At most one may be present.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitPolicy;

impl ExplicitPolicy {
    fn names(key: &str, value: &Value) -> Result<Vec<String>> {
        let names = match value {
            Value::String(name) => vec![name.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        MeshError::invalid(format!(
                            "'{}' entries must be strings, got {}",
                            key,
                            type_name(item)
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(MeshError::invalid(format!(
                    "'{}' must be a string or an array of strings, got {}",
                    key,
                    type_name(other)
                )))
            }
        };

        if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
            return Err(MeshError::invalid(format!("'{}' names no agent", key)));
        }
        Ok(names)
    }
}

impl SelectionPolicy for ExplicitPolicy {
    fn select(&self, request: &Request, _agents: &[AgentInfo]) -> Result<Selection> {
        let present: Vec<&str> = [keys::AGENT, keys::AGENTS, keys::PIPELINE]
            .into_iter()
            .filter(|k| request.contains(k))
            .collect();

        match present.as_slice() {
            [] => Ok(Selection::empty()),
            [key] => {
                let value = request.get(key).unwrap_or(&Value::Null);
                let names = Self::names(key, value)?;
                Ok(if *key == keys::PIPELINE {
                    Selection::pipeline(names)
                } else {
                    Selection::concurrent(names)
                })
            }
            many => Err(MeshError::invalid(format!(
                "conflicting routing fields: {}",
                many.join(", ")
            ))),
        }
    }
}

// ── Keyword matching ────────────────────────────────────────

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "how", "are", "you", "can", "please",
    "from", "into", "about", "your", "me", "give", "tell", "some", "any", "all", "was", "were",
    "has", "have", "had", "not", "but", "its", "why", "who", "when", "which",
];

/// Minimum shared prefix for two different words to count as a match
/// ("calculate" / "calculations").
const STEM_PREFIX: usize = 5;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn words_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let shared = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    shared >= STEM_PREFIX
}

/// Scores agents by how many distinct query words appear in their name or
/// capability strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordPolicy {
    pub min_score: usize,
    pub max_agents: usize,
    /// Agent used when nothing scores. Ignored if not registered.
    pub fallback_agent: Option<String>,
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self {
            min_score: defaults::MIN_KEYWORD_SCORE,
            max_agents: defaults::MAX_SELECTED_AGENTS,
            fallback_agent: None,
        }
    }
}

impl KeywordPolicy {
    pub fn with_fallback(mut self, agent: impl Into<String>) -> Self {
        self.fallback_agent = Some(agent.into());
        self
    }

    pub fn score(query: &str, agent: &AgentInfo) -> usize {
        let mut vocabulary = tokenize(&agent.name);
        for capability in &agent.capabilities {
            vocabulary.extend(tokenize(capability));
        }

        let mut query_words = tokenize(query);
        query_words.sort();
        query_words.dedup();

        query_words
            .iter()
            .filter(|q| vocabulary.iter().any(|v| words_match(q, v)))
            .count()
    }
}

impl SelectionPolicy for KeywordPolicy {
    fn select(&self, request: &Request, agents: &[AgentInfo]) -> Result<Selection> {
        let query = request.query_text().unwrap_or_default();

        let mut scored: Vec<(usize, &AgentInfo)> = agents
            .iter()
            .map(|agent| (Self::score(query, agent), agent))
            .filter(|(score, _)| *score > 0 && *score >= self.min_score)
            .collect();
        // stable: ties keep registration order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(self.max_agents.max(1));

        if scored.is_empty() {
            if let Some(ref fallback) = self.fallback_agent {
                if agents.iter().any(|a| &a.name == fallback) {
                    return Ok(Selection::single(fallback.clone()));
                }
                tracing::warn!("Fallback agent '{}' is not registered", fallback);
            }
            return Ok(Selection::empty());
        }

        Ok(Selection::concurrent(
            scored.into_iter().map(|(_, a)| a.name.clone()).collect(),
        ))
    }
}

// ── Default policy ──────────────────────────────────────────

/// Explicit routing fields win; otherwise keyword matching.
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    explicit: ExplicitPolicy,
    keyword: KeywordPolicy,
}

impl RoutingPolicy {
    pub fn new(keyword: KeywordPolicy) -> Self {
        Self {
            explicit: ExplicitPolicy,
            keyword,
        }
    }
}

impl SelectionPolicy for RoutingPolicy {
    fn select(&self, request: &Request, agents: &[AgentInfo]) -> Result<Selection> {
        let explicit = self.explicit.select(request, agents)?;
        if !explicit.is_empty() {
            return Ok(explicit);
        }
        self.keyword.select(request, agents)
    }
}

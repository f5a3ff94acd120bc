use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::analysis::settings::AnalysisSettings;
use crate::core::error::{Error, Result};
use crate::scoring::scorer::{BM25Scorer, Scorer, TfIdfScorer};

pub const DEFAULT_MAX_RESULT_WINDOW: usize = 10_000;

/// When buffered writes become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Every write refreshes before it returns.
    Immediate,
    /// A background thread refreshes on a fixed period.
    Interval { interval_ms: u64 },
}

impl RefreshPolicy {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RefreshPolicy::Immediate => None,
            RefreshPolicy::Interval { interval_ms } => Some(Duration::from_millis((*interval_ms).max(1))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    #[default]
    Bm25,
    Classic,
}

impl Similarity {
    pub fn scorer(&self) -> Box<dyn Scorer> {
        match self {
            Similarity::Bm25 => Box::new(BM25Scorer::default()),
            Similarity::Classic => Box::new(TfIdfScorer),
        }
    }
}

/// Per-index settings.
///
/// Static settings (`number_of_shards`, `mapping_coerce`, `similarity`, `analysis`)
/// change only while the index is closed; `number_of_shards` never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    /// Informational on a single node.
    pub number_of_replicas: u32,
    /// Engine default when unset.
    pub refresh_interval: Option<RefreshPolicy>,
    pub max_result_window: usize,
    pub mapping_coerce: bool,
    pub similarity: Similarity,
    pub analysis: AnalysisSettings,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            number_of_shards: 1,
            number_of_replicas: 1,
            refresh_interval: None,
            max_result_window: DEFAULT_MAX_RESULT_WINDOW,
            mapping_coerce: true,
            similarity: Similarity::Bm25,
            analysis: AnalysisSettings::default(),
        }
    }
}

impl IndexSettings {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_shards == 0 {
            return Err(Error::invalid_argument("[number_of_shards] must be at least 1"));
        }
        if self.max_result_window == 0 {
            return Err(Error::invalid_argument("[max_result_window] must be at least 1"));
        }
        Ok(())
    }

    /// Settings after `update`. Does not check open/closed state.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<IndexSettings> {
        let mut next = self.clone();
        if let Some(shards) = update.number_of_shards {
            if shards != self.number_of_shards {
                return Err(Error::invalid_mapping(format!(
                    "final setting [number_of_shards] cannot be changed from [{}] to [{}]",
                    self.number_of_shards, shards
                )));
            }
        }
        if let Some(replicas) = update.number_of_replicas {
            next.number_of_replicas = replicas;
        }
        if let Some(refresh) = update.refresh_interval {
            next.refresh_interval = Some(refresh);
        }
        if let Some(window) = update.max_result_window {
            next.max_result_window = window;
        }
        if let Some(coerce) = update.mapping_coerce {
            next.mapping_coerce = coerce;
        }
        if let Some(similarity) = update.similarity {
            next.similarity = similarity;
        }
        if let Some(analysis) = &update.analysis {
            next.analysis.merge(analysis.clone());
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial settings update; unset keys stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub number_of_shards: Option<u32>,
    pub number_of_replicas: Option<u32>,
    pub refresh_interval: Option<RefreshPolicy>,
    pub max_result_window: Option<usize>,
    pub mapping_coerce: Option<bool>,
    pub similarity: Option<Similarity>,
    pub analysis: Option<AnalysisSettings>,
}

impl SettingsUpdate {
    pub fn new() -> Self {
        SettingsUpdate::default()
    }

    pub fn number_of_replicas(mut self, replicas: u32) -> Self {
        self.number_of_replicas = Some(replicas);
        self
    }

    pub fn refresh_interval(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh_interval = Some(refresh);
        self
    }

    pub fn max_result_window(mut self, window: usize) -> Self {
        self.max_result_window = Some(window);
        self
    }

    pub fn similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn analysis(mut self, analysis: AnalysisSettings) -> Self {
        self.analysis = Some(analysis);
        self
    }

    /// Static keys this update touches.
    pub fn static_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.number_of_shards.is_some() {
            keys.push("number_of_shards");
        }
        if self.mapping_coerce.is_some() {
            keys.push("mapping_coerce");
        }
        if self.similarity.is_some() {
            keys.push("similarity");
        }
        if self.analysis.is_some() {
            keys.push("analysis");
        }
        keys
    }
}

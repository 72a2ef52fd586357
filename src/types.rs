//! Pipeline data model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// One entity to score under one strategy, immutable for a cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub strategy_id: String,
    pub entity_id: String,
}

impl WorkItem {
    pub fn new(strategy_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Key used by the duplicate-window check
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.strategy_id, self.entity_id)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.strategy_id, self.entity_id)
    }
}

/// Direction a successful score points in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// Action tag of a result, `Error` for failed items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Error,
}

impl From<SignalAction> for Action {
    fn from(action: SignalAction) -> Self {
        match action {
            SignalAction::Buy => Self::Buy,
            SignalAction::Sell => Self::Sell,
            SignalAction::Hold => Self::Hold,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// What the scoring upstream returns for a work item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub action: SignalAction,
    pub composite_score: f64,
    pub confidence: f64,
}

impl Score {
    pub fn new(action: SignalAction, composite_score: f64, confidence: f64) -> Self {
        Self {
            action,
            composite_score,
            confidence,
        }
    }
}

/// Either a score or the reason scoring failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Scored(Score),
    Failed { error: String },
}

/// Result for one work item in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: Uuid,
    pub item: WorkItem,
    pub outcome: Outcome,
    pub computed_at: SystemTime,
}

impl ScoredResult {
    pub fn scored(item: WorkItem, score: Score) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            outcome: Outcome::Scored(score),
            computed_at: SystemTime::now(),
        }
    }

    pub fn failed(item: WorkItem, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            outcome: Outcome::Failed {
                error: error.into(),
            },
            computed_at: SystemTime::now(),
        }
    }

    pub fn action(&self) -> Action {
        match &self.outcome {
            Outcome::Scored(score) => score.action.into(),
            Outcome::Failed { .. } => Action::Error,
        }
    }

    pub fn score(&self) -> Option<&Score> {
        match &self.outcome {
            Outcome::Scored(score) => Some(score),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Scored(_) => None,
            Outcome::Failed { error } => Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// Human-readable explanation of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub model: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnrichmentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Progress of the explanation step for one selected result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentTask {
    pub result_id: Uuid,
    /// Failed attempts so far
    pub attempt: u32,
    pub status: EnrichmentStatus,
    pub last_error: Option<String>,
}

impl EnrichmentTask {
    pub fn for_result(result: &ScoredResult) -> Self {
        Self {
            result_id: result.id,
            attempt: 0,
            status: EnrichmentStatus::Pending,
            last_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != EnrichmentStatus::Pending
    }

    pub(crate) fn record_failure(&mut self, error: impl Into<String>) {
        self.attempt += 1;
        self.last_error = Some(error.into());
    }

    pub(crate) fn succeed(&mut self) {
        self.status = EnrichmentStatus::Succeeded;
    }

    pub(crate) fn fail(&mut self) {
        self.status = EnrichmentStatus::Failed;
    }
}

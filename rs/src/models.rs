//! Core data models for insight deduplication
//!
//! Candidates come from the structuring step, corpus records from the record
//! store. The persisted record layout stays JSON-compatible with the hosted
//! `insights` table so rows can be exchanged without translation.

use crate::constants::MAX_DIFFERENCE_SCORE;
use crate::error::DedupError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for stored insights
pub type InsightId = Uuid;

/// The three compared text fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightField {
    Tactic,
    Results,
    Limitations,
}

impl InsightField {
    pub const ALL: [InsightField; 3] = [Self::Tactic, Self::Results, Self::Limitations];
}

/// Anything exposing the three compared text fields
pub trait InsightText {
    fn field_text(&self, field: InsightField) -> &str;
}

/// New insight produced by the structuring step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightCandidate {
    /// The core insight statement
    pub tactic_text: String,

    /// Free-form metrics and context
    pub results_text: String,

    pub limitations_text: String,

    /// 0-100, checked when the candidate is stored
    pub difference_score: i64,
}

impl InsightCandidate {
    pub fn new(
        tactic_text: impl Into<String>,
        results_text: impl Into<String>,
        limitations_text: impl Into<String>,
        difference_score: i64,
    ) -> Self {
        Self {
            tactic_text: tactic_text.into(),
            results_text: results_text.into(),
            limitations_text: limitations_text.into(),
            difference_score,
        }
    }
}

impl InsightText for InsightCandidate {
    fn field_text(&self, field: InsightField) -> &str {
        match field {
            InsightField::Tactic => &self.tactic_text,
            InsightField::Results => &self.results_text,
            InsightField::Limitations => &self.limitations_text,
        }
    }
}

/// Review lifecycle of a stored insight
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum InsightStatus {
    /// Stored but not yet reviewed
    #[default]
    Greylist,
    Approved,
    Rejected,
    Archived,
}

impl InsightStatus {
    pub const ALL: [InsightStatus; 4] = [
        Self::Greylist,
        Self::Approved,
        Self::Rejected,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greylist => "greylist",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightStatus {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                DedupError::invalid_input(format!(
                    "unknown status {s:?}, expected one of greylist, approved, rejected, archived"
                ))
            })
    }
}

/// Structured results as stored by later schema revisions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultsDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The `results` column: plain text or `{ metrics, context }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ResultsBody {
    Text(String),
    Structured(ResultsDetail),
}

impl ResultsBody {
    /// Text used for comparison; structured parts are joined by a space
    pub fn comparison_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(detail) => [detail.metrics.as_deref(), detail.context.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<String> for ResultsBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Persisted insight row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoredInsight {
    pub id: InsightId,

    /// The core insight statement
    pub insight: String,

    pub results: ResultsBody,

    pub limitations_context: String,

    /// 0-100 inclusive
    #[schemars(range(max = 100))]
    pub difference_score: u8,

    #[serde(default)]
    pub status: InsightStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StoredInsight {
    /// Prepare a candidate for storage: new id, greylist status, timestamps.
    ///
    /// Rejects a difference score outside 0-100.
    pub fn from_candidate(candidate: &InsightCandidate) -> Result<Self, DedupError> {
        let difference_score = u8::try_from(candidate.difference_score)
            .ok()
            .filter(|score| i64::from(*score) <= MAX_DIFFERENCE_SCORE)
            .ok_or_else(|| {
                DedupError::invalid_input(format!(
                    "difference score must be between 0 and {MAX_DIFFERENCE_SCORE}, got {}",
                    candidate.difference_score
                ))
            })?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            insight: candidate.tactic_text.clone(),
            results: ResultsBody::Text(candidate.results_text.clone()),
            limitations_context: candidate.limitations_text.clone(),
            difference_score,
            status: InsightStatus::Greylist,
            source_url: None,
            source_hash: None,
            source_text: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Change the review status and bump `updated_at`
    pub fn set_status(&mut self, status: InsightStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Check invariants serde cannot express on a loaded row
    pub fn validate(&self) -> Result<(), DedupError> {
        if i64::from(self.difference_score) > MAX_DIFFERENCE_SCORE {
            return Err(DedupError::invalid_input(format!(
                "difference score must be between 0 and {MAX_DIFFERENCE_SCORE}, got {}",
                self.difference_score
            )));
        }
        Ok(())
    }
}

/// Previously accepted insight, read-only input to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: InsightId,
    pub tactic_text: String,
    pub results_text: String,
    pub limitations_text: String,
    pub status: InsightStatus,
}

impl CorpusRecord {
    /// Build a record from a raw database row.
    ///
    /// `id`, `insight`, `results` and `limitations_context` must be present
    /// and non-null; text may be empty. A missing `status` means greylist.
    pub fn from_row(row: &Value) -> Result<Self, DedupError> {
        let object = row
            .as_object()
            .ok_or_else(|| DedupError::invalid_input("corpus row must be a JSON object"))?;

        let id = required_str(object, "id")?;
        let id = id
            .parse::<InsightId>()
            .map_err(|e| DedupError::invalid_input(format!("invalid id {id:?}: {e}")))?;

        let results = match object.get("results") {
            None | Some(Value::Null) => {
                return Err(DedupError::invalid_input(format!(
                    "corpus row {id} is missing required field results"
                )))
            }
            Some(value) => serde_json::from_value::<ResultsBody>(value.clone()).map_err(|e| {
                DedupError::invalid_input(format!("corpus row {id} has invalid results: {e}"))
            })?,
        };

        let status = match object.get("status") {
            None | Some(Value::Null) => InsightStatus::default(),
            Some(Value::String(status)) => status.parse()?,
            Some(other) => {
                return Err(DedupError::invalid_input(format!(
                    "corpus row {id} has non-string status {other}"
                )))
            }
        };

        Ok(Self {
            id,
            tactic_text: required_str(object, "insight")?.to_string(),
            results_text: results.comparison_text(),
            limitations_text: required_str(object, "limitations_context")?.to_string(),
            status,
        })
    }
}

impl From<&StoredInsight> for CorpusRecord {
    fn from(stored: &StoredInsight) -> Self {
        Self {
            id: stored.id,
            tactic_text: stored.insight.clone(),
            results_text: stored.results.comparison_text(),
            limitations_text: stored.limitations_context.clone(),
            status: stored.status,
        }
    }
}

impl InsightText for CorpusRecord {
    fn field_text(&self, field: InsightField) -> &str {
        match field {
            InsightField::Tactic => &self.tactic_text,
            InsightField::Results => &self.results_text,
            InsightField::Limitations => &self.limitations_text,
        }
    }
}

/// Convert raw rows into a corpus batch, failing the whole batch on the
/// first invalid row
pub fn corpus_from_rows(rows: &[Value]) -> Result<Vec<CorpusRecord>, DedupError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            CorpusRecord::from_row(row).map_err(|e| match e {
                DedupError::InvalidInput { message } => DedupError::InvalidInput {
                    message: format!("row {index}: {message}"),
                },
                other => other,
            })
        })
        .collect()
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str, DedupError> {
    match object.get(key) {
        Some(Value::String(text)) => Ok(text),
        Some(Value::Null) | None => Err(DedupError::invalid_input(format!(
            "missing required field {key}"
        ))),
        Some(other) => Err(DedupError::invalid_input(format!(
            "field {key} must be a string, got {other}"
        ))),
    }
}

/// Per-field cosine scores for one candidate/record pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldScores {
    pub tactic: f64,
    pub results: f64,
    pub limitations: f64,
}

impl FieldScores {
    pub fn set(&mut self, field: InsightField, score: f64) {
        match field {
            InsightField::Tactic => self.tactic = score,
            InsightField::Results => self.results = score,
            InsightField::Limitations => self.limitations = score,
        }
    }
}

/// Similarity of the candidate to one corpus record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub corpus_id: InsightId,

    /// Weighted combination of the field scores, 0.0 to 1.0
    pub score: f64,

    pub field_scores: FieldScores,
}

/// Outcome of the duplicate decision policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDecision {
    pub is_duplicate: bool,

    /// Highest-scoring record; `None` only for an empty corpus
    pub best_match: Option<SimilarityResult>,
}

impl DuplicateDecision {
    /// Decision for an empty corpus
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            best_match: None,
        }
    }
}

/// Raw structuring output as returned by the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredInsight {
    #[serde(rename = "INSIGHT")]
    pub insight: String,

    #[serde(rename = "RESULTS")]
    pub results: String,

    #[serde(rename = "LIMITATIONS_CONTEXT")]
    pub limitations_context: String,

    #[serde(rename = "DIFFERENCE_SCORE")]
    pub difference_score: i64,
}

const STRUCTURED_TEXT_FIELDS: [&str; 3] = ["INSIGHT", "RESULTS", "LIMITATIONS_CONTEXT"];
const STRUCTURED_SCORE_FIELD: &str = "DIFFERENCE_SCORE";

impl StructuredInsight {
    /// Parse and validate structuring output.
    ///
    /// Every problem (missing or null field, wrong type, score outside
    /// 0-100) is reported in a single `InvalidInput` error.
    pub fn from_json(json: &str) -> Result<Self, DedupError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DedupError::invalid_input(format!("malformed insight JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, DedupError> {
        let object = value
            .as_object()
            .ok_or_else(|| DedupError::invalid_input("insight data must be a JSON object"))?;

        let mut errors = Vec::new();
        for field in STRUCTURED_TEXT_FIELDS {
            match object.get(field) {
                None | Some(Value::Null) => errors.push(format!("missing required field {field}")),
                Some(Value::String(_)) => {}
                Some(_) => errors.push(format!("field {field} must be a string")),
            }
        }

        match object.get(STRUCTURED_SCORE_FIELD) {
            None | Some(Value::Null) => {
                errors.push(format!("missing required field {STRUCTURED_SCORE_FIELD}"))
            }
            Some(Value::Number(n)) => match n.as_i64() {
                Some(score) if (0..=MAX_DIFFERENCE_SCORE).contains(&score) => {}
                Some(_) => errors.push(format!(
                    "{STRUCTURED_SCORE_FIELD} must be between 0 and {MAX_DIFFERENCE_SCORE}"
                )),
                None => errors.push(format!("field {STRUCTURED_SCORE_FIELD} must be an integer")),
            },
            Some(_) => errors.push(format!("field {STRUCTURED_SCORE_FIELD} must be an integer")),
        }

        if !errors.is_empty() {
            return Err(DedupError::invalid_input(errors.join("; ")));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| DedupError::invalid_input(format!("invalid insight data: {e}")))
    }

    /// Lenient parse: text fields are still required, but they are trimmed
    /// and the score is coerced into 0-100 (unparsable scores become 0).
    pub fn sanitize(value: &Value) -> Result<Self, DedupError> {
        let object = value
            .as_object()
            .ok_or_else(|| DedupError::invalid_input("insight data must be a JSON object"))?;

        let text = |key: &str| -> Result<String, DedupError> {
            match object.get(key) {
                Some(Value::String(s)) => Ok(s.trim().to_string()),
                Some(Value::Null) | None => Err(DedupError::invalid_input(format!(
                    "missing required field {key}"
                ))),
                Some(other) => Ok(other.to_string().trim().to_string()),
            }
        };

        let raw_score = match object.get(STRUCTURED_SCORE_FIELD) {
            Some(Value::Number(n)) => n.as_f64().map(|f| f.trunc() as i64),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        Ok(Self {
            insight: text("INSIGHT")?,
            results: text("RESULTS")?,
            limitations_context: text("LIMITATIONS_CONTEXT")?,
            difference_score: raw_score.unwrap_or(0).clamp(0, MAX_DIFFERENCE_SCORE),
        })
    }
}

impl From<StructuredInsight> for InsightCandidate {
    fn from(structured: StructuredInsight) -> Self {
        Self {
            tactic_text: structured.insight,
            results_text: structured.results,
            limitations_text: structured.limitations_context,
            difference_score: structured.difference_score,
        }
    }
}

/// Which records to fetch for comparison
#[derive(Debug, Clone, PartialEq)]
pub enum CorpusQuery {
    All { limit: usize },
    /// Records whose text contains any of the (normalized) keywords
    Keywords { keywords: Vec<String>, limit: usize },
    /// Records created within the last `days` days
    Recent { days: u32, limit: usize },
}

/// Number of stored insights per status
pub type StatusOverview = BTreeMap<InsightStatus, usize>;

/// Record store interface
///
/// Abstracts over the hosted database and the local file store.
#[async_trait::async_trait]
pub trait InsightStore: Send + Sync {
    /// Store a new insight
    async fn store_insight(&mut self, insight: StoredInsight) -> crate::Result<()>;

    /// Retrieve an insight by ID
    async fn get_insight(&self, id: InsightId) -> crate::Result<Option<StoredInsight>>;

    /// Change the status of one insight
    async fn update_status(&mut self, id: InsightId, status: InsightStatus) -> crate::Result<()>;

    /// Change the status of several insights, returning how many were updated.
    /// Unknown ids are skipped.
    async fn bulk_update_status(
        &mut self,
        ids: &[InsightId],
        status: InsightStatus,
    ) -> crate::Result<usize>;

    /// Fetch a bounded comparison corpus
    async fn fetch(&self, query: &CorpusQuery) -> crate::Result<Vec<StoredInsight>>;

    /// Count insights per status; every status is present
    async fn status_overview(&self) -> crate::Result<StatusOverview>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate() -> InsightCandidate {
        InsightCandidate::new(
            "Use emotional before/after stories",
            "45% engagement increase",
            "needs authentic stories",
            72,
        )
    }

    #[test]
    fn test_from_candidate() {
        let stored = StoredInsight::from_candidate(&candidate()).unwrap();
        assert_eq!(stored.status, InsightStatus::Greylist);
        assert_eq!(stored.difference_score, 72);
        assert_eq!(stored.insight, "Use emotional before/after stories");
        assert!(stored.id != Uuid::nil());
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(stored.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_row() {
        let mut stored = StoredInsight::from_candidate(&candidate()).unwrap();
        stored.difference_score = 101;
        assert!(matches!(stored.validate(), Err(DedupError::InvalidInput { .. })));
    }

    #[test]
    fn test_schema_bounds_difference_score() {
        let schema = serde_json::to_value(schemars::schema_for!(StoredInsight)).unwrap();
        assert_eq!(schema["properties"]["difference_score"]["maximum"], 100);
    }

    #[test]
    fn test_from_candidate_rejects_out_of_range_score() {
        for score in [-1, 101, 1000] {
            let mut c = candidate();
            c.difference_score = score;
            assert!(matches!(
                StoredInsight::from_candidate(&c),
                Err(DedupError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!("approved".parse::<InsightStatus>().unwrap(), InsightStatus::Approved);
        assert_eq!(" Archived ".parse::<InsightStatus>().unwrap(), InsightStatus::Archived);
        assert!("pending".parse::<InsightStatus>().is_err());
        assert_eq!(serde_json::to_string(&InsightStatus::Greylist).unwrap(), "\"greylist\"");
        assert_eq!(InsightStatus::default(), InsightStatus::Greylist);
    }

    #[test]
    fn test_results_comparison_text() {
        let text = ResultsBody::Text("45% lift".to_string());
        assert_eq!(text.comparison_text(), "45% lift");

        let structured: ResultsBody =
            serde_json::from_value(json!({"metrics": "45% lift", "context": "Q4 retail"})).unwrap();
        assert_eq!(structured.comparison_text(), "45% lift Q4 retail");

        let metrics_only: ResultsBody = serde_json::from_value(json!({"metrics": "2x CTR"})).unwrap();
        assert_eq!(metrics_only.comparison_text(), "2x CTR");
    }

    #[test]
    fn test_corpus_row_parsing() {
        let id = Uuid::new_v4();
        let row = json!({
            "id": id.to_string(),
            "insight": "Lead with the problem",
            "results": {"metrics": "CTR up 30%", "context": "cold traffic"},
            "limitations_context": "",
            "difference_score": 60,
            "status": "approved"
        });

        let record = CorpusRecord::from_row(&row).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.results_text, "CTR up 30% cold traffic");
        assert_eq!(record.limitations_text, "");
        assert_eq!(record.status, InsightStatus::Approved);
    }

    #[test]
    fn test_corpus_row_missing_or_null_field() {
        let id = Uuid::new_v4().to_string();
        let missing = json!({"id": id, "insight": "x", "results": "y"});
        let null = json!({"id": id, "insight": null, "results": "y", "limitations_context": "z"});
        let null_results = json!({"id": id, "insight": "x", "results": null, "limitations_context": "z"});

        for row in [missing, null, null_results] {
            assert!(matches!(
                CorpusRecord::from_row(&row),
                Err(DedupError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn test_corpus_batch_fails_whole_batch() {
        let good = json!({
            "id": Uuid::new_v4().to_string(),
            "insight": "a",
            "results": "b",
            "limitations_context": "c"
        });
        let bad = json!({"id": Uuid::new_v4().to_string(), "insight": "a"});

        let err = corpus_from_rows(&[good.clone(), bad]).unwrap_err();
        match err {
            DedupError::InvalidInput { message } => assert!(message.starts_with("row 1:")),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(corpus_from_rows(&[good]).unwrap().len(), 1);
    }

    #[test]
    fn test_structured_insight_valid() {
        let json = r#"{
            "INSIGHT": "Show the product in the first second",
            "RESULTS": "Hook rate 38%",
            "LIMITATIONS_CONTEXT": "Tested on TikTok only",
            "DIFFERENCE_SCORE": 81
        }"#;
        let structured = StructuredInsight::from_json(json).unwrap();
        assert_eq!(structured.difference_score, 81);

        let candidate: InsightCandidate = structured.into();
        assert_eq!(candidate.tactic_text, "Show the product in the first second");
        assert_eq!(candidate.limitations_text, "Tested on TikTok only");
    }

    #[test]
    fn test_structured_insight_reports_all_errors() {
        let json = r#"{"INSIGHT": 5, "RESULTS": null, "DIFFERENCE_SCORE": 140}"#;
        match StructuredInsight::from_json(json).unwrap_err() {
            DedupError::InvalidInput { message } => {
                assert!(message.contains("INSIGHT must be a string"));
                assert!(message.contains("missing required field RESULTS"));
                assert!(message.contains("missing required field LIMITATIONS_CONTEXT"));
                assert!(message.contains("between 0 and 100"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_structured_insight_sanitize() {
        let value = json!({
            "INSIGHT": "  Use UGC  ",
            "RESULTS": "ROAS 3x",
            "LIMITATIONS_CONTEXT": "small budget",
            "DIFFERENCE_SCORE": "250"
        });
        let sanitized = StructuredInsight::sanitize(&value).unwrap();
        assert_eq!(sanitized.insight, "Use UGC");
        assert_eq!(sanitized.difference_score, 100);

        let unparsable = json!({
            "INSIGHT": "a", "RESULTS": "b", "LIMITATIONS_CONTEXT": "c", "DIFFERENCE_SCORE": "high"
        });
        assert_eq!(StructuredInsight::sanitize(&unparsable).unwrap().difference_score, 0);

        let missing = json!({"INSIGHT": "a", "RESULTS": "b"});
        assert!(StructuredInsight::sanitize(&missing).is_err());
    }

    #[test]
    fn test_stored_insight_json_layout() {
        let stored = StoredInsight::from_candidate(&candidate()).unwrap();
        let json = serde_json::to_value(&stored).unwrap();

        assert_eq!(json["insight"], "Use emotional before/after stories");
        assert_eq!(json["results"], "45% engagement increase");
        assert_eq!(json["limitations_context"], "needs authentic stories");
        assert_eq!(json["status"], "greylist");
        assert!(json.get("source_url").is_none());

        let back: StoredInsight = serde_json::from_value(json).unwrap();
        assert_eq!(back, stored);
    }
}

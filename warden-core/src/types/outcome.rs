use serde::{Deserialize, Serialize};

/// Classification of one processed identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Passed the ban check; no valuation was performed.
    VerifiedClean,
    /// Flagged by the ban check; valuation is skipped.
    VerifiedFlagged,
    /// Passed the ban check and was valued.
    ValuationSuccess,
    /// The ban-check lookup failed.
    UpstreamErrorStage1,
    /// The ban check passed but the valuation lookup failed.
    UpstreamErrorStage2,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::VerifiedClean => "verified_clean",
            OutcomeKind::VerifiedFlagged => "verified_flagged",
            OutcomeKind::ValuationSuccess => "valuation_success",
            OutcomeKind::UpstreamErrorStage1 => "upstream_error_stage1",
            OutcomeKind::UpstreamErrorStage2 => "upstream_error_stage2",
        }
    }
}

/// Immutable result of running one identifier through both stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: String,
    pub display_name: String,
    pub kind: OutcomeKind,
    pub value: f64,
    pub reason: String,
}

impl ItemOutcome {
    fn build(
        id: impl Into<String>,
        display_name: Option<String>,
        kind: OutcomeKind,
        value: f64,
        reason: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: display_name.unwrap_or_else(|| id.clone()),
            id,
            kind,
            value,
            reason: reason.into(),
        }
    }

    pub fn clean(id: impl Into<String>, display_name: Option<String>) -> Self {
        Self::build(id, display_name, OutcomeKind::VerifiedClean, 0.0, "")
    }

    pub fn flagged(
        id: impl Into<String>,
        display_name: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(id, display_name, OutcomeKind::VerifiedFlagged, 0.0, reason)
    }

    pub fn valued(
        id: impl Into<String>,
        display_name: Option<String>,
        value: f64,
    ) -> Self {
        Self::build(id, display_name, OutcomeKind::ValuationSuccess, value, "")
    }

    pub fn stage1_error(
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(id, None, OutcomeKind::UpstreamErrorStage1, 0.0, reason)
    }

    pub fn stage2_error(
        id: impl Into<String>,
        display_name: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(
            id,
            display_name,
            OutcomeKind::UpstreamErrorStage2,
            0.0,
            reason,
        )
    }

    pub fn is_flagged(&self) -> bool {
        self.kind == OutcomeKind::VerifiedFlagged
    }

    pub fn is_stage1_error(&self) -> bool {
        self.kind == OutcomeKind::UpstreamErrorStage1
    }

    pub fn is_stage2_error(&self) -> bool {
        self.kind == OutcomeKind::UpstreamErrorStage2
    }

    /// Clean means the ban check did not flag the identifier and did not fail.
    pub fn is_clean(&self) -> bool {
        !self.is_flagged() && !self.is_stage1_error()
    }

    pub fn is_valued(&self) -> bool {
        self.kind == OutcomeKind::ValuationSuccess
    }
}

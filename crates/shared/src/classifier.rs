use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ClassificationError;
use crate::judge::SemanticJudge;
use crate::models::{ClassifiedListing, FilteredListing};

/// How a verdict was recovered from the judge's response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The response decoded as `{"match": bool}`
    Structured(bool),
    /// A literal `true`/`false` token was found in the raw text
    Literal(bool),
    /// Nothing usable; treated as no match
    Default,
}

impl Verdict {
    pub fn is_match(self) -> bool {
        match self {
            Verdict::Structured(v) | Verdict::Literal(v) => v,
            Verdict::Default => false,
        }
    }
}

#[derive(Deserialize)]
struct MatchPayload {
    #[serde(rename = "match")]
    is_match: bool,
}

/// Decode a judge response: structured first, then literal tokens, then `false`
pub fn decode_verdict(raw: &str) -> Verdict {
    if let Some(v) = decode_structured(raw) {
        return Verdict::Structured(v);
    }

    let lower = raw.to_lowercase();
    if lower.contains("true") {
        Verdict::Literal(true)
    } else if lower.contains("false") {
        Verdict::Literal(false)
    } else {
        Verdict::Default
    }
}

fn decode_structured(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if let Ok(payload) = serde_json::from_str::<MatchPayload>(trimmed) {
        return Some(payload.is_match);
    }

    // Models sometimes wrap the object in prose or code fences
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<MatchPayload>(&trimmed[start..=end])
        .ok()
        .map(|p| p.is_match)
}

/// Counts reported after a classification run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    pub evaluated: usize,
    pub matched: usize,
    pub failed_calls: usize,
    pub undecided: usize,
}

pub struct Classifier {
    judge: Box<dyn SemanticJudge>,
    profile: String,
}

impl Classifier {
    pub fn new(judge: Box<dyn SemanticJudge>, profile: String) -> Self {
        Self { judge, profile }
    }

    /// Judge a single title. Call failures surface as errors; the caller decides.
    pub async fn classify_title(&self, title: &str) -> Result<Verdict, ClassificationError> {
        let raw = self
            .judge
            .judge(&self.profile, title)
            .await
            .map_err(|e| ClassificationError::Transport(format!("{:#}", e)))?;
        Ok(decode_verdict(&raw))
    }

    /// Classify every listing in order and keep only the matches
    pub async fn classify(
        &self,
        listings: Vec<FilteredListing>,
    ) -> (Vec<ClassifiedListing>, ClassifyReport) {
        let total = listings.len();
        let mut report = ClassifyReport {
            evaluated: total,
            ..ClassifyReport::default()
        };
        let mut matches = Vec::new();

        for (idx, listing) in listings.into_iter().enumerate() {
            let verdict = match self.classify_title(&listing.position).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("[{}/{}] {}: {}", idx + 1, total, listing.position, e);
                    report.failed_calls += 1;
                    Verdict::Default
                }
            };

            if verdict == Verdict::Default {
                report.undecided += 1;
            }

            let is_match = verdict.is_match();
            info!("[{}/{}] {} -> {}", idx + 1, total, listing.position, is_match);

            if is_match {
                matches.push(ClassifiedListing::new(listing, true));
            }
        }

        report.matched = matches.len();
        (matches, report)
    }
}

use crate::models::{FilteredListing, RawListing};

/// Term lists driving the two keyword passes. Terms are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct KeywordRules {
    banned: Vec<String>,
    allowed: Vec<String>,
}

impl KeywordRules {
    pub fn new(banned: Vec<String>, allowed: Vec<String>) -> Self {
        Self {
            banned: normalize_terms(banned),
            allowed: normalize_terms(allowed),
        }
    }

    /// True if `position` contains any banned term
    pub fn is_banned(&self, position: &str) -> bool {
        contains_any(position, &self.banned)
    }

    /// True if `department` contains at least one allowed term
    pub fn is_allowed(&self, department: &str) -> bool {
        contains_any(department, &self.allowed)
    }
}

fn normalize_terms(terms: Vec<String>) -> Vec<String> {
    terms
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn contains_any(text: &str, terms: &[String]) -> bool {
    let text_lower = text.to_lowercase();
    terms.iter().any(|term| text_lower.contains(term.as_str()))
}

/// Counts reported after a filter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub input: usize,
    pub after_exclusion: usize,
    pub retained: usize,
}

pub struct RuleFilter {
    rules: KeywordRules,
}

impl RuleFilter {
    pub fn new(rules: KeywordRules) -> Self {
        Self { rules }
    }

    /// Drop listings whose position carries a banned term
    pub fn exclude<'a>(&self, listings: &'a [RawListing]) -> Vec<&'a RawListing> {
        listings
            .iter()
            .filter(|l| !self.rules.is_banned(&l.position))
            .collect()
    }

    /// Keep listings whose department carries an allowed term
    pub fn include<'a>(&self, listings: Vec<&'a RawListing>) -> Vec<&'a RawListing> {
        listings
            .into_iter()
            .filter(|l| self.rules.is_allowed(&l.department))
            .collect()
    }

    /// Run both passes and strip `location` from the survivors. Input order is kept.
    pub fn apply(&self, listings: &[RawListing]) -> (Vec<FilteredListing>, FilterReport) {
        let excluded = self.exclude(listings);
        let after_exclusion = excluded.len();
        let retained: Vec<FilteredListing> = self
            .include(excluded)
            .into_iter()
            .cloned()
            .map(FilteredListing::from)
            .collect();

        let report = FilterReport {
            input: listings.len(),
            after_exclusion,
            retained: retained.len(),
        };

        (retained, report)
    }

    /// Re-check listings that were already filtered
    #[cfg(test)]
    pub(crate) fn refilter(&self, listings: &[FilteredListing]) -> Vec<FilteredListing> {
        listings
            .iter()
            .filter(|l| !self.rules.is_banned(&l.position) && self.rules.is_allowed(&l.department))
            .cloned()
            .collect()
    }
}

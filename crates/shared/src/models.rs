use serde::{Deserialize, Serialize};

/// Company name used when a source page has no resolvable company heading
pub const UNKNOWN_COMPANY: &str = "UNKNOWN";

/// Status attached to every record written to the store
pub const STATUS_NEW: &str = "New";

/// One job listing as scraped from a source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub source_id: String,
    pub company: String,
    pub position: String,
    pub department: String,
    pub location: String,
    pub external_link: String,
}

/// A listing that survived both keyword passes. `location` is gone by now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredListing {
    pub source_id: String,
    pub company: String,
    pub position: String,
    pub department: String,
    pub external_link: String,
}

impl From<RawListing> for FilteredListing {
    fn from(raw: RawListing) -> Self {
        Self {
            source_id: raw.source_id,
            company: raw.company,
            position: raw.position,
            department: raw.department,
            external_link: raw.external_link,
        }
    }
}

/// A filtered listing with the judge's verdict attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedListing {
    #[serde(flatten)]
    pub listing: FilteredListing,
    #[serde(rename = "match")]
    pub is_match: bool,
}

impl ClassifiedListing {
    pub fn new(listing: FilteredListing, is_match: bool) -> Self {
        Self { listing, is_match }
    }

    pub fn external_link(&self) -> &str {
        &self.listing.external_link
    }
}

/// Store-side representation. Field names must match the table columns exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedRecord {
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Date")]
    pub date: String,
}

impl SyncedRecord {
    pub fn from_listing(listing: &ClassifiedListing, date: &str) -> Self {
        let inner = &listing.listing;
        Self {
            position: inner.position.clone(),
            company: inner.company.clone(),
            location: inner.department.clone(),
            url: inner.external_link.clone(),
            status: STATUS_NEW.to_string(),
            date: date.to_string(),
        }
    }
}

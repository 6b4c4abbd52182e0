use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::SyncedRecord;

/// Store-side column holding the unique listing URL
pub const URL_FIELD: &str = "URL";

/// Maximum records the store accepts in one write request
pub const MAX_RECORDS_PER_WRITE: usize = 10;

/// One page of existing keys
#[derive(Debug, Clone, Default)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` on the last page
    pub next: Option<String>,
}

/// External record store. Append-only from this program's point of view.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_keys(&self, cursor: Option<&str>) -> Result<KeyPage>;

    async fn create_records(&self, records: &[SyncedRecord]) -> Result<()>;
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<StoredRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Deserialize)]
struct StoredRecord {
    #[serde(default)]
    fields: StoredFields,
}

#[derive(Deserialize, Default)]
struct StoredFields {
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    records: Vec<CreateRecord<'a>>,
}

#[derive(Serialize)]
struct CreateRecord<'a> {
    fields: &'a SyncedRecord,
}

pub struct AirtableStore {
    client: Client,
    token: String,
    table_url: String,
}

impl AirtableStore {
    pub fn new(token: String, base_id: &str, table_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let table_url = format!(
            "https://api.airtable.com/v0/{}/{}",
            urlencoding::encode(base_id),
            urlencoding::encode(table_id)
        );

        Ok(Self {
            client,
            token,
            table_url,
        })
    }

    fn list_url(&self, cursor: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.table_url).context("Invalid Airtable table URL")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("fields[]", URL_FIELD);
            if let Some(offset) = cursor {
                query.append_pair("offset", offset);
            }
        }
        Ok(url)
    }
}

fn parse_list_response(body: ListResponse) -> KeyPage {
    KeyPage {
        keys: body
            .records
            .into_iter()
            .filter_map(|r| r.fields.url)
            .filter(|u| !u.is_empty())
            .collect(),
        next: body.offset.filter(|o| !o.is_empty()),
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn fetch_keys(&self, cursor: Option<&str>) -> Result<KeyPage> {
        let response = self
            .client
            .get(self.list_url(cursor)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to list records from Airtable")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Airtable API returned error: {} - {}", status, error_text);
        }

        let body = response
            .json::<ListResponse>()
            .await
            .context("Failed to parse Airtable list response")?;

        Ok(parse_list_response(body))
    }

    async fn create_records(&self, records: &[SyncedRecord]) -> Result<()> {
        let payload = CreateRequest {
            records: records.iter().map(|fields| CreateRecord { fields }).collect(),
        };

        let response = self
            .client
            .post(&self.table_url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send records to Airtable")?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("{} {}", status, error_text);
        }

        Ok(())
    }
}

//! Sheets v4 values client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use courtside_roster::{FetchError, RosterSource, SheetRow};

use crate::{ServiceAccountAuth, ServiceAccountKey, SheetsError};

/// Tab the sign-up form writes its responses to.
pub const DEFAULT_TAB: &str = "Form Responses";

const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

/// Header names of the columns the roster is built from.
#[derive(Debug, Clone)]
pub struct ColumnNames {
    pub name: String,
    pub participation_date: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: "Name:".to_string(),
            participation_date: "PARTICIPATION Date (NOT birthday!)".to_string(),
        }
    }
}

/// Client for the sign-up spreadsheet.
pub struct SheetsClient {
    http: Client,
    api_base: String,
    spreadsheet_id: String,
    tab: String,
    columns: ColumnNames,
    auth: ServiceAccountAuth,
}

impl SheetsClient {
    /// Create a client from the service account JSON blob.
    pub fn new(
        credentials_json: &str,
        spreadsheet_id: impl Into<String>,
        tab: impl Into<String>,
    ) -> Result<Self, SheetsError> {
        let key = ServiceAccountKey::from_json(credentials_json)?;
        let auth = ServiceAccountAuth::new(key)?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            tab: tab.into(),
            columns: ColumnNames::default(),
            auth,
        })
    }

    /// Point the client at a different API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Use different header names for the name and date columns.
    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    fn values_url(&self) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SheetsError::Credentials(format!("bad API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| SheetsError::Credentials("API base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                self.tab.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "FORMATTED_VALUE")
            .append_pair("majorDimension", "ROWS");
        Ok(url)
    }

    /// Fetch every cell of the tab as formatted strings, header row first.
    #[tracing::instrument(skip(self), fields(spreadsheet = %self.spreadsheet_id, tab = %self.tab))]
    pub async fn fetch_values(&self) -> Result<Vec<Vec<String>>, SheetsError> {
        #[derive(Deserialize)]
        struct ValueRange {
            #[serde(default)]
            values: Vec<Vec<serde_json::Value>>,
        }

        let token = self.auth.access_token(&self.http).await?;
        let response = self
            .http
            .get(self.values_url()?)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Sheets API rate limited");
            return Err(SheetsError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let range: ValueRange = response.json().await?;
        let values = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect::<Vec<Vec<String>>>();

        debug!(rows = values.len(), "fetched sheet values");
        Ok(values)
    }
}

fn cell_to_string(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Map raw values (header row first) to sheet rows.
///
/// Rows shorter than the header are padded with empty cells, matching how
/// the API omits trailing blanks.
pub fn rows_from_values(
    values: Vec<Vec<String>>,
    columns: &ColumnNames,
) -> Result<Vec<SheetRow>, SheetsError> {
    let mut rows = values.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| SheetsError::MissingColumn(columns.name.clone()))?;

    let position = |wanted: &str| {
        header
            .iter()
            .position(|h| h.trim() == wanted)
            .ok_or_else(|| SheetsError::MissingColumn(wanted.to_string()))
    };
    let name_idx = position(&columns.name)?;
    let date_idx = position(&columns.participation_date)?;

    let cell = |row: &[String], idx: usize| row.get(idx).cloned().unwrap_or_default();

    Ok(rows
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| SheetRow {
            name: cell(row.as_slice(), name_idx),
            participation_date: cell(row.as_slice(), date_idx),
        })
        .collect())
}

#[async_trait]
impl RosterSource for SheetsClient {
    async fn list_rows(&self) -> Result<Vec<SheetRow>, FetchError> {
        let values = self.fetch_values().await?;
        Ok(rows_from_values(values, &self.columns)?)
    }
}

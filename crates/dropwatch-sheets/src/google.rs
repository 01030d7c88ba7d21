//! Google Sheets v4 REST backend.
//!
//! Authenticates with a bearer access token minted outside the process
//! (service-account exchange is not done here). Values are written with
//! `valueInputOption=RAW` so nothing is parsed as a formula.

use std::collections::HashMap;
use std::ops::Range;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{CellRange, Row, SheetsBackend};
use crate::error::{Result, SheetError};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

pub struct GoogleSheets {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    token: String,
    // worksheet title -> numeric sheetId, needed by batchUpdate requests
    sheet_ids: RwLock<HashMap<String, i64>>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueUpdate<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

impl GoogleSheets {
    pub fn new(client: Client, spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL, spreadsheet_id, token)
    }

    pub fn with_base_url(
        client: Client,
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
            sheet_ids: RwLock::new(HashMap::new()),
        }
    }

    fn values_url(&self, range: &CellRange) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/v4/spreadsheets/{}/values",
            self.base_url, self.spreadsheet_id
        ))
        .map_err(|e| SheetError::Decode(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::Decode("base url cannot carry a path".into()))?
            .push(&range.to_a1());
        Ok(url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SheetError::Auth(message));
        }
        Err(SheetError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Numeric id of a worksheet, fetched from spreadsheet metadata on first
    /// use and cached afterwards.
    async fn sheet_id(&self, worksheet: &str) -> Result<i64> {
        if let Some(id) = self.sheet_ids.read().await.get(worksheet) {
            return Ok(*id);
        }

        let url = format!(
            "{}/v4/spreadsheets/{}?fields=sheets.properties",
            self.base_url, self.spreadsheet_id
        );
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        let meta: SpreadsheetMeta = Self::check(resp).await?.json().await?;

        let mut cache = self.sheet_ids.write().await;
        for entry in meta.sheets {
            cache.insert(entry.properties.title, entry.properties.sheet_id);
        }
        debug!(worksheets = cache.len(), "cached worksheet ids");

        cache
            .get(worksheet)
            .copied()
            .ok_or_else(|| SheetError::UnknownWorksheet(worksheet.to_string()))
    }
}

/// One `copyPaste` request per column span, template row onto target row.
fn validation_requests(sheet_id: i64, template_row: u32, target_row: u32, columns: &[Range<u32>]) -> Value {
    let grid = |row: u32, cols: &Range<u32>| {
        json!({
            "sheetId": sheet_id,
            "startRowIndex": row.saturating_sub(1),
            "endRowIndex": row,
            "startColumnIndex": cols.start,
            "endColumnIndex": cols.end,
        })
    };

    let requests: Vec<Value> = columns
        .iter()
        .map(|cols| {
            json!({
                "copyPaste": {
                    "source": grid(template_row, cols),
                    "destination": grid(target_row, cols),
                    "pasteType": "PASTE_DATA_VALIDATION",
                }
            })
        })
        .collect();

    json!({ "requests": requests })
}

#[async_trait]
impl SheetsBackend for GoogleSheets {
    async fn get_values(&self, range: &CellRange) -> Result<Vec<Row>> {
        let mut url = self.values_url(range)?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");

        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        let body: ValueRange = Self::check(resp).await?.json().await?;

        debug!(range = %range, rows = body.values.len(), "read sheet values");
        Ok(body.values)
    }

    async fn update_values(&self, range: &CellRange, rows: Vec<Row>) -> Result<()> {
        let a1 = range.to_a1();
        let mut url = self.values_url(range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueUpdate {
            range: &a1,
            major_dimension: "ROWS",
            values: rows,
        };
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;

        debug!(range = %a1, "updated sheet values");
        Ok(())
    }

    async fn copy_validation(
        &self,
        worksheet: &str,
        template_row: u32,
        target_row: u32,
        columns: &[Range<u32>],
    ) -> Result<()> {
        let sheet_id = self.sheet_id(worksheet).await?;
        let body = validation_requests(sheet_id, template_row, target_row, columns);

        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.base_url, self.spreadsheet_id
        );
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;

        debug!(worksheet, template_row, target_row, "copied checkbox validation");
        Ok(())
    }
}

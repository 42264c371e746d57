//! Google Sheets backend.
//!
//! The spreadsheet is looked up on Drive by its title and its first
//! worksheet is used. Authentication is the service-account flow: an RS256
//! JWT assertion exchanged for a short-lived access token, reused until
//! shortly before it expires.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{row_text, SheetStore, StoreError};
use crate::models::Cell;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Assertions are valid for one hour, the maximum Google accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account key file this store needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Auth(format!("Invalid service account key: {e}")))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

fn build_claims(key: &ServiceAccountKey, now: DateTime<Utc>) -> Claims<'_> {
    let iat = now.timestamp();
    Claims {
        iss: &key.client_email,
        scope: SCOPES,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct AppendBody<'a> {
    values: [&'a [Cell]; 1],
}

pub struct GoogleSheetStore {
    client: reqwest::blocking::Client,
    key: ServiceAccountKey,
    name: String,
    spreadsheet_id: String,
    sheet_title: String,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleSheetStore {
    /// Authenticate, find the spreadsheet by name and select its first sheet.
    pub fn open(key: ServiceAccountKey, name: &str) -> Result<Self, StoreError> {
        let _span = tracing::info_span!("google_sheet_open", sheet = name).entered();

        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let mut store = Self {
            client,
            key,
            name: name.to_string(),
            spreadsheet_id: String::new(),
            sheet_title: String::new(),
            token: Mutex::new(None),
        };

        store.spreadsheet_id = store.find_spreadsheet(name)?;
        store.sheet_title = store.first_sheet_title()?;
        tracing::info!(
            spreadsheet_id = %store.spreadsheet_id,
            worksheet = %store.sheet_title,
            "Opened spreadsheet"
        );
        Ok(store)
    }

    fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| StoreError::Auth("Token cache lock poisoned".into()))?;

        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.token.clone());
        }

        let token = self.request_token(now)?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn request_token(&self, now: DateTime<Utc>) -> Result<AccessToken, StoreError> {
        tracing::debug!(account = %self.key.client_email, "Requesting access token");

        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| StoreError::Auth(format!("Invalid private key: {e}")))?;
        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &build_claims(&self.key, now),
            &signing_key,
        )
        .map_err(|e| StoreError::Auth(format!("Cannot sign assertion: {e}")))?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Auth(format!(
                "Token exchange returned {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| StoreError::Auth(format!("Unexpected token response: {e}")))?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: now + Duration::seconds(parsed.expires_in),
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, StoreError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token()?)
            .send()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        let body = check_status(response)?
            .text()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn find_spreadsheet(&self, name: &str) -> Result<String, StoreError> {
        let mut url = parse_url(DRIVE_FILES_API)?;
        url.query_pairs_mut()
            .append_pair("q", &drive_query(name))
            .append_pair("fields", "files(id,name)")
            .append_pair("pageSize", "1")
            .append_pair("supportsAllDrives", "true")
            .append_pair("includeItemsFromAllDrives", "true");

        let list: DriveFileList = self.get_json(url)?;
        list.files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| StoreError::SheetNotFound(name.to_string()))
    }

    fn first_sheet_title(&self) -> Result<String, StoreError> {
        let mut url = spreadsheet_url(&self.spreadsheet_id, None)?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let meta: SpreadsheetMeta = self.get_json(url)?;
        meta.sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .ok_or_else(|| StoreError::SheetNotFound(format!("{} (no worksheets)", self.name)))
    }

    fn rows_in(&self, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let range: ValueRange = self.get_json(values_get_url(&self.spreadsheet_id, range)?)?;
        Ok(range.values.iter().map(|row| row_text(row)).collect())
    }
}

impl SheetStore for GoogleSheetStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn header(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.rows_in(&header_range(&self.sheet_title))?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    fn append_row(&self, cells: &[Cell]) -> Result<(), StoreError> {
        let range = format!("{}!A1", quote_sheet_title(&self.sheet_title));
        let mut url = spreadsheet_url(&self.spreadsheet_id, Some(&format!("{range}:append")))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token()?)
            .json(&AppendBody { values: [cells] })
            .send()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        check_status(response)?;

        tracing::debug!(sheet = %self.name, cells = cells.len(), "Appended row");
        Ok(())
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let rows = self.rows_in(&quote_sheet_title(&self.sheet_title))?;
        Ok(rows.into_iter().skip(1).collect())
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(StoreError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

fn parse_url(raw: &str) -> Result<Url, StoreError> {
    Url::parse(raw).map_err(|e| StoreError::Http(format!("Invalid URL {raw}: {e}")))
}

/// `.../spreadsheets/{id}` or `.../spreadsheets/{id}/values/{range}`, with
/// the range percent-encoded as one path segment.
fn spreadsheet_url(spreadsheet_id: &str, range: Option<&str>) -> Result<Url, StoreError> {
    let mut url = parse_url(SHEETS_API)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| StoreError::Http("Sheets API URL cannot be a base".into()))?;
        segments.push(spreadsheet_id);
        if let Some(range) = range {
            segments.push("values").push(range);
        }
    }
    Ok(url)
}

/// A1-notation sheet reference: single-quoted, inner quotes doubled.
/// `values.get` for one A1 range, cells as raw values.
fn values_get_url(spreadsheet_id: &str, range: &str) -> Result<Url, StoreError> {
    let mut url = spreadsheet_url(spreadsheet_id, Some(range))?;
    url.query_pairs_mut()
        .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
        .append_pair("majorDimension", "ROWS");
    Ok(url)
}

/// First row of the worksheet only.
fn header_range(title: &str) -> String {
    format!("{}!1:1", quote_sheet_title(title))
}

fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Drive search expression for a spreadsheet with this exact title.
fn drive_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false")
}

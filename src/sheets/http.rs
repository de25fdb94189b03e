//! Google Sheets v4 REST backend.
//!
//! Authenticates with a bearer access token supplied by configuration.
//! Minting and refreshing that token is left to the deployment.

use super::traits::{Row, SheetMetadata, SheetsBackend};
use crate::retry::{ErrorCode, RemoteError};
use crate::util::sanitize_api_error;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";

pub struct HttpSheets {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    properties: SheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    #[serde(default)]
    properties: SheetProperties,
}

impl HttpSheets {
    pub fn new(
        base_url: Option<&str>,
        spreadsheet_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn spreadsheet_url(&self) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            RemoteError::new(ErrorCode::InvalidArgument, format!("bad sheets base url: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::new(ErrorCode::InvalidArgument, "sheets base url cannot be a base"))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id);
        Ok(url)
    }

    /// `…/spreadsheets/{id}/values/{range}{suffix}` with the range percent-encoded.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, RemoteError> {
        let mut url = self.spreadsheet_url()?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::new(ErrorCode::InvalidArgument, "sheets base url cannot be a base"))?
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        response.json::<T>().await.map_err(|e| {
            RemoteError::new(ErrorCode::Unknown, format!("unexpected sheets response: {e}"))
        })
    }
}

/// Map a non-success HTTP response to a classified error.
///
/// Quota errors come back as 429 or as 403 with a rate-limit reason, so the
/// body is inspected before falling back to the status code.
pub fn status_error(status: u16, body: &str) -> RemoteError {
    let rate_limited = ["RESOURCE_EXHAUSTED", "rateLimitExceeded", "userRateLimitExceeded"]
        .iter()
        .any(|marker| body.contains(marker));
    let code = if rate_limited {
        ErrorCode::RateLimited
    } else {
        ErrorCode::from_http_status(status)
    };

    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    RemoteError::new(
        code,
        format!("sheets API error ({status}): {}", sanitize_api_error(&message)),
    )
}

fn transport_error(error: &reqwest::Error) -> RemoteError {
    let code = if error.is_timeout() {
        ErrorCode::Timeout
    } else if error.is_connect() || error.is_request() {
        ErrorCode::Network
    } else {
        ErrorCode::Unknown
    };
    RemoteError::new(code, sanitize_api_error(&error.to_string()))
}

#[async_trait]
impl SheetsBackend for HttpSheets {
    async fn read_range(&self, range: &str) -> Result<Vec<Row>, RemoteError> {
        let url = self.values_url(range, "")?;
        let request = self
            .client
            .get(url)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")]);
        let body: ValueRange = self.send(request).await?;
        Ok(body.values)
    }

    async fn write_range(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        let url = self.values_url(range, "")?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&ValueRangeBody {
                range,
                major_dimension: "ROWS",
                values: rows,
            });
        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        let url = self.values_url(range, ":append")?;
        let request = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&ValueRangeBody {
                range,
                major_dimension: "ROWS",
                values: rows,
            });
        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<SheetMetadata, RemoteError> {
        let url = self.spreadsheet_url()?;
        let request = self
            .client
            .get(url)
            .query(&[("fields", "properties.title,sheets.properties.title")]);
        let body: Spreadsheet = self.send(request).await?;
        Ok(SheetMetadata {
            title: body.properties.title,
            sheets: body.sheets.into_iter().map(|s| s.properties.title).collect(),
        })
    }

    fn name(&self) -> &str {
        "sheets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpSheets {
        HttpSheets::new(None, "sheet-123", "ya29.token", Duration::from_secs(5))
    }

    #[test]
    fn values_url_encodes_range() {
        let url = backend().values_url("Weekly Reports!A2:H", "").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/Weekly%20Reports!A2:H"
        );
    }

    #[test]
    fn append_url_has_suffix() {
        let url = backend().values_url("Reports!A:H", ":append").unwrap();
        assert!(url.path().ends_with("/values/Reports!A:H:append"));
    }

    #[test]
    fn quota_403_is_rate_limited() {
        let body = r#"{"error":{"code":403,"message":"Quota exceeded","status":"PERMISSION_DENIED","errors":[{"reason":"rateLimitExceeded"}]}}"#;
        let err = status_error(403, body);
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert!(err.message.contains("Quota exceeded"));
    }

    #[test]
    fn plain_status_codes_map_through() {
        assert_eq!(status_error(503, "").code, ErrorCode::Unavailable);
        assert_eq!(status_error(403, "{}").code, ErrorCode::PermissionDenied);
        assert_eq!(status_error(404, "not found").code, ErrorCode::NotFound);
        assert_eq!(status_error(400, "bad range").code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn value_range_without_values_is_empty() {
        let body: ValueRange = serde_json::from_str(r#"{"range":"Reports!A1:H1"}"#).unwrap();
        assert!(body.values.is_empty());
    }
}

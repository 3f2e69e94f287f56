//! Google Drive v3 implementation of [`RemoteStore`].

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{FileMetadata, RemoteError, RemoteFile, RemoteResult, RemoteStore};
use crate::auth::parse_api_error;
use crate::config::MIME_TYPE;

pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

const MULTIPART_BOUNDARY: &str = "-------314159265358979323846";

#[derive(Debug, Clone)]
pub struct GoogleDriveStore {
    api_url: String,
    upload_url: String,
    client: Client,
}

impl GoogleDriveStore {
    pub fn new() -> RemoteResult<Self> {
        Self::with_base_urls(DRIVE_API_URL, DRIVE_UPLOAD_URL)
    }

    pub fn with_base_urls(api_url: &str, upload_url: &str) -> RemoteResult<Self> {
        Ok(Self {
            api_url: api_url.trim().trim_end_matches('/').to_string(),
            upload_url: upload_url.trim().trim_end_matches('/').to_string(),
            client: Client::builder().build()?,
        })
    }

    fn upload_request(
        &self,
        request: RequestBuilder,
        access_token: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> RemoteResult<RequestBuilder> {
        Ok(request
            .bearer_auth(access_token)
            .query(&[("uploadType", "multipart")])
            .header(
                "Content-Type",
                format!("multipart/related; boundary=\"{MULTIPART_BOUNDARY}\""),
            )
            .body(multipart_body(metadata, content)?))
    }
}

impl RemoteStore for GoogleDriveStore {
    async fn list(&self, access_token: &str, name: &str) -> RemoteResult<Vec<RemoteFile>> {
        let query = name_query(name);
        let response = self
            .client
            .get(format!("{}/files", self.api_url))
            .bearer_auth(access_token)
            .query(&[
                ("q", query.as_str()),
                ("pageSize", "1"),
                ("fields", "files(id, name)"),
            ])
            .send()
            .await?;
        let response = check_status(response, name).await?;
        let payload = response.json::<FileList>().await?;
        Ok(payload.files)
    }

    async fn get(&self, access_token: &str, id: &str) -> RemoteResult<String> {
        let response = self
            .client
            .get(format!("{}/files/{id}", self.api_url))
            .bearer_auth(access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let response = check_status(response, id).await?;
        Ok(response.text().await?)
    }

    async fn create(
        &self,
        access_token: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> RemoteResult<String> {
        let request = self.upload_request(
            self.client.post(format!("{}/files", self.upload_url)),
            access_token,
            metadata,
            content,
        )?;
        let response = check_status(request.send().await?, &metadata.name).await?;
        let created = response.json::<CreatedFile>().await?;
        tracing::debug!(file_id = %created.id, "Created remote file");
        Ok(created.id)
    }

    async fn update(
        &self,
        access_token: &str,
        id: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> RemoteResult<()> {
        let request = self.upload_request(
            self.client.patch(format!("{}/files/{id}", self.upload_url)),
            access_token,
            metadata,
            content,
        )?;
        check_status(request.send().await?, id).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

fn name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and trashed = false")
}

fn multipart_body(metadata: &FileMetadata, content: &str) -> RemoteResult<String> {
    let metadata = serde_json::to_string(metadata)?;
    Ok(format!(
        "\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: {MIME_TYPE}\r\n\r\n{metadata}\
         \r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: {MIME_TYPE}\r\n\r\n{content}\
         \r\n--{MULTIPART_BOUNDARY}--"
    ))
}

async fn check_status(response: Response, subject: &str) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, subject, &body))
}

fn status_error(status: StatusCode, subject: &str, body: &str) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Unauthorized(status.as_u16())
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound(subject.to_string()),
        _ => RemoteError::Api {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn name_query_matches_untrashed_file_by_name() {
        assert_eq!(
            name_query("myFodmap.json"),
            "name = 'myFodmap.json' and trashed = false"
        );
        assert_eq!(
            name_query("it's.json"),
            "name = 'it\\'s.json' and trashed = false"
        );
    }

    #[test]
    fn multipart_body_carries_metadata_then_content() {
        let body = multipart_body(&FileMetadata::json("myFodmap.json"), r#"{"categories":[]}"#)
            .unwrap();
        let metadata_at = body
            .find(r#"{"name":"myFodmap.json","mimeType":"application/json"}"#)
            .unwrap();
        let content_at = body.find(r#"{"categories":[]}"#).unwrap();
        assert!(metadata_at < content_at);
        assert!(body.ends_with(&format!("--{MULTIPART_BOUNDARY}--")));
        assert_eq!(body.matches(MULTIPART_BOUNDARY).count(), 3);
    }

    #[test]
    fn auth_statuses_map_to_unauthorized() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "f", "").is_unauthorized());
        assert!(status_error(StatusCode::FORBIDDEN, "f", "").is_unauthorized());
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "file-1", ""),
            RemoteError::NotFound(id) if id == "file-1"
        ));
    }

    #[test]
    fn other_statuses_carry_api_message() {
        let error = status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "f",
            r#"{"error":{"code":500,"message":"Backend Error"}}"#,
        );
        match error {
            RemoteError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

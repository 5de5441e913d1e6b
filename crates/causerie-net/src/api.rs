//! Bulk sync client.
//!
//! Typed wrapper over the server's REST surface, used for the initial data
//! load and the periodic message sync.  Every call carries the bearer token
//! captured at login; pagination follows the server's `Page` envelope.

use serde::{Deserialize, Serialize};
use tracing::debug;

use causerie_shared::types::{Chat, Comment, Message, Publication, User};

use crate::error::ApiError;

/// Paginated response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_pages: i64,
    pub total_elements: i64,
}

/// Server response to a file upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub file_download_uri: String,
    pub file_thumbnail_uri: String,
}

/// ICE server entry from the signaling configuration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Peer connection configuration served by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcConfig {
    pub ice_servers: Vec<IceServer>,
}

/// Fields accepted when creating or updating a publication.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationRequest {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest<'a> {
    content: &'a str,
    publication_id: i64,
}

/// HTTP client for the chat server's REST endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    /// `base_url` without a trailing slash, e.g. `https://host/api`.
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: session_token.into(),
        }
    }

    // -- users --------------------------------------------------------------

    pub async fn get_current_user(&self) -> Result<User, ApiError> {
        self.get_json("/users/info").await
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("/users").await
    }

    /// Usernames currently connected to the broker.
    pub async fn get_online_users(&self) -> Result<Vec<String>, ApiError> {
        self.get_json("/users/online").await
    }

    // -- chats --------------------------------------------------------------

    pub async fn get_chat_by_id(&self, id: i64) -> Result<Chat, ApiError> {
        self.get_json(&format!("/chats/{id}")).await
    }

    pub async fn get_user_chats(&self, page: u32, size: u32) -> Result<Page<Chat>, ApiError> {
        self.get_json(&format!("/chats?page={page}&size={size}"))
            .await
    }

    /// Messages for one chat, newest first, in the server's page envelope.
    pub async fn get_chat_messages(
        &self,
        chat_id: i64,
        page: u32,
        size: u32,
    ) -> Result<Page<Message>, ApiError> {
        self.get_json(&format!("/chats/{chat_id}/messages?page={page}&size={size}"))
            .await
    }

    pub async fn create_private_chat(&self, other_username: &str) -> Result<Chat, ApiError> {
        let url = self.url("/chats/private");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("otherUsername", other_username)])
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn create_group_chat(
        &self,
        chat_name: &str,
        usernames: &[String],
    ) -> Result<Chat, ApiError> {
        let url = self.url("/chats/group");
        let mut query: Vec<(&str, &str)> = vec![("chatName", chat_name)];
        query.extend(usernames.iter().map(|u| ("usernames", u.as_str())));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;
        Self::decode(response).await
    }

    // -- publications -------------------------------------------------------

    pub async fn get_all_publications(
        &self,
        page: u32,
        size: u32,
    ) -> Result<Page<Publication>, ApiError> {
        self.get_json(&format!("/publications?page={page}&size={size}"))
            .await
    }

    pub async fn get_publication_by_id(&self, id: i64) -> Result<Publication, ApiError> {
        self.get_json(&format!("/publications/{id}")).await
    }

    pub async fn create_publication(
        &self,
        request: &PublicationRequest,
    ) -> Result<Publication, ApiError> {
        let response = self
            .http
            .post(self.url("/publications"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn update_publication(
        &self,
        id: i64,
        request: &PublicationRequest,
    ) -> Result<Publication, ApiError> {
        let response = self
            .http
            .put(self.url(&format!("/publications/{id}")))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn delete_publication(&self, id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/publications/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    pub async fn like_publication(&self, id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(&format!("/publications/{id}/like")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    pub async fn unlike_publication(&self, id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/publications/{id}/like")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    pub async fn get_publication_comments(
        &self,
        id: i64,
        page: u32,
        size: u32,
    ) -> Result<Page<Comment>, ApiError> {
        self.get_json(&format!("/publications/{id}/comments?page={page}&size={size}"))
            .await
    }

    pub async fn create_comment(
        &self,
        publication_id: i64,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let request = CommentRequest {
            content,
            publication_id,
        };
        let response = self
            .http
            .post(self.url("/comments"))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/comments/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    // -- files and signaling ------------------------------------------------

    /// Upload an attachment for a chat.  The server generates the thumbnail.
    pub async fn upload_chat_file(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<FileResponse, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("chatId", chat_id.to_string());
        let response = self
            .http
            .post(self.url("/files/upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn get_webrtc_config(&self) -> Result<WebRtcConfig, ApiError> {
        self.get_json("/webrtc/config").await
    }

    // -- plumbing -----------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }
}

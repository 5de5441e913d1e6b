//! Bulk sync seam over the REST client.

use async_trait::async_trait;

use causerie_net::{ApiClient, ApiError};
use causerie_shared::constants::{CHAT_PAGE_SIZE, MESSAGE_PAGE_SIZE, PUBLICATION_PAGE_SIZE};
use causerie_shared::types::{Chat, Message, Publication};

/// Server fetches the engine performs.  First pages only; older history is
/// paged in on demand by the UI through [`ApiClient`] directly.
#[async_trait]
pub trait BulkSync: Send + Sync {
    async fn fetch_chats(&self) -> Result<Vec<Chat>, ApiError>;
    async fn fetch_chat_messages(&self, chat_id: i64) -> Result<Vec<Message>, ApiError>;
    async fn fetch_publications(&self) -> Result<Vec<Publication>, ApiError>;
}

#[async_trait]
impl BulkSync for ApiClient {
    async fn fetch_chats(&self) -> Result<Vec<Chat>, ApiError> {
        Ok(self.get_user_chats(0, CHAT_PAGE_SIZE).await?.content)
    }

    async fn fetch_chat_messages(&self, chat_id: i64) -> Result<Vec<Message>, ApiError> {
        Ok(self
            .get_chat_messages(chat_id, 0, MESSAGE_PAGE_SIZE)
            .await?
            .content)
    }

    async fn fetch_publications(&self) -> Result<Vec<Publication>, ApiError> {
        Ok(self
            .get_all_publications(0, PUBLICATION_PAGE_SIZE)
            .await?
            .content)
    }
}

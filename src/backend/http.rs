//! REST adapter for the note/task API.
//!
//! ROUTES
//! ======
//! ```text
//! prefix           /api                   personal
//!                  /api/teams/{team}      team
//! active list      GET    {prefix}/{kinds}
//! board list       GET    {prefix}/boards/{board_id}/{kinds}
//! deleted list     GET    {prefix}/{kinds}/deleted
//! delete           DELETE {prefix}/{kinds}/{id}
//! restore          POST   {prefix}/{kinds}/deleted/{original_id}/restore
//! ```

use std::time::Duration;

use reqwest::{StatusCode, Url};

use super::{BackendError, ItemBackend};
use crate::item::{Collection, HostContext, Item, ItemId, ItemKind};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    context: HostContext,
    kind: ItemKind,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns `BackendError::InvalidUrl` if `base_url` cannot carry a path, or
    /// `BackendError::Request` if the HTTP client cannot be built.
    pub fn new(base_url: &str, context: HostContext, kind: ItemKind) -> Result<Self, BackendError> {
        let base = Url::parse(base_url).map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_owned()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self { client, base, context, kind })
    }

    /// `{base}/api[/teams/{team}]/{tail..}`. Every segment is percent-encoded,
    /// `/` and `#` included, so ids can never leave their own route.
    fn endpoint(&self, tail: &[&str]) -> Result<String, BackendError> {
        let team = self.context.team();
        if let Some(bad) = team.iter().chain(tail).find(|s| matches!(**s, "" | "." | "..")) {
            return Err(BackendError::InvalidUrl(format!("path segment {bad:?}")));
        }
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| BackendError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("api");
            if let Some(team) = team {
                segments.extend(["teams", team]);
            }
            segments.extend(tail);
        }
        Ok(url.into())
    }

    pub(crate) fn collection_url(&self, collection: Collection) -> Result<String, BackendError> {
        let kinds = self.kind.plural();
        match (collection, self.context.board_id()) {
            (Collection::Active, Some(board_id)) => self.endpoint(&["boards", &board_id.to_string(), kinds]),
            (Collection::Active, None) => self.endpoint(&[kinds]),
            (Collection::Deleted, _) => self.endpoint(&[kinds, "deleted"]),
        }
    }

    pub(crate) fn delete_url(&self, id: &ItemId) -> Result<String, BackendError> {
        self.endpoint(&[self.kind.plural(), &id.to_string()])
    }

    pub(crate) fn restore_url(&self, original_id: &str) -> Result<String, BackendError> {
        self.endpoint(&[self.kind.plural(), "deleted", original_id, "restore"])
    }

    async fn send(&self, request: reqwest::RequestBuilder, token: &str) -> Result<reqwest::Response, BackendError> {
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

fn status_error(status: StatusCode, body: String) -> BackendError {
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized { status: status.as_u16() },
        _ => BackendError::Status { status: status.as_u16(), body },
    }
}

#[async_trait::async_trait]
impl ItemBackend for HttpBackend {
    async fn fetch_collection(&self, collection: Collection, token: &str) -> Result<Vec<Item>, BackendError> {
        let url = self.collection_url(collection)?;
        let response = self.send(self.client.get(url), token).await?;
        response
            .json::<Vec<Item>>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn delete(&self, id: &ItemId, token: &str) -> Result<(), BackendError> {
        let url = self.delete_url(id)?;
        self.send(self.client.delete(url), token).await?;
        Ok(())
    }

    async fn restore(&self, original_id: &str, token: &str) -> Result<Item, BackendError> {
        let url = self.restore_url(original_id)?;
        let response = self.send(self.client.post(url), token).await?;
        response
            .json::<Item>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

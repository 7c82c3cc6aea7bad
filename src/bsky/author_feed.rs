//! `app.bsky.feed.getAuthorFeed`, one page per call.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

use super::{AccountId, BskyError, FeedFetcher, FeedSnapshot, SessionCredential, XrpcClient};

const GET_AUTHOR_FEED: &str = "app.bsky.feed.getAuthorFeed";

#[async_trait]
impl FeedFetcher for XrpcClient {
    async fn fetch_author_feed(
        &self,
        actor: &AccountId,
        credential: &SessionCredential,
        limit: u32,
    ) -> Result<FeedSnapshot, BskyError> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(self.endpoint(GET_AUTHOR_FEED))
            .query(&[("actor", actor.as_str()), ("limit", limit.as_str())])
            .header(AUTHORIZATION, credential.bearer())
            .send()
            .await
            .map_err(|e| BskyError::Fetch(e.to_string()))?;
        let body = self
            .read_body(GET_AUTHOR_FEED, resp)
            .await
            .map_err(BskyError::Fetch)?;

        let snapshot: FeedSnapshot = serde_json::from_str(&body)
            .map_err(|e| BskyError::Fetch(format!("malformed body: {e}")))?;

        tracing::debug!(%actor, items = snapshot.feed.len(), "fetched author feed");
        Ok(snapshot)
    }
}

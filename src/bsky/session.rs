//! `com.atproto.identity.resolveHandle` and `com.atproto.server.createSession`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AccountId, BskyError, Secret, SessionCredential, SessionProvider, XrpcClient};

const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";
const CREATE_SESSION: &str = "com.atproto.server.createSession";

#[derive(Deserialize)]
struct ResolveHandleResponse {
    did: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: Option<String>,
}

/// Treat `null`, missing, and blank fields alike.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl SessionProvider for XrpcClient {
    async fn resolve_identity(&self, handle: &str) -> Result<AccountId, BskyError> {
        let failed = |reason: String| BskyError::Resolution {
            handle: handle.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(self.endpoint(RESOLVE_HANDLE))
            .query(&[("handle", handle)])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let body = self.read_body(RESOLVE_HANDLE, resp).await.map_err(failed)?;

        let parsed: ResolveHandleResponse =
            serde_json::from_str(&body).map_err(|e| failed(format!("malformed body: {e}")))?;
        let did = non_blank(parsed.did).ok_or_else(|| failed("response has no did".into()))?;

        tracing::debug!(handle, %did, "resolved handle");
        Ok(AccountId::new(did))
    }

    async fn create_session(
        &self,
        account: &AccountId,
        secret: &Secret,
    ) -> Result<SessionCredential, BskyError> {
        let request = CreateSessionRequest {
            identifier: account.as_str(),
            password: secret.expose(),
        };

        let resp = self
            .client
            .post(self.endpoint(CREATE_SESSION))
            .json(&request)
            .send()
            .await
            .map_err(|e| BskyError::Auth(e.to_string()))?;
        let body = self
            .read_body(CREATE_SESSION, resp)
            .await
            .map_err(BskyError::Auth)?;

        let parsed: CreateSessionResponse = serde_json::from_str(&body)
            .map_err(|e| BskyError::Auth(format!("malformed body: {e}")))?;
        let jwt = non_blank(parsed.access_jwt)
            .ok_or_else(|| BskyError::Auth("response has no accessJwt".into()))?;

        Ok(SessionCredential::new(jwt))
    }
}

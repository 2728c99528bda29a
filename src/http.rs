use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::*;

/// `MemberApi` over the household backend's `/api/family` REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpMemberApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemberApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed =
            reqwest::Url::parse(base_url).map_err(|e| anyhow!("invalid backend url: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("backend url must use http or https, got '{}'", parsed.scheme());
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn collection_url(&self) -> String {
        format!("{}/api/family", self.base_url)
    }

    pub fn member_url(&self, id: &str) -> String {
        format!("{}/api/family/{}", self.base_url, id)
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, url: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("request failed status={status} url={url}: {body}");
    }
    resp.json::<T>()
        .await
        .with_context(|| format!("unexpected response body from {url}"))
}

#[async_trait]
impl MemberApi for HttpMemberApi {
    async fn list_members(&self) -> Result<Vec<Member>> {
        let url = self.collection_url();
        debug!(url = %url, "listing family members");
        let resp = self.client.get(&url).send().await?;
        decode(resp, &url).await
    }

    async fn create_member(&self, member: &NewMember) -> Result<Member> {
        let url = self.collection_url();
        debug!(url = %url, name = %member.name, "creating family member");
        let resp = self.client.post(&url).json(member).send().await?;
        decode(resp, &url).await
    }

    async fn patch_member(&self, id: &str, patch: &MemberPatch) -> Result<Member> {
        let url = self.member_url(id);
        debug!(url = %url, "patching family member");
        let resp = self.client.patch(&url).json(patch).send().await?;
        decode(resp, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoint_urls_without_double_slashes() {
        let api = HttpMemberApi::new("http://localhost:8000/").unwrap();
        assert_eq!(api.collection_url(), "http://localhost:8000/api/family");
        assert_eq!(api.member_url("65f0"), "http://localhost:8000/api/family/65f0");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpMemberApi::new("not a url").is_err());
        assert!(HttpMemberApi::new("ftp://example.com").is_err());
    }
}

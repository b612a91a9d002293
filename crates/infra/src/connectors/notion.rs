//! Notion connector (notes only).
//!
//! Implements the NotesWrite capability tier alone: Notion is not a
//! calendar here. Notes become pages in a user-chosen database, with the
//! content as paragraph blocks. Notion integration tokens do not expire, so
//! refresh is unsupported.

use async_trait::async_trait;
use calbridge_core::{Connector, NotesWrite};
use calbridge_domain::{
    CalbridgeError, Capability, CreatedNote, NoteDraft, ProviderAccess, ProviderKind,
    RemoteCalendar, Result, TokenRefresh,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::response_failure;
use crate::http::HttpClient;

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

const CAPABILITIES: [Capability; 1] = [Capability::NotesWrite];

/// Notion provider adapter.
pub struct NotionConnector {
    http: HttpClient,
    api_base: String,
}

impl NotionConnector {
    pub fn new(http: HttpClient) -> Self {
        Self { http, api_base: NOTION_API_BASE.to_string() }
    }

    /// Override the endpoint (wiremock-based tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn bearer<'a>(&self, access: &'a ProviderAccess) -> Result<&'a str> {
        match access {
            ProviderAccess::OAuth { access_token, .. } => Ok(access_token),
            ProviderAccess::AppPassword { .. } => Err(CalbridgeError::InvalidInput(
                "notion requires an integration token".into(),
            )),
        }
    }
}

#[async_trait]
impl Connector for NotionConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Notion
    }

    fn capabilities(&self) -> &'static [Capability] {
        &CAPABILITIES
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn test_connection(&self, access: &ProviderAccess) -> Result<()> {
        let token = self.bearer(access)?;
        let url = format!("{}/users/me", self.api_base);
        let response = self
            .http
            .send(
                self.http
                    .request(Method::GET, &url)
                    .bearer_auth(token)
                    .header("Notion-Version", NOTION_VERSION),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }
        Ok(())
    }

    async fn refresh_credentials(&self, _access: &ProviderAccess) -> Result<TokenRefresh> {
        Err(CalbridgeError::InvalidInput("notion tokens do not refresh".into()))
    }
}

#[async_trait]
impl NotesWrite for NotionConnector {
    async fn list_databases(&self, access: &ProviderAccess) -> Result<Vec<RemoteCalendar>> {
        let token = self.bearer(access)?;
        let url = format!("{}/search", self.api_base);
        let body = json!({
            "filter": {"value": "database", "property": "object"},
            "page_size": 25,
        });

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(token)
                    .header("Notion-Version", NOTION_VERSION)
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let search: NotionSearchResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        Ok(search
            .results
            .into_iter()
            .map(|database| RemoteCalendar {
                id: database.id,
                name: database
                    .title
                    .into_iter()
                    .map(|t| t.plain_text)
                    .collect::<Vec<_>>()
                    .join(""),
                is_primary: false,
            })
            .collect())
    }

    async fn create_note(
        &self,
        access: &ProviderAccess,
        database_id: Option<&str>,
        note: &NoteDraft,
    ) -> Result<CreatedNote> {
        let token = self.bearer(access)?;
        let database_id = database_id.ok_or_else(|| {
            CalbridgeError::InvalidInput("notion notes require a target database".into())
        })?;

        let url = format!("{}/pages", self.api_base);
        let body = json!({
            "parent": {"database_id": database_id},
            "properties": {
                "Name": {"title": [{"text": {"content": note.title}}]},
            },
            "children": [{
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [{"type": "text", "text": {"content": note.content}}],
                },
            }],
        });

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(token)
                    .header("Notion-Version", NOTION_VERSION)
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let page: NotionPageResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        Ok(CreatedNote { external_id: page.id, title: note.title.clone(), url: page.url })
    }
}

#[derive(Debug, Deserialize)]
struct NotionSearchResponse {
    #[serde(default)]
    results: Vec<NotionDatabase>,
}

#[derive(Debug, Deserialize)]
struct NotionDatabase {
    id: String,
    #[serde(default)]
    title: Vec<NotionRichText>,
}

#[derive(Debug, Deserialize)]
struct NotionRichText {
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct NotionPageResponse {
    id: String,
    url: Option<String>,
}

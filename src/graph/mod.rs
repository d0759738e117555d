//! Microsoft Graph REST client
//!
//! One pooled HTTP client for the process. A bearer token is fetched from
//! the token provider per request, so token refreshes and rotations in the
//! credential take effect immediately.

pub mod models;

use anyhow::{Result, anyhow};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::auth::provider::TokenProvider;
use crate::constants::GRAPH_BASE_URL;

use models::{Collection, Event, EventPatch, Person, PersonMatch, User};

/// Query options for listing calendar events.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub subject_contains: Option<String>,
    pub start_after: Option<String>,
    pub end_before: Option<String>,
    pub top: Option<u32>,
}

#[derive(Debug)]
pub struct GraphClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
}

impl GraphClient {
    pub fn new(tokens: TokenProvider) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            tokens,
            base_url: GRAPH_BASE_URL.to_string(),
        })
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.tokens.access_token().await?)
    }

    async fn read_error(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow!("Graph request failed ({}): {}", status, body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, query: &[(&str, String)]) -> Result<T> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn create_event(&self, user_email: &str, event: &Event) -> Result<Event> {
        debug!("Creating event for {}", user_email);
        let url = format!("{}/users/{}/calendar/events", self.base_url, user_email);
        let token = self.bearer().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn get_event(&self, user_email: &str, event_id: &str) -> Result<Event> {
        let url = format!("{}/users/{}/events/{}", self.base_url, user_email, event_id);
        self.get_json(url, &[]).await
    }

    pub async fn list_events(&self, user_email: &str, query: &EventQuery) -> Result<Vec<Event>> {
        let url = format!("{}/users/{}/events", self.base_url, user_email);

        let mut filters = Vec::new();
        if let Some(subject) = &query.subject_contains {
            filters.push(format!("contains(subject,'{}')", subject.replace('\'', "''")));
        }
        if let Some(start) = &query.start_after {
            filters.push(format!("start/dateTime ge '{}'", start));
        }
        if let Some(end) = &query.end_before {
            filters.push(format!("end/dateTime le '{}'", end));
        }

        let mut params: Vec<(&str, String)> = vec![
            ("$orderby", "start/dateTime".to_string()),
            ("$top", query.top.unwrap_or(10).to_string()),
        ];
        if !filters.is_empty() {
            params.push(("$filter", filters.join(" and ")));
        }

        let collection: Collection<Event> = self.get_json(url, &params).await?;
        Ok(collection.value)
    }

    pub async fn update_event(
        &self,
        user_email: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Event> {
        debug!("Updating event {} for {}", event_id, user_email);
        let url = format!("{}/users/{}/events/{}", self.base_url, user_email, event_id);
        let token = self.bearer().await?;
        let response = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .json(patch)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn delete_event(&self, user_email: &str, event_id: &str) -> Result<()> {
        debug!("Deleting event {} for {}", event_id, user_email);
        let url = format!("{}/users/{}/events/{}", self.base_url, user_email, event_id);
        let token = self.bearer().await?;
        let response = self.http.delete(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(())
    }

    /// Search the signed-in user's relevant people, falling back to a
    /// directory lookup when the people endpoint is unavailable (common for
    /// app-only tokens, which return 403 there).
    pub async fn search_people(
        &self,
        user_email: &str,
        query: &str,
        top: u32,
    ) -> Result<Vec<PersonMatch>> {
        let url = format!("{}/users/{}/people", self.base_url, user_email);
        let params = [
            ("$search", format!("\"{}\"", query)),
            ("$top", top.to_string()),
        ];

        match self.get_json::<Collection<Person>>(url, &params).await {
            Ok(collection) => Ok(collection
                .value
                .into_iter()
                .map(|person| PersonMatch {
                    email: person.best_email().map(str::to_string),
                    display_name: person
                        .display_name
                        .unwrap_or_else(|| "(unknown)".to_string()),
                })
                .collect()),
            Err(err) => {
                warn!("People search failed ({}), trying directory lookup", err);
                self.search_directory(query, top).await
            }
        }
    }

    async fn search_directory(&self, query: &str, top: u32) -> Result<Vec<PersonMatch>> {
        let url = format!("{}/users", self.base_url);
        let params = [
            (
                "$filter",
                format!("startswith(displayName,'{}')", query.replace('\'', "''")),
            ),
            (
                "$select",
                "displayName,mail,userPrincipalName".to_string(),
            ),
            ("$top", top.to_string()),
        ];
        let collection: Collection<User> = self.get_json(url, &params).await?;
        Ok(collection
            .value
            .into_iter()
            .map(|user| PersonMatch {
                email: user.effective_email().map(str::to_string),
                display_name: user.display_name.unwrap_or_else(|| "(unknown)".to_string()),
            })
            .collect())
    }

    /// Profile of the signed-in user. Only meaningful with delegated tokens.
    pub async fn get_me(&self) -> Result<User> {
        let url = format!("{}/me", self.base_url);
        self.get_json(url, &[]).await
    }
}

// Team source client: the player handles listed for a team id.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use valdraft_core::config::TeamEntry;

use crate::error::FetchError;

#[derive(Debug, Clone, Deserialize)]
pub struct TeamResponse {
    pub data: TeamData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamData {
    #[serde(default)]
    pub players: Vec<TeamPlayer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamPlayer {
    #[serde(default)]
    pub user: Option<String>,
}

impl TeamResponse {
    /// Listed handles in source order, with missing and blank entries
    /// dropped.
    pub fn handles(self) -> Vec<String> {
        self.data
            .players
            .into_iter()
            .filter_map(|p| p.user)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

#[async_trait]
pub trait TeamSource: Send + Sync {
    /// Player handles for `team`, in the order the source lists them.
    async fn fetch_team(&self, team: &TeamEntry) -> Result<Vec<String>, FetchError>;
}

/// Team source backed by the JSON teams API.
pub struct HttpTeamSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTeamSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        HttpTeamSource {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TeamSource for HttpTeamSource {
    async fn fetch_team(&self, team: &TeamEntry) -> Result<Vec<String>, FetchError> {
        let fail = |reason: String| FetchError::Team {
            team_id: team.id,
            reason,
        };

        let url = format!("{}/api/v1/teams/{}", self.base_url, team.id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?;

        let body: TeamResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("malformed response: {e}")))?;

        let handles = body.handles();
        debug!(team = %team.name, id = team.id, players = handles.len(), "team roster fetched");
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn kru() -> TeamEntry {
        TeamEntry {
            name: "KRU".into(),
            id: 2355,
        }
    }

    #[tokio::test]
    async fn fetches_handles_in_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/teams/2355")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"OK","data":{"info":{"name":"KRÜ Esports"},"players":[
                    {"id":1,"user":"keznit","name":"Angelo Mori"},
                    {"id":2,"user":" Melser "},
                    {"id":3,"user":""},
                    {"id":4},
                    {"id":5,"user":"Shyy"}
                ]}}"#,
            )
            .create_async()
            .await;

        let source = HttpTeamSource::new(reqwest::Client::new(), server.url());
        let handles = source.fetch_team(&kru()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(handles, vec!["keznit", "Melser", "Shyy"]);
    }

    #[tokio::test]
    async fn not_found_is_a_team_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/teams/2355")
            .with_status(404)
            .create_async()
            .await;

        let source = HttpTeamSource::new(reqwest::Client::new(), server.url());
        let err = source.fetch_team(&kru()).await.unwrap_err();
        assert!(matches!(err, FetchError::Team { team_id: 2355, .. }));
    }

    #[tokio::test]
    async fn missing_players_field_is_an_empty_roster() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/teams/2355")
            .with_status(200)
            .with_body(r#"{"data":{}}"#)
            .create_async()
            .await;

        let source = HttpTeamSource::new(reqwest::Client::new(), server.url());
        assert!(source.fetch_team(&kru()).await.unwrap().is_empty());
    }
}

// Stat source client: per-player performance rows for a (region, timespan).

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use valdraft_core::config::StatQuery;

use crate::error::FetchError;

// ---------------------------------------------------------------------------
// Response schema
// ---------------------------------------------------------------------------

/// Envelope returned by `GET /stats`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub data: StatsData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsData {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub segments: Vec<StatRow>,
}

/// One player's line. Only `player`, `agents` and `rating` are used; the
/// other columns the source reports are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatRow {
    #[serde(default)]
    pub player: String,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    /// Sent as a display string ("1.10") or a number; anything unparseable
    /// reads as 0.
    #[serde(default, deserialize_with = "lenient_rating")]
    pub rating: f64,
}

impl StatRow {
    pub fn new(player: impl Into<String>, agents: &[&str], rating: f64) -> Self {
        StatRow {
            player: player.into(),
            org: None,
            agents: agents.iter().map(|a| a.to_string()).collect(),
            rating,
        }
    }
}

fn lenient_rating<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let rating = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => n,
        Some(Raw::Text(s)) => s.trim().parse().unwrap_or(0.0),
        None => 0.0,
    };
    Ok(if rating.is_finite() && rating > 0.0 {
        rating
    } else {
        0.0
    })
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StatSource: Send + Sync {
    async fn fetch_stats(&self, query: &StatQuery) -> Result<Vec<StatRow>, FetchError>;
}

/// Stat source backed by the JSON stats API.
pub struct HttpStatSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        HttpStatSource {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StatSource for HttpStatSource {
    async fn fetch_stats(&self, query: &StatQuery) -> Result<Vec<StatRow>, FetchError> {
        let fail = |reason: String| FetchError::Stats {
            query: query.to_string(),
            reason,
        };

        let url = format!("{}/stats", self.base_url);
        let timespan = query.timespan.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("region", query.region.as_str()), ("timespan", timespan.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?;

        let body: StatsResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("malformed response: {e}")))?;

        if let Some(status) = body.data.status {
            if !(200..300).contains(&status) {
                return Err(fail(format!("source reported status {status}")));
            }
        }

        debug!(query = %query, rows = body.data.segments.len(), "stat rows fetched");
        Ok(body.data.segments)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use valdraft_core::config::Timespan;

    #[test]
    fn rating_accepts_strings_and_numbers() {
        let rows: Vec<StatRow> = serde_json::from_str(
            r#"[
                {"player":"a","agents":["jett"],"rating":"1.10"},
                {"player":"b","agents":[],"rating":0.95},
                {"player":"c","rating":""},
                {"player":"d","rating":null},
                {"player":"e"}
            ]"#,
        )
        .unwrap();

        assert!((rows[0].rating - 1.10).abs() < 1e-9);
        assert!((rows[1].rating - 0.95).abs() < 1e-9);
        assert_eq!(rows[2].rating, 0.0);
        assert_eq!(rows[3].rating, 0.0);
        assert_eq!(rows[4].rating, 0.0);
        assert!(rows[4].agents.is_empty());
    }

    #[test]
    fn extra_columns_are_ignored() {
        let row: StatRow = serde_json::from_str(
            r#"{"player":"Demon1","org":"EG","agents":["jett","raze"],
                "rounds_played":"1200","rating":"1.21","average_combat_score":"255.3"}"#,
        )
        .unwrap();
        assert_eq!(row.player, "Demon1");
        assert_eq!(row.org.as_deref(), Some("EG"));
        assert_eq!(row.agents, vec!["jett", "raze"]);
    }

    #[tokio::test]
    async fn fetches_rows_for_region_and_timespan() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/stats")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("region".into(), "na".into()),
                Matcher::UrlEncoded("timespan".into(), "30d".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":{"status":200,"segments":[
                    {"player":"TenZ","org":"SEN","agents":["jett"],"rating":"1.05"},
                    {"player":"zekken","org":"SEN","agents":["raze","jett"],"rating":"1.12"}
                ]}}"#,
            )
            .create_async()
            .await;

        let source = HttpStatSource::new(reqwest::Client::new(), server.url());
        let rows = source
            .fetch_stats(&StatQuery::new("na", Timespan::Days(30)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].player, "zekken");
        assert!((rows[1].rating - 1.12).abs() < 1e-9);
    }

    #[tokio::test]
    async fn http_error_is_a_stats_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/stats")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let source = HttpStatSource::new(reqwest::Client::new(), server.url());
        let err = source
            .fetch_stats(&StatQuery::new("br", Timespan::All))
            .await
            .unwrap_err();

        match err {
            FetchError::Stats { query, .. } => assert_eq!(query, "br/all"),
            other => panic!("expected stats failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_stats_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/stats")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let source = HttpStatSource::new(reqwest::Client::new(), server.url());
        let result = source.fetch_stats(&StatQuery::new("na", Timespan::All)).await;
        assert!(matches!(result, Err(FetchError::Stats { .. })));
    }

    #[tokio::test]
    async fn empty_segments_are_not_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/stats")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":{"status":200,"segments":[]}}"#)
            .create_async()
            .await;

        let source = HttpStatSource::new(reqwest::Client::new(), format!("{}/", server.url()));
        let rows = source
            .fetch_stats(&StatQuery::new("br", Timespan::All))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}

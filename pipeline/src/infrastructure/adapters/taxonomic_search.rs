// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP-backed taxonomic [`SearchAdapter`] (§4.7): token-exact scoring
//! over the configured taxonomy endpoint, normalized, deduplicated by id
//! keeping the highest score, then truncated to `k`.

use async_trait::async_trait;
use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::services::SearchAdapter;
use pipeline_domain::value_objects::Candidate;
use serde::Deserialize;
use serde_json::json;

const SEARCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TaxonHit {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    /// Count of query tokens present in this entry's token set.
    matched: i64,
    /// Total token count for this entry, per the `matched·100 − ntokens`
    /// scoring formula.
    ntokens: i64,
}

pub struct HttpTaxonomicSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTaxonomicSearch {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::invalid_config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchAdapter for HttpTaxonomicSearch {
    async fn search(&self, index_name: &str, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut req = self.client.post(&self.endpoint).json(&json!({
            "index": index_name,
            "tokens": tokens,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| PipelineError::transient(format!("taxonomic search request: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::transient(format!(
                "taxonomic search returned HTTP {}",
                response.status()
            )));
        }

        let hits: Vec<TaxonHit> = response
            .json()
            .await
            .map_err(|e| PipelineError::parse_failure(format!("taxonomic search response: {e}")))?;

        let mut scored: Vec<(TaxonHit, f64)> = hits
            .into_iter()
            .map(|h| {
                let score = (h.matched * 100 - h.ntokens) as f64;
                (h, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let max_score = scored.first().map(|(_, s)| *s).unwrap_or(0.0).max(1e-9);

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (hit, score) in scored {
            if !seen.insert(hit.id.clone()) {
                continue;
            }
            let normalized = if max_score > 0.0 { score / max_score } else { 0.0 };
            out.push(Candidate::new(hit.id, hit.name, normalized).with_description(hit.description));
            if out.len() == k {
                break;
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn dedups_by_id_keeping_highest_score_and_normalizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "NCBITaxon:9606", "name": "Homo sapiens", "description": "", "matched": 2, "ntokens": 2 },
                { "id": "NCBITaxon:9606", "name": "Homo sapiens", "description": "", "matched": 1, "ntokens": 2 },
                { "id": "NCBITaxon:10090", "name": "Mus musculus", "description": "", "matched": 1, "ntokens": 2 },
            ])))
            .mount(&server)
            .await;

        let adapter = HttpTaxonomicSearch::new(server.uri(), None).unwrap();
        let results = adapter.search("taxon", "homo sapiens", 10).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "NCBITaxon:9606");
        assert_eq!(results[0].score, 1.0);
    }

    #[tokio::test]
    async fn empty_query_returns_no_candidates_without_a_request() {
        let server = MockServer::start().await;
        let adapter = HttpTaxonomicSearch::new(server.uri(), None).unwrap();
        let results = adapter.search("taxon", "   ", 10).await.unwrap();
        assert!(results.is_empty());
    }
}

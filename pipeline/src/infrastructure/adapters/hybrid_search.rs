// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP-backed hybrid dense+sparse [`SearchAdapter`] (§4.5.3 Step A point
//! 3, §4.7): a dense-KNN recall pass followed by SPLADE sparse
//! rescoring, fused by max-normalized weighted sum.

use async_trait::async_trait;
use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::services::SearchAdapter;
use pipeline_domain::value_objects::Candidate;
use serde::Deserialize;
use serde_json::json;

const SEARCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const VEC_TOPN: usize = 200;
const W_DENSE: f64 = 0.5;
const W_SPLADE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct DenseHit {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct SparseHit {
    id: String,
    score: f64,
}

pub struct HttpHybridSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpHybridSearch {
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

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.endpoint.trim_end_matches('/'), path);
        let mut req = self.client.post(url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[async_trait]
impl SearchAdapter for HttpHybridSearch {
    async fn search(&self, index_name: &str, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let num_candidates = (VEC_TOPN * 3).max(1000);

        let dense_resp = self
            .request("/dense")
            .json(&json!({
                "index": index_name,
                "query": query,
                "size": VEC_TOPN,
                "num_candidates": num_candidates,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::transient(format!("hybrid search dense pass: {e}")))?;

        if !dense_resp.status().is_success() {
            return Err(PipelineError::transient(format!(
                "hybrid search dense pass returned HTTP {}",
                dense_resp.status()
            )));
        }

        let dense_hits: Vec<DenseHit> = dense_resp
            .json()
            .await
            .map_err(|e| PipelineError::parse_failure(format!("hybrid search dense response: {e}")))?;

        if dense_hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = dense_hits.iter().map(|h| h.id.as_str()).collect();

        let sparse_resp = self
            .request("/sparse")
            .json(&json!({
                "index": index_name,
                "query": query,
                "ids": ids,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::transient(format!("hybrid search sparse pass: {e}")))?;

        if !sparse_resp.status().is_success() {
            return Err(PipelineError::transient(format!(
                "hybrid search sparse pass returned HTTP {}",
                sparse_resp.status()
            )));
        }

        let sparse_hits: Vec<SparseHit> = sparse_resp
            .json()
            .await
            .map_err(|e| PipelineError::parse_failure(format!("hybrid search sparse response: {e}")))?;

        let sparse_by_id: std::collections::HashMap<&str, f64> =
            sparse_hits.iter().map(|h| (h.id.as_str(), h.score)).collect();

        let max_dense = dense_hits.iter().map(|h| h.score).fold(0.0_f64, f64::max).max(1e-9);
        let max_splade = sparse_hits.iter().map(|h| h.score).fold(0.0_f64, f64::max).max(1e-9);

        let mut fused: Vec<Candidate> = dense_hits
            .into_iter()
            .map(|h| {
                let splade_score = sparse_by_id.get(h.id.as_str()).copied().unwrap_or(0.0);
                let fused_score = W_DENSE * (h.score / max_dense) + W_SPLADE * (splade_score / max_splade);
                Candidate::new(h.id, h.name, fused_score).with_description(h.description)
            })
            .collect();

        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(k);
        Ok(fused)
    }
}

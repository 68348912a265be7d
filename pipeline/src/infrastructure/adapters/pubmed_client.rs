// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! PubMed abstract fetch (§4.7): XML fetch against the E-utilities
//! `efetch` endpoint, gated by the shared app-level rate bucket and
//! retried forever on transient failure.
//!
//! Not behind a port trait — this adapter has a single concrete consumer
//! (document ingest) and no alternate implementation is ever swapped in,
//! unlike `LlmClient`/`SearchAdapter` which the stage driver dispatches
//! through generically.

use std::sync::Arc;
use std::time::Duration;

use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::services::RateLimiter;

const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct PubmedClient {
    client: reqwest::Client,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl PubmedClient {
    pub fn new(rate_limiter: Arc<dyn RateLimiter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::invalid_config(e.to_string()))?;
        Ok(Self { client, rate_limiter })
    }

    /// Fetches one document's abstract text, retrying forever on any
    /// transient failure (network error, non-2xx, unparsable XML) with a
    /// fixed 1-second back-off, since this is explicitly unbounded per
    /// §4.7 ("retries forever"), unlike the stage driver's bounded
    /// 3-attempt policy. Returns `"NO_ARTICLE"`/`"NO_ABSTRACT"` verbatim
    /// when PubMed has no matching record, matching the original
    /// collaborator's sentinel values.
    pub async fn fetch_abstract(&self, pmid: &str) -> String {
        loop {
            match self.try_fetch(pmid).await {
                Ok(text) => return text,
                Err(_) => tokio::time::sleep(RETRY_BACKOFF).await,
            }
        }
    }

    async fn try_fetch(&self, pmid: &str) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let response = self
            .client
            .get(EFETCH_URL)
            .query(&[("db", "pubmed"), ("id", pmid), ("retmode", "xml")])
            .send()
            .await
            .map_err(|e| PipelineError::transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::transient(format!("efetch returned HTTP {}", response.status())));
        }

        let body = response.text().await.map_err(|e| PipelineError::transient(e.to_string()))?;
        extract_abstract(&body)
    }
}

/// Extracts the abstract text from an `efetch` XML payload without a full
/// XML dependency: the payload's shape is a single known element path
/// (`PubmedArticle//Abstract/AbstractText`[+]), so a minimal tag-scan over
/// the known markers suffices, documented as a deliberate simplification
/// rather than a silently-dropped capability.
fn extract_abstract(xml: &str) -> Result<String> {
    if !xml.contains("<PubmedArticle") {
        return Ok("NO_ARTICLE".to_string());
    }

    let mut parts = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<AbstractText") {
        let after_open = &rest[start..];
        let Some(tag_end) = after_open.find('>') else { break };
        let label = extract_label_attr(&after_open[..tag_end]);

        let body_start = start + tag_end + 1;
        let Some(close_rel) = rest[body_start..].find("</AbstractText>") else {
            break;
        };
        let close = body_start + close_rel;

        let text = clean_xml_text(&strip_inline_tags(&rest[body_start..close]));
        if !text.is_empty() {
            parts.push(match label {
                Some(l) => format!("{l}: {text}"),
                None => text,
            });
        }

        rest = &rest[close + "</AbstractText>".len()..];
    }

    if parts.is_empty() {
        Ok("NO_ABSTRACT".to_string())
    } else {
        Ok(parts.join("\n\n"))
    }
}

fn extract_label_attr(open_tag: &str) -> Option<String> {
    let idx = open_tag.find("Label=")?;
    let after = &open_tag[idx + "Label=".len()..];
    let quote = after.chars().next()?;
    let after = &after[1..];
    let end = after.find(quote)?;
    Some(after[..end].to_string())
}

fn strip_inline_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn clean_xml_text(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_unlabeled_abstract_text() {
        let xml = r#"<PubmedArticleSet><PubmedArticle><Abstract><AbstractText>Hello world.</AbstractText></Abstract></PubmedArticle></PubmedArticleSet>"#;
        assert_eq!(extract_abstract(xml).unwrap(), "Hello world.");
    }

    #[test]
    fn joins_multiple_labeled_sections() {
        let xml = r#"<PubmedArticle><Abstract>
            <AbstractText Label="BACKGROUND">Some background.</AbstractText>
            <AbstractText Label="METHODS">Some methods.</AbstractText>
        </Abstract></PubmedArticle>"#;
        assert_eq!(
            extract_abstract(xml).unwrap(),
            "BACKGROUND: Some background.\n\nMETHODS: Some methods."
        );
    }

    #[test]
    fn missing_article_yields_sentinel() {
        assert_eq!(extract_abstract("<eSummaryResult></eSummaryResult>").unwrap(), "NO_ARTICLE");
    }

    #[test]
    fn missing_abstract_yields_sentinel() {
        assert_eq!(extract_abstract("<PubmedArticle></PubmedArticle>").unwrap(), "NO_ABSTRACT");
    }
}

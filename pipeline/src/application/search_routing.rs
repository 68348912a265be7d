// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Routes a `search(index_name, ...)` call to whichever concrete
//! [`SearchAdapter`] backs that index (§3, §4.7): `get_db_id` and
//! `convert_failed` each take a single search port, but a stage's
//! ontologies can mix hybrid and taxonomic indices, so the composition
//! root hands them one router built from the stage's own ontology list
//! rather than widening either stage's constructor to take more than one
//! adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::services::SearchAdapter;
use pipeline_domain::value_objects::Candidate;

pub struct RoutingSearchAdapter {
    routes: HashMap<String, Arc<dyn SearchAdapter>>,
}

impl RoutingSearchAdapter {
    pub fn new(routes: HashMap<String, Arc<dyn SearchAdapter>>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl SearchAdapter for RoutingSearchAdapter {
    async fn search(&self, index_name: &str, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let adapter = self
            .routes
            .get(index_name)
            .ok_or_else(|| PipelineError::invalid_config(format!("no search adapter registered for index \"{index_name}\"")))?;
        adapter.search(index_name, query, k).await
    }
}

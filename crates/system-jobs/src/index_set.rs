// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

/// Static description of an index set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSetConfig {
    pub id: String,
    pub title: String,
    pub index_template_name: String,
}

/// A set of indices managed together under one template.
pub trait IndexSet: Send + Sync {
    fn config(&self) -> &IndexSetConfig;

    /// Names of the indices currently in the set, in deletion order.
    fn managed_indices_names(&self) -> Vec<String>;
}

/// Index set backed by a fixed list of index names.
#[derive(Debug, Clone)]
pub struct ManagedIndexSet {
    config: IndexSetConfig,
    indices: Vec<String>,
}

impl ManagedIndexSet {
    pub fn new(config: IndexSetConfig, indices: Vec<String>) -> Self {
        Self { config, indices }
    }
}

impl IndexSet for ManagedIndexSet {
    fn config(&self) -> &IndexSetConfig {
        &self.config
    }

    fn managed_indices_names(&self) -> Vec<String> {
        self.indices.clone()
    }
}

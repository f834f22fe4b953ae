// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::IndicesError;
use crate::index_set::IndexSetConfig;

/// Boundary to the storage engine holding the indices.
///
/// Calls are synchronous and may block; jobs invoke them from a blocking thread.
pub trait Indices: Send + Sync {
    /// Fails with [`IndicesError::TemplateMissing`] when the template does not exist.
    fn delete_index_template(&self, index_set: &IndexSetConfig) -> Result<(), IndicesError>;

    fn delete(&self, index_name: &str) -> Result<(), IndicesError>;
}

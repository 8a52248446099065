// Copyright 2025 Cowboy AI, LLC.

//! Registration of externally built projections

use super::source::common_problems;
use super::Projection;
use crate::errors::{ProjectionError, ProjectionResult};
use crate::lifecycle::ProjectionLifecycle;
use crate::options::{AsyncOptions, StoreOptions};
use std::fmt;
use std::sync::Arc;

/// Adapter registering an opaque [`Projection`] instance
///
/// The registry cannot see inside a wrapped projection, so it can never be
/// run with the Live lifecycle.
#[derive(Clone)]
pub struct ProjectionWrapper {
    projection: Arc<dyn Projection>,
    name: String,
    lifecycle: ProjectionLifecycle,
    version: u32,
    async_options: AsyncOptions,
}

impl ProjectionWrapper {
    /// Wrap a projection; fails with [`ProjectionError::LiveNotSupported`] for Live
    pub fn new(
        projection: Arc<dyn Projection>,
        lifecycle: ProjectionLifecycle,
    ) -> ProjectionResult<Self> {
        let name = projection.projection_name();
        if lifecycle == ProjectionLifecycle::Live {
            return Err(ProjectionError::LiveNotSupported { name });
        }

        Ok(Self {
            projection,
            name,
            lifecycle,
            version: 1,
            async_options: AsyncOptions::default(),
        })
    }

    /// Register under an explicit name instead of the projection's own
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the projection version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Adjust the async daemon options
    pub fn configure_async(mut self, configure: impl FnOnce(&mut AsyncOptions)) -> Self {
        configure(&mut self.async_options);
        self
    }

    /// The wrapped instance
    pub fn projection(&self) -> Arc<dyn Projection> {
        Arc::clone(&self.projection)
    }

    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle
    pub fn lifecycle(&self) -> ProjectionLifecycle {
        self.lifecycle
    }

    /// Version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Async daemon options
    pub fn async_options(&self) -> &AsyncOptions {
        &self.async_options
    }

    /// Configuration problems, empty when valid
    pub fn validate(&self, _options: &StoreOptions) -> Vec<String> {
        let mut problems = common_problems(&self.name, self.lifecycle, &self.async_options);
        if self.lifecycle == ProjectionLifecycle::Live {
            problems.push(format!(
                "Projection '{}' wraps an opaque projection and cannot use the Live lifecycle",
                self.name
            ));
        }
        problems
    }
}

impl fmt::Debug for ProjectionWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionWrapper")
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("version", &self.version)
            .finish()
    }
}

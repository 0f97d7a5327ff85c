//! Ordered merge of several environment repositories
//!
//! Members are queried in ascending `order` and their property sources are
//! concatenated, so a source from an earlier member wins any key conflict.
//! With a single member the composite is transparent: that member's result,
//! including its version and state, is returned unchanged. With several,
//! `version` and `state` are left empty because no single value describes
//! the merge.
//!
//! A failing member either aborts the whole request (`fail_on_error`) or is
//! logged and left out, so the remaining members still produce a response.

use log::warn;

use crate::environment::{Environment, EnvironmentRequest};
use crate::error::{Error, Result};
use crate::repository::{EnvironmentRepository, DEFAULT_ORDER};

pub struct CompositeEnvironmentRepository {
    repositories: Vec<Box<dyn EnvironmentRepository>>,
    fail_on_error: bool,
}

impl std::fmt::Debug for CompositeEnvironmentRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEnvironmentRepository")
            .field(
                "repositories",
                &self.repositories.iter().map(|r| r.describe()).collect::<Vec<_>>(),
            )
            .field("fail_on_error", &self.fail_on_error)
            .finish()
    }
}

impl CompositeEnvironmentRepository {
    /// Creates a composite; members are sorted by their `order` (stable, so
    /// equal orders keep the given sequence).
    pub fn new(mut repositories: Vec<Box<dyn EnvironmentRepository>>, fail_on_error: bool) -> Self {
        repositories.sort_by_key(|r| r.order());
        Self {
            repositories,
            fail_on_error,
        }
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

impl EnvironmentRepository for CompositeEnvironmentRepository {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        if let [single] = self.repositories.as_slice() {
            return single.find_one(request);
        }

        let mut environment = Environment::for_request(request);
        for repository in &self.repositories {
            match repository.find_one(request) {
                Ok(found) => environment.add_all(found.property_sources),
                Err(e) if self.fail_on_error => {
                    return Err(Error::Aggregation {
                        repository: repository.describe(),
                        source: Box::new(e),
                    })
                }
                Err(e) => warn!(
                    "Error getting the environment from {}, leaving it out: {}",
                    repository.describe(),
                    e
                ),
            }
        }
        Ok(environment)
    }

    fn order(&self) -> i32 {
        self.repositories
            .first()
            .map(|r| r.order())
            .unwrap_or(DEFAULT_ORDER)
    }

    fn describe(&self) -> String {
        format!(
            "composite [{}]",
            self.repositories
                .iter()
                .map(|r| r.describe())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

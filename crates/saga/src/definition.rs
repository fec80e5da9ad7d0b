//! Saga definitions: a named, ordered list of steps.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, SagaError};
use crate::step::SagaStep;

/// A named, ordered sequence of steps.
///
/// Order is fixed at definition time. Step ids must be unique.
#[derive(Clone)]
pub struct SagaDefinition {
    name: String,
    steps: Vec<Arc<dyn SagaStep>>,
}

impl SagaDefinition {
    /// Creates an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Creates a definition from an existing step list.
    pub fn from_steps(name: impl Into<String>, steps: Vec<Arc<dyn SagaStep>>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Appends a step.
    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends an already shared step.
    pub fn shared_step(mut self, step: Arc<dyn SagaStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn SagaStep>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks that every step has a non-empty, unique id.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SagaError::InvalidDefinition(
                "saga name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            let id = step.id();
            if id.is_empty() {
                return Err(SagaError::InvalidDefinition(format!(
                    "step '{}' has an empty id",
                    step.name()
                )));
            }
            if !seen.insert(id) {
                return Err(SagaError::DuplicateStepId(id.to_string()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SagaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

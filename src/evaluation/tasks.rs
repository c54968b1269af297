use super::TaskBuilder;
use crate::error::EvaluationError;
use crate::types::ParameterVector;
use indexmap::IndexMap;

/// Sends the candidate itself as the request.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl TaskBuilder for PassThrough {
    type Request = ParameterVector;

    fn build_task(&self, candidate: &[f64]) -> Result<ParameterVector, EvaluationError> {
        Ok(candidate.to_vec())
    }
}

/// Binds each coordinate to a parameter name, preserving order.
#[derive(Clone, Debug)]
pub struct NamedParameters {
    names: Vec<String>,
}

impl NamedParameters {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl TaskBuilder for NamedParameters {
    type Request = IndexMap<String, f64>;

    fn build_task(&self, candidate: &[f64]) -> Result<Self::Request, EvaluationError> {
        if candidate.len() != self.names.len() {
            return Err(EvaluationError::TaskBuild(format!(
                "candidate has {} values but {} parameter names are bound",
                candidate.len(),
                self.names.len()
            )));
        }

        Ok(self
            .names
            .iter()
            .cloned()
            .zip(candidate.iter().copied())
            .collect())
    }
}

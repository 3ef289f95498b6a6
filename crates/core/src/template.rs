//! ComfyUI job templates (API-format workflow graphs).
//!
//! A template maps node ids to `{ "inputs": {...}, "class_type": "..." }`
//! descriptors. Input values are either literals or references to another
//! node's output slot (`["38", 0]`). The graph is trusted as-is: reference
//! integrity is never checked, and structural problems only surface when a
//! designated field is substituted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Key holding a node's input mapping.
const INPUTS_KEY: &str = "inputs";

/// Which template fields receive the per-request values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeBindings {
    /// Node whose `text` input carries the user's prompt.
    pub prompt_node: &'static str,
    /// Node whose `seed` input is re-drawn for every request.
    pub seed_node: &'static str,
    /// Node whose outputs hold the produced artifact.
    pub output_node: &'static str,
}

impl NodeBindings {
    pub const PROMPT_FIELD: &'static str = "text";
    pub const SEED_FIELD: &'static str = "seed";
}

/// A job template as stored on disk and submitted to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobTemplate(Map<String, Value>);

/// A fully parameterized copy of a template, ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub workflow: JobTemplate,
    pub prompt: String,
    pub seed: u64,
}

impl JobTemplate {
    /// Wrap an already-parsed JSON value. Only the top level must be an
    /// object; node contents are not inspected.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        Ok(Self(serde_json::from_value(value)?))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn class_type(&self, node: &str) -> Option<&str> {
        self.0.get(node)?.get("class_type")?.as_str()
    }

    pub fn input(&self, node: &str, field: &str) -> Option<&Value> {
        self.0.get(node)?.get(INPUTS_KEY)?.get(field)
    }

    /// Overwrite one input of one node.
    ///
    /// Fails with a lookup error when the node is missing or does not
    /// carry an `inputs` object.
    pub fn set_input(&mut self, node: &str, field: &str, value: Value) -> Result<(), CoreError> {
        let descriptor = self.0.get_mut(node).ok_or_else(|| CoreError::NodeNotFound {
            node: node.to_string(),
        })?;

        let inputs = descriptor
            .get_mut(INPUTS_KEY)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| CoreError::MalformedNode {
                node: node.to_string(),
            })?;

        inputs.insert(field.to_string(), value);
        Ok(())
    }

    /// Build a job request from a deep copy of this template.
    ///
    /// `self` is left untouched, so one shared template can serve any
    /// number of concurrent requests.
    pub fn to_request(
        &self,
        bindings: &NodeBindings,
        prompt: &str,
        seed: u64,
    ) -> Result<JobRequest, CoreError> {
        let mut workflow = self.clone();
        workflow.set_input(
            bindings.prompt_node,
            NodeBindings::PROMPT_FIELD,
            Value::String(prompt.to_string()),
        )?;
        workflow.set_input(bindings.seed_node, NodeBindings::SEED_FIELD, Value::from(seed))?;

        Ok(JobRequest {
            workflow,
            prompt: prompt.to_string(),
            seed,
        })
    }
}

impl From<Map<String, Value>> for JobTemplate {
    fn from(nodes: Map<String, Value>) -> Self {
        Self(nodes)
    }
}

//! Workload call carried by a job definition
//!
//! A definition names the method the cluster should run and the keyword
//! parameters to call it with. `parameters` may be given inline as an object
//! or as a JSON-encoded string, the form submitters storing definitions in
//! plain key/value records tend to use.

use serde_json::{Map, Value};
use thiserror::Error;

/// Key naming the method to run
pub const METHOD_KEY: &str = "method";

/// Key carrying the method's keyword parameters
pub const PARAMETERS_KEY: &str = "parameters";

/// Method and parameters extracted from a definition
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadCall {
    pub method: String,
    pub parameters: Map<String, Value>,
}

impl WorkloadCall {
    pub fn from_definition(definition: &Value) -> Result<Self, DefinitionError> {
        let object = definition
            .as_object()
            .ok_or(DefinitionError::NotAnObject)?;

        let method = match object.get(METHOD_KEY) {
            Some(Value::String(method)) if !method.trim().is_empty() => method.clone(),
            _ => return Err(DefinitionError::MissingMethod),
        };

        let parameters = match object.get(PARAMETERS_KEY) {
            None | Some(Value::Null) => return Err(DefinitionError::MissingParameters),
            Some(Value::String(raw)) if raw.trim().is_empty() => {
                return Err(DefinitionError::MissingParameters);
            }
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(parameters)) => parameters,
                Ok(_) => return Err(DefinitionError::ParametersNotAnObject),
                Err(e) => return Err(DefinitionError::MalformedParameters(e.to_string())),
            },
            Some(Value::Object(parameters)) => parameters.clone(),
            Some(_) => return Err(DefinitionError::ParametersNotAnObject),
        };

        Ok(Self { method, parameters })
    }
}

/// Why a definition does not describe a runnable workload
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("job definition must be a JSON object")]
    NotAnObject,

    #[error("`method` must be a non-empty string")]
    MissingMethod,

    #[error("`parameters` is missing")]
    MissingParameters,

    #[error("`parameters` is not valid JSON: {0}")]
    MalformedParameters(String),

    #[error("`parameters` must be an object of keyword arguments")]
    ParametersNotAnObject,
}

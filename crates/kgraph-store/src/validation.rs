//! Input validation for graph operations.
//!
//! Create paths run these before any statement touches the store, so a
//! rejected batch never leaves partial writes behind. Delete paths take
//! input as-is; unknown names simply match nothing.

use crate::error::{GraphError, Result};
use crate::types::{Entity, ObservationInput, Relation};

/// Specific validation failures for graph input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// An entity name is empty.
    #[error("entity name is empty")]
    EmptyEntityName,

    /// A relation endpoint is empty.
    #[error("relation endpoint '{0}' is empty")]
    EmptyEndpoint(&'static str),
}

impl From<ValidationError> for GraphError {
    fn from(err: ValidationError) -> Self {
        GraphError::InvalidData(err.to_string())
    }
}

/// Validate an entity name.
pub fn validate_entity_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyEntityName);
    }
    Ok(())
}

/// Validate a relation's endpoints. The relation type is free text.
pub fn validate_relation(relation: &Relation) -> std::result::Result<(), ValidationError> {
    if relation.from.is_empty() {
        return Err(ValidationError::EmptyEndpoint("from"));
    }
    if relation.to.is_empty() {
        return Err(ValidationError::EmptyEndpoint("to"));
    }
    Ok(())
}

pub(crate) fn validate_entities(entities: &[Entity]) -> Result<()> {
    for entity in entities {
        validate_entity_name(&entity.name)?;
    }
    Ok(())
}

pub(crate) fn validate_relations(relations: &[Relation]) -> Result<()> {
    for relation in relations {
        validate_relation(relation)?;
    }
    Ok(())
}

pub(crate) fn validate_observation_inputs(inputs: &[ObservationInput]) -> Result<()> {
    for input in inputs {
        validate_entity_name(&input.entity_name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_name() {
        assert!(validate_entity_name("Alice").is_ok());
        assert_eq!(
            validate_entity_name(""),
            Err(ValidationError::EmptyEntityName)
        );
        assert!(validate_entity_name("   ").is_ok());
    }

    #[test]
    fn test_relation() {
        assert!(validate_relation(&Relation::new("a", "b", "knows")).is_ok());
        assert_eq!(
            validate_relation(&Relation::new("", "b", "knows")),
            Err(ValidationError::EmptyEndpoint("from"))
        );
        assert_eq!(
            validate_relation(&Relation::new("a", "", "knows")),
            Err(ValidationError::EmptyEndpoint("to"))
        );
        assert!(validate_relation(&Relation::new("a", "b", "")).is_ok());
    }

    #[test]
    fn test_converts_to_invalid_data() {
        let err: GraphError = ValidationError::EmptyEntityName.into();
        assert!(matches!(err, GraphError::InvalidData(_)));
        assert_eq!(err.kind(), "InvalidData");
    }
}

use std::fmt::{self, Display};

use crate::entity::Entity;

/// Provides `OrreryError` and maps other errors to
/// convert to an `OrreryError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum OrreryError {
    /// An entity id or component index outside the allocated bounds.
    OutOfRange(String),
    /// A `get` on a component the entity does not have. Absence-tolerant
    /// accessors report absence as a value instead.
    MissingComponent(String),
    /// An id/version mismatch against a recycled slot; the handle refers to
    /// an entity that no longer exists.
    StaleEntity(Entity),
    OrreryError(String),
}

impl From<String> for OrreryError {
    fn from(error: String) -> Self {
        OrreryError::OrreryError(error)
    }
}

impl From<&str> for OrreryError {
    fn from(error: &str) -> Self {
        OrreryError::OrreryError(error.to_string())
    }
}

impl std::error::Error for OrreryError {}

impl Display for OrreryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::OrreryError;

    #[test]
    fn string_conversions() {
        let from_str: OrreryError = "boom".into();
        let from_string: OrreryError = String::from("boom").into();
        assert!(matches!(from_str, OrreryError::OrreryError(ref s) if s == "boom"));
        assert!(matches!(from_string, OrreryError::OrreryError(ref s) if s == "boom"));
    }

    #[test]
    fn display_includes_variant() {
        let error = OrreryError::MissingComponent("entity 3 has no Position".to_string());
        let displayed = format!("{error}");
        assert!(displayed.contains("MissingComponent"));
        assert!(displayed.contains("Position"));
    }
}

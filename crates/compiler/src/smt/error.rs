//! Lowering and linking error types.

/// Error type for the statement representation layer.
///
/// Both kinds are compiler defects rather than user mistakes: the contextual
/// tree arrives validated, so anything malformed at this point aborts the whole
/// compilation with full internal context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtError {
    /// An invariant broken while lowering (e.g. wrong atom bound to a parameter)
    Representation(String),
    /// An address that cannot be produced while linking or rendering
    /// (e.g. a variable lacks the address kind a command requests)
    Virtualization(String),
}

impl std::fmt::Display for SmtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtError::Representation(s) => write!(f, "representation error: {}", s),
            SmtError::Virtualization(s) => write!(f, "virtualization error: {}", s),
        }
    }
}

impl std::error::Error for SmtError {}

impl From<SmtError> for String {
    fn from(e: SmtError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_kind() {
        let e = SmtError::Representation("bad atom".to_string());
        assert_eq!(e.to_string(), "representation error: bad atom");
        let e = SmtError::Virtualization("no score".to_string());
        assert_eq!(String::from(e), "virtualization error: no score");
    }
}

use thiserror::Error;

/// Failures that end a turn. Invalid or unusable model output is never an
/// error here; it flows through validation outcomes instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("{upstream} unavailable: {message}")]
    TransientUpstream { upstream: String, message: String },
    #[error("configuration failure: {0}")]
    Configuration(String),
    /// The review catalog could not be read or parsed.
    #[error("catalog failure: {0}")]
    Catalog(String),
}

impl ApplicationError {
    pub fn transient(upstream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientUpstream { upstream: upstream.into(), message: message.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUpstream { .. })
    }

    /// Stable class name used in structured logs and CLI payloads.
    pub fn class(&self) -> &'static str {
        match self {
            Self::TransientUpstream { .. } => "transient_upstream",
            Self::Configuration(_) => "configuration",
            Self::Catalog(_) => "catalog",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => {
                "The recommendation service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => {
                "Ridematch is not configured correctly. Check the configuration and try again."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::TransientUpstream { upstream, message } => Self::ServiceUnavailable {
                message: format!("{upstream}: {message}"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Configuration(message) | ApplicationError::Catalog(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, InterfaceError};

    #[test]
    fn transient_upstream_maps_to_service_unavailable() {
        let interface =
            ApplicationError::transient("completion", "request timed out").into_interface("turn-1");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable {
                ref correlation_id,
                ref message,
            } if correlation_id == "turn-1" && message == "completion: request timed out"
        ));
        assert_eq!(
            interface.user_message(),
            "The recommendation service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("llm.api_key is required".to_owned())
            .into_interface("turn-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.correlation_id(), "turn-2");
    }

    #[test]
    fn error_classes_are_stable() {
        assert_eq!(ApplicationError::transient("store", "down").class(), "transient_upstream");
        assert!(ApplicationError::transient("store", "down").is_transient());
        assert_eq!(ApplicationError::Configuration(String::new()).class(), "configuration");
        assert_eq!(ApplicationError::Catalog(String::new()).class(), "catalog");
        assert!(!ApplicationError::Catalog(String::new()).is_transient());
    }
}

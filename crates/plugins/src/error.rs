/// Registration failures. Raised only during startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin already registered: {name}")]
    DuplicateName { name: String },

    #[error("invalid plugin descriptor {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

impl RegistryError {
    #[must_use]
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    #[must_use]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a plugin action that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// An expected failure the plugin knows how to explain to the user.
    #[error("{message}")]
    Declared { message: String },

    /// The task itself cannot be processed. The delivery is rejected.
    #[error("malformed task: {reason}")]
    MalformedTask { reason: String },

    /// Anything outside the plugin's contract.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl PluginError {
    #[must_use]
    pub fn declared(message: impl Into<String>) -> Self {
        Self::Declared {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTask {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_declared(&self) -> bool {
        matches!(self, Self::Declared { .. })
    }
}

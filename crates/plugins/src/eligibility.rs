//! Plugin eligibility: required env keys against the startup snapshot.

use {serde::Serialize, switchyard_config::EnvSnapshot};

use crate::descriptor::PluginDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub missing_env: Vec<String>,
}

/// A plugin missing any required key is ineligible. It stays registered
/// (names remain reserved) but never matches.
pub fn check_eligibility(descriptor: &PluginDescriptor, env: &EnvSnapshot) -> Eligibility {
    let missing_env: Vec<String> = env
        .missing(&descriptor.required_env)
        .into_iter()
        .map(str::to_string)
        .collect();
    Eligibility {
        eligible: missing_env.is_empty(),
        missing_env,
    }
}

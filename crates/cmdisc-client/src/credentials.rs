use cmdisc_common::api::CredentialResolver;
use std::collections::HashMap;

/// Resolves password aliases from environment variables.
///
/// The alias is upper-cased, every character that is not alphanumeric is
/// replaced by `_`, and the configured prefix is prepended:
/// `cm.discovery.password` becomes `CMDISC_CM_DISCOVERY_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvCredentialResolver {
    prefix: String,
}

impl EnvCredentialResolver {
    pub fn new() -> Self {
        Self::with_prefix("CMDISC_")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, alias: &str) -> String {
        let suffix: String = alias
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvCredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve_password(&self, alias: &str) -> Option<String> {
        std::env::var(self.variable_name(alias)).ok()
    }
}

/// Fixed alias-to-password table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialResolver {
    passwords: HashMap<String, String>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, alias: impl Into<String>, password: impl Into<String>) -> Self {
        self.passwords.insert(alias.into(), password.into());
        self
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn resolve_password(&self, alias: &str) -> Option<String> {
        self.passwords.get(alias).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_variable_name() {
        let resolver = EnvCredentialResolver::new();
        assert_eq!(
            resolver.variable_name("cm.discovery.password"),
            "CMDISC_CM_DISCOVERY_PASSWORD"
        );
        assert_eq!(
            EnvCredentialResolver::with_prefix("GW_").variable_name("my-alias"),
            "GW_MY_ALIAS"
        );
    }

    #[test]
    fn test_env_resolution() {
        let resolver = EnvCredentialResolver::with_prefix("CMDISC_TEST_RESOLVER_");
        std::env::set_var("CMDISC_TEST_RESOLVER_ALIAS_ONE", "s3cret");
        assert_eq!(resolver.resolve_password("alias.one"), Some("s3cret".to_string()));
        assert_eq!(resolver.resolve_password("alias.two"), None);
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticCredentialResolver::new().with_password("a", "pw");
        assert_eq!(resolver.resolve_password("a"), Some("pw".to_string()));
        assert_eq!(resolver.resolve_password("b"), None);
    }
}

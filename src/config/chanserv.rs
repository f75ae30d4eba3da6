//! Channel service configuration.

use serde::Deserialize;

use super::defaults::{
    default_akick_reason, default_max_channels_per_account, default_max_founders, default_mlock,
};
use crate::acl::{AclLimits, AclPolicy, GlobalTemplates, Privileges, Template, apply_flag_string};

/// Channel service behaviour and limits.
///
/// Zero disables a limit.
#[derive(Debug, Clone, Deserialize)]
pub struct ChanServConfig {
    /// Maximum access records per channel.
    #[serde(default)]
    pub max_chanacs: usize,
    /// Maximum founders per channel.
    #[serde(default = "default_max_founders")]
    pub max_founders: usize,
    /// Maximum channels a single account may found.
    #[serde(default = "default_max_channels_per_account")]
    pub max_channels_per_account: usize,
    /// Kick reason used when enforcing AKICK.
    #[serde(default = "default_akick_reason")]
    pub akick_reason: String,
    /// Mode lock given to newly registered channels, e.g. `"+nt"` or `"+ntl 50"`.
    #[serde(default = "default_mlock")]
    pub default_mlock: String,
    /// Network-wide templates. Empty means the VOP/HOP/AOP/SOP built-ins.
    #[serde(default, rename = "template")]
    pub templates: Vec<TemplateConfig>,
}

/// A `[[chanserv.template]]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    /// Flag string, e.g. `"+AOortv"`.
    pub flags: String,
}

impl Default for ChanServConfig {
    fn default() -> Self {
        Self {
            max_chanacs: 0,
            max_founders: default_max_founders(),
            max_channels_per_account: default_max_channels_per_account(),
            akick_reason: default_akick_reason(),
            default_mlock: default_mlock(),
            templates: Vec::new(),
        }
    }
}

impl ChanServConfig {
    pub fn limits(&self) -> AclLimits {
        AclLimits {
            max_chanacs: self.max_chanacs,
            max_founders: self.max_founders,
            max_channels_per_account: self.max_channels_per_account,
        }
    }

    pub fn global_templates(&self, policy: &AclPolicy) -> GlobalTemplates {
        if self.templates.is_empty() {
            return GlobalTemplates::builtin(policy);
        }
        GlobalTemplates::new(
            self.templates
                .iter()
                .map(|t| Template {
                    name: t.name.clone(),
                    level: apply_flag_string(&t.flags, Privileges::empty(), policy),
                })
                .collect(),
        )
    }

    /// `default_mlock` split into the mode string and its parameters.
    pub fn default_mlock_parts(&self) -> (&str, Vec<&str>) {
        let mut words = self.default_mlock.split_whitespace();
        let modes = words.next().unwrap_or("");
        (modes, words.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_when_none_configured() {
        let config = ChanServConfig::default();
        let policy = AclPolicy::new(false, true, true);
        let globals = config.global_templates(&policy);
        let names: Vec<&str> = globals.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["VOP", "AOP", "SOP"]);
    }

    #[test]
    fn configured_templates_replace_builtins() {
        let config: ChanServConfig = toml::from_str(
            r#"
[[template]]
name = "HELPER"
flags = "+vV"

[[template]]
name = "OWNER"
flags = "*"
"#,
        )
        .unwrap();
        let policy = AclPolicy::default();
        let globals = config.global_templates(&policy);
        assert_eq!(
            globals.get("helper").map(|t| t.level),
            Some(Privileges::VOICE | Privileges::AUTOVOICE)
        );
        assert_eq!(globals.get("OWNER").map(|t| t.level), Some(policy.all_enable));
        assert!(globals.get("VOP").is_none());
    }

    #[test]
    fn default_mlock_splits_params() {
        let config = ChanServConfig {
            default_mlock: "+ntl 50".into(),
            ..ChanServConfig::default()
        };
        assert_eq!(config.default_mlock_parts(), ("+ntl", vec!["50"]));
        assert_eq!(config.limits().max_founders, 4);
    }
}

//! Named privilege templates.
//!
//! Global templates come from configuration. Channel templates live in the
//! channel's `private:templates` metadata as `NAME=+flags NAME2=+flags` and
//! shadow global ones of the same name.

use super::flags::apply_flag_string;
use super::privs::{AclPolicy, Privileges};
use crate::error::{AclError, Denial};

/// Metadata key for channel templates.
pub const TEMPLATE_METADATA_KEY: &str = "private:templates";

/// Longest metadata value we store.
pub const MAX_TEMPLATE_TEXT: usize = 300;

pub const MAX_TEMPLATE_NAME: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub level: Privileges,
}

/// Parse the metadata form. Malformed trailing text is ignored.
pub fn parse_templates(raw: &str, policy: &AclPolicy) -> Vec<Template> {
    raw.split_whitespace()
        .filter_map(|item| {
            let (name, flags) = item.split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some(Template {
                name: name.to_string(),
                level: apply_flag_string(flags, Privileges::empty(), policy),
            })
        })
        .collect()
}

pub fn render_templates(templates: &[Template]) -> String {
    templates
        .iter()
        .map(|t| format!("{}={}", t.name, t.level.to_flag_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_template_name(name: &str) -> Result<(), AclError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_TEMPLATE_NAME
        && !name.contains(['=', ' ', '+', '-', '*'])
        && name.chars().all(|c| c.is_ascii_graphic());
    if ok {
        Ok(())
    } else {
        Err(AclError::InvalidTemplate(name.to_string()))
    }
}

/// Global templates from configuration, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct GlobalTemplates {
    templates: Vec<Template>,
}

impl GlobalTemplates {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// The VOP/HOP/AOP/SOP defaults; HOP only if the network has halfops.
    pub fn builtin(policy: &AclPolicy) -> Self {
        let mut templates = vec![Template {
            name: "VOP".into(),
            level: Privileges::VOP_DEF,
        }];
        if policy.all.contains(Privileges::HALFOP) {
            templates.push(Template {
                name: "HOP".into(),
                level: Privileges::HOP_DEF,
            });
        }
        templates.push(Template {
            name: "AOP".into(),
            level: Privileges::AOP_DEF & policy.all,
        });
        templates.push(Template {
            name: "SOP".into(),
            level: Privileges::SOP_DEF & policy.all,
        });
        Self { templates }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

/// Resolve a template name to its level, channel templates first.
pub fn template_flags(
    channel_raw: Option<&str>,
    globals: &GlobalTemplates,
    name: &str,
    policy: &AclPolicy,
) -> Option<Privileges> {
    if let Some(raw) = channel_raw
        && let Some(t) = parse_templates(raw, policy)
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    {
        return Some(t.level);
    }
    globals.get(name).map(|t| t.level)
}

/// Find the template whose level is exactly `level`, channel templates first.
pub fn template_name(
    channel_raw: Option<&str>,
    globals: &GlobalTemplates,
    level: Privileges,
    policy: &AclPolicy,
) -> Option<String> {
    if let Some(raw) = channel_raw
        && let Some(t) = parse_templates(raw, policy)
            .into_iter()
            .find(|t| t.level == level)
    {
        return Some(t.name);
    }
    globals
        .iter()
        .find(|t| t.level == level)
        .map(|t| t.name.clone())
}

/// Outcome of [`change_template`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateChange {
    pub old: Privileges,
    pub new: Privileges,
    /// New metadata value; `None` when no templates remain.
    pub raw: Option<String>,
}

/// Add, alter or remove (level becomes empty) a channel template.
///
/// The same restrict rules as access records apply: the actor may only
/// touch bits inside `restrict`, and only on templates whose current level
/// is inside `restrict`.
pub fn change_template(
    channel: &str,
    channel_raw: Option<&str>,
    name: &str,
    add: Privileges,
    remove: Privileges,
    restrict: Privileges,
    policy: &AclPolicy,
) -> Result<TemplateChange, AclError> {
    validate_template_name(name)?;

    let mut templates = channel_raw
        .map(|raw| parse_templates(raw, policy))
        .unwrap_or_default();
    let pos = templates
        .iter()
        .position(|t| t.name.eq_ignore_ascii_case(name));
    let old = pos.map(|i| templates[i].level).unwrap_or_default();

    let add = add & policy.all & !old;
    let remove = if pos.is_some() {
        remove & old & !add
    } else {
        Privileges::empty()
    };

    if (add | remove).is_empty() {
        return Ok(TemplateChange {
            old,
            new: old,
            raw: channel_raw.map(str::to_string),
        });
    }

    if !(add - restrict).is_empty()
        || !(remove - restrict).is_empty()
        || !(old - restrict).is_empty()
    {
        return Err(Denial::Restricted.into());
    }

    let new = (old | add) - remove;
    match (pos, new.is_empty()) {
        (Some(i), true) => {
            templates.remove(i);
        }
        (Some(i), false) => templates[i].level = new,
        (None, _) => templates.push(Template {
            name: name.to_string(),
            level: new,
        }),
    }

    let rendered = render_templates(&templates);
    if rendered.len() >= MAX_TEMPLATE_TEXT {
        return Err(AclError::TooManyTemplates(channel.to_string()));
    }

    Ok(TemplateChange {
        old,
        new,
        raw: (!rendered.is_empty()).then_some(rendered),
    })
}

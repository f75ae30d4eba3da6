//! Channel access control.
//!
//! - [`privs`]: the privilege bitmask and network policy
//! - [`flags`]: `+oV-s` style flag strings
//! - [`template`]: named privilege sets
//! - [`record`]: access records and their storage hooks
//! - [`store`]: per-channel lists with an entity index
//! - [`engine`]: the rules, the mutation handle and read queries

mod engine;
mod event;
mod flags;
mod privs;
mod record;
mod store;
mod template;

pub use engine::{
    AccessEngine, AccessHandle, AclLimits, AclView, Actor, RECENTLY_SEEN, Realized, resolve_target,
    restrict_for,
};
pub use event::{AclObserver, ChanacsChanged};
pub use flags::{allow_flags, apply_flag_string, flag_delta_string, parse_flag_changes};
pub use privs::{AclPolicy, PRIVILEGE_TABLE, PrivilegeDef, Privileges, lookup_letter, lookup_name};
pub use record::{AccessRecord, AccessTarget, RecordError, deserialize_record, serialize_record};
pub use store::AclStore;
pub use template::{
    GlobalTemplates, MAX_TEMPLATE_NAME, MAX_TEMPLATE_TEXT, TEMPLATE_METADATA_KEY, Template, TemplateChange,
    change_template, parse_templates, render_templates, template_flags, template_name,
    validate_template_name,
};

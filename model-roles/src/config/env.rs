use std::collections::BTreeMap;

use crate::error::ModelConfigError;
use crate::role::Role;

/// Collect `{ROLE}_MODEL__{KEY}` variables from the live process environment.
///
/// Keys come back lower-cased with the prefix stripped; values are copied
/// verbatim. Variables that are not valid Unicode are skipped.
pub fn read_env_overrides(role: Role) -> BTreeMap<String, String> {
    read_overrides_from(
        role,
        std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }),
    )
}

/// Same as [`read_env_overrides`] for a role given by name.
pub fn read_env_overrides_for_name(
    role: &str,
) -> Result<BTreeMap<String, String>, ModelConfigError> {
    Ok(read_env_overrides(role.parse()?))
}

/// Select the overrides for `role` from an explicit set of variables.
pub fn read_overrides_from<I, K, V>(role: Role, vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let prefix = role.env_prefix();
    vars.into_iter()
        .filter_map(|(name, value)| {
            let key = name.as_ref().strip_prefix(prefix.as_str())?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_lowercase(), value.into()))
        })
        .collect()
}

//! Mapping from `(unique_key, param_name)` to the flat telemetry key space.

/// Parameters whose telemetry keys were renamed upstream and no longer follow
/// the `<unique_key>_<param_name>` rule. Consulted before [`derive_key`].
struct KeyOverride {
    unique_key: &'static str,
    param_name: &'static str,
    telemetry_key: &'static str,
}

const KEY_OVERRIDES: &[KeyOverride] = &[
    KeyOverride {
        unique_key: "USG_DP1_PS1_MRCZ1_PSL",
        param_name: "PSB1_PSL_COUNTER_VALUE",
        telemetry_key: "USG_DP1_PS1_PSB1_PSL_COUNTER_VALUE",
    },
    KeyOverride {
        unique_key: "USG_DP1_PS1_MRCZ1_PSL",
        param_name: "MRCZ1_PSL_COUNTER_VALUE",
        telemetry_key: "USG_DP1_PS1_MRCZ1_PSL_COUNTER_VALUE",
    },
];

fn key_override(unique_key: &str, param_name: &str) -> Option<&'static str> {
    KEY_OVERRIDES
        .iter()
        .find(|o| o.unique_key == unique_key && o.param_name == param_name)
        .map(|o| o.telemetry_key)
}

/// `<unique_key>_<param_name>` with every whitespace run replaced by `_`.
pub fn derive_key(unique_key: &str, param_name: &str) -> String {
    let mut out = String::with_capacity(unique_key.len() + param_name.len() + 1);
    let mut in_whitespace = false;
    for ch in unique_key.chars().chain(std::iter::once('_')).chain(param_name.chars()) {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}

/// Telemetry key to look up for a parameter, honouring the override table.
pub fn telemetry_key(unique_key: &str, param_name: &str) -> String {
    match key_override(unique_key, param_name) {
        Some(key) => key.to_string(),
        None => derive_key(unique_key, param_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_underscore() {
        assert_eq!(derive_key("U1", "paramA"), "U1_paramA");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(derive_key("U1", "Active  Power\tL1"), "U1_Active_Power_L1");
        assert_eq!(derive_key("U1", " KW"), "U1__KW");
    }

    #[test]
    fn override_table_wins_for_renamed_parameters() {
        assert_eq!(
            telemetry_key("USG_DP1_PS1_MRCZ1_PSL", "PSB1_PSL_COUNTER_VALUE"),
            "USG_DP1_PS1_PSB1_PSL_COUNTER_VALUE"
        );
        assert_eq!(
            telemetry_key("USG_DP1_PS1_MRCZ1_PSL", "MRCZ1_PSL_COUNTER_VALUE"),
            "USG_DP1_PS1_MRCZ1_PSL_COUNTER_VALUE"
        );
        // Other parameters of the same meter use the generic rule.
        assert_eq!(
            telemetry_key("USG_DP1_PS1_MRCZ1_PSL", "KW"),
            "USG_DP1_PS1_MRCZ1_PSL_KW"
        );
        // The override is scoped to its meter.
        assert_eq!(
            telemetry_key("U1", "PSB1_PSL_COUNTER_VALUE"),
            "U1_PSB1_PSL_COUNTER_VALUE"
        );
    }
}

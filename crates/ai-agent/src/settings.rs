use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_STEPS: usize = 100;
pub const DEFAULT_PLANNING_INTERVAL: usize = 3;
pub const DEFAULT_MAX_ACTIONS_PER_STEP: usize = 10;

/// General agent settings as persisted by the host.
///
/// Every field has a default so settings written by older builds, which lack
/// the newer flags, still deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Master switch for any in-page code execution.
    #[serde(default)]
    pub allow_code_generation: bool,
    /// Skip planning for client-side JavaScript tasks. Only takes effect when
    /// `allow_code_generation` is also set.
    #[serde(default)]
    pub fast_js_mode: bool,
    #[serde(default = "Settings::default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "Settings::default_planning_interval")]
    pub planning_interval: usize,
    #[serde(default = "Settings::default_max_actions_per_step")]
    pub max_actions_per_step: usize,
}

impl Settings {
    fn default_max_steps() -> usize {
        DEFAULT_MAX_STEPS
    }

    fn default_planning_interval() -> usize {
        DEFAULT_PLANNING_INTERVAL
    }

    fn default_max_actions_per_step() -> usize {
        DEFAULT_MAX_ACTIONS_PER_STEP
    }

    pub fn fast_js_mode_enabled(&self) -> bool {
        self.fast_js_mode && self.allow_code_generation
    }

    /// Returns a copy with `patch` applied on top.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            allow_code_generation: patch
                .allow_code_generation
                .unwrap_or(self.allow_code_generation),
            fast_js_mode: patch.fast_js_mode.unwrap_or(self.fast_js_mode),
            max_steps: patch.max_steps.unwrap_or(self.max_steps),
            planning_interval: patch.planning_interval.unwrap_or(self.planning_interval),
            max_actions_per_step: patch
                .max_actions_per_step
                .unwrap_or(self.max_actions_per_step),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_code_generation: false,
            fast_js_mode: false,
            max_steps: DEFAULT_MAX_STEPS,
            planning_interval: DEFAULT_PLANNING_INTERVAL,
            max_actions_per_step: DEFAULT_MAX_ACTIONS_PER_STEP,
        }
    }
}

/// Partial settings update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_code_generation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_js_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_interval: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_actions_per_step: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_value(json!({ "maxSteps": 12 })).unwrap();
        assert!(!settings.allow_code_generation);
        assert!(!settings.fast_js_mode);
        assert_eq!(settings.max_steps, 12);
        assert_eq!(settings.planning_interval, DEFAULT_PLANNING_INTERVAL);
    }

    #[test]
    fn fast_js_mode_requires_code_generation() {
        let mut settings = Settings {
            fast_js_mode: true,
            ..Settings::default()
        };
        assert!(!settings.fast_js_mode_enabled());
        settings.allow_code_generation = true;
        assert!(settings.fast_js_mode_enabled());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let base = Settings::default();
        let patched = base.merged(&SettingsPatch {
            fast_js_mode: Some(true),
            ..SettingsPatch::default()
        });
        assert!(patched.fast_js_mode);
        assert_eq!(patched.max_steps, base.max_steps);
        assert!(!patched.allow_code_generation);
    }
}

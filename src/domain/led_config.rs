//! The `ugreen-leds.conf` shell-style configuration file.
//!
//! Lines are kept verbatim so operator comments and ordering survive a merge.

/// Key controlling the power LED service.
pub const BLINK_TYPE_POWER: &str = "BLINK_TYPE_POWER";

/// Parsed `KEY=value` configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedConfig {
    lines: Vec<String>,
}

impl LedConfig {
    #[must_use]
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Value of `key`, with surrounding quotes removed. Last assignment wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.assignments()
            .filter(|(k, _)| *k == key)
            .last()
            .map(|(_, v)| unquote(v).to_string())
    }

    /// Keys in order of first appearance.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in self.assignments() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// The power LED service runs unless `BLINK_TYPE_POWER` is `none`.
    #[must_use]
    pub fn power_led_enabled(&self) -> bool {
        self.get(BLINK_TYPE_POWER)
            .is_none_or(|value| value != "none")
    }

    /// Append every assignment from `template` whose key is missing here.
    ///
    /// Returns the keys that were added.
    pub fn merge_missing_from(&mut self, template: &Self) -> Vec<String> {
        let existing: Vec<String> = self.keys().into_iter().map(str::to_string).collect();
        let mut added = Vec::new();
        let mut appended = Vec::new();

        for line in &template.lines {
            if let Some((key, _)) = split_assignment(line) {
                if !existing.iter().any(|k| k == key) && !added.iter().any(|k| k == key) {
                    added.push(key.to_string());
                    appended.push(line.clone());
                }
            }
        }

        if !appended.is_empty() {
            if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines
                .push("# Options added from the upstream template".to_string());
            self.lines.extend(appended);
        }

        added
    }

    /// Render back to file content with a trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    fn assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| split_assignment(line))
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    // Drop trailing inline comments on unquoted values.
    let value = value.trim();
    let value = if value.starts_with('"') || value.starts_with('\'') {
        value
    } else {
        value.split(" #").next().unwrap_or(value).trim()
    };
    Some((key, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "# LED settings\nBLINK_TYPE_POWER=\"breath 500 500\"\nCOLOR_POWER=\"255 255 255\"\nCHECK_SMART=true\n";

    #[test]
    fn test_power_led_none_disables_service() {
        let cfg = LedConfig::parse("BLINK_TYPE_POWER=none\n");
        assert!(!cfg.power_led_enabled());

        let cfg = LedConfig::parse("BLINK_TYPE_POWER=\"none\"\n");
        assert!(!cfg.power_led_enabled());
    }

    #[test]
    fn test_power_led_other_values_enable_service() {
        for value in ["\"breath 500 500\"", "on", "blink", "\"\"", "NONE", "None"] {
            let cfg = LedConfig::parse(&format!("BLINK_TYPE_POWER={value}\n"));
            assert!(cfg.power_led_enabled(), "value {value} should enable");
        }
        assert!(LedConfig::parse("# nothing set\n").power_led_enabled());
    }

    #[test]
    fn test_commented_assignment_is_ignored() {
        let cfg = LedConfig::parse("#BLINK_TYPE_POWER=none\nBLINK_TYPE_POWER=on\n");
        assert_eq!(cfg.get(BLINK_TYPE_POWER).as_deref(), Some("on"));
    }

    #[test]
    fn test_merge_keeps_operator_values() {
        let mut cfg = LedConfig::parse("BLINK_TYPE_POWER=none\n");
        let added = cfg.merge_missing_from(&LedConfig::parse(TEMPLATE));

        assert_eq!(added, vec!["COLOR_POWER", "CHECK_SMART"]);
        assert_eq!(cfg.get(BLINK_TYPE_POWER).as_deref(), Some("none"));
        assert_eq!(cfg.get("CHECK_SMART").as_deref(), Some("true"));
        assert!(cfg.render().contains("# Options added from the upstream template"));
    }

    #[test]
    fn test_merge_without_new_keys_is_noop() {
        let mut cfg = LedConfig::parse(TEMPLATE);
        let before = cfg.render();
        assert!(cfg.merge_missing_from(&LedConfig::parse(TEMPLATE)).is_empty());
        assert_eq!(cfg.render(), before);
    }

    #[test]
    fn test_inline_comment_stripped() {
        let cfg = LedConfig::parse("CHECK_SMART=false # disable smart\n");
        assert_eq!(cfg.get("CHECK_SMART").as_deref(), Some("false"));
    }
}

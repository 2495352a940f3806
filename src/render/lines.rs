//! Line builder used by all renderers.
//!
//! An artifact is an ordered list of line groups. Groups can be switched off
//! with [`LineGroup::when`]; disabled and empty groups are dropped and the
//! remaining ones are joined by a single blank line.

/// A run of consecutive lines emitted or dropped as a unit.
#[derive(Debug, Clone)]
pub struct LineGroup {
    lines: Vec<String>,
    enabled: bool,
}

impl Default for LineGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl LineGroup {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            enabled: true,
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Appends a `key = value` line.
    pub fn assign(self, key: &str, value: impl std::fmt::Display) -> Self {
        self.line(format!("{} = {}", key, value))
    }

    /// Keep the group only if `condition` holds.
    pub fn when(mut self, condition: bool) -> Self {
        self.enabled &= condition;
        self
    }

    fn is_emitted(&self) -> bool {
        self.enabled && !self.lines.is_empty()
    }
}

/// Ordered collection of line groups.
#[derive(Debug, Clone, Default)]
pub struct LineBuilder {
    groups: Vec<LineGroup>,
}

impl LineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: LineGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn build(self) -> Vec<String> {
        let mut out = Vec::new();
        for group in self.groups.into_iter().filter(LineGroup::is_emitted) {
            if !out.is_empty() {
                out.push(String::new());
            }
            out.extend(group.lines);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_joined_by_blank_line() {
        let lines = LineBuilder::new()
            .group(LineGroup::new().line("a").line("b"))
            .group(LineGroup::new().assign("key", 3))
            .build();
        assert_eq!(lines, vec!["a", "b", "", "key = 3"]);
    }

    #[test]
    fn test_disabled_and_empty_groups_are_dropped() {
        let lines = LineBuilder::new()
            .group(LineGroup::new().line("first"))
            .group(LineGroup::new().line("hidden").when(false))
            .group(LineGroup::new())
            .group(LineGroup::new().lines(["x", "y"]))
            .build();
        assert_eq!(lines, vec!["first", "", "x", "y"]);
    }

    #[test]
    fn test_when_is_sticky() {
        let lines = LineBuilder::new()
            .group(LineGroup::new().line("z").when(false).when(true))
            .build();
        assert!(lines.is_empty());
    }
}

//! Reconciliation configuration.

// =============================================================================
// Strategy
// =============================================================================

/// How a [`Root`](crate::root::Root) brings the live tree up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Single pass against the live tree, tolerating foreign nodes.
    #[default]
    Morph,
    /// Diff the previous and next virtual trees, then apply the patches.
    DiffPatch,
}

// =============================================================================
// Config
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub strategy: Strategy,
    /// When set, each pass runs in a span with this name and logs how long
    /// it took.
    pub time_label: Option<String>,
    /// Morph only: take over the mount node's existing children instead of
    /// rendering next to them. Children are virtualized and recorded before
    /// the first pass.
    pub adopt_existing: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn time_label(mut self, label: impl Into<String>) -> Self {
        self.time_label = Some(label.into());
        self
    }

    pub fn adopt_existing(mut self, adopt: bool) -> Self {
        self.adopt_existing = adopt;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.strategy, Strategy::Morph);
        assert!(config.time_label.is_none());
        assert!(!config.adopt_existing);
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .strategy(Strategy::DiffPatch)
            .time_label("view")
            .adopt_existing(true);
        assert_eq!(config.strategy, Strategy::DiffPatch);
        assert_eq!(config.time_label.as_deref(), Some("view"));
        assert!(config.adopt_existing);
    }
}

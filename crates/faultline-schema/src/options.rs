//! Typed per-test ticket options and their precedence rules.
//!
//! Options can be registered at three levels: global (from configuration),
//! suite (the class-level equivalent) and test. Resolution walks from the most
//! specific level outward.

use faultline_ids::TestIdentity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Priority used when no level sets one.
pub const FALLBACK_PRIORITY: &str = "Medium";

/// Ticket options for one level. `None` means "not set at this level".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TicketOptions {
    pub create_on_failure: Option<bool>,
    pub priority: Option<String>,
    pub labels: Option<Vec<String>>,
    pub components: Option<Vec<String>>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    /// Set when ticket creation is explicitly skipped, with a free-text reason.
    pub skip_reason: Option<String>,
    /// Test-management key of the test (e.g. `QA-17`), if it has one.
    pub test_key: Option<String>,
}

impl TicketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that suppress ticket creation for a test.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            create_on_failure: Some(false),
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = Some(components.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_custom_field(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_fields.insert(field.into(), value);
        self
    }

    pub fn with_create_on_failure(mut self, create: bool) -> Self {
        self.create_on_failure = Some(create);
        self
    }

    pub fn with_test_key(mut self, key: impl Into<String>) -> Self {
        self.test_key = Some(key.into());
        self
    }

    /// Layer `self` over `base`: values set on `self` win.
    ///
    /// Custom fields merge per key.
    pub fn over(&self, base: &TicketOptions) -> TicketOptions {
        let mut custom_fields = base.custom_fields.clone();
        for (k, v) in &self.custom_fields {
            custom_fields.insert(k.clone(), v.clone());
        }
        TicketOptions {
            create_on_failure: self.create_on_failure.or(base.create_on_failure),
            priority: self.priority.clone().or_else(|| base.priority.clone()),
            labels: self.labels.clone().or_else(|| base.labels.clone()),
            components: self.components.clone().or_else(|| base.components.clone()),
            custom_fields,
            skip_reason: self.skip_reason.clone().or_else(|| base.skip_reason.clone()),
            test_key: self.test_key.clone().or_else(|| base.test_key.clone()),
        }
    }
}

/// Fully resolved options for one test.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResolvedOptions {
    pub create_on_failure: bool,
    pub priority: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    pub skip_reason: Option<String>,
    pub test_key: Option<String>,
}

impl ResolvedOptions {
    /// Whether the failure chain should run for this test.
    pub fn wants_ticket(&self) -> bool {
        self.create_on_failure && self.skip_reason.is_none()
    }
}

impl From<TicketOptions> for ResolvedOptions {
    fn from(o: TicketOptions) -> Self {
        Self {
            create_on_failure: o.create_on_failure.unwrap_or(true),
            priority: o.priority.unwrap_or_else(|| FALLBACK_PRIORITY.to_string()),
            labels: o.labels.unwrap_or_default(),
            components: o.components.unwrap_or_default(),
            custom_fields: o.custom_fields,
            skip_reason: o.skip_reason,
            test_key: o.test_key,
        }
    }
}

/// Explicit registration table for per-test and per-suite options.
#[derive(Clone, Debug, Default)]
pub struct TicketOptionsRegistry {
    suites: HashMap<String, TicketOptions>,
    tests: HashMap<TestIdentity, TicketOptions>,
}

impl TicketOptionsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register class-level options for every test in `suite`.
    pub fn register_suite(&mut self, suite: impl Into<String>, options: TicketOptions) -> &mut Self {
        self.suites.insert(suite.into(), options);
        self
    }

    /// Register options for a single test.
    pub fn register_test(&mut self, identity: TestIdentity, options: TicketOptions) -> &mut Self {
        self.tests.insert(identity, options);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty() && self.tests.is_empty()
    }

    /// Resolve with precedence test > suite > global.
    ///
    /// Parametrized tests fall back to options registered for the
    /// unparametrized identity.
    pub fn resolve(&self, identity: &TestIdentity, global: &TicketOptions) -> ResolvedOptions {
        let suite_level = self.suites.get(&identity.suite);
        let test_level = self.tests.get(identity).or_else(|| {
            if identity.params.is_empty() {
                None
            } else {
                self.tests
                    .get(&TestIdentity::new(identity.suite.clone(), identity.name.clone()))
            }
        });

        let mut merged = global.clone();
        if let Some(s) = suite_level {
            merged = s.over(&merged);
        }
        if let Some(t) = test_level {
            merged = t.over(&merged);
        }
        merged.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn login() -> TestIdentity {
        TestIdentity::new("tests/auth.rs", "test_login")
    }

    #[test]
    fn defaults_when_nothing_registered() {
        let r = TicketOptionsRegistry::new().resolve(&login(), &TicketOptions::new());
        assert!(r.create_on_failure);
        assert_eq!(r.priority, FALLBACK_PRIORITY);
        assert!(r.labels.is_empty());
        assert!(r.wants_ticket());
    }

    #[test]
    fn test_level_beats_suite_beats_global() {
        let global = TicketOptions::new()
            .with_priority("Low")
            .with_labels(["global"])
            .with_components(["core"]);
        let mut reg = TicketOptionsRegistry::new();
        reg.register_suite(
            "tests/auth.rs",
            TicketOptions::new().with_priority("High").with_labels(["api-tests"]),
        );
        reg.register_test(login(), TicketOptions::new().with_priority("Highest"));

        let r = reg.resolve(&login(), &global);
        assert_eq!(r.priority, "Highest");
        assert_eq!(r.labels, vec!["api-tests"]);
        assert_eq!(r.components, vec!["core"]);

        let other = TestIdentity::new("tests/auth.rs", "test_logout");
        assert_eq!(reg.resolve(&other, &global).priority, "High");

        let elsewhere = TestIdentity::new("tests/cart.rs", "test_add");
        assert_eq!(reg.resolve(&elsewhere, &global).priority, "Low");
    }

    #[test]
    fn custom_fields_merge_per_key() {
        let global = TicketOptions::new()
            .with_custom_field("customfield_1", json!("g"))
            .with_custom_field("customfield_2", json!("g"));
        let mut reg = TicketOptionsRegistry::new();
        reg.register_suite(
            "tests/auth.rs",
            TicketOptions::new().with_custom_field("customfield_2", json!("suite")),
        );
        reg.register_test(
            login(),
            TicketOptions::new().with_custom_field("customfield_3", json!({"value": "t"})),
        );
        let r = reg.resolve(&login(), &global);
        assert_eq!(r.custom_fields["customfield_1"], json!("g"));
        assert_eq!(r.custom_fields["customfield_2"], json!("suite"));
        assert_eq!(r.custom_fields["customfield_3"], json!({"value": "t"}));
    }

    #[test]
    fn skip_flag_disables_ticket() {
        let mut reg = TicketOptionsRegistry::new();
        reg.register_test(login(), TicketOptions::skip("Known flaky test"));
        let r = reg.resolve(&login(), &TicketOptions::new());
        assert!(!r.wants_ticket());
        assert_eq!(r.skip_reason.as_deref(), Some("Known flaky test"));
    }

    #[test]
    fn test_level_can_reenable_suite_opt_out() {
        let mut reg = TicketOptionsRegistry::new();
        reg.register_suite("tests/auth.rs", TicketOptions::new().with_create_on_failure(false));
        reg.register_test(login(), TicketOptions::new().with_create_on_failure(true));
        assert!(reg.resolve(&login(), &TicketOptions::new()).wants_ticket());
    }

    #[test]
    fn parametrized_tests_inherit_base_registration() {
        let mut reg = TicketOptionsRegistry::new();
        reg.register_test(login(), TicketOptions::new().with_test_key("QA-7"));
        let param = login().with_params("admin");
        let r = reg.resolve(&param, &TicketOptions::new());
        assert_eq!(r.test_key.as_deref(), Some("QA-7"));
    }

    proptest! {
        #[test]
        fn prop_most_specific_priority_wins(
            g in proptest::option::of("[A-Z][a-z]{2,6}"),
            s in proptest::option::of("[A-Z][a-z]{2,6}"),
            t in proptest::option::of("[A-Z][a-z]{2,6}"),
        ) {
            let global = TicketOptions { priority: g.clone(), ..TicketOptions::default() };
            let mut reg = TicketOptionsRegistry::new();
            reg.register_suite("tests/auth.rs", TicketOptions { priority: s.clone(), ..TicketOptions::default() });
            reg.register_test(login(), TicketOptions { priority: t.clone(), ..TicketOptions::default() });
            let expected = t.or(s).or(g).unwrap_or_else(|| FALLBACK_PRIORITY.to_string());
            prop_assert_eq!(reg.resolve(&login(), &global).priority, expected);
        }
    }
}

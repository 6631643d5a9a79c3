//! Path heuristics that derive categorical tags from fixture paths.
//!
//! Classification never fails: a path that matches nothing yields `None`
//! (or [`TestType::Unknown`]) and the tag falls back to
//! [`UNKNOWN`](crate::model::UNKNOWN).

use regex::Regex;

use crate::config::ClassifyConfig;
use crate::model::{TestType, UNKNOWN};

/// Derives the application and test type of a fixture from its path.
///
/// Any `Fn(&str) -> Option<String>` is a classifier whose test type comes
/// from [`TestType::from_path`].
pub trait Classifier: Send + Sync {
    /// Application the fixture belongs to, if it can be told from the path.
    fn application(&self, path: &str) -> Option<String>;

    /// Test type of the fixture.
    fn test_type(&self, path: &str) -> TestType {
        TestType::from_path(path)
    }
}

impl<F> Classifier for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn application(&self, path: &str) -> Option<String> {
        self(path)
    }
}

struct ApplicationRule {
    pattern: Regex,
    name: String,
}

/// Rule-based classifier.
///
/// Application rules are tried in order and the first match wins. When no
/// rule matches, the configured project name (typically the CI project) is
/// used.
///
/// # Example
///
/// ```
/// use testflux::classify::{Classifier, PathClassifier};
///
/// let classifier = PathClassifier::new()
///     .with_rule("apps/shop/", "SHOP")?
///     .with_project_name("storefront");
///
/// assert_eq!(classifier.application("apps/shop/login.ts").as_deref(), Some("SHOP"));
/// assert_eq!(classifier.application("apps/admin/x.ts").as_deref(), Some("storefront"));
/// # Ok::<(), regex::Error>(())
/// ```
#[derive(Default)]
pub struct PathClassifier {
    rules: Vec<ApplicationRule>,
    project_name: Option<String>,
}

impl PathClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a classifier from the `[classify]` config section.
    pub fn from_config(config: &ClassifyConfig) -> Result<Self, regex::Error> {
        let mut classifier = Self::new();
        for rule in &config.applications {
            classifier = classifier.with_rule(&rule.pattern, &rule.name)?;
        }
        if let Some(name) = &config.project_name {
            classifier = classifier.with_project_name(name);
        }
        Ok(classifier)
    }

    /// Append an application rule.
    pub fn with_rule(mut self, pattern: &str, name: impl Into<String>) -> Result<Self, regex::Error> {
        self.rules.push(ApplicationRule {
            pattern: Regex::new(pattern)?,
            name: name.into(),
        });
        Ok(self)
    }

    /// Set the fallback application name. Blank or `UNK` names are ignored.
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() && name != UNKNOWN {
            self.project_name = Some(name);
        }
        self
    }
}

impl Classifier for PathClassifier {
    fn application(&self, path: &str) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(path))
            .map(|rule| rule.name.clone())
            .or_else(|| self.project_name.clone())
    }
}

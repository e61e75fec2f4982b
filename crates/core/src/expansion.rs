//! Heuristic query expansion.
//!
//! A question is widened into at most [`MAX_QUERIES`] lookups: the original text first, then
//! the reformulations of whichever rules fire, in rule order. Rules are independent; the cap
//! decides which of them survive.

pub const MAX_QUERIES: usize = 3;

/// One intent detector and the reformulations it contributes.
pub trait ExpansionRule: Send + Sync {
    fn name(&self) -> &str;

    /// `lowered` is the lowercased question; `existing` holds the queries gathered so far.
    fn expand(&self, query: &str, lowered: &str, existing: &[String]) -> Vec<String>;
}

fn contains_any(lowered: &str, triggers: &[&str]) -> bool {
    triggers.iter().any(|trigger| lowered.contains(trigger))
}

/// Appends fixed reformulations when any trigger substring is present.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub name: &'static str,
    pub triggers: &'static [&'static str],
    pub reformulations: &'static [&'static str],
}

impl ExpansionRule for KeywordRule {
    fn name(&self) -> &str {
        self.name
    }

    fn expand(&self, _query: &str, lowered: &str, _existing: &[String]) -> Vec<String> {
        if !contains_any(lowered, self.triggers) {
            return Vec::new();
        }
        self.reformulations.iter().map(|r| (*r).to_string()).collect()
    }
}

/// Strips conversational prefixes ("show me", "what is") to surface the bare topic.
#[derive(Debug, Clone)]
pub struct FocusRule {
    pub triggers: &'static [&'static str],
    pub phrases: &'static [&'static str],
}

impl ExpansionRule for FocusRule {
    fn name(&self) -> &str {
        "focus"
    }

    fn expand(&self, _query: &str, lowered: &str, existing: &[String]) -> Vec<String> {
        if !contains_any(lowered, self.triggers) {
            return Vec::new();
        }

        let mut focused: Vec<String> = Vec::new();
        for phrase in self.phrases.iter().filter(|phrase| lowered.contains(**phrase)) {
            let candidate = lowered.replace(*phrase, "").trim().to_string();
            let seen = existing
                .iter()
                .chain(focused.iter())
                .any(|query| query.to_lowercase() == candidate);
            if !candidate.is_empty() && !seen {
                focused.push(candidate);
            }
        }
        focused
    }
}

/// Specializes deployment questions by the first cloud provider mentioned.
#[derive(Debug, Clone)]
pub struct DeploymentRule {
    pub trigger: &'static str,
    pub providers: &'static [(&'static [&'static str], &'static str)],
    pub fallback: &'static str,
}

impl ExpansionRule for DeploymentRule {
    fn name(&self) -> &str {
        "deployment"
    }

    fn expand(&self, _query: &str, lowered: &str, _existing: &[String]) -> Vec<String> {
        if !lowered.contains(self.trigger) {
            return Vec::new();
        }

        let reformulation = self
            .providers
            .iter()
            .find(|(names, _)| contains_any(lowered, names))
            .map_or(self.fallback, |(_, reformulation)| *reformulation);
        vec![reformulation.to_string()]
    }
}

pub struct QueryExpander {
    rules: Vec<Box<dyn ExpansionRule>>,
    max_queries: usize,
}

impl QueryExpander {
    pub fn new(rules: Vec<Box<dyn ExpansionRule>>) -> Self {
        Self {
            rules,
            max_queries: MAX_QUERIES,
        }
    }

    pub fn with_rule(mut self, rule: impl ExpansionRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Returns the original query followed by up to two reformulations.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut queries = vec![query.to_string()];

        for rule in &self.rules {
            if queries.len() >= self.max_queries {
                break;
            }
            let additions = rule.expand(query, &lowered, &queries);
            queries.extend(additions);
        }

        queries.truncate(self.max_queries);
        queries
    }
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new(vec![
            Box::new(KeywordRule {
                name: "value-proposition",
                triggers: &["why", "should i use", "benefits", "advantages"],
                reformulations: &[
                    "why choose nebari benefits features advantages",
                    "gitops collaboration dask open source platform",
                ],
            }),
            Box::new(FocusRule {
                triggers: &["show", "see", "view", "display", "what"],
                phrases: &[
                    "show me",
                    "let me see",
                    "can you show",
                    "i want to see",
                    "what is",
                    "what are",
                ],
            }),
            Box::new(KeywordRule {
                name: "architecture",
                triggers: &["architecture"],
                reformulations: &[
                    "architecture diagram infrastructure",
                    "system design components",
                ],
            }),
            Box::new(DeploymentRule {
                trigger: "deploy",
                providers: &[
                    (&["aws"], "AWS deployment configuration terraform"),
                    (&["gcp", "google"], "GCP deployment google cloud"),
                    (&["azure"], "Azure deployment configuration"),
                ],
                fallback: "cloud deployment steps",
            }),
            Box::new(KeywordRule {
                name: "installation",
                triggers: &["install", "setup"],
                reformulations: &["installation requirements setup"],
            }),
            Box::new(KeywordRule {
                name: "authentication",
                triggers: &["auth", "login", "keycloak"],
                reformulations: &["authentication keycloak configuration"],
            }),
        ])
    }
}

pub fn expand_query(query: &str) -> Vec<String> {
    QueryExpander::default().expand(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_query_always_comes_first() {
        for query in ["", "hello", "Why should I use Nebari?", "show me the architecture"] {
            let expanded = expand_query(query);
            assert!(!expanded.is_empty() && expanded.len() <= MAX_QUERIES);
            assert_eq!(expanded[0], query);
        }
    }

    #[test]
    fn unmatched_query_is_not_expanded() {
        assert_eq!(expand_query("conda-store environments"), vec!["conda-store environments"]);
    }

    #[test]
    fn deployment_is_specialized_by_provider() {
        assert_eq!(
            expand_query("How do I deploy Nebari on AWS?"),
            vec!["How do I deploy Nebari on AWS?", "AWS deployment configuration terraform"]
        );
        assert_eq!(expand_query("deploy to Google cloud")[1], "GCP deployment google cloud");
        assert_eq!(expand_query("deploy on azure")[1], "Azure deployment configuration");
        assert_eq!(expand_query("deploy it")[1], "cloud deployment steps");
    }

    #[test]
    fn value_questions_fill_the_cap() {
        let expanded = expand_query("Why should I deploy Nebari on AWS?");
        assert_eq!(
            expanded,
            vec![
                "Why should I deploy Nebari on AWS?",
                "why choose nebari benefits features advantages",
                "gitops collaboration dask open source platform",
            ]
        );
    }

    #[test]
    fn focus_rule_strips_prefix() {
        assert_eq!(
            expand_query("Show me the architecture"),
            vec![
                "Show me the architecture",
                "the architecture",
                "architecture diagram infrastructure",
            ]
        );
    }

    #[test]
    fn focus_rule_skips_duplicates_and_empty_topics() {
        assert_eq!(expand_query("what is"), vec!["what is"]);
    }

    #[test]
    fn later_rules_are_kept_when_earlier_ones_are_silent() {
        assert_eq!(
            expand_query("install and login"),
            vec![
                "install and login",
                "installation requirements setup",
                "authentication keycloak configuration",
            ]
        );
    }

    #[test]
    fn custom_rules_extend_the_table() {
        let expander = QueryExpander::new(Vec::new()).with_rule(KeywordRule {
            name: "monitoring",
            triggers: &["grafana"],
            reformulations: &["monitoring dashboards grafana"],
        });
        assert_eq!(expander.rule_names(), vec!["monitoring"]);
        assert_eq!(
            expander.expand("Grafana setup"),
            vec!["Grafana setup", "monitoring dashboards grafana"]
        );
    }
}

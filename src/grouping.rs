//! Rule-based tool grouping.
//!
//! Rules are an ordered list loaded from TOML (`rules/groups.toml` by
//! default). The first rule whose predicate matches a tool decides its
//! group; tools no rule claims land in the default group.

use crate::registry::ToolRecord;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const DEFAULT_RULES: &str = include_str!("../rules/groups.toml");

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("failed to parse grouping rules: {0}")]
    Parse(String),
    #[error("rule {rule} ({group}) has an invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        rule: usize,
        group: String,
        pattern: String,
        reason: String,
    },
    #[error("rule {rule} ({group}) has no usable patterns")]
    EmptyRule { rule: usize, group: String },
    #[error("rule {rule} has an empty group label")]
    EmptyGroup { rule: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Substring,
    Prefix,
    Regex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Description,
    #[default]
    Any,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    group: String,
    #[serde(rename = "match", default)]
    kind: MatchKind,
    #[serde(default)]
    field: Field,
    patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default = "default_group_label")]
    default_group: String,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleEntry>,
}

fn default_group_label() -> String {
    "other".to_string()
}

#[derive(Debug, Clone)]
enum Matcher {
    Substring(Vec<String>),
    Prefix(Vec<String>),
    Regex(Vec<Regex>),
}

impl Matcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Substring(needles) => needles.iter().any(|needle| text.contains(needle)),
            Matcher::Prefix(prefixes) => prefixes.iter().any(|prefix| text.starts_with(prefix)),
            Matcher::Regex(patterns) => patterns.iter().any(|pattern| pattern.is_match(text)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub group: String,
    pub field: Field,
    matcher: Matcher,
}

impl Rule {
    fn matches(&self, name: &str, description: &str) -> bool {
        match self.field {
            Field::Name => self.matcher.matches(name),
            Field::Description => self.matcher.matches(description),
            Field::Any => match self.matcher {
                Matcher::Substring(_) => self.matcher.matches(&format!("{name} {description}")),
                _ => self.matcher.matches(name) || self.matcher.matches(description),
            },
        }
    }
}

/// Compiled, ordered grouping rules.
#[derive(Debug, Clone)]
pub struct GroupRules {
    default_group: String,
    rules: Vec<Rule>,
}

impl GroupRules {
    pub fn builtin() -> Result<Self, RuleError> {
        Self::parse(DEFAULT_RULES)
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let content = fs::read_to_string(path)
            .map_err(|err| RuleError::Parse(format!("{}: {err}", path.display())))?;
        Self::parse(&content)
    }

    /// Parse and compile every rule; any malformed rule fails the whole set.
    pub fn parse(content: &str) -> Result<Self, RuleError> {
        let file: RuleFile =
            toml::from_str(content).map_err(|err| RuleError::Parse(err.to_string()))?;
        if file.default_group.trim().is_empty() {
            return Err(RuleError::Parse("default_group must not be empty".into()));
        }

        let mut rules = Vec::with_capacity(file.rules.len());
        for (index, entry) in file.rules.into_iter().enumerate() {
            rules.push(compile(index, entry)?);
        }

        Ok(Self {
            default_group: file.default_group,
            rules,
        })
    }

    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    /// Every label a tool can be assigned to.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .map(|rule| rule.group.as_str())
            .chain(std::iter::once(self.default_group.as_str()))
            .collect()
    }

    /// Index and label of the first matching rule.
    pub fn classify(&self, name: &str, description: &str) -> (Option<usize>, &str) {
        let name = name.to_lowercase();
        let description = description.to_lowercase();
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(&name, &description))
            .map(|(index, rule)| (Some(index), rule.group.as_str()))
            .unwrap_or((None, self.default_group.as_str()))
    }

    pub fn assign(&self, records: &[ToolRecord]) -> GroupAssignment {
        let entries = records
            .iter()
            .map(|record| {
                let (rule, group) = self.classify(&record.name, &record.description);
                (
                    record.tool_id.clone(),
                    GroupEntry {
                        group: group.to_string(),
                        rule,
                    },
                )
            })
            .collect();
        GroupAssignment {
            default_group: self.default_group.clone(),
            entries,
        }
    }
}

fn compile(index: usize, entry: RuleEntry) -> Result<Rule, RuleError> {
    if entry.group.trim().is_empty() {
        return Err(RuleError::EmptyGroup { rule: index });
    }
    let patterns: Vec<String> = entry
        .patterns
        .iter()
        .map(|pattern| pattern.trim())
        .filter(|pattern| !pattern.is_empty())
        .map(str::to_string)
        .collect();
    if patterns.is_empty() || patterns.len() != entry.patterns.len() {
        return Err(RuleError::EmptyRule {
            rule: index,
            group: entry.group,
        });
    }

    let matcher = match entry.kind {
        MatchKind::Substring => {
            Matcher::Substring(patterns.iter().map(|p| p.to_lowercase()).collect())
        }
        MatchKind::Prefix => Matcher::Prefix(patterns.iter().map(|p| p.to_lowercase()).collect()),
        MatchKind::Regex => {
            let mut compiled = Vec::with_capacity(patterns.len());
            for pattern in &patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| RuleError::InvalidPattern {
                        rule: index,
                        group: entry.group.clone(),
                        pattern: pattern.clone(),
                        reason: err.to_string(),
                    })?;
                compiled.push(regex);
            }
            Matcher::Regex(compiled)
        }
    };

    Ok(Rule {
        group: entry.group,
        field: entry.field,
        matcher,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEntry {
    pub group: String,
    /// Index of the rule that matched; `None` for the default group.
    pub rule: Option<usize>,
}

/// Total mapping from `tool_id` to group label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupAssignment {
    default_group: String,
    entries: BTreeMap<String, GroupEntry>,
}

impl GroupAssignment {
    pub fn group_of(&self, tool_id: &str) -> &str {
        self.entries
            .get(tool_id)
            .map(|entry| entry.group.as_str())
            .unwrap_or(self.default_group.as_str())
    }

    pub fn entry(&self, tool_id: &str) -> Option<&GroupEntry> {
        self.entries.get(tool_id)
    }

    /// Number of tools with an assignment.
    pub fn assigned_count(&self) -> usize {
        self.entries.len()
    }

    /// Tool count per group label.
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.group.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

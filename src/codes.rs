//! Identifier generation: project codes, change ids, and session handles.

use crate::types::ChangeKind;
use heck::ToShoutyKebabCase;
use std::collections::{HashMap, HashSet};

/// Fallback initials when a project name has no usable words.
const FALLBACK_INITIALS: &str = "PRJ";

/// Derive initials from the first three words of a project name.
///
/// "Grid Modernization Program" -> "GMP".
pub fn project_initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(3)
        .flat_map(char::to_uppercase)
        .collect();

    if initials.is_empty() {
        FALLBACK_INITIALS.to_string()
    } else {
        initials
    }
}

/// Assigns project codes for one export in document order.
///
/// Supplied codes are used verbatim. Derived codes are `<INITIALS>-P<n>`,
/// where `n` starts at 1 and increases while the code is taken or reserved.
#[derive(Debug, Default)]
pub struct ProjectCodes {
    used: HashSet<String>,
    supplied: HashSet<String>,
    /// Supplied codes seen up front; derivation never hands these out.
    reserved: HashSet<String>,
}

/// Outcome of assigning a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeAssignment {
    Assigned(String),
    /// The supplied code was already supplied by, or derived for, an earlier
    /// project.
    DuplicateSupplied(String),
}

impl ProjectCodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with every supplied code of the export reserved, so a derived
    /// code for an earlier project never takes one a later project supplies.
    pub fn reserving<'a>(supplied: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let reserved = supplied
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            reserved,
            ..Self::default()
        }
    }

    pub fn assign(&mut self, supplied: Option<&str>, name: &str) -> CodeAssignment {
        if let Some(code) = supplied.map(str::trim).filter(|c| !c.is_empty()) {
            if !self.supplied.insert(code.to_string()) || !self.used.insert(code.to_string()) {
                return CodeAssignment::DuplicateSupplied(code.to_string());
            }
            return CodeAssignment::Assigned(code.to_string());
        }

        let initials = project_initials(name);
        let mut n = 1;
        loop {
            let candidate = format!("{}-P{}", initials, n);
            if !self.reserved.contains(&candidate) && self.used.insert(candidate.clone()) {
                return CodeAssignment::Assigned(candidate);
            }
            n += 1;
        }
    }
}

/// Allocates session-unique change ids of the form
/// `CHG-<project>-<MILESTONE-SLUG>-<KIND>`.
#[derive(Debug, Default)]
pub struct ChangeIds {
    issued: HashMap<String, usize>,
}

impl ChangeIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, project_code: &str, milestone: &str, kind: ChangeKind) -> String {
        let mut slug = milestone.to_shouty_kebab_case();
        if slug.is_empty() {
            slug = "MILESTONE".to_string();
        }
        let base = format!("CHG-{}-{}-{}", project_code, slug, kind.as_str().replace('_', "-"));
        let count = self.issued.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}-{}", base, count)
        }
    }
}

/// Generate a human-friendly session handle such as `brave-otter`.
pub fn session_handle(words: u8) -> String {
    use petname::{Generator, Petnames};

    Petnames::medium()
        .generate_one(words, "-")
        .unwrap_or_else(|| format!("session-{}", chrono::Utc::now().timestamp_millis()))
}

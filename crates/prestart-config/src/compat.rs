use console::style;
use semver::{Version, VersionReq};
use tracing::warn;

/// Outcome of comparing the running version against a supported range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    pub compatible: bool,
    /// Running version with any leading non-numeric prefix removed.
    pub running: String,
    pub required: String,
}

impl Compatibility {
    /// The advisory lines logged when the versions are incompatible.
    pub fn warning_lines(&self) -> [String; 2] {
        [
            "Your runtime version is too outdated for this application. Please update your runtime."
                .to_string(),
            format!(
                "Recommended {}, {} provided",
                style(&self.required).green(),
                style(&self.running).yellow()
            ),
        ]
    }
}

/// Check `running_version` against an npm-style `required_range`.
///
/// Advisory only: an incompatible or unparsable version logs two warnings
/// and returns `compatible = false`. Never fails.
pub fn check(running_version: &str, required_range: &str) -> Compatibility {
    let running = running_version
        .trim()
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .to_string();
    let result = Compatibility {
        compatible: satisfies(&running, required_range),
        running,
        required: required_range.to_string(),
    };

    if !result.compatible {
        for line in result.warning_lines() {
            warn!("{line}");
        }
    }
    result
}

fn satisfies(version: &str, range: &str) -> bool {
    let Some(version) = parse_version(version) else {
        return false;
    };
    range.split("||").any(|alternative| {
        VersionReq::parse(&translate_range(alternative)).is_ok_and(|req| req.matches(&version))
    })
}

/// Pad `20` or `20.1` to a full `major.minor.patch` before parsing.
fn parse_version(version: &str) -> Option<Version> {
    let split_at = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(split_at);
    let mut core = core.to_string();
    for _ in core.matches('.').count()..2 {
        core.push_str(".0");
    }
    Version::parse(&format!("{core}{suffix}")).ok()
}

/// Translate one npm range alternative into `semver::VersionReq` syntax:
/// hyphen ranges become a `>=`/`<=` pair and whitespace-separated
/// comparators become comma-separated ones.
fn translate_range(range: &str) -> String {
    let range = range.trim();
    if range.is_empty() {
        return "*".to_string();
    }
    if let Some((low, high)) = range.split_once(" - ") {
        return format!(">={}, <={}", low.trim(), high.trim());
    }

    let mut comparators = Vec::new();
    let mut operator = String::new();
    for token in range.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            operator.push_str(token);
        } else {
            comparators.push(format!("{operator}{token}"));
            operator.clear();
        }
    }
    comparators.join(", ")
}

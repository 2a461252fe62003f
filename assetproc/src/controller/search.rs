//! Search terms and path matching for compile-group and escalation requests.
//!
//! Callers that don't know a source UUID identify assets by a path-ish search
//! term. Terms arrive in many shapes (`@products@/textures/Rock.dds`,
//! `textures\rock.png`, `/textures/rock`) so they are normalised first and
//! then matched against job source paths, case-insensitively, in widening
//! tiers:
//!
//! 1. the source path ends with the term (on a path boundary)
//! 2. both compared without their file extension
//! 3. the term stem with its trailing `_suffix` removed
//!
//! The first tier that matches anything wins. [`SearchMode::Exact`] only
//! accepts a full case-insensitive path match.

use std::collections::HashSet;

use super::job::{JobKey, JobRunKey};

// =============================================================================
// Search Mode
// =============================================================================

/// How a path search term is matched against job sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Heuristic suffix matching with widening tiers.
    #[default]
    Default,

    /// Case-insensitive equality of the whole path.
    Exact,
}

/// Match tiers of the default mode, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchTier {
    Suffix,
    WithoutExtension,
    WithoutStemSuffix,
}

impl MatchTier {
    pub(crate) const ALL: [MatchTier; 3] = [
        MatchTier::Suffix,
        MatchTier::WithoutExtension,
        MatchTier::WithoutStemSuffix,
    ];
}

// =============================================================================
// Search Results
// =============================================================================

/// Outcome of a search: the matched job keys plus the escalations to apply.
///
/// A search is never a pure read. Every match produces an escalation entry so
/// that the matched work moves to the front of the queue.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Keys of the matched pending or processing jobs.
    pub found: HashSet<JobKey>,

    /// Run key and escalation value for every matched job.
    pub escalations: Vec<(JobRunKey, i32)>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub(crate) fn push(&mut self, key: JobKey, run_key: JobRunKey, escalation: i32) {
        self.found.insert(key);
        self.escalations.push((run_key, escalation));
    }
}

// =============================================================================
// Normalisation
// =============================================================================

/// Normalises a search term.
///
/// Backslashes become forward slashes, a leading `@alias@` is dropped and
/// leading slashes are trimmed.
///
/// ```
/// use assetproc::controller::normalize_search_term;
///
/// assert_eq!(normalize_search_term("@products@\\textures\\rock.dds"), "textures/rock.dds");
/// assert_eq!(normalize_search_term("/levels/main.lvl"), "levels/main.lvl");
/// ```
pub fn normalize_search_term(term: &str) -> String {
    let mut normalized = term.trim().replace('\\', "/");

    if let Some(rest) = normalized.strip_prefix('@') {
        if let Some(end) = rest.find('@') {
            normalized = rest[end + 1..].to_string();
        }
    }

    normalized.trim_start_matches('/').to_string()
}

// =============================================================================
// Matching
// =============================================================================

/// Whether `source` matches an already normalised and lower-cased `term`
/// under `mode`. For [`SearchMode::Default`] this checks a single tier.
pub(crate) fn matches(source: &str, term: &str, mode: SearchMode, tier: MatchTier) -> bool {
    if term.is_empty() {
        return false;
    }

    let source = source.replace('\\', "/").to_lowercase();
    let source = source.trim_start_matches('/');

    match mode {
        SearchMode::Exact => source == term,
        SearchMode::Default => match tier {
            MatchTier::Suffix => ends_with_path(source, term),
            MatchTier::WithoutExtension => {
                ends_with_path(strip_extension(source), strip_extension(term))
            }
            MatchTier::WithoutStemSuffix => match strip_stem_suffix(strip_extension(term)) {
                Some(stripped) => ends_with_path(strip_extension(source), stripped),
                None => false,
            },
        },
    }
}

/// Suffix match that only accepts a whole path segment boundary.
fn ends_with_path(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || !haystack.ends_with(needle) {
        return false;
    }
    let boundary = haystack.len() - needle.len();
    boundary == 0 || haystack.as_bytes()[boundary - 1] == b'/'
}

/// Drops the extension of the last path segment, if it has one.
fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..segment_start + dot],
        _ => path,
    }
}

/// Drops the trailing `_suffix` of the last path segment.
fn strip_stem_suffix(path: &str) -> Option<&str> {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('_') {
        Some(underscore) if underscore > 0 => Some(&path[..segment_start + underscore]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_match(source: &str, term: &str) -> Option<MatchTier> {
        let term = normalize_search_term(term).to_lowercase();
        MatchTier::ALL
            .into_iter()
            .find(|tier| matches(source, &term, SearchMode::Default, *tier))
    }

    #[test]
    fn test_normalize_backslashes_and_alias() {
        assert_eq!(
            normalize_search_term("@assets@\\Textures\\Rock.png"),
            "Textures/Rock.png"
        );
        assert_eq!(normalize_search_term("//a/b.png"), "a/b.png");
        assert_eq!(normalize_search_term("plain.png"), "plain.png");
    }

    #[test]
    fn test_normalize_keeps_unterminated_alias() {
        assert_eq!(normalize_search_term("@broken/a.png"), "@broken/a.png");
    }

    #[test]
    fn test_exact_is_case_insensitive() {
        assert!(matches(
            "Textures/Rock.png",
            "textures/rock.png",
            SearchMode::Exact,
            MatchTier::Suffix
        ));
        assert!(!matches(
            "Textures/Rock.png",
            "rock.png",
            SearchMode::Exact,
            MatchTier::Suffix
        ));
    }

    #[test]
    fn test_suffix_requires_segment_boundary() {
        assert_eq!(
            default_match("textures/rock.png", "rock.png"),
            Some(MatchTier::Suffix)
        );
        assert_eq!(default_match("textures/bedrock.png", "rock.png"), None);
    }

    #[test]
    fn test_match_without_extension() {
        assert_eq!(
            default_match("textures/rock.png", "@products@/textures/rock.dds"),
            Some(MatchTier::WithoutExtension)
        );
    }

    #[test]
    fn test_match_without_stem_suffix() {
        assert_eq!(
            default_match("textures/rock.png", "textures/rock_ddna.dds"),
            Some(MatchTier::WithoutStemSuffix)
        );
    }

    #[test]
    fn test_empty_term_never_matches() {
        assert!(!matches("a.png", "", SearchMode::Default, MatchTier::Suffix));
        assert!(!matches("a.png", "", SearchMode::Exact, MatchTier::Suffix));
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_extension("a/b.c/d"), "a/b.c/d");
        assert_eq!(strip_extension("a/.hidden"), "a/.hidden");
        assert_eq!(strip_extension("a/b.tar.gz"), "a/b.tar");
        assert_eq!(strip_stem_suffix("a/rock_n"), Some("a/rock"));
        assert_eq!(strip_stem_suffix("a_b/rock"), None);
    }
}

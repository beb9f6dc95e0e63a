//! Duplicate and corruption detection over the external catalog.
//!
//! Pure functions over a read-only `{code, name}` snapshot. Entries are
//! grouped by case-folded name (diacritics are kept, since a damaged
//! diacritic is itself evidence) and every member of a duplicate group is
//! checked for three corruption signatures:
//!
//! - a trailing version suffix on the code (`-V2`, `-v10`);
//! - a value doubled onto itself (`BFM-01BFM-01`, `ABC-ABC`);
//! - a lost byte from a bad transcoding (`?` or U+FFFD in the name).
//!
//! The engine is advisory. It never writes anywhere.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

static VERSION_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-V(\d+)$").expect("valid regex"));

/// Values shorter than this are never treated as concatenations.
pub const MIN_CONCATENATION_LEN: usize = 4;

/// Characters allowed between the two halves of an odd-length concatenation.
pub const CONCATENATION_SEPARATORS: [char; 3] = ['-', '_', ' '];

/// Characters left behind by a lossy transcoding.
pub const ENCODING_PLACEHOLDERS: [char; 2] = ['?', '\u{FFFD}'];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One `{code, name}` pair from the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub name: String,
}

impl CatalogEntry {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Versioning,
    Concatenation,
    Encoding,
}

/// Overall classification of a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCategory {
    /// Same name, no corruption signature on any member.
    Exact,
    Versioning,
    Concatenation,
    Encoding,
    /// More than one kind of issue across the group.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateMember {
    pub code: String,
    pub raw_name: String,
    pub issues: BTreeSet<IssueKind>,
    /// Extracted version number; 0 for unversioned codes.
    pub version: u64,
    /// Halved code when the code itself is concatenated.
    pub corrected_code: Option<String>,
    /// Halved name when the name itself is concatenated.
    pub corrected_name: Option<String>,
    /// Operator-facing explanation of each issue.
    pub descriptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogDuplicateGroup {
    pub normalized_name: String,
    /// Ordered by `version` ascending; ties keep catalog order.
    pub members: Vec<DuplicateMember>,
    pub proposed_canonical_code: String,
    pub category: DuplicateCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub total_entries: usize,
    pub group_count: usize,
    /// Entries that belong to some duplicate group.
    pub duplicate_entries: usize,
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Group key: trimmed and case-folded, diacritics untouched.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Version number of a `-V<digits>` suffixed code.
pub fn version_of(code: &str) -> Option<u64> {
    VERSION_SUFFIX_RE
        .captures(code.trim())
        .map(|caps| caps[1].parse::<u64>().unwrap_or(u64::MAX))
}

/// The code with its version suffix removed.
pub fn version_base(code: &str) -> &str {
    let code = code.trim();
    match VERSION_SUFFIX_RE.find(code) {
        Some(m) => &code[..m.start()],
        None => code,
    }
}

/// If `value` is a string doubled onto itself, return the single copy.
///
/// Even lengths split in half; odd lengths need a separator as the middle
/// character. Halves compare case-insensitively.
pub fn concatenation_half(value: &str) -> Option<String> {
    let chars: Vec<char> = value.chars().collect();
    if value.trim().is_empty() || chars.len() < MIN_CONCATENATION_LEN {
        return None;
    }
    let mid = chars.len() / 2;
    let (first, second): (String, String) = if chars.len() % 2 == 0 {
        (chars[..mid].iter().collect(), chars[mid..].iter().collect())
    } else if CONCATENATION_SEPARATORS.contains(&chars[mid]) {
        (chars[..mid].iter().collect(), chars[mid + 1..].iter().collect())
    } else {
        return None;
    };
    if first.to_lowercase() == second.to_lowercase() {
        Some(first)
    } else {
        None
    }
}

pub fn has_encoding_corruption(name: &str) -> bool {
    name.chars().any(|c| ENCODING_PLACEHOLDERS.contains(&c))
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

fn classify_member(entry: &CatalogEntry, versioned_bases: &[String]) -> DuplicateMember {
    let mut issues = BTreeSet::new();
    let mut descriptions = Vec::new();

    let version = version_of(&entry.code);
    match version {
        Some(_) => {
            issues.insert(IssueKind::Versioning);
            let suffix = &entry.code.trim()[version_base(&entry.code).len()..];
            descriptions.push(format!("Version suffix detected: {suffix}"));
        }
        None if versioned_bases
            .iter()
            .any(|base| base.eq_ignore_ascii_case(entry.code.trim())) =>
        {
            issues.insert(IssueKind::Versioning);
            descriptions.push("Base code of a versioned family".to_string());
        }
        None => {}
    }

    let corrected_code = concatenation_half(&entry.code);
    if let Some(corrected) = &corrected_code {
        issues.insert(IssueKind::Concatenation);
        descriptions.push(format!("Concatenation error in code. Corrected: {corrected}"));
    }
    let corrected_name = concatenation_half(&entry.name);
    if let Some(corrected) = &corrected_name {
        issues.insert(IssueKind::Concatenation);
        descriptions.push(format!("Concatenation error in name. Corrected: {corrected}"));
    }

    if has_encoding_corruption(&entry.name) {
        issues.insert(IssueKind::Encoding);
        descriptions.push("Character encoding issue detected (placeholder characters)".to_string());
    }

    DuplicateMember {
        code: entry.code.clone(),
        raw_name: entry.name.clone(),
        issues,
        version: version.unwrap_or(0),
        corrected_code,
        corrected_name,
        descriptions,
    }
}

fn categorize(members: &[DuplicateMember]) -> DuplicateCategory {
    let kinds: BTreeSet<IssueKind> = members
        .iter()
        .flat_map(|m| m.issues.iter().copied())
        .collect();
    let mut iter = kinds.iter();
    match (iter.next(), iter.next()) {
        (None, _) => DuplicateCategory::Exact,
        (Some(_), Some(_)) => DuplicateCategory::Mixed,
        (Some(IssueKind::Versioning), None) => DuplicateCategory::Versioning,
        (Some(IssueKind::Concatenation), None) => DuplicateCategory::Concatenation,
        (Some(IssueKind::Encoding), None) => DuplicateCategory::Encoding,
    }
}

/// Canonical code for a group whose members are in catalog order.
///
/// Lowest version wins when any member is versioned (unversioned counts as
/// version 0); otherwise the earliest concatenated member, halved when its
/// code is doubled; otherwise the first member.
fn propose_canonical(members_in_catalog_order: &[DuplicateMember]) -> String {
    let any_versioned = members_in_catalog_order
        .iter()
        .any(|m| m.issues.contains(&IssueKind::Versioning));
    if any_versioned {
        if let Some(lowest) = members_in_catalog_order.iter().min_by_key(|m| m.version) {
            return lowest.code.clone();
        }
    }
    if let Some(concatenated) = members_in_catalog_order
        .iter()
        .find(|m| m.issues.contains(&IssueKind::Concatenation))
    {
        return concatenated
            .corrected_code
            .clone()
            .unwrap_or_else(|| concatenated.code.clone());
    }
    members_in_catalog_order
        .first()
        .map(|m| m.code.clone())
        .unwrap_or_default()
}

/// Find duplicate groups in a catalog snapshot.
///
/// Only names shared by two or more entries form a group. Groups are
/// returned in order of first appearance of their name.
pub fn detect_duplicates(entries: &[CatalogEntry]) -> Vec<CatalogDuplicateGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<&CatalogEntry>> = HashMap::new();
    for entry in entries {
        let key = normalize_name(&entry.name);
        buckets
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(entry);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let bucket = buckets.remove(&key)?;
            if bucket.len() < 2 {
                return None;
            }
            let versioned_bases: Vec<String> = bucket
                .iter()
                .filter(|e| version_of(&e.code).is_some())
                .map(|e| version_base(&e.code).to_string())
                .collect();
            let mut members: Vec<DuplicateMember> = bucket
                .iter()
                .map(|e| classify_member(e, &versioned_bases))
                .collect();

            let proposed_canonical_code = propose_canonical(&members);
            let category = categorize(&members);
            members.sort_by_key(|m| m.version);

            Some(CatalogDuplicateGroup {
                normalized_name: key,
                members,
                proposed_canonical_code,
                category,
            })
        })
        .collect()
}

pub fn summarize(total_entries: usize, groups: &[CatalogDuplicateGroup]) -> DetectionSummary {
    DetectionSummary {
        total_entries,
        group_count: groups.len(),
        duplicate_entries: groups.iter().map(|g| g.members.len()).sum(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Signatures --------------------------------------------------------

    #[test]
    fn version_suffix_is_case_insensitive() {
        assert_eq!(version_of("9310011-V2"), Some(2));
        assert_eq!(version_of("BFM-01-v10"), Some(10));
        assert_eq!(version_of("9310011"), None);
        assert_eq!(version_of("V2-9310011"), None);
        assert_eq!(version_base("9310011-V3"), "9310011");
    }

    #[test]
    fn concatenated_code_is_halved() {
        assert_eq!(concatenation_half("BFM-01BFM-01").as_deref(), Some("BFM-01"));
    }

    #[test]
    fn concatenation_with_separator() {
        assert_eq!(concatenation_half("ABC-abc").as_deref(), Some("ABC"));
        assert_eq!(concatenation_half("KDV_KDV").as_deref(), Some("KDV"));
        assert_eq!(concatenation_half("ABCxABC"), None);
    }

    #[test]
    fn short_values_are_never_concatenations() {
        assert_eq!(concatenation_half("AA"), None);
        assert_eq!(concatenation_half("A-A"), None);
        assert_eq!(concatenation_half("    "), None);
    }

    #[test]
    fn concatenation_counts_characters_not_bytes() {
        assert_eq!(concatenation_half("ŞİŞEŞİŞE").as_deref(), Some("ŞİŞE"));
    }

    #[test]
    fn encoding_placeholders() {
        assert!(has_encoding_corruption("NETS?S KONTROL"));
        assert!(has_encoding_corruption("NETS\u{FFFD}S KONTROL"));
        assert!(!has_encoding_corruption("NETSİS KONTROL"));
    }

    // -- Grouping ----------------------------------------------------------

    #[test]
    fn versioned_family_groups_with_base_as_canonical() {
        let entries = vec![
            CatalogEntry::new("9310011-V3", "NETSİS KONTROL ET1"),
            CatalogEntry::new("9310011", "NETSİS KONTROL ET1"),
            CatalogEntry::new("9310011-V2", "netsİs kontrol et1"),
        ];
        let groups = detect_duplicates(&entries);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.proposed_canonical_code, "9310011");
        assert_eq!(group.category, DuplicateCategory::Versioning);
        assert_eq!(group.members.len(), 3);
        assert!(group
            .members
            .iter()
            .all(|m| m.issues.contains(&IssueKind::Versioning)));
        let codes: Vec<&str> = group.members.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, ["9310011", "9310011-V2", "9310011-V3"]);
    }

    #[test]
    fn concatenated_member_proposes_halved_code() {
        let entries = vec![
            CatalogEntry::new("BFM-01BFM-01", "FLANŞ 01"),
            CatalogEntry::new("BFM-01", "FLANŞ 01"),
        ];
        let groups = detect_duplicates(&entries);
        assert_eq!(groups.len(), 1);
        let doubled = &groups[0].members[0];
        assert!(doubled.issues.contains(&IssueKind::Concatenation));
        assert_eq!(doubled.corrected_code.as_deref(), Some("BFM-01"));
        assert_eq!(groups[0].proposed_canonical_code, "BFM-01");
        assert_eq!(groups[0].category, DuplicateCategory::Concatenation);
    }

    #[test]
    fn unrelated_names_never_group() {
        let entries = vec![
            CatalogEntry::new("BFM-01", "FLANŞ"),
            CatalogEntry::new("BFM-01-V2", "CİVATA"),
            CatalogEntry::new("BFM-01BFM-01", "SOMUN"),
        ];
        assert!(detect_duplicates(&entries).is_empty());
    }

    #[test]
    fn diacritics_are_not_folded() {
        let entries = vec![
            CatalogEntry::new("A1", "ŞİŞE"),
            CatalogEntry::new("A2", "SISE"),
        ];
        assert!(detect_duplicates(&entries).is_empty());
    }

    #[test]
    fn plain_duplicate_is_exact_and_keeps_first_code() {
        let entries = vec![
            CatalogEntry::new("X-2", "Vida"),
            CatalogEntry::new("X-1", " vida "),
        ];
        let groups = detect_duplicates(&entries);
        assert_eq!(groups[0].category, DuplicateCategory::Exact);
        assert_eq!(groups[0].proposed_canonical_code, "X-2");
        assert!(groups[0].members.iter().all(|m| m.descriptions.is_empty()));
    }

    #[test]
    fn mixed_issues_are_reported() {
        let entries = vec![
            CatalogEntry::new("P-1", "BOR?"),
            CatalogEntry::new("P-1-V2", "bor?"),
        ];
        let groups = detect_duplicates(&entries);
        assert_eq!(groups[0].category, DuplicateCategory::Mixed);
        assert_eq!(groups[0].proposed_canonical_code, "P-1");
        let versioned = &groups[0].members[1];
        assert_eq!(
            versioned.descriptions,
            vec![
                "Version suffix detected: -V2".to_string(),
                "Character encoding issue detected (placeholder characters)".to_string(),
            ]
        );
    }

    #[test]
    fn summary_counts_grouped_entries() {
        let entries = vec![
            CatalogEntry::new("A", "one"),
            CatalogEntry::new("B", "one"),
            CatalogEntry::new("C", "two"),
            CatalogEntry::new("D", "three"),
            CatalogEntry::new("E", "THREE"),
            CatalogEntry::new("F", "three"),
        ];
        let groups = detect_duplicates(&entries);
        let summary = summarize(entries.len(), &groups);
        assert_eq!(
            summary,
            DetectionSummary {
                total_entries: 6,
                group_count: 2,
                duplicate_entries: 5,
            }
        );
        assert_eq!(groups[0].normalized_name, "one");
        assert_eq!(groups[1].normalized_name, "three");
    }
}

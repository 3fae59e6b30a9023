//! Synonym expansion and document-reference detection.
//!
//! A built-in dictionary of labor-contract vocabulary is merged with a
//! user-editable overlay stored in the database. The merged view and its
//! reverse map are cached behind a lock; every overlay write invalidates
//! the cache. Readers take a snapshot `Arc` so expansion never blocks on
//! writers.

mod builtin;

pub use builtin::BUILTIN_SYNONYMS;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::error::Result;
use crate::models::FileStatus;
use crate::storage::Store;

/// The merged synonym view: canonical -> synonyms plus the reverse map.
#[derive(Debug, Default)]
pub struct MergedSynonyms {
    /// canonical term -> synonym list.
    pub forward: BTreeMap<String, Vec<String>>,
    /// synonym (or canonical) -> canonical term.
    pub reverse: BTreeMap<String, String>,
}

impl MergedSynonyms {
    fn from_maps(
        base: &[(&str, &[&str])],
        overlay: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut forward: BTreeMap<String, Vec<String>> = base
            .iter()
            .map(|(canonical, synonyms)| {
                (
                    (*canonical).to_lowercase(),
                    synonyms.iter().map(|s| (*s).to_lowercase()).collect(),
                )
            })
            .collect();

        for (canonical, synonyms) in overlay {
            let canonical = canonical.to_lowercase();
            let entry = forward.entry(canonical).or_default();
            for synonym in synonyms {
                let synonym = synonym.to_lowercase();
                if !entry.contains(&synonym) {
                    entry.push(synonym);
                }
            }
        }

        let mut reverse = BTreeMap::new();
        for (canonical, synonyms) in &forward {
            reverse.insert(canonical.clone(), canonical.clone());
            for synonym in synonyms {
                reverse.insert(synonym.clone(), canonical.clone());
            }
        }

        Self { forward, reverse }
    }
}

/// Synonym service with a cached merged view.
#[derive(Debug, Default)]
pub struct SynonymMap {
    cache: RwLock<Option<Arc<MergedSynonyms>>>,
}

impl SynonymMap {
    /// Creates an empty (uncached) synonym service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the merged view, loading the overlay from the store when
    /// the cache is cold.
    pub fn merged(&self, store: &Store) -> Result<Arc<MergedSynonyms>> {
        if let Ok(guard) = self.cache.read() {
            if let Some(merged) = guard.as_ref() {
                return Ok(Arc::clone(merged));
            }
        }

        let overlay = store.custom_synonyms()?;
        let merged = Arc::new(MergedSynonyms::from_maps(BUILTIN_SYNONYMS, &overlay));

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(Arc::clone(&merged));
        }
        Ok(merged)
    }

    /// Invalidates the cached merged view. Called after every overlay write.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }

    /// Saves custom synonyms and refreshes the cache.
    pub fn save_custom(
        &self,
        store: &Store,
        synonyms: &BTreeMap<String, Vec<String>>,
        replace: bool,
    ) -> Result<usize> {
        let count = store.save_custom_synonyms(synonyms, replace)?;
        self.invalidate();
        Ok(count)
    }

    /// Deletes one custom term and refreshes the cache.
    pub fn delete_custom(&self, store: &Store, canonical_term: &str) -> Result<bool> {
        let deleted = store.delete_custom_synonym(canonical_term)?;
        if deleted {
            self.invalidate();
        }
        Ok(deleted)
    }

    /// Returns all synonyms for a term, the canonical form first. A term
    /// with no entry yields just itself (lowercased).
    pub fn get_synonyms(&self, store: &Store, term: &str) -> Result<Vec<String>> {
        let merged = self.merged(store)?;
        let term_lower = term.to_lowercase();

        if let Some(canonical) = merged.reverse.get(&term_lower) {
            if let Some(synonyms) = merged.forward.get(canonical) {
                let mut all = vec![canonical.clone()];
                all.extend(synonyms.iter().cloned());
                return Ok(all);
            }
        }
        Ok(vec![term_lower])
    }

    /// Expands a query into an ordered list of variants.
    ///
    /// The original query always comes first. Known terms appearing in the
    /// query (longest match first, longer than 3 characters) are
    /// substituted by each of their synonyms; duplicates are dropped.
    pub fn expand_query(&self, store: &Store, query: &str) -> Result<Vec<String>> {
        let merged = self.merged(store)?;
        let query_lower = query.to_lowercase();

        let mut expanded: Vec<String> = vec![query.to_string()];

        let mut terms: Vec<&String> = merged.reverse.keys().collect();
        terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));

        for term in terms {
            if term.chars().count() <= 3 || !query_lower.contains(term.as_str()) {
                continue;
            }
            for synonym in self.get_synonyms(store, term)? {
                if synonym == *term {
                    continue;
                }
                let variant = query_lower.replace(term.as_str(), &synonym);
                if variant != query_lower && !expanded.contains(&variant) {
                    expanded.push(variant);
                }
            }
        }

        Ok(expanded)
    }
}

/// A resolved document reference: the file and the query residue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    /// The referenced file id.
    pub file_id: i64,
    /// The matched name text.
    pub matched_name: String,
    /// The query with the reference removed.
    pub remaining_query: String,
}

fn filename_stem(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = Regex::new(r"^(collective[_\s]?agreement[_\s]?[-_]?|ca[_\s]?[-_]?)")
        .map(|re| re.replace(&stem, "").into_owned())
        .unwrap_or(stem);
    stem.replace(['-', '_'], " ").trim().to_string()
}

/// Detects whether the query names a specific indexed document.
///
/// Candidate names come from file metadata (short name, employer, region,
/// union local) and filename stems; the longest name found as a substring
/// of the query wins. The reference and its connecting "for/in/from" or
/// possessive patterns are removed from the query; if fewer than 2 words
/// remain, only the bare name is removed instead.
pub fn detect_document_reference(
    store: &Store,
    query: &str,
) -> Result<Option<DocumentReference>> {
    let query_lower = query.to_lowercase();
    let files = store.list_files_with_status(FileStatus::Indexed)?;
    if files.is_empty() {
        return Ok(None);
    }

    // Searchable name -> file id; metadata names take precedence over stems
    let mut names: Vec<(String, i64)> = Vec::new();
    for file in &files {
        for candidate in [
            file.short_name.as_deref(),
            file.employer_name.as_deref(),
            file.region.as_deref(),
            file.union_local.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            names.push((candidate.to_lowercase(), file.id));
        }

        let stem = filename_stem(&file.filename);
        if !stem.is_empty() {
            names.push((stem.clone(), file.id));
            let words: Vec<&str> = stem.split_whitespace().collect();
            if words.len() >= 2 {
                names.push((words[..2].join(" "), file.id));
                names.push((words[0].to_string(), file.id));
            }
        }
        names.push((file.filename.to_lowercase(), file.id));
    }

    let mut best: Option<(String, i64)> = None;
    for (name, file_id) in names {
        if name.chars().count() > 2 && query_lower.contains(&name) {
            let better = best
                .as_ref()
                .map_or(true, |(b, _)| name.chars().count() > b.chars().count());
            if better {
                best = Some((name, file_id));
            }
        }
    }

    let Some((matched_name, file_id)) = best else {
        return Ok(None);
    };

    let escaped = regex::escape(&matched_name);

    // "sick leave for the Spruce Grove agreement" -> "sick leave"
    let mut remaining = Regex::new(&format!(
        r"(?i)\b(for|in|from)\s+(the\s+)?{escaped}(\s+contract|\s+agreement|\s+local)?\b"
    ))
    .map(|re| re.replace_all(query, "").into_owned())
    .unwrap_or_else(|_| query.to_string());

    // "Spruce Grove's sick leave" -> "sick leave"
    remaining = Regex::new(&format!(r"(?i)\b{escaped}('s|s')\s*"))
        .map(|re| re.replace_all(&remaining, "").into_owned())
        .unwrap_or(remaining);

    remaining = remaining.split_whitespace().collect::<Vec<_>>().join(" ");

    if remaining.split_whitespace().count() < 2 {
        remaining = Regex::new(&format!(r"(?i)\b{escaped}\b"))
            .map(|re| re.replace_all(query, "").into_owned())
            .unwrap_or_else(|_| query.to_string());
        remaining = remaining.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    let remaining_query = if remaining.is_empty() {
        query.to_string()
    } else {
        remaining
    };

    Ok(Some(DocumentReference {
        file_id,
        matched_name,
        remaining_query,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PageText;

    fn store_with_file(filename: &str, short_name: Option<&str>) -> (Store, i64) {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let id = store
            .insert_file(&format!("/tmp/{filename}"), filename, "hash", 0.0, 1)
            .unwrap();
        store
            .replace_file_content(
                id,
                &[PageText {
                    page_number: 1,
                    text: "body".to_string(),
                    raw_text: String::new(),
                }],
                &[],
                &[],
            )
            .unwrap();
        store.set_file_indexed(id, 1).unwrap();
        if short_name.is_some() {
            store
                .set_file_metadata(id, None, None, None, None, None, short_name)
                .unwrap();
        }
        (store, id)
    }

    #[test]
    fn test_builtin_synonyms_present() {
        assert!(BUILTIN_SYNONYMS.len() >= 50);
        assert!(BUILTIN_SYNONYMS
            .iter()
            .any(|(canonical, _)| *canonical == "sick leave"));
    }

    #[test]
    fn test_get_synonyms_canonical() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();
        let syns = map.get_synonyms(&store, "sick leave").unwrap();
        assert_eq!(syns[0], "sick leave");
        assert!(syns.contains(&"sick time".to_string()));
    }

    #[test]
    fn test_get_synonyms_reverse_lookup() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();
        let syns = map.get_synonyms(&store, "sick time").unwrap();
        assert_eq!(syns[0], "sick leave");
    }

    #[test]
    fn test_get_synonyms_unknown_term() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();
        assert_eq!(
            map.get_synonyms(&store, "Gadget").unwrap(),
            vec!["gadget".to_string()]
        );
    }

    #[test]
    fn test_expand_query_original_first() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();
        let expanded = map
            .expand_query(&store, "what is the sick leave policy")
            .unwrap();
        assert!(!expanded.is_empty());
        assert_eq!(expanded[0], "what is the sick leave policy");
        assert!(expanded.len() > 1);
        assert!(expanded
            .iter()
            .any(|v| v.contains("sick time") || v.contains("sick days")));
    }

    #[test]
    fn test_expand_query_no_match() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();
        let expanded = map.expand_query(&store, "xyzzy quux").unwrap();
        assert_eq!(expanded, vec!["xyzzy quux".to_string()]);
    }

    #[test]
    fn test_expand_query_no_duplicates() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();
        let expanded = map.expand_query(&store, "overtime overtime").unwrap();
        let mut dedup = expanded.clone();
        dedup.dedup();
        assert_eq!(expanded.len(), dedup.len());
    }

    #[test]
    fn test_custom_overlay_extends_builtin() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();

        let mut custom = BTreeMap::new();
        custom.insert(
            "sick leave".to_string(),
            vec!["wellness days".to_string()],
        );
        map.save_custom(&store, &custom, false).unwrap();

        let syns = map.get_synonyms(&store, "sick leave").unwrap();
        assert!(syns.contains(&"wellness days".to_string()));
        assert!(syns.contains(&"sick time".to_string()));
    }

    #[test]
    fn test_cache_invalidation_on_write() {
        let (store, _) = store_with_file("a.pdf", None);
        let map = SynonymMap::new();

        // Warm the cache
        let _ = map.get_synonyms(&store, "sick leave").unwrap();

        let mut custom = BTreeMap::new();
        custom.insert("gizmo".to_string(), vec!["widget".to_string()]);
        map.save_custom(&store, &custom, false).unwrap();

        let syns = map.get_synonyms(&store, "gizmo").unwrap();
        assert!(syns.contains(&"widget".to_string()));

        map.delete_custom(&store, "gizmo").unwrap();
        assert_eq!(
            map.get_synonyms(&store, "gizmo").unwrap(),
            vec!["gizmo".to_string()]
        );
    }

    #[test]
    fn test_detect_document_reference_by_short_name() {
        let (store, id) = store_with_file("agreement_2024.pdf", Some("Spruce Grove"));
        let reference = detect_document_reference(&store, "sick leave for Spruce Grove")
            .unwrap()
            .unwrap();
        assert_eq!(reference.file_id, id);
        assert_eq!(reference.matched_name, "spruce grove");
        assert_eq!(reference.remaining_query, "sick leave");
    }

    #[test]
    fn test_detect_document_reference_possessive() {
        let (store, id) = store_with_file("agreement_2024.pdf", Some("Spruce Grove"));
        let reference = detect_document_reference(&store, "Spruce Grove's vacation entitlement")
            .unwrap()
            .unwrap();
        assert_eq!(reference.file_id, id);
        assert_eq!(reference.remaining_query, "vacation entitlement");
    }

    #[test]
    fn test_detect_document_reference_filename_stem() {
        let (store, id) = store_with_file("ca_riverside_hospital.pdf", None);
        let reference =
            detect_document_reference(&store, "overtime rules in riverside hospital")
                .unwrap()
                .unwrap();
        assert_eq!(reference.file_id, id);
        assert!(reference.remaining_query.contains("overtime"));
    }

    #[test]
    fn test_detect_document_reference_short_residue() {
        let (store, _) = store_with_file("agreement_2024.pdf", Some("Spruce Grove"));
        // Removing "for Spruce Grove" leaves one word; only the name is removed
        let reference = detect_document_reference(&store, "overtime for Spruce Grove")
            .unwrap()
            .unwrap();
        assert!(reference.remaining_query.contains("overtime"));
    }

    #[test]
    fn test_detect_document_reference_none() {
        let (store, _) = store_with_file("agreement_2024.pdf", Some("Spruce Grove"));
        assert!(detect_document_reference(&store, "what is the grievance procedure")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_detect_document_reference_requires_indexed() {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        let id = store
            .insert_file("/tmp/pending.pdf", "spruce_grove.pdf", "hash", 0.0, 1)
            .unwrap();
        store
            .set_file_status(id, FileStatus::Pending, None)
            .unwrap();
        assert!(detect_document_reference(&store, "sick leave for spruce grove")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_filename_stem() {
        assert_eq!(filename_stem("ca_spruce_grove.pdf"), "spruce grove");
        assert_eq!(
            filename_stem("collective_agreement_city_of_example.pdf"),
            "city of example"
        );
    }
}

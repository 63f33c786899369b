//! Technical-term detection
//!
//! Scans the prepared question against three static weighted dictionaries
//! (unigrams, bigrams, trigrams) covering the migration domain: platform
//! names, wire formats, entity attributes and migration phrases. Longer
//! phrases win when phrase spans overlap; component unigrams are still
//! reported so downstream boosts can match single-word file names.
//!
//! Detection is pure and cannot fail; an empty set is a valid result.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use askfuze_core::DetectedTerm;

use crate::tokenize::tokenize;

/// The static weighted dictionaries. Weights are in [2.0, 3.5].
pub struct TermDictionaries {
    unigrams: HashMap<&'static str, f32>,
    bigrams: HashMap<&'static str, f32>,
    trigrams: HashMap<&'static str, f32>,
}

static DICTIONARIES: Lazy<TermDictionaries> = Lazy::new(TermDictionaries::builtin);

impl TermDictionaries {
    /// The process-wide dictionaries
    pub fn shared() -> &'static Self {
        &DICTIONARIES
    }

    fn builtin() -> Self {
        let unigrams: HashMap<&'static str, f32> = [
            // Platforms
            ("slack", 2.5),
            ("teams", 2.5),
            ("sharepoint", 2.5),
            ("onedrive", 2.5),
            ("dropbox", 2.4),
            ("box", 2.2),
            ("egnyte", 2.4),
            ("gdrive", 2.3),
            ("gmail", 2.3),
            ("outlook", 2.3),
            ("exchange", 2.3),
            ("confluence", 2.4),
            ("jira", 2.3),
            ("notion", 2.3),
            ("mattermost", 2.5),
            ("webex", 2.4),
            ("zoom", 2.2),
            ("onenote", 2.4),
            ("google", 2.1),
            ("microsoft", 2.1),
            ("azure", 2.3),
            ("workspace", 2.2),
            ("cloudfuze", 3.0),
            // Wire formats and file types
            ("json", 2.6),
            ("csv", 2.4),
            ("pst", 2.6),
            ("mbox", 2.6),
            ("eml", 2.4),
            ("msg", 2.2),
            ("xlsx", 2.3),
            ("docx", 2.3),
            ("pptx", 2.3),
            ("pdf", 2.2),
            ("html", 2.1),
            ("txt", 2.0),
            // Protocols and plumbing
            ("api", 2.2),
            ("oauth", 2.5),
            ("sso", 2.4),
            ("saml", 2.5),
            ("imap", 2.2),
            ("smtp", 2.3),
            ("ews", 2.5),
            ("graph", 2.2),
            ("s3", 2.4),
            ("sftp", 2.4),
            ("webhook", 2.3),
            ("tenant", 2.5),
            ("sandbox", 2.2),
            ("throttling", 2.5),
            // Entity attributes
            ("permissions", 2.6),
            ("permission", 2.6),
            ("metadata", 2.6),
            ("timestamp", 2.3),
            ("timestamps", 2.3),
            ("versioning", 2.5),
            ("versions", 2.2),
            ("mailbox", 2.4),
            ("channel", 2.3),
            ("channels", 2.3),
            ("attachments", 2.3),
            ("emoji", 2.2),
            ("reactions", 2.2),
            ("threads", 2.2),
            // Migration vocabulary
            ("migration", 2.4),
            ("migrations", 2.4),
            ("delta", 2.5),
            ("incremental", 2.5),
            ("cutover", 2.6),
        ]
        .into_iter()
        .collect();

        let bigrams: HashMap<&'static str, f32> = [
            ("slack export", 3.0),
            ("json export", 3.0),
            ("google drive", 2.8),
            ("google workspace", 2.8),
            ("office 365", 2.8),
            ("microsoft 365", 2.8),
            ("microsoft teams", 2.9),
            ("shared drive", 2.8),
            ("shared drives", 2.8),
            ("team site", 2.8),
            ("site collection", 2.9),
            ("document library", 2.9),
            ("private channel", 2.9),
            ("private channels", 2.9),
            ("direct message", 2.8),
            ("direct messages", 2.8),
            ("created by", 2.9),
            ("modified by", 2.9),
            ("modified date", 2.8),
            ("version history", 3.0),
            ("file share", 2.7),
            ("file server", 2.8),
            ("access token", 2.7),
            ("rate limit", 2.8),
            ("rate limits", 2.8),
            ("user mapping", 3.0),
            ("channel mapping", 3.0),
            ("permission mapping", 3.1),
            ("permissions mapping", 3.1),
            ("delta migration", 3.1),
            ("delta sync", 3.0),
            ("mail migration", 2.9),
            ("guest users", 2.7),
            ("external sharing", 2.9),
            ("retention policy", 2.9),
            ("admin consent", 2.8),
            ("service account", 2.8),
            ("migration report", 2.8),
            ("chat history", 2.9),
            ("mapping csv", 2.9),
        ]
        .into_iter()
        .collect();

        let trigrams: HashMap<&'static str, f32> = [
            ("slack to teams", 3.4),
            ("teams to slack", 3.2),
            ("sharepoint to onedrive", 3.4),
            ("onedrive to sharepoint", 3.2),
            ("box to onedrive", 3.3),
            ("box to sharepoint", 3.2),
            ("dropbox to onedrive", 3.3),
            ("dropbox to sharepoint", 3.2),
            ("gmail to outlook", 3.3),
            ("google to microsoft", 3.2),
            ("file server migration", 3.2),
            ("slack export file", 3.3),
            ("tenant to tenant", 3.3),
            ("google drive migration", 3.2),
            ("end user mapping", 3.2),
            ("created by metadata", 3.4),
            ("modified by metadata", 3.3),
            ("one way sync", 3.1),
            ("two way sync", 3.1),
            ("chat history migration", 3.3),
        ]
        .into_iter()
        .collect();

        Self {
            unigrams,
            bigrams,
            trigrams,
        }
    }

    pub fn unigram_count(&self) -> usize {
        self.unigrams.len()
    }

    pub fn bigram_count(&self) -> usize {
        self.bigrams.len()
    }

    pub fn trigram_count(&self) -> usize {
        self.trigrams.len()
    }
}

/// Detect technical terms in a prepared question
///
/// Phrase matches (trigrams before bigrams) consume their token spans so a
/// shorter phrase never overlaps a longer one. Unigram matches are scanned
/// independently over every token. The result is deduplicated and sorted
/// by weight descending, then lexically, so identical inputs always yield
/// the same ordering.
pub fn detect_terms(text: &str) -> Vec<DetectedTerm> {
    let dicts = TermDictionaries::shared();
    let tokens = tokenize(text);

    let mut found: HashMap<String, f32> = HashMap::new();

    // Phrase scan: longest match first, spans do not overlap
    let mut i = 0;
    while i < tokens.len() {
        if i + 3 <= tokens.len() {
            let phrase = tokens[i..i + 3].join(" ");
            if let Some(&weight) = dicts.trigrams.get(phrase.as_str()) {
                found.insert(phrase, weight);
                i += 3;
                continue;
            }
        }
        if i + 2 <= tokens.len() {
            let phrase = tokens[i..i + 2].join(" ");
            if let Some(&weight) = dicts.bigrams.get(phrase.as_str()) {
                found.insert(phrase, weight);
                i += 2;
                continue;
            }
        }
        i += 1;
    }

    // Unigram scan over every token, including phrase components, so that
    // single-word boosts (file names, folder segments) still fire
    for token in &tokens {
        if let Some(&weight) = dicts.unigrams.get(token.as_str()) {
            found.insert(token.clone(), weight);
        }
    }

    let mut terms: Vec<DetectedTerm> = found
        .into_iter()
        .map(|(text, weight)| DetectedTerm::new(text, weight))
        .collect();
    terms.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.text.cmp(&b.text))
    });
    terms
}

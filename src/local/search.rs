//! Fuzzy search over local songs.
//!
//! Songs are scored against their title, artists, album and genres; the
//! best field wins. Matching is case-insensitive and tolerates missing
//! characters, so "rdiohd" still finds "Radiohead". Results of the last term
//! are kept so that paging through them does not rank the collection again.

use crate::model::SharedSong;

/// How well a field matches a term, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    /// Characters appear in order with gaps; fewer gaps score higher
    Scattered(u32),
    Contains,
    WordPrefix,
    Prefix,
    Exact,
}

/// Score `key` against `term`. Both are already lowercase.
fn match_tier(key: &str, term: &str) -> Option<MatchTier> {
    if key == term {
        return Some(MatchTier::Exact);
    }
    if key.starts_with(term) {
        return Some(MatchTier::Prefix);
    }
    if key.split_whitespace().any(|word| word.starts_with(term)) {
        return Some(MatchTier::WordPrefix);
    }
    if key.contains(term) {
        return Some(MatchTier::Contains);
    }

    let mut gaps: u32 = 0;
    let mut rest = key.chars();
    for wanted in term.chars() {
        loop {
            match rest.next() {
                Some(c) if c == wanted => break,
                Some(_) => gaps += 1,
                None => return None,
            }
        }
    }
    Some(MatchTier::Scattered(u32::MAX - gaps))
}

/// One indexed song with its searchable fields.
struct Entry {
    song: SharedSong,
    keys: Vec<String>,
}

/// Ranked results for one term.
struct Results {
    term: String,
    songs: Vec<SharedSong>,
}

/// Lazily built search index.
pub struct LocalSearch {
    page_size: usize,
    entries: Option<Vec<Entry>>,
    last: Option<Results>,
}

impl LocalSearch {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            entries: None,
            last: None,
        }
    }

    pub fn is_built(&self) -> bool {
        self.entries.is_some()
    }

    /// Index the full song collection.
    pub fn build(&mut self, songs: Vec<SharedSong>) {
        let entries: Vec<Entry> = songs
            .into_iter()
            .map(|song| {
                let keys = {
                    let s = song.read();
                    let mut keys = vec![s.title.to_lowercase()];
                    keys.extend(s.artists.iter().map(|a| a.title.to_lowercase()));
                    keys.extend(s.album.as_deref().map(str::to_lowercase));
                    keys.extend(s.genres.iter().map(|g| g.to_lowercase()));
                    keys
                };
                Entry { song, keys }
            })
            .collect();

        tracing::debug!(target: "local::search", songs = entries.len(), "Built search index");
        self.entries = Some(entries);
        self.last = None;
    }

    /// Drop the index; the next search rebuilds it.
    pub fn invalidate(&mut self) {
        self.entries = None;
        self.last = None;
    }

    /// One page of results for `term`, best match first.
    ///
    /// A term other than the last one is ranked afresh.
    pub fn page(&mut self, term: &str, page: usize) -> Vec<SharedSong> {
        if self.last.as_ref().is_none_or(|last| last.term != term) {
            let songs = self.rank(term);
            tracing::debug!(target: "local::search", term, hits = songs.len(), "Ranked");
            self.last = Some(Results {
                term: term.to_string(),
                songs,
            });
        }

        let Some(results) = &self.last else {
            return Vec::new();
        };
        results
            .songs
            .iter()
            .skip(page.saturating_mul(self.page_size))
            .take(self.page_size)
            .cloned()
            .collect()
    }

    fn rank(&self, term: &str) -> Vec<SharedSong> {
        let Some(entries) = &self.entries else {
            return Vec::new();
        };

        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(MatchTier, &SharedSong)> = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .keys
                    .iter()
                    .filter_map(|key| match_tier(key, &term))
                    .max()
                    .map(|tier| (tier, &entry.song))
            })
            .collect();

        // Stable: equal scores keep discovery order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, song)| song.clone()).collect()
    }
}

use crate::{StreamingProvider, TitleCandidate};

/// Finds the streaming-provider entry for a title known from the metadata
/// provider.
///
/// Stages run in order and stop at the first hit: English title, Romaji
/// title (when it differs), then the English title with every character
/// outside `[A-Za-z0-9 ]` removed (when that changes it). A failing search
/// counts as "no match at this stage"; the resolver itself never errors.
pub struct TitleResolver<'a> {
    provider: &'a dyn StreamingProvider,
}

impl<'a> TitleResolver<'a> {
    pub fn new(provider: &'a dyn StreamingProvider) -> Self {
        Self { provider }
    }

    pub async fn resolve(
        &self,
        title_english: &str,
        title_romaji: &str,
    ) -> Option<TitleCandidate> {
        if let Some(candidate) = self.search_first(title_english).await {
            return Some(candidate);
        }

        if title_romaji != title_english {
            log::debug!(
                "No stream found for \"{}\", trying \"{}\"",
                title_english,
                title_romaji
            );
            if let Some(candidate) = self.search_first(title_romaji).await {
                return Some(candidate);
            }
        }

        if !title_english.is_empty() {
            let cleaned = clean_title(title_english);
            if cleaned != title_english {
                log::debug!("Retrying with cleaned title \"{}\"", cleaned);
                return self.search_first(&cleaned).await;
            }
        }

        None
    }

    async fn search_first(&self, query: &str) -> Option<TitleCandidate> {
        if query.trim().is_empty() {
            return None;
        }
        match self.provider.search(query).await {
            Ok(results) => results.results.first().map(TitleCandidate::from),
            Err(e) => {
                log::warn!(
                    "{} search for \"{}\" failed: {}",
                    self.provider.name(),
                    query,
                    e
                );
                None
            }
        }
    }
}

/// Drop every character outside `[A-Za-z0-9 ]`
pub fn clean_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}

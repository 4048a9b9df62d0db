use crate::error::Result;
use crate::lemma::Lemmatizer;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// LRU cache in front of a lemmatizer
///
/// Test sets repeat questions; each miss on an external analyzer costs a
/// process spawn, so lemmas are memoized per query text.
pub struct LemmaCache<L> {
    inner: L,
    cache: Mutex<LruCache<String, String>>,
}

impl<L: Lemmatizer> LemmaCache<L> {
    /// Wrap `inner` with a cache holding at most `capacity` entries (minimum 1)
    pub fn new(inner: L, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn get(&self, text: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(text)
            .cloned()
    }

    fn put(&self, text: String, lemmas: String) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .put(text, lemmas);
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: Lemmatizer> Lemmatizer for LemmaCache<L> {
    async fn lemmatize(&self, text: &str) -> Result<String> {
        if let Some(cached) = self.get(text) {
            log::debug!("Lemma cache hit for query: {}", text);
            return Ok(cached);
        }
        let lemmas = self.inner.lemmatize(text).await?;
        self.put(text.to_string(), lemmas.clone());
        Ok(lemmas)
    }
}

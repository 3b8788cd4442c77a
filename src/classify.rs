//! Product classification.
//!
//! The engine treats classification as an external capability with two
//! paths: a synchronous fast heuristic used while building a route, and a
//! slower, higher-confidence async lookup used for background refinement.
//! The async path is cached with a TTL and bounded capacity.
//!
//! Classification failures are never surfaced to the user: callers fall
//! back to the fast heuristic silently.

use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::Result;

/// Category label reserved for items no classifier could place.
pub const UNCLASSIFIED: &str = "unclassified";

/// Confidence reported by the sync keyword heuristic.
const FAST_PATH_CONFIDENCE: f64 = 0.6;

/// Confidence reported by the (simulated) higher-accuracy async path.
const ASYNC_PATH_CONFIDENCE: f64 = 0.8;

/// A classification result for a product name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(category: &str, confidence: f64) -> Self {
        Self {
            category: category.to_string(),
            confidence,
        }
    }

    pub fn unclassified() -> Self {
        Self::new(UNCLASSIFIED, 0.0)
    }
}

/// Maps a product name to a category and confidence score.
#[allow(async_fn_in_trait)]
pub trait Classifier {
    /// Fast, synchronous heuristic. Must never fail.
    fn classify(&self, product_name: &str) -> Classification;

    /// Slower, higher-accuracy lookup.
    async fn classify_async(&self, product_name: &str) -> Result<Classification>;
}

// ============================================================================
// Keyword Heuristic
// ============================================================================

/// (category, keywords) pairs for the fast path. The longest matching
/// keyword wins, so "ice cream" lands in frozen rather than dairy.
static KEYWORD_TABLE: Lazy<Vec<(&'static str, &'static [&'static str])>> = Lazy::new(|| {
    vec![
        (
            "produce",
            &[
                "apple", "banana", "lettuce", "tomato", "onion", "carrot", "avocado", "salad",
                "spinach", "potato", "fruit", "berries", "grapes",
            ][..],
        ),
        (
            "bakery",
            &["bread", "bagel", "croissant", "muffin", "cake", "tortilla", "baguette"][..],
        ),
        ("deli", &["salami", "prosciutto", "hummus", "olives", "pastrami"][..]),
        (
            "meat",
            &["chicken", "beef", "pork", "salmon", "shrimp", "fish", "steak", "bacon", "sausage"]
                [..],
        ),
        (
            "dairy",
            &["milk", "yogurt", "butter", "cheese", "cream", "egg"][..],
        ),
        ("frozen", &["frozen", "ice cream", "popsicle"][..]),
        (
            "pantry",
            &[
                "rice", "pasta", "flour", "sugar", "cereal", "beans", "oil", "sauce", "soup",
                "spice", "salt", "honey",
            ][..],
        ),
        (
            "beverages",
            &["water", "juice", "soda", "coffee", "tea", "beer", "wine", "kombucha"][..],
        ),
        (
            "snacks",
            &["chips", "cookies", "crackers", "candy", "chocolate", "popcorn", "nuts", "granola"]
                [..],
        ),
        (
            "household",
            &[
                "paper towel", "detergent", "soap", "shampoo", "toothpaste", "trash bag",
                "cleaner", "foil", "sponge",
            ][..],
        ),
    ]
});

/// Deterministic keyword heuristic shipped with the crate.
///
/// The full classification ruleset lives outside this library; this is the
/// minimal in-crate capability the engine and tests run against. Unknown
/// names classify as [`UNCLASSIFIED`] with zero confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn best_match(product_name: &str) -> Option<&'static str> {
        let name = product_name.to_lowercase();
        let mut best: Option<(&'static str, usize)> = None;
        for (category, keywords) in KEYWORD_TABLE.iter() {
            for keyword in *keywords {
                if name.contains(keyword) {
                    let longer = best.map(|(_, len)| keyword.len() > len).unwrap_or(true);
                    if longer {
                        best = Some((category, keyword.len()));
                    }
                }
            }
        }
        best.map(|(category, _)| category)
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, product_name: &str) -> Classification {
        match Self::best_match(product_name) {
            Some(category) => Classification::new(category, FAST_PATH_CONFIDENCE),
            None => Classification::unclassified(),
        }
    }

    async fn classify_async(&self, product_name: &str) -> Result<Classification> {
        // Same table, reported at the higher-accuracy tier.
        Ok(match Self::best_match(product_name) {
            Some(category) => Classification::new(category, ASYNC_PATH_CONFIDENCE),
            None => Classification::unclassified(),
        })
    }
}

// ============================================================================
// Cached Classifier
// ============================================================================

/// Default async-result cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Default async-result time-to-live.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Wraps a classifier's async path with a bounded TTL cache.
///
/// Failures of the inner async lookup fall back to the sync heuristic and
/// are never surfaced to callers.
pub struct CachedClassifier<C> {
    inner: C,
    cache: Mutex<TtlCache<String, Classification>>,
}

impl<C: Classifier> CachedClassifier<C> {
    pub fn new(inner: C) -> Self {
        Self::with_limits(inner, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    pub fn with_limits(inner: C, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Mutex::new(TtlCache::new(capacity, ttl)),
        }
    }

    /// Number of live cached classifications.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl<C: Classifier> Classifier for CachedClassifier<C> {
    fn classify(&self, product_name: &str) -> Classification {
        self.inner.classify(product_name)
    }

    async fn classify_async(&self, product_name: &str) -> Result<Classification> {
        let key = product_name.to_lowercase();

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get_cloned(&key) {
                debug!("[Classifier] Cache hit for '{}'", product_name);
                return Ok(hit);
            }
        }

        match self.inner.classify_async(product_name).await {
            Ok(result) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, result.clone());
                }
                Ok(result)
            }
            Err(e) => {
                // Silent fallback to the fast heuristic.
                warn!(
                    "[Classifier] Async lookup failed for '{}': {}, using fast path",
                    product_name, e
                );
                Ok(self.inner.classify(product_name))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TripError;

    #[test]
    fn test_keyword_fast_path() {
        let classifier = KeywordClassifier::new();
        assert_eq!(classifier.classify("Whole milk").category, "dairy");
        assert_eq!(classifier.classify("Sourdough bread").category, "bakery");
        assert_eq!(classifier.classify("Fuji apples").category, "produce");
        assert_eq!(classifier.classify("Paper towels").category, "household");
    }

    #[test]
    fn test_longest_keyword_wins() {
        let classifier = KeywordClassifier::new();
        // "ice cream" (frozen) outranks "cream" (dairy)
        assert_eq!(classifier.classify("Vanilla ice cream").category, "frozen");
    }

    #[test]
    fn test_unknown_name_is_unclassified() {
        let classifier = KeywordClassifier::new();
        let result = classifier.classify("Mystery object");
        assert_eq!(result.category, UNCLASSIFIED);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_async_path_outranks_fast_path() {
        let classifier = KeywordClassifier::new();
        let fast = classifier.classify("Cheddar cheese");
        let refined = classifier.classify_async("Cheddar cheese").await.unwrap();
        assert_eq!(fast.category, refined.category);
        assert!(refined.confidence > fast.confidence);
    }

    #[tokio::test]
    async fn test_cached_classifier_caches() {
        let cached = CachedClassifier::new(KeywordClassifier::new());
        assert_eq!(cached.cached_count(), 0);

        let first = cached.classify_async("Greek yogurt").await.unwrap();
        assert_eq!(first.category, "dairy");
        assert_eq!(cached.cached_count(), 1);

        // Same name, different casing: one cache entry
        let second = cached.classify_async("greek YOGURT").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(cached.cached_count(), 1);
    }

    /// Classifier whose async path always fails.
    struct FailingAsync;

    impl Classifier for FailingAsync {
        fn classify(&self, _product_name: &str) -> Classification {
            Classification::new("pantry", FAST_PATH_CONFIDENCE)
        }

        async fn classify_async(&self, _product_name: &str) -> Result<Classification> {
            Err(TripError::classification("lookup service unavailable"))
        }
    }

    #[tokio::test]
    async fn test_async_failure_falls_back_silently() {
        let cached = CachedClassifier::new(FailingAsync);
        let result = cached.classify_async("Jasmine rice").await.unwrap();
        assert_eq!(result.category, "pantry");
        assert_eq!(result.confidence, FAST_PATH_CONFIDENCE);
        // Fallback results are not cached
        assert_eq!(cached.cached_count(), 0);
    }
}

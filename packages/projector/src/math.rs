//! Seam to the external math typesetter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Laid-out math as the UI draws it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathRender {
    pub glyphs: String,
    /// Caret units the box occupies; always at least one
    pub width: usize,
}

/// External math layout collaborator. Implementations must be deterministic
/// for identical input and free of side effects.
pub trait MathLayout: Send + Sync {
    fn layout_math(&self, source: &str, display: bool) -> MathRender;
}

/// Renders math as its source with whitespace collapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMathLayout;

impl MathLayout for PlainMathLayout {
    fn layout_math(&self, source: &str, _display: bool) -> MathRender {
        let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
        let glyphs = if collapsed.is_empty() {
            "\u{25a1}".to_string()
        } else {
            collapsed
        };
        MathRender {
            width: glyphs.chars().count(),
            glyphs,
        }
    }
}

/// Memoizes another layout by a CRC32 fingerprint of the math source.
pub struct CachedMathLayout<L> {
    inner: L,
    cache: Mutex<HashMap<(u32, bool), (String, MathRender)>>,
}

impl<L: MathLayout> CachedMathLayout<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: MathLayout> MathLayout for CachedMathLayout<L> {
    fn layout_math(&self, source: &str, display: bool) -> MathRender {
        let key = (crc32fast::hash(source.as_bytes()), display);
        if let Ok(cache) = self.cache.lock() {
            if let Some((cached_source, render)) = cache.get(&key) {
                if cached_source == source {
                    return render.clone();
                }
            }
        }
        debug!(fingerprint = key.0, "Laying out math");
        let render = self.inner.layout_math(source, display);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, (source.to_string(), render.clone()));
        }
        render
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl MathLayout for Counting {
        fn layout_math(&self, source: &str, display: bool) -> MathRender {
            self.0.fetch_add(1, Ordering::SeqCst);
            PlainMathLayout.layout_math(source, display)
        }
    }

    #[test]
    fn test_plain_layout() {
        let render = PlainMathLayout.layout_math(" x^2 +\n y ", false);
        assert_eq!(render.glyphs, "x^2 + y");
        assert_eq!(render.width, 7);
        assert_eq!(PlainMathLayout.layout_math("  ", true).width, 1);
    }

    #[test]
    fn test_cache_hits() {
        let cached = CachedMathLayout::new(Counting(AtomicUsize::new(0)));
        cached.layout_math("a+b", false);
        cached.layout_math("a+b", false);
        cached.layout_math("a+b", true);
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len(), 2);
    }
}

use super::{
    AnalysisProvider, AnalysisRequest, AnalysisResult, HealthHint, ProviderError, ProviderKind,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Only this many characters of input are scanned, bounding local compute
const MAX_SCAN_CHARS: usize = 4096;

/// Fallback answers never claim more confidence than this
pub const MAX_FALLBACK_CONFIDENCE: f32 = 0.4;

const NEUTRAL_CONFIDENCE: f32 = 0.1;

struct Lexicon {
    emotion: &'static str,
    valence: f32,
    words: &'static [&'static str],
}

const LEXICON: &[Lexicon] = &[
    Lexicon {
        emotion: "joy",
        valence: 0.8,
        words: &[
            "happy", "joy", "glad", "love", "wonderful", "great", "delight", "excited", "smile",
            "laugh", "bright", "amazing", "beautiful",
        ],
    },
    Lexicon {
        emotion: "sadness",
        valence: -0.7,
        words: &[
            "sad", "cry", "tears", "lonely", "miss", "grief", "sorrow", "down", "empty", "lost",
            "depressed", "heartbroken",
        ],
    },
    Lexicon {
        emotion: "anger",
        valence: -0.8,
        words: &[
            "angry", "mad", "furious", "hate", "rage", "annoyed", "frustrated", "irritated",
        ],
    },
    Lexicon {
        emotion: "fear",
        valence: -0.6,
        words: &[
            "afraid", "scared", "fear", "anxious", "worried", "nervous", "panic", "terrified",
        ],
    },
    Lexicon {
        emotion: "surprise",
        valence: 0.2,
        words: &["wow", "surprised", "unexpected", "suddenly", "shocked", "astonished"],
    },
    Lexicon {
        emotion: "calm",
        valence: 0.4,
        words: &[
            "calm", "peace", "peaceful", "quiet", "relaxed", "serene", "gentle", "still", "soft",
        ],
    },
];

/// Lexicon-based local analysis used when the primary provider is unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordProvider;

impl KeywordProvider {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous analysis; infallible
    pub fn classify(&self, request: &AnalysisRequest) -> AnalysisResult {
        let text: String = request.text.chars().take(MAX_SCAN_CHARS).collect();
        let lowered = text.to_lowercase();

        let mut hits: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
        {
            for (index, entry) in LEXICON.iter().enumerate() {
                if entry.words.iter().any(|w| *w == word) {
                    let matched = hits.entry(index).or_default();
                    if !matched.iter().any(|m| m == word) {
                        matched.push(word.to_string());
                    }
                }
            }
        }

        // Ties resolve to the entry listed first in the lexicon
        let best = hits
            .iter()
            .max_by(|(ia, a), (ib, b)| a.len().cmp(&b.len()).then(ib.cmp(ia)));

        let exclamations = text.chars().filter(|c| *c == '!').count().min(3) as f32;

        match best {
            Some((&index, keywords)) => {
                let entry = &LEXICON[index];
                let strength = keywords.len() as f32;
                AnalysisResult {
                    emotion: entry.emotion.to_string(),
                    sentiment: entry.valence,
                    intensity: (0.3 + 0.2 * strength + 0.1 * exclamations).min(1.0),
                    confidence: (0.15 + 0.05 * strength).min(MAX_FALLBACK_CONFIDENCE),
                    keywords: keywords.clone(),
                    provider: ProviderKind::Fallback,
                    degraded: true,
                }
            }
            None => AnalysisResult {
                emotion: "neutral".to_string(),
                sentiment: 0.0,
                intensity: (0.2 + 0.1 * exclamations).min(1.0),
                confidence: NEUTRAL_CONFIDENCE,
                keywords: Vec::new(),
                provider: ProviderKind::Fallback,
                degraded: true,
            },
        }
    }
}

#[async_trait]
impl AnalysisProvider for KeywordProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fallback
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ProviderError> {
        Ok(self.classify(request))
    }

    fn health_hint(&self) -> HealthHint {
        HealthHint {
            ok: true,
            name: "keyword-fallback".to_string(),
        }
    }
}

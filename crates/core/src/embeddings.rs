use rayon::prelude::*;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

const FNV_OFFSET: u64 = 1469598103934665603;
const FNV_PRIME: u64 = 1099511628211;

/// Maps text to fixed-length vectors. Implementations must be deterministic:
/// the same text always yields the same vector.
pub trait Encoder: Send + Sync {
    /// Identifies the vector space; indexes built with another id are not
    /// searchable with this encoder.
    fn model_id(&self) -> String;

    fn dimensions(&self) -> usize;

    fn encode(&self, text: &str) -> Vec<f32>;

    /// Output order matches input order.
    fn encode_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }
}

/// Feature-hashing encoder over character trigrams and word unigrams.
#[derive(Debug, Clone, Copy)]
pub struct HashingEncoder {
    pub dimensions: usize,
    /// Relative weight of whole-word features against trigram features.
    pub word_weight: f32,
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            word_weight: 2.0,
        }
    }
}

impl HashingEncoder {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl Encoder for HashingEncoder {
    fn model_id(&self) -> String {
        format!("hashing-trigram-word-v1/{}", self.word_weight)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();
        let buckets = vector.len() as u64;

        let chars: Vec<char> = lowered.chars().collect();
        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            vector[(fnv1a(&token) % buckets) as usize] += 1.0;
        }

        for word in lowered
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let token = format!("w:{word}");
            vector[(fnv1a(&token) % buckets) as usize] += self.word_weight;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Position of a reaction template in the loaded `TemplateSet`.
pub type TemplateId = usize;

/// Position of a building block in the ordered `Catalog`.
pub type CatalogIndex = usize;

/// Fixed-length molecular fingerprint bit-vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(Vec<bool>);

impl Fingerprint {
    pub fn new(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![false; len])
    }

    /// Uniform random bits.
    pub fn random<R: Rng>(len: usize, rng: &mut R) -> Self {
        Self((0..len).map(|_| rng.gen::<bool>()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn get(&self, i: usize) -> bool {
        self.0[i]
    }

    pub fn set(&mut self, i: usize, value: bool) {
        self.0[i] = value;
    }

    pub fn flip(&mut self, i: usize) {
        self.0[i] = !self.0[i];
    }

    pub fn count_ones(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    /// Tanimoto (Jaccard) similarity. Two empty fingerprints are identical.
    pub fn tanimoto(&self, other: &Fingerprint) -> f64 {
        let mut both = 0usize;
        let mut either = 0usize;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            if *a && *b {
                both += 1;
            }
            if *a || *b {
                either += 1;
            }
        }
        if either == 0 {
            1.0
        } else {
            both as f64 / either as f64
        }
    }

    pub fn to_f64(&self) -> Vec<f64> {
        self.0.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()
    }
}

/// What a decode is trying to synthesize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// A known molecule identifier (canonical SMILES or similar).
    Molecule(String),
    /// A fingerprint with no known molecule behind it (genetic search).
    Fingerprint(Fingerprint),
}

impl Target {
    pub fn molecule(&self) -> Option<&str> {
        match self {
            Target::Molecule(id) => Some(id),
            Target::Fingerprint(_) => None,
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Target::Molecule(_) => None,
            Target::Fingerprint(fp) => Some(fp),
        }
    }
}

/// Distance used for nearest-neighbour search over building-block embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Manhattan,
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tanimoto() {
        let a = Fingerprint::new(vec![true, true, false, false]);
        let b = Fingerprint::new(vec![true, false, true, false]);
        assert!((a.tanimoto(&b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(a.tanimoto(&a), 1.0);
        assert_eq!(Fingerprint::zeros(4).tanimoto(&Fingerprint::zeros(4)), 1.0);
    }

    #[test]
    fn test_distance_metrics() {
        let a = [0.0, 3.0];
        let b = [4.0, 0.0];
        assert_eq!(DistanceMetric::Manhattan.distance(&a, &b), 7.0);
        assert_eq!(DistanceMetric::Euclidean.distance(&a, &b), 5.0);
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
    }
}

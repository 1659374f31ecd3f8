use std::cmp::Ordering;

use ndarray::ArrayView1;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Class probabilities, most likely first.
///
/// Serializes as a JSON object whose keys keep the ranked order.
#[derive(Clone, Debug, PartialEq)]
pub struct Probabilities(pub Vec<(String, f64)>);

impl Probabilities {
    pub fn top(&self) -> Option<(&str, f64)> {
        self.0.first().map(|(class, p)| (class.as_str(), *p))
    }

    pub fn get(&self, class: &str) -> Option<f64> {
        self.0.iter().find(|(c, _)| c == class).map(|(_, p)| *p)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (class, p) in &self.0 {
            map.serialize_entry(class, p)?;
        }
        map.end()
    }
}

/// Pairs every class with its probability and sorts by probability,
/// descending.
///
/// The sort is stable, so classes with equal probability stay in label
/// encoder order.
pub fn rank_probabilities(probs: ArrayView1<f32>, classes: &[String]) -> Probabilities {
    let mut ranked: Vec<(String, f64)> = classes
        .iter()
        .zip(probs.iter())
        .map(|(class, &p)| (class.clone(), f64::from(p)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    Probabilities(ranked)
}

//! Picks one representative n-gram per filter width from convolution
//! activations.
//!
//! Each channel of a branch is reduced by max pooling to the value at a single
//! sequence position. The position chosen most often across channels marks
//! the text that branch responds to; this module reports the span starting at
//! the *second* most frequent position (or the only one when every channel
//! agrees).

use ndarray::{ArrayView2, Axis};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A span of tokens `[start, end)` and its text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NGramSpan {
    pub n_gram: String,
    pub start: usize,
    pub end: usize,
}

/// Representative spans keyed by filter size, in configured filter order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopNGrams(pub Vec<(usize, NGramSpan)>);

impl TopNGrams {
    pub fn get(&self, filter_size: usize) -> Option<&NGramSpan> {
        self.0
            .iter()
            .find(|(size, _)| *size == filter_size)
            .map(|(_, span)| span)
    }

    pub fn filter_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|(size, _)| *size)
    }

    /// Inserts or, for a repeated filter size, overwrites in place.
    fn put(&mut self, filter_size: usize, span: NGramSpan) {
        match self.0.iter_mut().find(|(size, _)| *size == filter_size) {
            Some(slot) => slot.1 = span,
            None => self.0.push((filter_size, span)),
        }
    }
}

impl Serialize for TopNGrams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (size, span) in &self.0 {
            map.serialize_entry(&size.to_string(), span)?;
        }
        map.end()
    }
}

/// Position of the maximum activation of every channel of a
/// `[seq, channels]` tensor. The first maximum wins on ties.
pub fn argmax_positions(activations: ArrayView2<f32>) -> Vec<usize> {
    activations
        .axis_iter(Axis(1))
        .map(|channel| {
            let mut best = 0;
            for (t, &v) in channel.iter().enumerate() {
                if v > channel[best] {
                    best = t;
                }
            }
            best
        })
        .collect()
}

/// Positions with their frequency, most common first. Positions with equal
/// counts keep the order in which they were first seen.
pub fn most_common(positions: &[usize]) -> Vec<(usize, usize)> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for &p in positions {
        match counts.iter_mut().find(|(pos, _)| *pos == p) {
            Some(entry) => entry.1 += 1,
            None => counts.push((p, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Start position representing one branch: the last of the two most common
/// max-pooling positions. `None` only when there are no channels.
pub fn representative_start(activations: ArrayView2<f32>) -> Option<usize> {
    let ranked = most_common(&argmax_positions(activations));
    ranked.iter().take(2).last().map(|(pos, _)| *pos)
}

/// Clips `[start, start + filter_size)` to the available tokens.
pub fn span_bounds(start: usize, filter_size: usize, token_count: usize) -> (usize, usize) {
    let start = start.min(token_count);
    let end = token_count.min(start + filter_size);
    (start, end)
}

/// Builds the representative n-gram for every filter size.
///
/// `conv_outputs[i]` is the `[seq, channels]` activation of the branch with
/// width `filter_sizes[i]` for one sample.
pub fn top_n_grams(
    tokens: &[&str],
    conv_outputs: &[ArrayView2<f32>],
    filter_sizes: &[usize],
) -> TopNGrams {
    let mut n_grams = TopNGrams::default();
    for (&filter_size, activations) in filter_sizes.iter().zip(conv_outputs) {
        let start = representative_start(activations.view()).unwrap_or(0);
        let (start, end) = span_bounds(start, filter_size, tokens.len());
        n_grams.put(
            filter_size,
            NGramSpan {
                n_gram: tokens[start..end].join(" "),
                start,
                end,
            },
        );
    }
    n_grams
}

//! Reciprocal Rank Fusion.
//!
//! Fuses ranked candidate lists by summing `1 / (k0 + rank)` per list a
//! candidate appears in (1-based ranks). Candidates found in a single list
//! still score from that list alone. Output order is stable: equal scores
//! keep first-retrieval order (earlier list first).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::ScoredChunk;

pub const RRF_K0: f32 = 60.0;

pub fn rrf_fuse(lists: &[Vec<ScoredChunk>], k0: f32) -> Vec<ScoredChunk> {
    let mut first_seen: Vec<String> = Vec::new();
    let mut fused: HashMap<String, ScoredChunk> = HashMap::new();

    for list in lists {
        for (index, item) in list.iter().enumerate() {
            let contribution = 1.0 / (k0 + (index + 1) as f32);
            match fused.entry(item.chunk.chunk_id.clone()) {
                Entry::Occupied(mut entry) => entry.get_mut().score += contribution,
                Entry::Vacant(entry) => {
                    first_seen.push(item.chunk.chunk_id.clone());
                    entry.insert(ScoredChunk {
                        chunk: item.chunk.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    let mut result: Vec<ScoredChunk> = first_seen
        .into_iter()
        .filter_map(|chunk_id| fused.remove(&chunk_id))
        .collect();

    // Stable sort keeps first-retrieval order on ties.
    result.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result
}

/// Reciprocal rank fusion over independently ranked candidate lists.
///
/// Each list contributes `weight / (k + rank)` per candidate, rank being
/// 1-based. A candidate absent from a list simply contributes nothing;
/// there is no penalty term, which is what lets the lexical-only
/// degradation path reuse this unchanged.
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Lexical,
    VectorText,
    VectorCode,
}

/// One ranked candidate list, best first.
pub struct RankedList {
    pub signal: Signal,
    pub weight: f32,
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: i64,
    pub score: f32,
    pub lexical_rank: Option<usize>,
    /// Best rank across the two vector lists.
    pub vector_rank: Option<usize>,
}

pub fn fuse(lists: &[RankedList], k: f32) -> Vec<FusedHit> {
    let mut fused: HashMap<i64, FusedHit> = HashMap::new();

    for list in lists {
        for (i, &chunk_id) in list.ids.iter().enumerate() {
            let rank = i + 1;
            let entry = fused.entry(chunk_id).or_insert(FusedHit {
                chunk_id,
                score: 0.0,
                lexical_rank: None,
                vector_rank: None,
            });
            entry.score += list.weight / (k + rank as f32);
            match list.signal {
                Signal::Lexical => {
                    entry.lexical_rank = Some(match entry.lexical_rank {
                        Some(r) => r.min(rank),
                        None => rank,
                    });
                }
                Signal::VectorText | Signal::VectorCode => {
                    entry.vector_rank = Some(match entry.vector_rank {
                        Some(r) => r.min(rank),
                        None => rank,
                    });
                }
            }
        }
    }

    let mut hits: Vec<FusedHit> = fused.into_values().collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(signal: Signal, weight: f32, ids: &[i64]) -> RankedList {
        RankedList {
            signal,
            weight,
            ids: ids.to_vec(),
        }
    }

    #[test]
    fn test_agreement_outranks_single_signal() {
        // id 1 appears mid-list in both signals; id 2 tops one list only.
        let lists = vec![
            list(Signal::Lexical, 1.0, &[2, 1, 3]),
            list(Signal::VectorCode, 1.0, &[4, 1, 5]),
        ];
        let hits = fuse(&lists, 60.0);
        assert_eq!(hits[0].chunk_id, 1, "two mid ranks beat one top rank");
    }

    #[test]
    fn test_ranks_recorded() {
        let lists = vec![
            list(Signal::Lexical, 1.0, &[7, 8]),
            list(Signal::VectorText, 1.0, &[8, 9]),
            list(Signal::VectorCode, 1.0, &[9, 8]),
        ];
        let hits = fuse(&lists, 60.0);
        let hit8 = hits.iter().find(|h| h.chunk_id == 8).unwrap();
        assert_eq!(hit8.lexical_rank, Some(2));
        assert_eq!(hit8.vector_rank, Some(1), "best of the two vector lists");

        let hit7 = hits.iter().find(|h| h.chunk_id == 7).unwrap();
        assert_eq!(hit7.vector_rank, None);
    }

    #[test]
    fn test_monotonicity_in_rank() {
        // Better rank in one list, all else equal, never scores lower.
        let lists = vec![
            list(Signal::Lexical, 1.0, &[1, 2]),
            list(Signal::VectorCode, 1.0, &[1, 2]),
        ];
        let hits = fuse(&lists, 60.0);
        assert!(hits[0].chunk_id == 1 && hits[0].score > hits[1].score);
    }

    #[test]
    fn test_weights_shift_ranking() {
        let lists = vec![
            list(Signal::Lexical, 2.0, &[1]),
            list(Signal::VectorCode, 0.5, &[2]),
        ];
        let hits = fuse(&lists, 60.0);
        assert_eq!(hits[0].chunk_id, 1);
        assert!(hits[0].score > hits[1].score * 3.0);
    }

    #[test]
    fn test_deterministic_tiebreak() {
        let lists = vec![list(Signal::Lexical, 1.0, &[5]), list(Signal::VectorText, 1.0, &[3])];
        let hits = fuse(&lists, 60.0);
        // Equal scores: lower chunk id first.
        assert_eq!(hits[0].chunk_id, 3);
    }
}

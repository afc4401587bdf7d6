//! Survivor selection (spec §4.5): a mutually-exclusive 4-step decision
//! tree, not a layered floor-then-rescue backfill. Natural survivors win
//! outright when there are any; floor and rescue are two distinct ways of
//! keeping the generation alive when there are none, not a pair of filler
//! passes stacked on top of a short natural list.

use ordered_float::OrderedFloat;

use crate::{executor::Decision, graph::GraphId};

/// One candidate considered for survival: enough to rank and identify, not
/// the full graph/result (callers zip the returned indices back against
/// their own candidate list).
#[derive(Debug, Clone, Copy)]
pub struct CandidateRef {
    pub graph_id: GraphId,
    pub fitness: f64,
    pub decision: Decision,
}

/// The outcome of one generation's survivor selection: which candidates
/// survive, in selection order, and which (if either) of the two
/// dead-generation escape hatches fired.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    /// Indices into the `candidates` slice passed to `select_survivors`.
    pub survivors: Vec<usize>,
    /// Indices promoted outside the natural `Decision::Survive` cutoff,
    /// tagged with the `_survivors_override` flag (spec §4.5 step 2).
    pub survivors_override: Vec<usize>,
    /// Indices promoted via the `_rescue_from_dead` path (spec §4.5 step 3).
    pub rescue_from_dead: Vec<usize>,
    pub survivor_floor_triggered: bool,
    pub rescue_from_best_dead_triggered: bool,
}

fn rank(candidates: &[CandidateRef]) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..candidates.len()).collect();
    // `OrderedFloat` gives a total order even if a fitness ever comes back
    // NaN (e.g. division by zero in an adequacy factor), which a bare
    // `partial_cmp(...).unwrap()` would panic on.
    ranked.sort_by(|&a, &b| {
        OrderedFloat(candidates[b].fitness)
            .cmp(&OrderedFloat(candidates[a].fitness))
            .then_with(|| candidates[a].graph_id.cmp(&candidates[b].graph_id))
    });
    ranked
}

/// Runs the spec's 4-step selection tree for one generation.
///
/// 1. Natural survivors = top `survivors_per_layer` of `Decision::Survive`
///    candidates, best fitness first. If non-empty, these are the result
///    and neither floor nor rescue runs.
/// 2. Else, if `min_survivors_floor > 0`: survivors = top
///    `min_survivors_floor` by fitness regardless of decision, each tagged
///    `_survivors_override`.
/// 3. Else, if `rescue_mode`: survivors = top 2 by fitness, each tagged
///    `_rescue_from_dead`.
/// 4. Else: the generation produces no survivors and the loop terminates.
pub fn select_survivors(
    candidates: &[CandidateRef],
    survivors_per_layer: usize,
    min_survivors_floor: usize,
    rescue_mode: bool,
) -> SelectionResult {
    let ranked = rank(candidates);

    let natural: Vec<usize> = ranked
        .iter()
        .copied()
        .filter(|&i| candidates[i].decision == Decision::Survive)
        .take(survivors_per_layer)
        .collect();

    if !natural.is_empty() {
        return SelectionResult { survivors: natural, ..Default::default() };
    }

    if min_survivors_floor > 0 {
        let promoted: Vec<usize> = ranked.iter().copied().take(min_survivors_floor).collect();
        return SelectionResult {
            survivors: promoted.clone(),
            survivors_override: promoted,
            survivor_floor_triggered: true,
            ..Default::default()
        };
    }

    if rescue_mode {
        let rescued: Vec<usize> = ranked.iter().copied().take(2).collect();
        return SelectionResult {
            survivors: rescued.clone(),
            rescue_from_dead: rescued,
            rescue_from_best_dead_triggered: true,
            ..Default::default()
        };
    }

    SelectionResult::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(fitness: f64, decision: Decision) -> CandidateRef {
        CandidateRef { graph_id: GraphId::new(), fitness, decision }
    }

    #[test]
    fn natural_survivors_skip_floor_and_rescue_entirely() {
        let candidates = vec![candidate(0.5, Decision::Survive), candidate(0.3, Decision::Kill)];
        let result = select_survivors(&candidates, 3, 1, true);
        assert_eq!(result.survivors, vec![0]);
        assert!(!result.survivor_floor_triggered);
        assert!(!result.rescue_from_best_dead_triggered);
    }

    #[test]
    fn floor_promotes_best_candidates_when_nothing_naturally_survives() {
        let candidates = vec![
            candidate(0.5, Decision::Kill),
            candidate(-1.0, Decision::Kill),
            candidate(-2.0, Decision::Kill),
        ];
        let result = select_survivors(&candidates, 5, 1, false);
        assert_eq!(result.survivors, vec![0]);
        assert_eq!(result.survivors_override, vec![0]);
        assert!(result.survivor_floor_triggered);
        assert!(!result.rescue_from_best_dead_triggered);
    }

    #[test]
    fn rescue_only_fires_when_floor_is_disabled_and_nothing_survives() {
        let candidates = vec![
            candidate(0.3, Decision::Kill),
            candidate(0.1, Decision::Kill),
            candidate(-0.5, Decision::Kill),
        ];
        let result = select_survivors(&candidates, 3, 0, true);
        assert_eq!(result.survivors, vec![0, 1]);
        assert_eq!(result.rescue_from_dead, vec![0, 1]);
        assert!(!result.survivor_floor_triggered);
        assert!(result.rescue_from_best_dead_triggered);
    }

    #[test]
    fn nothing_survives_and_floor_and_rescue_are_both_off() {
        let candidates = vec![candidate(0.3, Decision::Kill), candidate(-0.5, Decision::Kill)];
        let result = select_survivors(&candidates, 3, 0, false);
        assert!(result.survivors.is_empty());
        assert!(!result.survivor_floor_triggered);
        assert!(!result.rescue_from_best_dead_triggered);
    }
}

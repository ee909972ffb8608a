//! Top-K nearest neighbor pruning of pairwise tensors

use burn::prelude::*;

use super::tensors::planar_distance;

/// Which neighbor slots a pairwise tensor was reduced to
#[derive(Debug, Clone)]
pub enum NeighborSelection<B: Backend> {
    /// The swarm is no larger than K; every pair is kept
    All,
    /// Column indices of each agent's K nearest agents, `[n, k]`
    TopK(Tensor<B, 2, Int>),
}

impl<B: Backend> NeighborSelection<B> {
    pub fn is_pruned(&self) -> bool {
        matches!(self, NeighborSelection::TopK(_))
    }

    /// Number of neighbor slots per agent for a swarm of `num_agents`
    pub fn slots(&self, num_agents: usize) -> usize {
        match self {
            NeighborSelection::All => num_agents,
            NeighborSelection::TopK(indices) => indices.dims()[1],
        }
    }
}

/// Reduce a `[n, n, c]` pairwise tensor to `[n, k, c]`.
///
/// Swarms with `n <= k` are returned unchanged. Otherwise the slots come from
/// `previous` when it holds indices, so a next-state evaluation sees the same
/// neighbors as the current one, or from the k smallest planar distances.
pub fn select_neighbors<B: Backend>(
    x: Tensor<B, 3>,
    k: usize,
    previous: Option<&NeighborSelection<B>>,
) -> (Tensor<B, 3>, NeighborSelection<B>) {
    let [n, _, _] = x.dims();
    if n <= k {
        return (x, NeighborSelection::All);
    }

    let indices = match previous {
        Some(NeighborSelection::TopK(indices)) => indices.clone(),
        _ => nearest_indices(x.clone(), k),
    };
    let gathered = gather_neighbors(x, indices.clone());
    (gathered, NeighborSelection::TopK(indices))
}

fn nearest_indices<B: Backend>(x: Tensor<B, 3>, k: usize) -> Tensor<B, 2, Int> {
    let [n, m, _] = x.dims();
    let dist = planar_distance(x.detach(), 1e-6).reshape([n, m]);
    dist.argsort(1).slice([0..n, 0..k])
}

fn gather_neighbors<B: Backend>(x: Tensor<B, 3>, indices: Tensor<B, 2, Int>) -> Tensor<B, 3> {
    let [_, _, c] = x.dims();
    let indices = indices.unsqueeze_dim::<3>(2).repeat_dim(2, c);
    x.gather(1, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tensors::{relative_states, states_to_tensor, tensor_to_vec};
    use crate::infra::{AgentState, Vec2};
    use burn::backend::NdArray;

    type B = NdArray;

    fn line_of_agents(xs: &[f32]) -> Vec<AgentState> {
        xs.iter()
            .map(|&x| AgentState::at_rest(Vec2::new(x, 0.0)))
            .collect()
    }

    #[test]
    fn test_small_swarm_is_not_pruned() {
        let device = Default::default();
        let states = line_of_agents(&[0.0, 1.0, 2.0]);
        let x = relative_states(states_to_tensor::<B>(&states, &device));
        let expected = tensor_to_vec(x.clone());

        let (kept, selection) = select_neighbors(x, 3, None);
        assert!(!selection.is_pruned());
        assert_eq!(kept.dims(), [3, 3, 4]);
        assert_eq!(tensor_to_vec(kept), expected);
    }

    #[test]
    fn test_prunes_to_nearest() {
        let device = Default::default();
        let states = line_of_agents(&[0.0, 1.0, 2.5, 5.0, 10.0]);
        let x = relative_states(states_to_tensor::<B>(&states, &device));

        let (kept, selection) = select_neighbors(x, 2, None);
        assert_eq!(kept.dims(), [5, 2, 4]);
        assert_eq!(selection.slots(5), 2);

        let NeighborSelection::TopK(indices) = selection else {
            panic!("expected pruning");
        };
        let indices: Vec<i64> = indices.into_data().iter::<i64>().collect();
        // Each agent's nearest slot is itself
        assert_eq!(indices, vec![0, 1, 1, 0, 2, 1, 3, 2, 4, 3]);
    }

    #[test]
    fn test_reuses_previous_selection() {
        let device = Default::default();
        let states = line_of_agents(&[0.0, 1.0, 2.5, 5.0, 10.0]);
        let x = relative_states(states_to_tensor::<B>(&states, &device));
        let (_, selection) = select_neighbors(x, 2, None);

        // Agent 4 moves next to agent 0; the cached slots must not change
        let moved = line_of_agents(&[0.0, 1.0, 2.5, 5.0, 0.1]);
        let x_moved = relative_states(states_to_tensor::<B>(&moved, &device));
        let (kept, reused) = select_neighbors(x_moved, 2, Some(&selection));

        let (NeighborSelection::TopK(a), NeighborSelection::TopK(b)) = (selection, reused) else {
            panic!("expected pruning");
        };
        let a: Vec<i64> = a.into_data().iter::<i64>().collect();
        let b: Vec<i64> = b.into_data().iter::<i64>().collect();
        assert_eq!(a, b);

        // Agent 0 still sees itself and agent 1, not agent 4
        let values = tensor_to_vec(kept);
        assert!((values[4] - (-1.0)).abs() < 1e-6);
    }
}

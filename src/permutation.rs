// permutation.rs

use crate::config::SimulationRng;
use rand::seq::SliceRandom;

/// Current assignment of input haplotype slots to output slots, plus how
/// often each slot took part in a switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermutationState {
    mapping: Vec<usize>,
    switch_counts: Vec<u64>,
}

impl PermutationState {
    /// Identity mapping over `slot_count` slots with the active slots
    /// relabeled by one uniform shuffle. Inactive slots keep their own index.
    pub fn initialize(slot_count: usize, active_slots: &[usize], rng: &mut SimulationRng) -> Self {
        let mut mapping: Vec<usize> = (0..slot_count).collect();
        let mut targets = active_slots.to_vec();
        targets.shuffle(rng);
        for (&slot, &target) in active_slots.iter().zip(targets.iter()) {
            mapping[slot] = target;
        }
        Self {
            mapping,
            switch_counts: vec![0; slot_count],
        }
    }

    /// Exchanges where `slot_a` and `slot_b` are written.
    #[inline]
    pub fn apply_switch(&mut self, slot_a: usize, slot_b: usize) {
        self.mapping.swap(slot_a, slot_b);
        self.switch_counts[slot_a] += 1;
        self.switch_counts[slot_b] += 1;
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }

    pub fn switch_counts(&self) -> &[u64] {
        &self.switch_counts
    }

    pub fn is_bijection(&self) -> bool {
        let mut seen = vec![false; self.mapping.len()];
        for &target in &self.mapping {
            if target >= seen.len() || seen[target] {
                return false;
            }
            seen[target] = true;
        }
        true
    }

    /// Writes `input[i]` to `output[mapping[i]]`.
    pub fn scatter<T: Copy>(&self, input: &[T], output: &mut Vec<T>) {
        output.clear();
        output.extend_from_slice(input);
        for (slot, &value) in input.iter().enumerate() {
            output[self.mapping[slot]] = value;
        }
    }
}

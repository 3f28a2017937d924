//! Lazily-recomputed per-variable jump cache (§3.3 `JumpTable`, feasibility_jump.h `JumpTable`).

/// Caches `compute_jump(var) -> (delta, score)` per variable, recomputing
/// lazily via a supplied closure (§4.B.4 step 1).
pub struct JumpTable {
    compute_jump: Option<Box<dyn FnMut(usize) -> (i64, f64)>>,
    deltas: Vec<i64>,
    scores: Vec<f64>,
    needs_recomputation: Vec<bool>,
}

impl std::fmt::Debug for JumpTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JumpTable")
            .field("deltas", &self.deltas)
            .field("scores", &self.scores)
            .field("needs_recomputation", &self.needs_recomputation)
            .finish()
    }
}

impl JumpTable {
    /// An empty table; call [`Self::set_compute_function`] and
    /// [`Self::recompute_all`] before use.
    pub fn new() -> Self {
        JumpTable {
            compute_jump: None,
            deltas: Vec::new(),
            scores: Vec::new(),
            needs_recomputation: Vec::new(),
        }
    }

    /// Install the jump-computation closure used by [`Self::get_jump`].
    pub fn set_compute_function(&mut self, f: Box<dyn FnMut(usize) -> (i64, f64)>) {
        self.compute_jump = Some(f);
    }

    /// Resize to `num_variables` and mark every variable's jump as stale.
    pub fn recompute_all(&mut self, num_variables: usize) {
        self.deltas = vec![0; num_variables];
        self.scores = vec![0.0; num_variables];
        self.needs_recomputation = vec![true; num_variables];
    }

    /// Get the jump for `var`, recomputing it first if it is stale.
    pub fn get_jump(&mut self, var: usize) -> (i64, f64) {
        if self.needs_recomputation[var] {
            let f = self
                .compute_jump
                .as_mut()
                .expect("compute function must be installed before get_jump");
            let (delta, score) = f(var);
            self.deltas[var] = delta;
            self.scores[var] = score;
            self.needs_recomputation[var] = false;
        }
        (self.deltas[var], self.scores[var])
    }

    /// Directly set a known jump (e.g. undoing a just-performed move, or
    /// after a weight rescale that only needs a uniform score rewrite).
    pub fn set_jump(&mut self, var: usize, delta: i64, score: f64) {
        self.deltas[var] = delta;
        self.scores[var] = score;
        self.needs_recomputation[var] = false;
    }

    /// Mark `var`'s jump as stale; recomputed lazily on the next `get_jump`.
    pub fn recompute(&mut self, var: usize) {
        self.needs_recomputation[var] = true;
    }

    /// Whether `var`'s jump is currently marked stale.
    pub fn needs_recomputation(&self, var: usize) -> bool {
        self.needs_recomputation[var]
    }

    /// The cached score for `var`, valid only when not stale.
    pub fn score(&self, var: usize) -> f64 {
        self.scores[var]
    }

    /// Read-only view of every cached delta, for incremental score updates
    /// that need "what would var do if it jumped right now".
    pub fn deltas(&self) -> &[i64] {
        &self.deltas
    }

    /// Read-only view of every cached score.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Mutable view of every cached score, for batched incremental updates.
    pub fn scores_mut(&mut self) -> &mut [f64] {
        &mut self.scores
    }
}

impl Default for JumpTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompute_all_marks_every_variable_stale() {
        let mut jt = JumpTable::new();
        jt.recompute_all(3);
        assert!((0..3).all(|v| jt.needs_recomputation(v)));
    }

    #[test]
    fn get_jump_calls_compute_function_once_until_marked_stale_again() {
        let mut jt = JumpTable::new();
        jt.recompute_all(2);
        let calls = std::rc::Rc::new(std::cell::RefCell::new(0));
        let calls2 = calls.clone();
        jt.set_compute_function(Box::new(move |v| {
            *calls2.borrow_mut() += 1;
            (v as i64 + 1, -1.0)
        }));
        assert_eq!(jt.get_jump(0), (1, -1.0));
        assert_eq!(jt.get_jump(0), (1, -1.0));
        assert_eq!(*calls.borrow(), 1);
        jt.recompute(0);
        assert_eq!(jt.get_jump(0), (1, -1.0));
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn set_jump_avoids_recomputation() {
        let mut jt = JumpTable::new();
        jt.recompute_all(1);
        jt.set_jump(0, -5, 3.0);
        assert!(!jt.needs_recomputation(0));
        assert_eq!(jt.score(0), 3.0);
    }
}

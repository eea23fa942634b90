use super::*;

pub mod ascend;
pub use ascend::*;

pub mod descend;
pub use descend::*;

/// Geometric step-doubling line search along a gradient, shared by the
/// `descend` and `ascend` directions of spec §4.3. The two directions are
/// symmetric except for: the comparison that decides "is this candidate
/// better", which sign a coordinate's delta takes, and the per-coordinate
/// refinement skip predicate (`pct < 0.01` for descend, `pct == 0.0`
/// exact for ascend — an intentional asymmetry, preserved as-is).
pub trait LineSearch {
    /// Is `candidate` strictly better than `current` for this search's goal?
    fn improves(&self, candidate: Cost, current: Cost) -> bool;

    /// Does an `Ascending`-labeled coordinate move by `+delta` (true) or
    /// `-delta` (false) in this search? `Descending` always takes the
    /// opposite sign.
    fn ascending_adds(&self) -> bool;

    /// Per-coordinate refinement (Phase 2): should a coordinate with this
    /// normalized weight be skipped?
    fn refinement_skip(&self, pct: f64) -> bool;

    /// `pct * step`, computed in extended precision and truncated to an
    /// 8-bit modular delta (lower precision here can change tie-break
    /// outcomes, per spec §9).
    fn delta_for(&self, element: &GradientElement, step: f64) -> u8 {
        let magnitude = (*element.pct() * step).floor();
        let magnitude = if magnitude < 0.0 { 0.0 } else { magnitude };
        magnitude as u64 as u8
    }

    /// Apply this search's signed delta to one coordinate's word.
    /// Stationary coordinates are untouched.
    fn apply_coordinate(&self, word: Word, element: &GradientElement, step: f64) -> Word {
        let delta = self.delta_for(element, step);
        match element.direction() {
            Direction::Stationary => word,
            Direction::Ascending if self.ascending_adds() => wrapping_add_delta(word, delta),
            Direction::Ascending => wrapping_sub_delta(word, delta),
            Direction::Descending if self.ascending_adds() => wrapping_sub_delta(word, delta),
            Direction::Descending => wrapping_add_delta(word, delta),
        }
    }

    /// `compute_delta_all`: apply this search's per-coordinate delta to
    /// every coordinate of `x` at once, at the given `step`.
    fn apply_delta_all(
        &self,
        x: &Assignment,
        gradient: &[GradientElement],
        step: f64,
    ) -> Assignment {
        x.iter()
            .zip(gradient.iter())
            .map(|(&word, element)| self.apply_coordinate(word, element, step))
            .collect()
    }

    /// The shared step-doubling inner loop: repeatedly apply a delta at
    /// `step = 1, 2, 4, ...` while each step improves on the previous
    /// point, then stop and report the last improving point (or the
    /// starting point, if the very first step failed to improve).
    fn double_while_improving(
        &self,
        objective: &mut impl Objective,
        x0: &Assignment,
        f0: Cost,
        mut apply: impl FnMut(&Assignment, f64) -> Assignment,
    ) -> (Assignment, Cost) {
        let mut x = x0.clone();
        let mut f = f0;
        let mut step = 1.0_f64;
        loop {
            let candidate = apply(&x, step);
            let f_candidate = objective.evaluate(&candidate);
            if !self.improves(f_candidate, f) {
                break;
            }
            x = candidate;
            f = f_candidate;
            step *= 2.0;
        }
        (x, f)
    }

    /// Phase 1 (all-axes doubling) followed by Phase 2 (per-coordinate
    /// refinement, skipped when `n == 1`), per spec §4.3.
    fn search(
        &self,
        objective: &mut impl Objective,
        gradient: &[GradientElement],
        x0: &Assignment,
        f0: Cost,
    ) -> (Assignment, Cost) {
        let n = x0.len();

        let (mut x, mut f) = self.double_while_improving(objective, x0, f0, |x, step| {
            self.apply_delta_all(x, gradient, step)
        });
        debug!(target: "gradsolve::line_search", f0, f_after_phase1 = f, "all-axes doubling done");

        if n > 1 {
            for (i, element) in gradient.iter().enumerate() {
                if self.refinement_skip(*element.pct()) {
                    continue;
                }
                let element = *element;
                let (next_x, next_f) = self.double_while_improving(objective, &x, f, |xs, step| {
                    let mut xs = xs.clone();
                    xs[i] = self.apply_coordinate(xs[i], &element, step);
                    xs
                });
                x = next_x;
                f = next_f;
            }
            trace!(target: "gradsolve::line_search", f_after_phase2 = f, "per-coordinate refinement done");
        }

        (x, f)
    }
}

use super::*;

/// Fatal, process-level failures (spec §7). Both classes are
/// "this process cannot continue": an unreadable entropy source at
/// construction, or the partial-derivative classifier's declared-
/// unreachable branch (never constructed — [`gradient::classify`] panics
/// directly via `unreachable!()`, which is closer to spec's "aborts"
/// contract than a recoverable `Result`; the variant stays in the enum
/// to document the case).
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("entropy source unavailable")]
    EntropyUnavailable,
    #[error("partial-derivative classifier reached its declared-unreachable branch")]
    ClassifierUnreachable,
}

/// Every numeric knob spec.md pins to a literal constant, made
/// overridable the way the teacher makes `grad_tol`/`alpha`/`beta`
/// overridable on its solvers. `EngineConfig::default()` reproduces the
/// exact shipped behavior.
#[derive(derive_getters::Getters, Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Spec §4.4 `MAX_EPOCH`.
    max_epoch: usize,
    /// Spec §4.4/§9 `MAX_RANDOM_INPUT`. Pinned to `0` upstream, which
    /// makes the outer loop terminate on the first stationary gradient;
    /// kept overridable so the escape path can be exercised.
    max_random_input: usize,
    /// Spec §4.6 `RESEED_RNG`.
    reseed_interval: u64,
    /// Spec §6: "allocates a gradient scratch of initial capacity 10".
    initial_scratch_capacity: usize,
    /// Spec §4.3's descend Phase 2 skip predicate (`pct < threshold`).
    /// Ascend always uses an exact `pct == 0.0` check regardless of this
    /// field — the asymmetry is intentional and not configurable.
    refinement_skip_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_epoch: 1000,
            max_random_input: 0,
            reseed_interval: 10_000,
            initial_scratch_capacity: 10,
            refinement_skip_threshold: 0.01,
        }
    }
}

/// Why an optimization call stopped. None of these are errors — spec §7
/// classes "quiescent" and "convergence" termination as normal, in-band
/// outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The gradient at the start of an epoch was all-zero (a plateau)
    /// and the escape budget (`max_random_input`) was exhausted or zero.
    StationaryGradient,
    /// A line search produced the same cost as the epoch's starting
    /// cost.
    Converged,
    /// `max_epoch` epochs elapsed without convergence.
    EpochLimitReached,
}

/// The result of `minimize`/`maximize`: the caller's output vector and
/// scalar (spec §6), plus why the search stopped and how many epochs it
/// took.
#[derive(derive_getters::Getters, Debug, Clone)]
pub struct OptimizationOutcome {
    x: Assignment,
    f: Cost,
    reason: TerminationReason,
    epochs: usize,
}

/// The result of `descend_once`/`ascend_once`: one gradient build plus
/// one line search.
#[derive(derive_getters::Getters, Debug, Clone)]
pub struct StepOutcome {
    x: Assignment,
    f: Cost,
    /// `true` iff the starting point was already a stationary gradient
    /// (spec §4.5: "returns 1 if the starting point is already a
    /// stationary gradient").
    at_extremum: bool,
}

/// The explicit engine context: owns the plateau-escape RNG and the
/// reusable gradient scratch buffer. Spec §9 calls out the original's
/// process-wide globals as a re-architecture opportunity ("a clean
/// reimplementation passes an explicit engine context through every
/// entry point... `init`/`free` become constructor/destructor"); here
/// `Engine::new`/`try_new` are the constructor and `Drop` (derived
/// implicitly, since both resources are owned values with their own
/// `Drop` impls) is the destructor.
///
/// Not `Send`/`Sync`: the scratch buffer and RNG are mutated in place by
/// every call, matching spec §5's single-threaded, no-mutual-exclusion
/// resource model. A concurrent caller must give each thread its own
/// `Engine`.
pub struct Engine {
    rng: PlateauRng,
    scratch: Vec<GradientElement>,
    config: EngineConfig,
}

impl Engine {
    /// Opens the entropy source and allocates the scratch buffer at
    /// `config.initial_scratch_capacity`. Spec §6: "Fails fatally if the
    /// entropy source cannot be opened" — surfaced here as a `Result` so
    /// the caller decides how "fatally" looks (see [`Engine::new`] for
    /// the direct-abort convenience).
    pub fn try_new(config: EngineConfig) -> Result<Self, EngineError> {
        let rng = PlateauRng::new(*config.reseed_interval())?;
        Ok(Engine {
            rng,
            scratch: Vec::with_capacity(*config.initial_scratch_capacity()),
            config,
        })
    }

    /// Convenience constructor matching spec §7's literal "fails
    /// fatally... aborts" contract: panics rather than returning a
    /// `Result` if the entropy source can't be opened.
    pub fn new(config: EngineConfig) -> Self {
        Self::try_new(config).expect("gradsolve: entropy source unavailable at init")
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn build_gradient(&mut self, objective: &mut impl Objective, x: &mut Assignment, f0: Cost) {
        build_gradient_into(objective, x, f0, &mut self.scratch);
    }

    /// The plateau-escape block of spec §4.4/§9: perturbs a random
    /// coordinate's low byte by one random bit, up to
    /// `config.max_random_input` times, re-evaluating `f(x0)` rather
    /// than `f(x_prev)` on each attempt — both quirks are in the
    /// original design and are preserved here rather than "fixed" (spec
    /// §9's open question explicitly asks for this). With the shipped
    /// default (`max_random_input == 0`) the loop runs zero times and
    /// this always returns `None`, so the outer loop terminates on the
    /// first stationary gradient.
    fn try_escape_plateau(
        &mut self,
        objective: &mut impl Objective,
        x0: &Assignment,
        x_prev: &Assignment,
        f_prev: Cost,
        improves: &impl Fn(Cost, Cost) -> bool,
    ) -> Option<(Assignment, Cost)> {
        let n = x_prev.len();
        for attempt in 0..*self.config.max_random_input() {
            let coordinate = self.rng.random_index(n);
            let bit = self.rng.random_bit_position();
            let mut perturbed = x_prev.clone();
            perturbed[coordinate] = flip_low_bit(perturbed[coordinate], bit);

            // Preserved quirk: probes the *original* x0, not x_prev. Since
            // f_prev is monotone toward x0's cost across epochs (it can
            // never cross it), this candidate can in practice never improve
            // on f_prev — the block is wired but dead in normal operation.
            let f_candidate = objective.evaluate(x0);
            trace!(
                target: "gradsolve::engine",
                attempt, coordinate, bit, f_prev, f_candidate,
                "plateau-escape attempt"
            );
            if improves(f_candidate, f_prev) {
                return Some((perturbed, f_candidate));
            }
        }
        None
    }

    /// Shared outer loop for `minimize`/`maximize` (spec §4.4). `line`
    /// determines the direction (descend vs. ascend) and therefore which
    /// way "improves" points.
    fn run<LS: LineSearch>(
        &mut self,
        objective: &mut impl Objective,
        x0: &Assignment,
        line: &LS,
        improves: impl Fn(Cost, Cost) -> bool,
    ) -> OptimizationOutcome {
        let mut x_next = x0.clone();
        let mut f_current = objective.evaluate(&x_next);

        for epoch in 0..*self.config.max_epoch() {
            let x_prev = x_next.clone();
            let f_prev = f_current;

            self.build_gradient(objective, &mut x_next, f_prev);
            debug!(target: "gradsolve::engine", epoch, f_prev, "epoch gradient built");

            if is_plateau(&self.scratch) {
                if let Some((escaped_x, escaped_f)) =
                    self.try_escape_plateau(objective, x0, &x_prev, f_prev, &improves)
                {
                    x_next = escaped_x;
                    f_current = escaped_f;
                    continue;
                }
                info!(target: "gradsolve::engine", epoch, f_prev, "stationary gradient, terminating");
                return OptimizationOutcome {
                    x: x_prev,
                    f: f_prev,
                    reason: TerminationReason::StationaryGradient,
                    epochs: epoch,
                };
            }

            normalize_gradient(&mut self.scratch);
            let (x_searched, f_searched) = line.search(objective, &self.scratch, &x_prev, f_prev);
            x_next = x_searched;
            f_current = f_searched;

            if f_prev == f_current {
                info!(target: "gradsolve::engine", epoch, f_current, "converged");
                return OptimizationOutcome {
                    x: x_next,
                    f: f_current,
                    reason: TerminationReason::Converged,
                    epochs: epoch + 1,
                };
            }
            debug_assert!(improves(f_current, f_prev) || f_current == f_prev);
        }

        warn!(target: "gradsolve::engine", max_epoch = self.config.max_epoch(), "epoch limit reached");
        OptimizationOutcome {
            x: x_next,
            f: f_current,
            reason: TerminationReason::EpochLimitReached,
            epochs: *self.config.max_epoch(),
        }
    }

    /// Drive `objective` toward smaller cost (spec §4.4).
    pub fn minimize(&mut self, objective: &mut impl Objective, x0: &Assignment) -> OptimizationOutcome {
        let descend = Descend {
            skip_threshold: *self.config.refinement_skip_threshold(),
        };
        self.run(objective, x0, &descend, |candidate, current| candidate < current)
    }

    /// Drive `objective` toward larger cost (spec §4.4).
    pub fn maximize(&mut self, objective: &mut impl Objective, x0: &Assignment) -> OptimizationOutcome {
        let ascend = Ascend;
        self.run(objective, x0, &ascend, |candidate, current| candidate > current)
    }

    fn once<LS: LineSearch>(
        &mut self,
        objective: &mut impl Objective,
        x0: &Assignment,
        line: &LS,
    ) -> StepOutcome {
        let f0 = objective.evaluate(x0);
        let mut x = x0.clone();
        self.build_gradient(objective, &mut x, f0);

        if is_plateau(&self.scratch) {
            return StepOutcome {
                x: x0.clone(),
                f: f0,
                at_extremum: true,
            };
        }

        normalize_gradient(&mut self.scratch);
        let (x_next, f_next) = line.search(objective, &self.scratch, x0, f0);
        StepOutcome {
            x: x_next,
            f: f_next,
            at_extremum: false,
        }
    }

    /// One gradient build plus one descent line search (spec §4.5).
    pub fn descend_once(&mut self, objective: &mut impl Objective, x0: &Assignment) -> StepOutcome {
        let descend = Descend {
            skip_threshold: *self.config.refinement_skip_threshold(),
        };
        self.once(objective, x0, &descend)
    }

    /// One gradient build plus one ascent line search (spec §4.5).
    pub fn ascend_once(&mut self, objective: &mut impl Objective, x0: &Assignment) -> StepOutcome {
        let ascend = Ascend;
        self.once(objective, x0, &ascend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn instrumented_minimize_of_s3() {
        std::env::set_var("RUST_LOG", "debug");
        let _guards = Tracer::default()
            .with_stdout_layer(Some(LogFormat::Normal))
            .build();

        let mut engine = engine();
        let x0: Assignment = vec![0x00, 0x00];
        let mut objective = |x: &[Word]| {
            let a = (x[0] & 0xFF) as i64 - 0x40;
            let b = (x[1] & 0xFF) as i64 - 0xC0;
            a.abs() + b.abs()
        };
        let out = engine.minimize(&mut objective, &x0);
        println!("outcome: {:?}", out);
        assert_eq!(*out.f(), 0);
    }

    /// S1: n=1, f(x) = x[0] & 0xFF, x0 = 0x80. minimize -> (0, 0).
    #[test]
    fn s1_minimize_single_byte() {
        let mut engine = engine();
        let x0: Assignment = vec![0x80];
        let mut objective = |x: &[Word]| (x[0] & 0xFF) as Cost;
        let out = engine.minimize(&mut objective, &x0);
        assert_eq!(out.x()[0], 0x00);
        assert_eq!(*out.f(), 0);
    }

    /// S2: n=1, f(x) = -(x[0] & 0xFF), x0 = 0x10. maximize -> (0, 0).
    #[test]
    fn s2_maximize_negated_byte() {
        let mut engine = engine();
        let x0: Assignment = vec![0x10];
        let mut objective = |x: &[Word]| -((x[0] & 0xFF) as Cost);
        let out = engine.maximize(&mut objective, &x0);
        assert_eq!(out.x()[0], 0x00);
        assert_eq!(*out.f(), 0);
    }

    /// S3: n=2, f(x) = |x0-0x40| + |x1-0xC0|, x0={0,0}. minimize -> (0x40, 0xC0), f=0.
    #[test]
    fn s3_minimize_two_axis_distance() {
        let mut engine = engine();
        let x0: Assignment = vec![0x00, 0x00];
        let mut objective = |x: &[Word]| {
            let a = (x[0] & 0xFF) as i64 - 0x40;
            let b = (x[1] & 0xFF) as i64 - 0xC0;
            a.abs() + b.abs()
        };
        let out = engine.minimize(&mut objective, &x0);
        assert_eq!(out.x()[0] & 0xFF, 0x40);
        assert_eq!(out.x()[1] & 0xFF, 0xC0);
        assert_eq!(*out.f(), 0);
    }

    /// S4: n=1, f(x) = 42 (constant), x0=0x55. Both minimize and maximize
    /// return immediately at x0; descend_once/ascend_once report
    /// at_extremum.
    #[test]
    fn s4_constant_objective_is_already_extremal() {
        let mut engine = engine();
        let x0: Assignment = vec![0x55];
        let mut objective = |_: &[Word]| 42 as Cost;

        let min_out = engine.minimize(&mut objective, &x0);
        assert_eq!(min_out.x()[0], 0x55);
        assert_eq!(*min_out.f(), 42);
        assert_eq!(*min_out.reason(), TerminationReason::StationaryGradient);

        let max_out = engine.maximize(&mut objective, &x0);
        assert_eq!(max_out.x()[0], 0x55);
        assert_eq!(*max_out.f(), 42);

        let step = engine.descend_once(&mut objective, &x0);
        assert!(*step.at_extremum());
        let step = engine.ascend_once(&mut objective, &x0);
        assert!(*step.at_extremum());
    }

    /// S5: n=3, f(x) = x0 + 2*x1 + 4*x2, x0={0xFF,0xFF,0xFF}. minimize -> all zero.
    #[test]
    fn s5_minimize_three_axis_weighted_sum() {
        let mut engine = engine();
        let x0: Assignment = vec![0xFF, 0xFF, 0xFF];
        let mut objective = |x: &[Word]| {
            (x[0] & 0xFF) as Cost + 2 * (x[1] & 0xFF) as Cost + 4 * (x[2] & 0xFF) as Cost
        };
        let out = engine.minimize(&mut objective, &x0);
        assert_eq!(out.x(), &vec![0x00, 0x00, 0x00]);
        assert_eq!(*out.f(), 0);
    }

    /// S6: high-bit preservation for any out_x the engine produces.
    #[test]
    fn s6_high_bits_are_preserved() {
        let mut engine = engine();
        let x0: Assignment = vec![0xDEADBEEFDEADBE80];
        let mut objective = |x: &[Word]| {
            let a = (x[0] & 0xFF) as i64 - 0x40;
            a.abs()
        };
        let out = engine.minimize(&mut objective, &x0);
        assert_eq!(out.x()[0] & 0xFFFFFFFFFFFFFF00, 0xDEADBEEFDEADBE00);
    }

    #[test]
    fn property_monotone_improvement_for_minimize() {
        let mut engine = engine();
        let x0: Assignment = vec![0x77, 0x13];
        let mut objective =
            |x: &[Word]| (x[0] & 0xFF) as Cost * (x[0] & 0xFF) as Cost + (x[1] & 0xFF) as Cost;
        let f0 = objective.evaluate(&x0);
        let out = engine.minimize(&mut objective, &x0);
        assert!(*out.f() <= f0);
    }

    #[test]
    fn property_determinism_same_input_same_output() {
        let x0: Assignment = vec![200, 5, 90];
        let make_objective = || {
            move |x: &[Word]| {
                let a = (x[0] & 0xFF) as i64 - 10;
                let b = (x[1] & 0xFF) as i64 - 200;
                let c = (x[2] & 0xFF) as i64 - 3;
                a.abs() + b.abs() + c.abs()
            }
        };

        let mut engine_a = engine();
        let mut objective_a = make_objective();
        let out_a = engine_a.minimize(&mut objective_a, &x0);

        let mut engine_b = engine();
        let mut objective_b = make_objective();
        let out_b = engine_b.minimize(&mut objective_b, &x0);

        assert_eq!(out_a.x(), out_b.x());
        assert_eq!(out_a.f(), out_b.f());
    }

    #[test]
    fn plateau_escape_is_dormant_by_default() {
        assert_eq!(*EngineConfig::default().max_random_input(), 0);
    }

    /// Property 4: per epoch, evaluations of `f` are `2n + L` with
    /// `L <= (1 + n) * 8` (step-doubling never exceeds 8 probes per axis
    /// walked, since a byte-domain delta saturates well before step=256).
    #[test]
    fn property_call_count_bound_per_epoch() {
        let mut engine = Engine::new(EngineConfig {
            max_epoch: 1,
            ..EngineConfig::default()
        });
        let x0: Assignment = vec![0x01, 0x02, 0x03];
        let n = x0.len();
        let calls = std::cell::Cell::new(0usize);
        let mut objective = |x: &[Word]| {
            calls.set(calls.get() + 1);
            (x[0] & 0xFF) as Cost + 2 * (x[1] & 0xFF) as Cost + 4 * (x[2] & 0xFF) as Cost
        };
        let out = engine.minimize(&mut objective, &x0);
        // One extra call for the initial f(x0) snapshot at the top of `run`.
        let epoch_calls = calls.get() - 1;
        let max_l = (1 + n) * 8;
        assert!(
            epoch_calls <= 2 * n + max_l,
            "epoch_calls={epoch_calls} exceeds bound 2n+L={}",
            2 * n + max_l
        );
        let _ = out;
    }

    #[test]
    fn plateau_escape_is_dead_in_practice_even_when_enabled() {
        // Re-evaluating f(x0) instead of f(x_prev) (preserved per the
        // engine's documented quirk) combines with `f_prev` being monotone
        // toward f(x0) across epochs: f_prev can never cross f(x0), so the
        // escape's improvement check can never pass. A high budget makes
        // no observable difference over the default of zero.
        let config = EngineConfig {
            max_random_input: 8,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        let x0: Assignment = vec![0x55];
        let mut objective = |_: &[Word]| 100 as Cost;

        let out = engine.minimize(&mut objective, &x0);
        assert_eq!(out.x()[0], 0x55);
        assert_eq!(*out.f(), 100);
        assert_eq!(*out.reason(), TerminationReason::StationaryGradient);
    }
}

use tracing::{debug, error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

// A byte-granular, coordinate-wise local search: given an opaque integer
// objective over a vector of words, estimate a discrete "gradient" by
// probing each coordinate's low byte at +1/-1, then walk the resulting
// direction with a geometric step-doubling line search until no further
// improvement is found. There is no differentiability assumption and no
// global-optimality guarantee — this is a local search tuned for cheap
// convergence against adversarial integer predicates (equalities,
// distance-to-zero, bit-count objectives) under a tight evaluation
// budget, since every probe is a real call into the caller's objective.
//
// The two asymmetric pieces worth remembering while reading this crate:
// `descend`'s per-coordinate refinement skips a coordinate when its
// normalized weight is below 0.01, while `ascend`'s skips only an exact
// zero weight. Both are preserved intentionally (see `line_search`).

pub mod tracer;
pub use tracer::*;

pub mod types;
pub use types::*;

pub mod direction;
pub use direction::*;

pub mod objective;
pub use objective::*;

pub mod gradient;
pub use gradient::*;

pub mod line_search;
pub use line_search::*;

pub mod rng;
pub use rng::*;

pub mod engine;
pub use engine::*;

/// Composite score a pair must exceed to emit a tension gradient.
pub const TENSION_THRESHOLD: f64 = 0.4;

/// Pulse strength above which a gradient collapses into a scar.
pub const COLLAPSE_THRESHOLD: f64 = 0.5;

/// Pulse strength below which a gradient surges instead of buffering.
pub const SURGE_THRESHOLD: f64 = 0.3;

/// Default share of the smoothed signal blended back into a semantic state.
pub const DIFFUSION_RATE: f64 = 0.5;

/// Default Gaussian sigma for semantic diffusion.
pub const DECAY_FACTOR: f64 = 1.0;

/// Largest accepted sigma; the kernel grows as 6σ taps.
pub const MAX_DECAY_FACTOR: f64 = 1000.0;

/// Default embedding dimension.
pub const EMBEDDING_DIM: usize = 384;

/// Entropy histories keep at most this many measurements.
pub const ENTROPY_HISTORY_CAPACITY: usize = 1000;

/// Cycle statistics kept in memory.
pub const CYCLE_STATS_CAPACITY: usize = 1000;

/// Histogram bins for conditional entropy and mutual information.
pub const HISTOGRAM_BINS: usize = 10;

/// Measurements used to fit the entropy/complexity trend.
pub const PHASE_WINDOW: usize = 5;

/// Upper bound on pairwise comparisons in one cycle.
pub const MAX_COMPARISONS: usize = 50_000;

/// Stability: most recent units considered for cohesion.
pub const STABILITY_RECENT_UNITS: usize = 20;

/// Stability: most recent scars considered for pressure and entropic stability.
pub const STABILITY_RECENT_SCARS: usize = 100;

/// Stability: scars younger than this count toward vault pressure.
pub const PRESSURE_WINDOW_SECS: u64 = 3600;

/// Stability: scar count in the window that saturates vault pressure.
pub const PRESSURE_SATURATION: f64 = 10.0;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

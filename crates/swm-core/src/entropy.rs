//! Entropy engine: information-theoretic and thermodynamic disorder of the
//! geoid population.
//!
//! Every measure degrades to 0.0 on empty or zero-weight input. Shannon
//! entropy goes through a selectable [`Estimator`]; the rest are plain
//! plug-in estimates. Each recorded measurement lands in a bounded
//! [`EntropyHistory`], which also drives phase detection for the complexity
//! weights.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::EntropyConfig;
use crate::constants::{EPSILON, PHASE_WINDOW};
use crate::error::{CoreError, Result};
use crate::geoid::Geoid;
use crate::time::now_iso8601;

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    /// Plug-in maximum likelihood.
    #[default]
    Mle,
    /// MLE plus the `(k - 1) / 2N` bias correction.
    MillerMadow,
    /// Coverage-adjusted Horvitz-Thompson estimate.
    ChaoShen,
}

impl Estimator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mle => "mle",
            Self::MillerMadow => "miller_madow",
            Self::ChaoShen => "chao_shen",
        }
    }

    /// Entropy of a weight vector in the given log base.
    pub fn estimate(&self, weights: &[f64], base: f64) -> f64 {
        match self {
            Self::Mle => mle_entropy(weights, base),
            Self::MillerMadow => miller_madow_entropy(weights, base),
            Self::ChaoShen => chao_shen_entropy(weights, base),
        }
    }
}

impl FromStr for Estimator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mle" => Ok(Self::Mle),
            "miller_madow" => Ok(Self::MillerMadow),
            "chao_shen" => Ok(Self::ChaoShen),
            other => Err(CoreError::Configuration(format!(
                "unknown entropy estimator '{other}' (expected mle, miller_madow or chao_shen)"
            ))),
        }
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positive entries only, with their total.
fn positive_bins(weights: &[f64]) -> (Vec<f64>, f64) {
    let bins: Vec<f64> = weights.iter().copied().filter(|w| *w > 0.0).collect();
    let total = bins.iter().sum();
    (bins, total)
}

/// `-Σ p log_b p` over the normalized positive weights.
pub fn mle_entropy(weights: &[f64], base: f64) -> f64 {
    let (bins, total) = positive_bins(weights);
    if total <= 0.0 {
        return 0.0;
    }
    let h: f64 = bins
        .iter()
        .map(|w| {
            let p = w / total;
            -p * p.ln()
        })
        .sum();
    (h / base.ln()).max(0.0)
}

/// MLE plus `(k - 1) / (2 N ln b)`.
///
/// Weights are not counts, so `N` is the weight total, raised to at least
/// the number of occupied bins.
pub fn miller_madow_entropy(weights: &[f64], base: f64) -> f64 {
    let (bins, total) = positive_bins(weights);
    if total <= 0.0 {
        return 0.0;
    }
    let k = bins.len() as f64;
    let n = total.max(k);
    mle_entropy(&bins, base) + (k - 1.0) / (2.0 * n * base.ln())
}

/// Chao-Shen: scale probabilities by the estimated sample coverage
/// `C = 1 - f1/N` and weight each term by `1 / (1 - (1 - C p)^N)`.
///
/// Singletons are bins whose weight rounds to 1. When every bin is a
/// singleton one is discounted so coverage stays positive.
pub fn chao_shen_entropy(weights: &[f64], base: f64) -> f64 {
    let (bins, n) = positive_bins(weights);
    if n <= 0.0 {
        return 0.0;
    }

    let mut singletons = bins.iter().filter(|w| w.round() == 1.0).count() as f64;
    if singletons >= n {
        singletons = (n - 1.0).max(0.0);
    }
    let coverage = (1.0 - singletons / n).clamp(EPSILON, 1.0);

    let h: f64 = bins
        .iter()
        .map(|w| {
            let pa = coverage * (w / n);
            let inclusion = 1.0 - (1.0 - pa).powf(n);
            if inclusion < EPSILON {
                -pa * pa.ln()
            } else {
                -pa * pa.ln() / inclusion
            }
        })
        .sum();
    (h / base.ln()).max(0.0)
}

// ---------------------------------------------------------------------------
// Population measures
// ---------------------------------------------------------------------------

/// Sum of each feature's weight across all geoids, keyed by feature name.
pub fn aggregate_distribution(geoids: &[Geoid]) -> BTreeMap<String, f64> {
    let mut agg = BTreeMap::new();
    for g in geoids {
        for (feature, w) in g.semantic_state.iter() {
            *agg.entry(feature.to_string()).or_insert(0.0) += w;
        }
    }
    agg
}

/// Normalized aggregate distribution; empty when the total is not positive.
pub fn normalized_distribution(geoids: &[Geoid]) -> Vec<f64> {
    normalized_features(geoids).into_values().collect()
}

/// Normalized aggregate distribution keyed by feature name.
pub fn normalized_features(geoids: &[Geoid]) -> Baseline {
    let agg = aggregate_distribution(geoids);
    let total: f64 = agg.values().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return Baseline::new();
    }
    agg.into_iter()
        .map(|(feature, w)| (feature, w.max(0.0) / total))
        .collect()
}

/// Relative-entropy reference: feature name to probability.
pub type Baseline = BTreeMap<String, f64>;

/// `KL(current ‖ baseline)` over named features. Different feature sets
/// are a dimension mismatch and yield 0.0.
pub fn relative_to_baseline(current: &Baseline, baseline: &Baseline, base: f64) -> f64 {
    if current.len() != baseline.len() || !current.keys().eq(baseline.keys()) {
        return 0.0;
    }
    let p: Vec<f64> = current.values().copied().collect();
    let q: Vec<f64> = baseline.values().copied().collect();
    kl_divergence(&p, &q, base)
}

/// Gibbs entropy (natural log, `k_B = 1`) of the Boltzmann-like distribution
/// over per-geoid activation. Non-positive energies are discarded.
pub fn thermodynamic_entropy(geoids: &[Geoid]) -> f64 {
    let energies: Vec<f64> = geoids.iter().map(Geoid::total_activation).collect();
    mle_entropy(&energies, std::f64::consts::E)
}

/// `KL(p ‖ q)` in the given base. Both inputs are normalized first. Returns
/// 0.0 on length mismatch or empty input; `q` is floored at epsilon where
/// `p` has mass so the divergence stays finite.
pub fn kl_divergence(p: &[f64], q: &[f64], base: f64) -> f64 {
    if p.is_empty() || p.len() != q.len() {
        return 0.0;
    }
    let p_total: f64 = p.iter().filter(|v| **v > 0.0).sum();
    let q_total: f64 = q.iter().filter(|v| **v > 0.0).sum();
    if p_total <= 0.0 || q_total <= 0.0 {
        return 0.0;
    }
    let kl: f64 = p
        .iter()
        .zip(q)
        .filter(|(pi, _)| **pi > 0.0)
        .map(|(pi, qi)| {
            let pn = pi / p_total;
            let qn = (qi.max(0.0) / q_total).max(EPSILON);
            pn * (pn / qn).ln()
        })
        .sum();
    (kl / base.ln()).max(0.0)
}

/// Equal-width bin index of each value over `[min, max]`.
fn discretize(values: &[f64], bins: usize) -> Vec<usize> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = max - min;
    values
        .iter()
        .map(|v| {
            if width <= EPSILON {
                0
            } else {
                (((v - min) / width) * bins as f64).floor().min((bins - 1) as f64) as usize
            }
        })
        .collect()
}

/// `(H(X), H(Y), H(X,Y))` of two equally long series after histogram binning.
pub fn histogram_entropies(xs: &[f64], ys: &[f64], bins: usize, base: f64) -> (f64, f64, f64) {
    if xs.is_empty() || xs.len() != ys.len() || bins == 0 {
        return (0.0, 0.0, 0.0);
    }
    let bx = discretize(xs, bins);
    let by = discretize(ys, bins);

    let mut cx: HashMap<usize, f64> = HashMap::new();
    let mut cy: HashMap<usize, f64> = HashMap::new();
    let mut cxy: HashMap<(usize, usize), f64> = HashMap::new();
    for (x, y) in bx.iter().zip(&by) {
        *cx.entry(*x).or_insert(0.0) += 1.0;
        *cy.entry(*y).or_insert(0.0) += 1.0;
        *cxy.entry((*x, *y)).or_insert(0.0) += 1.0;
    }

    let h = |counts: Vec<f64>| mle_entropy(&counts, base);
    (
        h(cx.into_values().collect()),
        h(cy.into_values().collect()),
        h(cxy.into_values().collect()),
    )
}

/// `H(Y|X) = H(X,Y) - H(X)`.
pub fn conditional_entropy(xs: &[f64], ys: &[f64], bins: usize, base: f64) -> f64 {
    let (hx, _, hxy) = histogram_entropies(xs, ys, bins, base);
    (hxy - hx).max(0.0)
}

/// `I(X;Y) = H(X) + H(Y) - H(X,Y)`.
pub fn mutual_information(xs: &[f64], ys: &[f64], bins: usize, base: f64) -> f64 {
    let (hx, hy, hxy) = histogram_entropies(xs, ys, bins, base);
    (hx + hy - hxy).max(0.0)
}

/// Least-squares slope of `values` against their index.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den <= 0.0 { 0.0 } else { num / den }
}

/// Sample entropy `-ln(A / B)` of a series.
///
/// `B` counts pairs of length-`m` templates within tolerance `r` (Chebyshev
/// distance, self-matches excluded), `A` the same for length `m + 1`. Both
/// use the first `N - m` templates so the counts are comparable. `None` when
/// either count is zero or the series is too short.
pub fn sample_entropy(series: &[f64], m: usize, r: f64) -> Option<f64> {
    let n = series.len();
    if m == 0 || n <= m + 1 {
        return None;
    }
    let templates = n - m;

    let within = |i: usize, j: usize, len: usize| {
        (0..len).all(|k| (series[i + k] - series[j + k]).abs() <= r)
    };

    let mut b = 0u64;
    let mut a = 0u64;
    for i in 0..templates {
        for j in (i + 1)..templates {
            if within(i, j, m) {
                b += 1;
                if within(i, j, m + 1) {
                    a += 1;
                }
            }
        }
    }

    if a == 0 || b == 0 {
        return None;
    }
    Some(-(a as f64 / b as f64).ln())
}

// ---------------------------------------------------------------------------
// Complexity and phases
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemPhase {
    Exploration,
    Consolidation,
    Optimization,
    #[default]
    Balanced,
}

impl SystemPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploration => "exploration",
            Self::Consolidation => "consolidation",
            Self::Optimization => "optimization",
            Self::Balanced => "balanced",
        }
    }

    /// Classify from the recent entropy and complexity slopes.
    pub fn from_slopes(entropy_slope: f64, complexity_slope: f64) -> Self {
        const FLAT: f64 = 1e-6;
        if entropy_slope > FLAT {
            Self::Exploration
        } else if entropy_slope < -FLAT && complexity_slope > FLAT {
            Self::Consolidation
        } else if entropy_slope < -FLAT {
            Self::Optimization
        } else {
            Self::Balanced
        }
    }

    pub fn weights(&self) -> ComplexityWeights {
        match self {
            Self::Exploration => ComplexityWeights::new(0.5, 0.3, 0.2),
            Self::Consolidation => ComplexityWeights::new(0.3, 0.5, 0.2),
            Self::Optimization => ComplexityWeights::new(0.3, 0.3, 0.4),
            Self::Balanced => ComplexityWeights::default(),
        }
    }
}

/// Weights of features, co-occurrence edges and persisted records.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexityWeights {
    pub features: f64,
    pub edges: f64,
    pub records: f64,
}

impl ComplexityWeights {
    pub fn new(features: f64, edges: f64, records: f64) -> Self {
        Self {
            features,
            edges,
            records,
        }
    }
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self::new(0.4, 0.4, 0.2)
    }
}

/// Distinct feature names and unordered co-occurrence edges across geoids.
pub fn feature_graph_size(geoids: &[Geoid]) -> (usize, usize) {
    let mut features: BTreeSet<&str> = BTreeSet::new();
    let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
    for g in geoids {
        let keys: Vec<&str> = g.semantic_state.keys().collect();
        features.extend(keys.iter().copied());
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                let edge = if keys[i] < keys[j] {
                    (keys[i], keys[j])
                } else {
                    (keys[j], keys[i])
                };
                edges.insert(edge);
            }
        }
    }
    (features.len(), edges.len())
}

pub fn system_complexity(geoids: &[Geoid], persisted_records: usize, weights: ComplexityWeights) -> f64 {
    let (features, edges) = feature_graph_size(geoids);
    weights.features * features as f64
        + weights.edges * edges as f64
        + weights.records * persisted_records as f64
}

// ---------------------------------------------------------------------------
// Measurements and history
// ---------------------------------------------------------------------------

/// Scar counts per vault at measurement time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCounts {
    pub vault_a: usize,
    pub vault_b: usize,
}

impl VaultCounts {
    pub fn total(&self) -> usize {
        self.vault_a + self.vault_b
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntropyMeasurement {
    pub timestamp: String,
    pub estimator: Estimator,
    pub shannon_entropy: f64,
    pub thermodynamic_entropy: f64,
    pub relative_entropy: f64,
    pub conditional_entropy: f64,
    pub mutual_information: f64,
    pub system_complexity: f64,
    pub phase: SystemPhase,
    pub geoid_count: usize,
    pub vault_counts: VaultCounts,
}

/// Bounded FIFO of measurements; the oldest is evicted first.
#[derive(Clone, Debug)]
pub struct EntropyHistory {
    entries: VecDeque<EntropyMeasurement>,
    capacity: usize,
}

impl EntropyHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, measurement: EntropyMeasurement) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(measurement);
    }

    pub fn latest(&self) -> Option<&EntropyMeasurement> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntropyMeasurement> {
        self.entries.iter()
    }

    /// Phase from the last [`PHASE_WINDOW`] measurements; balanced until the
    /// window is full.
    pub fn phase(&self) -> SystemPhase {
        if self.entries.len() < PHASE_WINDOW {
            return SystemPhase::Balanced;
        }
        let recent: Vec<&EntropyMeasurement> =
            self.entries.iter().skip(self.entries.len() - PHASE_WINDOW).collect();
        let entropy: Vec<f64> = recent.iter().map(|m| m.shannon_entropy).collect();
        let complexity: Vec<f64> = recent.iter().map(|m| m.system_complexity).collect();
        SystemPhase::from_slopes(linear_slope(&entropy), linear_slope(&complexity))
    }
}

pub struct EntropyEngine {
    estimator: Estimator,
    log_base: f64,
    bins: usize,
    baseline: Mutex<Option<Baseline>>,
    history: Mutex<EntropyHistory>,
}

impl EntropyEngine {
    pub fn new(config: &EntropyConfig) -> Result<Self> {
        let estimator: Estimator = config.estimator.parse()?;
        if !(config.log_base > 1.0 && config.log_base.is_finite()) {
            return Err(CoreError::Configuration(format!(
                "log_base must be > 1, got {}",
                config.log_base
            )));
        }
        if config.histogram_bins == 0 {
            return Err(CoreError::Configuration(
                "histogram_bins must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            estimator,
            log_base: config.log_base,
            bins: config.histogram_bins,
            baseline: Mutex::new(None),
            history: Mutex::new(EntropyHistory::new(config.history_capacity)),
        })
    }

    pub fn estimator(&self) -> Estimator {
        self.estimator
    }

    /// Shannon entropy of the population's aggregate semantic distribution.
    pub fn shannon_entropy(&self, geoids: &[Geoid]) -> f64 {
        let weights: Vec<f64> = aggregate_distribution(geoids).into_values().collect();
        self.estimator.estimate(&weights, self.log_base)
    }

    /// Capture the current distribution as the relative-entropy reference.
    pub fn set_baseline(&self, geoids: &[Geoid]) {
        let dist = normalized_features(geoids);
        tracing::debug!(features = dist.len(), "entropy baseline captured");
        *lock(&self.baseline) = Some(dist);
    }

    /// Reinstate a previously captured reference, e.g. from storage.
    pub fn restore_baseline(&self, baseline: Baseline) {
        tracing::debug!(features = baseline.len(), "entropy baseline restored");
        *lock(&self.baseline) = Some(baseline);
    }

    pub fn baseline(&self) -> Option<Baseline> {
        lock(&self.baseline).clone()
    }

    pub fn has_baseline(&self) -> bool {
        lock(&self.baseline).is_some()
    }

    pub fn relative_entropy(&self, geoids: &[Geoid]) -> f64 {
        match lock(&self.baseline).as_ref() {
            Some(baseline) => {
                relative_to_baseline(&normalized_features(geoids), baseline, self.log_base)
            }
            None => 0.0,
        }
    }

    /// Conditional entropy and mutual information between mean semantic
    /// activation and symbolic complexity.
    pub fn activation_symbolic_information(&self, geoids: &[Geoid]) -> (f64, f64) {
        let xs: Vec<f64> = geoids.iter().map(Geoid::mean_activation).collect();
        let ys: Vec<f64> = geoids.iter().map(|g| g.symbolic_complexity() as f64).collect();
        let (hx, hy, hxy) = histogram_entropies(&xs, &ys, self.bins, self.log_base);
        ((hxy - hx).max(0.0), (hx + hy - hxy).max(0.0))
    }

    /// Compute a measurement without touching the history.
    pub fn measure(&self, geoids: &[Geoid], vault_counts: VaultCounts) -> EntropyMeasurement {
        let phase = lock(&self.history).phase();
        let (conditional, mutual) = self.activation_symbolic_information(geoids);
        EntropyMeasurement {
            timestamp: now_iso8601(),
            estimator: self.estimator,
            shannon_entropy: self.shannon_entropy(geoids),
            thermodynamic_entropy: thermodynamic_entropy(geoids),
            relative_entropy: self.relative_entropy(geoids),
            conditional_entropy: conditional,
            mutual_information: mutual,
            system_complexity: system_complexity(geoids, vault_counts.total(), phase.weights()),
            phase,
            geoid_count: geoids.len(),
            vault_counts,
        }
    }

    /// Compute a measurement and append it to the history.
    pub fn record(&self, geoids: &[Geoid], vault_counts: VaultCounts) -> EntropyMeasurement {
        let measurement = self.measure(geoids, vault_counts);
        self.push(measurement.clone());
        measurement
    }

    /// Append an already computed measurement.
    pub fn push(&self, measurement: EntropyMeasurement) {
        lock(&self.history).push(measurement);
    }

    pub fn latest(&self) -> Option<EntropyMeasurement> {
        lock(&self.history).latest().cloned()
    }

    pub fn history(&self) -> Vec<EntropyMeasurement> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }
}

/// Poisoning only means another thread panicked mid-append; the data is
/// still a valid history.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn engine(estimator: &str) -> EntropyEngine {
        EntropyEngine::new(&EntropyConfig {
            estimator: estimator.to_string(),
            history_capacity: 8,
            ..EntropyConfig::default()
        })
        .unwrap()
    }

    fn geoid(id: &str, weights: &[(&str, f64)]) -> Geoid {
        Geoid::new(id).with_semantic(weights.iter().map(|(k, w)| (*k, *w)))
    }

    fn measurement(shannon: f64, complexity: f64) -> EntropyMeasurement {
        EntropyMeasurement {
            timestamp: now_iso8601(),
            estimator: Estimator::Mle,
            shannon_entropy: shannon,
            thermodynamic_entropy: 0.0,
            relative_entropy: 0.0,
            conditional_entropy: 0.0,
            mutual_information: 0.0,
            system_complexity: complexity,
            phase: SystemPhase::Balanced,
            geoid_count: 0,
            vault_counts: VaultCounts::default(),
        }
    }

    #[test]
    fn test_uniform_four_bins_is_two_bits() {
        assert_relative_eq!(mle_entropy(&[0.25; 4], 2.0), 2.0, epsilon = 1e-12);
        // unnormalized weights give the same answer
        assert_relative_eq!(mle_entropy(&[3.0; 4], 2.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_inputs_are_zero() {
        assert_eq!(mle_entropy(&[], 2.0), 0.0);
        assert_eq!(mle_entropy(&[0.0, 0.0], 2.0), 0.0);
        assert_eq!(mle_entropy(&[-1.0, 0.0], 2.0), 0.0);
        assert_eq!(miller_madow_entropy(&[], 2.0), 0.0);
        assert_eq!(chao_shen_entropy(&[0.0], 2.0), 0.0);
        assert_eq!(thermodynamic_entropy(&[]), 0.0);
        assert_eq!(kl_divergence(&[], &[], 2.0), 0.0);
        assert_eq!(sample_entropy(&[], 2, 0.2), None);
    }

    #[test]
    fn test_single_bin_is_zero() {
        assert_eq!(mle_entropy(&[5.0], 2.0), 0.0);
        assert_eq!(miller_madow_entropy(&[5.0], 2.0), 0.0);
    }

    #[test]
    fn test_miller_madow_correction() {
        // counts [2, 2]: k = 2, N = 4 → correction 1 / (8 ln 2)
        let expected = 1.0 + 1.0 / (8.0 * 2f64.ln());
        assert_relative_eq!(miller_madow_entropy(&[2.0, 2.0], 2.0), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_miller_madow_fractional_weights_use_bin_count() {
        // total 1.0 < k = 4, so N = 4
        let expected = 2.0 + 3.0 / (8.0 * 2f64.ln());
        assert_relative_eq!(miller_madow_entropy(&[0.25; 4], 2.0), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_chao_shen_exceeds_mle_on_small_sample() {
        let counts = [1.0, 1.0, 2.0, 3.0];
        let mle = mle_entropy(&counts, 2.0);
        let cs = chao_shen_entropy(&counts, 2.0);
        assert!(cs > mle, "chao-shen {cs} should exceed mle {mle}");
    }

    #[test]
    fn test_chao_shen_without_singletons_is_close_to_mle() {
        let counts = [500.0, 500.0];
        assert_relative_eq!(chao_shen_entropy(&counts, 2.0), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_chao_shen_all_singletons_finite() {
        let h = chao_shen_entropy(&[1.0, 1.0, 1.0], 2.0);
        assert!(h.is_finite() && h > 0.0);
    }

    #[test]
    fn test_estimator_parse() {
        assert_eq!("mle".parse::<Estimator>().unwrap(), Estimator::Mle);
        assert_eq!("miller_madow".parse::<Estimator>().unwrap(), Estimator::MillerMadow);
        assert_eq!("chao_shen".parse::<Estimator>().unwrap(), Estimator::ChaoShen);
        assert!(matches!(
            "grassberger".parse::<Estimator>(),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_engine_rejects_unknown_estimator() {
        let result = EntropyEngine::new(&EntropyConfig {
            estimator: "nope".to_string(),
            ..EntropyConfig::default()
        });
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_aggregate_sums_shared_features() {
        let geoids = vec![geoid("a", &[("x", 1.0), ("y", 1.0)]), geoid("b", &[("x", 2.0)])];
        let agg = aggregate_distribution(&geoids);
        assert_eq!(agg["x"], 3.0);
        assert_eq!(agg["y"], 1.0);
        let dist = normalized_distribution(&geoids);
        assert_relative_eq!(dist.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_thermodynamic_ignores_non_positive_energy() {
        let geoids = vec![
            geoid("a", &[("x", 1.0)]),
            geoid("b", &[("y", 1.0)]),
            geoid("c", &[]),
        ];
        assert_relative_eq!(thermodynamic_entropy(&geoids), 2f64.ln(), epsilon = 1e-12);
        assert_eq!(thermodynamic_entropy(&[geoid("z", &[])]), 0.0);
    }

    #[test]
    fn test_kl_divergence() {
        assert_eq!(kl_divergence(&[0.5, 0.5], &[0.5, 0.5], 2.0), 0.0);
        assert_eq!(kl_divergence(&[0.5, 0.5], &[1.0], 2.0), 0.0);
        // KL([0.75, 0.25] ‖ [0.5, 0.5]) in bits
        let expected = 0.75 * (1.5f64).log2() + 0.25 * (0.5f64).log2();
        assert_relative_eq!(kl_divergence(&[0.75, 0.25], &[0.5, 0.5], 2.0), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_entropy_needs_baseline() {
        let e = engine("mle");
        let before = vec![geoid("a", &[("x", 1.0), ("y", 1.0)])];
        let after = vec![geoid("a", &[("x", 3.0), ("y", 1.0)])];
        assert_eq!(e.relative_entropy(&after), 0.0);

        e.set_baseline(&before);
        assert!(e.has_baseline());
        assert!(e.relative_entropy(&after) > 0.0);
        assert_eq!(e.relative_entropy(&before), 0.0);

        // new feature → dimension mismatch → 0
        let grown = vec![geoid("a", &[("x", 1.0), ("y", 1.0), ("z", 1.0)])];
        assert_eq!(e.relative_entropy(&grown), 0.0);
    }

    #[test]
    fn test_relative_entropy_aligns_by_feature_name() {
        let e = engine("mle");
        e.set_baseline(&[geoid("a", &[("x", 3.0), ("y", 1.0)])]);

        // Same count, one feature swapped: not comparable.
        let swapped = vec![geoid("a", &[("x", 3.0), ("z", 1.0)])];
        assert_eq!(e.relative_entropy(&swapped), 0.0);

        // Same features in a different insertion order compare by name.
        let reordered = vec![geoid("a", &[("y", 1.0), ("x", 3.0)])];
        assert_relative_eq!(e.relative_entropy(&reordered), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_restore_baseline() {
        let source = engine("mle");
        let before = vec![geoid("a", &[("x", 1.0), ("y", 1.0)])];
        let after = vec![geoid("a", &[("x", 3.0), ("y", 1.0)])];
        source.set_baseline(&before);
        let saved = source.baseline().unwrap();
        assert_relative_eq!(saved["x"], 0.5, epsilon = 1e-12);

        let resumed = engine("mle");
        assert!(resumed.baseline().is_none());
        resumed.restore_baseline(saved);
        assert_relative_eq!(
            resumed.relative_entropy(&after),
            source.relative_entropy(&after),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_information_identities() {
        // X determines Y: no residual uncertainty, I = H(Y)
        let xs = [0.0, 0.0, 1.0, 1.0];
        let ys = [5.0, 5.0, 9.0, 9.0];
        let (hx, hy, hxy) = histogram_entropies(&xs, &ys, 4, 2.0);
        assert_relative_eq!(hx, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hy, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hxy, 1.0, epsilon = 1e-12);
        assert_relative_eq!(conditional_entropy(&xs, &ys, 4, 2.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(mutual_information(&xs, &ys, 4, 2.0), 1.0, epsilon = 1e-12);

        // independent series share no information
        let xs = [0.0, 0.0, 1.0, 1.0];
        let ys = [0.0, 1.0, 0.0, 1.0];
        assert_relative_eq!(mutual_information(&xs, &ys, 2, 2.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(conditional_entropy(&xs, &ys, 2, 2.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_activation_symbolic_information_on_population() {
        let e = engine("mle");
        let geoids = vec![
            geoid("a", &[("x", 1.0)]),
            geoid("b", &[("x", 4.0)]).with_symbolic([("k", json!("a long symbolic value"))]),
        ];
        let (conditional, mutual) = e.activation_symbolic_information(&geoids);
        assert_relative_eq!(conditional, 0.0, epsilon = 1e-12);
        assert_relative_eq!(mutual, 1.0, epsilon = 1e-12);
        assert_eq!(e.activation_symbolic_information(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_linear_slope() {
        assert_relative_eq!(linear_slope(&[1.0, 2.0, 3.0, 4.0]), 1.0, epsilon = 1e-12);
        assert_relative_eq!(linear_slope(&[4.0, 2.0, 0.0]), -2.0, epsilon = 1e-12);
        assert_eq!(linear_slope(&[7.0]), 0.0);
    }

    #[test]
    fn test_phase_from_slopes() {
        assert_eq!(SystemPhase::from_slopes(0.1, -0.1), SystemPhase::Exploration);
        assert_eq!(SystemPhase::from_slopes(-0.1, 0.1), SystemPhase::Consolidation);
        assert_eq!(SystemPhase::from_slopes(-0.1, -0.1), SystemPhase::Optimization);
        assert_eq!(SystemPhase::from_slopes(0.0, 0.5), SystemPhase::Balanced);
    }

    #[test]
    fn test_history_phase_needs_full_window() {
        let mut h = EntropyHistory::new(10);
        for i in 0..4 {
            h.push(measurement(i as f64, 0.0));
        }
        assert_eq!(h.phase(), SystemPhase::Balanced);
        h.push(measurement(4.0, 0.0));
        assert_eq!(h.phase(), SystemPhase::Exploration);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut h = EntropyHistory::new(3);
        for i in 0..5 {
            h.push(measurement(i as f64, 0.0));
        }
        assert_eq!(h.len(), 3);
        let first = h.iter().next().unwrap().shannon_entropy;
        assert_eq!(first, 2.0);
        assert_eq!(h.latest().unwrap().shannon_entropy, 4.0);
    }

    #[test]
    fn test_feature_graph_and_complexity() {
        let geoids = vec![
            geoid("a", &[("x", 1.0), ("y", 1.0), ("z", 1.0)]),
            geoid("b", &[("y", 1.0), ("x", 1.0)]),
        ];
        // features x,y,z; edges xy, xz, yz (b's yx duplicates xy)
        assert_eq!(feature_graph_size(&geoids), (3, 3));
        let c = system_complexity(&geoids, 10, ComplexityWeights::default());
        assert_relative_eq!(c, 0.4 * 3.0 + 0.4 * 3.0 + 0.2 * 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_record_appends_and_caps() {
        let e = engine("miller_madow");
        let geoids = vec![geoid("a", &[("x", 1.0), ("y", 2.0)])];
        for _ in 0..12 {
            e.record(&geoids, VaultCounts::default());
        }
        assert_eq!(e.history_len(), 8);
        let latest = e.latest().unwrap();
        assert_eq!(latest.estimator, Estimator::MillerMadow);
        assert_eq!(latest.geoid_count, 1);
    }

    #[test]
    fn test_measure_does_not_append() {
        let e = engine("mle");
        let m = e.measure(&[], VaultCounts { vault_a: 2, vault_b: 1 });
        assert_eq!(e.history_len(), 0);
        assert_eq!(m.shannon_entropy, 0.0);
        assert_eq!(m.thermodynamic_entropy, 0.0);
        assert_eq!(m.relative_entropy, 0.0);
        assert_relative_eq!(m.system_complexity, 0.2 * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sample_entropy_regular_series_is_low() {
        let periodic: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let se = sample_entropy(&periodic, 2, 0.2).unwrap();
        assert!(se.abs() < 1e-12, "alternating series is perfectly predictable, got {se}");
    }

    #[test]
    fn test_sample_entropy_counts() {
        let series = [1.0, 2.0, 1.0, 2.0, 9.0];
        // m = 2, templates 0..3: [1,2],[2,1],[1,2]; B pairs: (0,2) → 1
        // m+1 = 3: [1,2,1] vs [1,2,9] → not within → A = 0 → undefined
        assert_eq!(sample_entropy(&series, 2, 0.5), None);

        let series = [1.0, 2.0, 1.0, 2.0, 1.0, 5.0];
        // templates 0..4 at m=2: [1,2],[2,1],[1,2],[2,1] → B = 2 pairs
        // m+1 = 3: [1,2,1],[2,1,2],[1,2,1],[2,1,5] → A = 1 pair (0,2)
        assert_relative_eq!(sample_entropy(&series, 2, 0.5).unwrap(), 2f64.ln(), epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_shannon_bounded(weights in prop::collection::vec(0.0f64..10.0, 1..40)) {
            let h = mle_entropy(&weights, 2.0);
            let n = weights.len() as f64;
            prop_assert!(h >= 0.0);
            prop_assert!(h <= n.log2() + 1e-9);
        }

        #[test]
        fn prop_kl_non_negative(
            pairs in prop::collection::vec((0.01f64..5.0, 0.01f64..5.0), 1..20)
        ) {
            let p: Vec<f64> = pairs.iter().map(|x| x.0).collect();
            let q: Vec<f64> = pairs.iter().map(|x| x.1).collect();
            prop_assert!(kl_divergence(&p, &q, 2.0) >= 0.0);
        }
    }
}

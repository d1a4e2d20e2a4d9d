//! The cognitive cycle: one tick over the whole population.
//!
//! 1. merge geoids ingested since the last tick
//! 2. measure entropy (pre-diffusion, not appended)
//! 3. diffuse every geoid's semantic state
//! 4. detect tension gradients within the comparison budget
//! 5. decide collapse, surge or buffer per gradient
//! 6. resolve every collapse into a scar and place it in a vault
//! 7. record the post-cycle measurement and the cycle summary
//!
//! A cycle holds the state lock from step 1 to step 7, so cycles serialize
//! and never interleave with a rebalance. Ingestion only touches the pending
//! queue. The scars of one tick are placed as a single batch, so a
//! persistence failure in step 6 leaves the vaults untouched: the population
//! keeps its pre-diffusion state, the counter does not move and nothing is
//! appended to the histories.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::contradiction::{ContradictionEngine, Decision, ProfileSettings};
use crate::diffusion::DiffusionEngine;
use crate::entropy::{Baseline, EntropyEngine, EntropyMeasurement, VaultCounts, normalized_features};
use crate::error::{CoreError, Result};
use crate::geoid::Geoid;
use crate::scar::{Scar, VaultId};
use crate::stability::{StabilityMonitor, StabilitySnapshot};
use crate::time::{now_iso8601, now_unix_secs};
use crate::vault::{VaultBackend, VaultStore};

/// Summary of one completed cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycle_id: u64,
    pub timestamp: String,
    pub geoid_count: usize,
    pub comparisons: usize,
    pub truncated: bool,
    pub contradictions_detected: usize,
    pub scars_created: usize,
    pub surges: usize,
    pub buffered: usize,
    pub entropy_before: f64,
    pub entropy_after: f64,
    pub entropy_delta: f64,
}

/// Everything a completed cycle produced.
#[derive(Clone, Debug)]
pub struct CycleOutcome {
    pub stats: CycleStats,
    pub scars: Vec<(Scar, VaultId)>,
    pub measurement: EntropyMeasurement,
    /// The relative-entropy baseline, when this cycle captured it.
    pub baseline: Option<Baseline>,
}

/// A cycle that did not complete.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    /// The id the cycle would have had.
    pub cycle_id: u64,
    pub source: CoreError,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle {} failed: {}", self.cycle_id, self.source)
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

struct CycleState<B: VaultBackend> {
    geoids: Vec<Geoid>,
    vaults: VaultStore<B>,
}

pub struct CognitiveCycle<B: VaultBackend> {
    diffusion: DiffusionEngine,
    contradiction: ContradictionEngine,
    entropy: EntropyEngine,
    stability: StabilityMonitor,
    profile: ProfileSettings,
    max_comparisons: usize,
    embedding_dimension: usize,
    state: Mutex<CycleState<B>>,
    pending: Mutex<Vec<Geoid>>,
    stats: Mutex<VecDeque<CycleStats>>,
    stats_capacity: usize,
    counter: AtomicU64,
}

impl<B: VaultBackend> CognitiveCycle<B> {
    /// Validate `config` and build every engine from it.
    pub fn from_config(config: &EngineConfig, backend: B) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            diffusion: DiffusionEngine::new(&config.diffusion)?,
            contradiction: ContradictionEngine::new(&config.contradiction)?,
            entropy: EntropyEngine::new(&config.entropy)?,
            stability: StabilityMonitor::new(&config.stability),
            profile: ProfileSettings {
                allow_surges: config.contradiction.allow_surges,
            },
            max_comparisons: config.cycle.max_comparisons,
            embedding_dimension: config.embedding.dimension,
            state: Mutex::new(CycleState {
                geoids: Vec::new(),
                vaults: VaultStore::new(backend),
            }),
            pending: Mutex::new(Vec::new()),
            stats: Mutex::new(VecDeque::new()),
            stats_capacity: config.cycle.stats_capacity,
            counter: AtomicU64::new(0),
        })
    }

    pub fn contradiction(&self) -> &ContradictionEngine {
        &self.contradiction
    }

    pub fn entropy(&self) -> &EntropyEngine {
        &self.entropy
    }

    pub fn profile(&self) -> ProfileSettings {
        self.profile
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Queue a geoid for the next cycle. A geoid whose id is already active
    /// replaces the active one at the merge. An embedding of the wrong
    /// dimension is rejected.
    pub fn ingest(&self, geoid: Geoid) -> Result<()> {
        geoid.check_dimension(self.embedding_dimension)?;
        lock(&self.pending).push(geoid);
        Ok(())
    }

    /// Queue several geoids; one rejected geoid queues none of them.
    pub fn ingest_many(&self, geoids: impl IntoIterator<Item = Geoid>) -> Result<()> {
        let geoids: Vec<Geoid> = geoids.into_iter().collect();
        self.check_dimensions(&geoids)?;
        lock(&self.pending).extend(geoids);
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Replace the active population directly, bypassing the queue. Used
    /// when restoring saved state.
    pub fn load_population(&self, geoids: Vec<Geoid>) -> Result<()> {
        self.check_dimensions(&geoids)?;
        lock(&self.state).geoids = geoids;
        Ok(())
    }

    fn check_dimensions(&self, geoids: &[Geoid]) -> Result<()> {
        geoids
            .iter()
            .try_for_each(|g| g.check_dimension(self.embedding_dimension))
    }

    /// Restore counters and histories from a journal.
    pub fn restore(
        &self,
        cycle_count: u64,
        stats: impl IntoIterator<Item = CycleStats>,
        history: impl IntoIterator<Item = EntropyMeasurement>,
    ) {
        self.counter.store(cycle_count, Ordering::SeqCst);
        {
            let mut s = lock(&self.stats);
            s.clear();
            for entry in stats {
                push_bounded(&mut s, entry, self.stats_capacity);
            }
        }
        for m in history {
            self.entropy.push(m);
        }
    }

    // -----------------------------------------------------------------------
    // The cycle
    // -----------------------------------------------------------------------

    pub fn run_cycle(&self) -> std::result::Result<CycleOutcome, CycleError> {
        let mut state = lock(&self.state);
        let cycle_id = self.counter.load(Ordering::SeqCst) + 1;
        let fail = |source: CoreError| CycleError { cycle_id, source };

        let merged = merge_pending(&mut state.geoids, std::mem::take(&mut *lock(&self.pending)));
        if merged > 0 {
            tracing::debug!(cycle_id, merged, "pending geoids merged");
        }
        let captured = (!self.entropy.has_baseline()).then(|| normalized_features(&state.geoids));

        let counts_before = state.vaults.counts().map_err(fail)?;
        let before = self.entropy.measure(&state.geoids, counts_before);

        let working: Vec<Geoid> = state
            .geoids
            .iter()
            .map(|g| {
                let mut g = g.clone();
                g.semantic_state = self.diffusion.diffuse(&g.semantic_state);
                g
            })
            .collect();
        let post_diffusion = self.entropy.shannon_entropy(&working);
        tracing::debug!(cycle_id, geoids = working.len(), "diffusion applied");

        let detection = self
            .contradiction
            .detect_bounded(&working, self.max_comparisons)
            .map_err(fail)?;
        if detection.truncated {
            tracing::warn!(
                cycle_id,
                comparisons = detection.comparisons,
                budget = self.max_comparisons,
                "comparison budget exhausted; remaining pairs skipped this cycle"
            );
        }

        let stability = self.snapshot_locked(&state).map_err(fail)?;
        let index: HashMap<&str, usize> = working
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.as_str(), i))
            .collect();

        let mut resolved = Vec::new();
        let (mut surges, mut buffered) = (0usize, 0usize);
        for gradient in &detection.gradients {
            let pulse = self.contradiction.calculate_pulse_strength(gradient);
            match self
                .contradiction
                .decide_collapse_or_surge(pulse, &stability, &self.profile)
            {
                Decision::Collapse => {
                    let a = &working[index[gradient.geoid_a.as_str()]];
                    let b = &working[index[gradient.geoid_b.as_str()]];
                    let prior = state
                        .vaults
                        .pair_count(&gradient.geoid_a, &gradient.geoid_b)
                        .map_err(fail)?;
                    let scar = Scar::resolve(gradient, a, b, pulse, before.shannon_entropy, post_diffusion, prior)
                        .map_err(fail)?;
                    resolved.push(scar);
                }
                Decision::Surge => surges += 1,
                Decision::Buffer => buffered += 1,
            }
        }

        let scars = state.vaults.insert_scars(resolved).map_err(|e| {
            tracing::error!(cycle_id, error = %e, "scar batch insert failed; cycle aborted");
            fail(e)
        })?;

        // Commit. Nothing below can fail.
        let placed_b = scars.iter().filter(|(_, v)| *v == VaultId::B).count();
        let counts_after = VaultCounts {
            vault_a: counts_before.vault_a + scars.len() - placed_b,
            vault_b: counts_before.vault_b + placed_b,
        };
        if let Some(baseline) = &captured {
            self.entropy.restore_baseline(baseline.clone());
        }
        let measurement = self.entropy.measure(&working, counts_after);
        state.geoids = working;
        drop(state);
        self.entropy.push(measurement.clone());
        self.counter.store(cycle_id, Ordering::SeqCst);

        let stats = CycleStats {
            cycle_id,
            timestamp: now_iso8601(),
            geoid_count: measurement.geoid_count,
            comparisons: detection.comparisons,
            truncated: detection.truncated,
            contradictions_detected: detection.gradients.len(),
            scars_created: scars.len(),
            surges,
            buffered,
            entropy_before: before.shannon_entropy,
            entropy_after: measurement.shannon_entropy,
            entropy_delta: measurement.shannon_entropy - before.shannon_entropy,
        };
        push_bounded(&mut lock(&self.stats), stats.clone(), self.stats_capacity);

        tracing::info!(
            cycle_id,
            contradictions = stats.contradictions_detected,
            scars = stats.scars_created,
            entropy_delta = stats.entropy_delta,
            "cycle complete"
        );

        Ok(CycleOutcome {
            stats,
            scars,
            measurement,
            baseline: captured,
        })
    }

    // -----------------------------------------------------------------------
    // Vaults
    // -----------------------------------------------------------------------

    pub fn rebalance(&self, by_weight: bool) -> Result<usize> {
        lock(&self.state).vaults.rebalance(by_weight)
    }

    pub fn vault_counts(&self) -> Result<VaultCounts> {
        lock(&self.state).vaults.counts()
    }

    pub fn vault_weight(&self, vault: VaultId) -> Result<f64> {
        lock(&self.state).vaults.total_weight(vault)
    }

    /// Run `f` against the backend and the active population under the
    /// state lock.
    pub fn with_backend<R>(&self, f: impl FnOnce(&B, &[Geoid]) -> R) -> R {
        let state = lock(&self.state);
        f(state.vaults.backend(), &state.geoids)
    }

    /// Give the backend back, e.g. to close it.
    pub fn into_backend(self) -> B {
        let state = self.state.into_inner().unwrap_or_else(|e| e.into_inner());
        state.vaults.into_inner()
    }

    // -----------------------------------------------------------------------
    // Telemetry
    // -----------------------------------------------------------------------

    pub fn cycle_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn latest_measurement(&self) -> Option<EntropyMeasurement> {
        self.entropy.latest()
    }

    pub fn entropy_history(&self) -> Vec<EntropyMeasurement> {
        self.entropy.history()
    }

    pub fn latest_cycle_stats(&self) -> Option<CycleStats> {
        lock(&self.stats).back().cloned()
    }

    pub fn cycle_stats(&self) -> Vec<CycleStats> {
        lock(&self.stats).iter().cloned().collect()
    }

    pub fn stability_snapshot(&self) -> Result<StabilitySnapshot> {
        let state = lock(&self.state);
        self.snapshot_locked(&state)
    }

    pub fn geoids(&self) -> Vec<Geoid> {
        lock(&self.state).geoids.clone()
    }

    pub fn geoid_count(&self) -> usize {
        lock(&self.state).geoids.len()
    }

    /// Re-capture the relative-entropy baseline from the active population.
    pub fn set_baseline(&self) {
        let state = lock(&self.state);
        self.entropy.set_baseline(&state.geoids);
    }

    /// Reinstate a saved baseline so relative entropy keeps measuring drift
    /// from the same reference across restarts.
    pub fn restore_baseline(&self, baseline: Baseline) {
        self.entropy.restore_baseline(baseline);
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.entropy.baseline()
    }

    fn snapshot_locked(&self, state: &CycleState<B>) -> Result<StabilitySnapshot> {
        let scars = state.vaults.recent_scars(self.stability.scar_window())?;
        Ok(self.stability.snapshot(&scars, &state.geoids, now_unix_secs()))
    }
}

/// Merge queued geoids into the active set. Known ids are replaced in
/// place, new ids are appended in arrival order.
fn merge_pending(active: &mut Vec<Geoid>, pending: Vec<Geoid>) -> usize {
    let merged = pending.len();
    for geoid in pending {
        match active.iter().position(|g| g.id == geoid.id) {
            Some(pos) => active[pos] = geoid,
            None => active.push(geoid),
        }
    }
    merged
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    if queue.len() >= capacity.max(1) {
        queue.pop_front();
    }
    queue.push_back(item);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

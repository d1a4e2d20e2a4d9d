//! Two-partition scar storage with weight balancing.
//!
//! [`VaultStore`] owns the placement policy (lighter vault wins, ties go to
//! A) and the rebalancing algorithm. The storage technology sits behind
//! [`VaultBackend`]; [`InMemoryVault`] is the reference backend.
//!
//! All mutating operations take `&mut self`, so a rebalance can never
//! interleave with an insert on the same store. Callers that share a store
//! across threads wrap it in a mutex.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::constants::EPSILON;
use crate::entropy::VaultCounts;
use crate::error::{PersistenceFailure, Result};
use crate::scar::{Scar, VaultId};

type BackendResult<T> = std::result::Result<T, PersistenceFailure>;

/// Storage contract for scars.
///
/// Scars are append-only: a backend never edits or deletes scar content.
/// `reassign` is the only membership change and must apply all moves or
/// none.
pub trait VaultBackend {
    fn insert(&mut self, scar: &Scar, vault: VaultId) -> BackendResult<()>;

    /// Insert every placed scar or none of them.
    fn insert_batch(&mut self, placed: &[(Scar, VaultId)]) -> BackendResult<()>;

    fn count(&self, vault: VaultId) -> BackendResult<usize>;

    fn total_weight(&self, vault: VaultId) -> BackendResult<f64>;

    /// Every scar in a vault, oldest first.
    fn scars(&self, vault: VaultId) -> BackendResult<Vec<Scar>>;

    /// Most recent scars across both vaults, newest first.
    fn recent_scars(&self, limit: usize) -> BackendResult<Vec<Scar>>;

    /// Scars already recorded between two geoids, in either order.
    fn pair_count(&self, geoid_a: &str, geoid_b: &str) -> BackendResult<usize>;

    /// Move scars to new vaults atomically.
    fn reassign(&mut self, moves: &[(Uuid, VaultId)]) -> BackendResult<()>;
}

/// Backend holding scars in insertion order.
#[derive(Clone, Debug, Default)]
pub struct InMemoryVault {
    entries: Vec<(Scar, VaultId)>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vault_of(&self, id: Uuid) -> Option<VaultId> {
        self.entries.iter().find(|(s, _)| s.id == id).map(|(_, v)| *v)
    }
}

impl VaultBackend for InMemoryVault {
    fn insert(&mut self, scar: &Scar, vault: VaultId) -> BackendResult<()> {
        if self.entries.iter().any(|(s, _)| s.id == scar.id) {
            return Err(PersistenceFailure::new(format!("duplicate scar {}", scar.id)));
        }
        self.entries.push((scar.clone(), vault));
        Ok(())
    }

    fn insert_batch(&mut self, placed: &[(Scar, VaultId)]) -> BackendResult<()> {
        let mut seen: HashSet<Uuid> = self.entries.iter().map(|(s, _)| s.id).collect();
        for (scar, _) in placed {
            if !seen.insert(scar.id) {
                return Err(PersistenceFailure::new(format!("duplicate scar {}", scar.id)));
            }
        }
        self.entries.extend(placed.iter().cloned());
        Ok(())
    }

    fn count(&self, vault: VaultId) -> BackendResult<usize> {
        Ok(self.entries.iter().filter(|(_, v)| *v == vault).count())
    }

    fn total_weight(&self, vault: VaultId) -> BackendResult<f64> {
        Ok(self
            .entries
            .iter()
            .filter(|(_, v)| *v == vault)
            .map(|(s, _)| s.weight)
            .sum())
    }

    fn scars(&self, vault: VaultId) -> BackendResult<Vec<Scar>> {
        Ok(self
            .entries
            .iter()
            .filter(|(_, v)| *v == vault)
            .map(|(s, _)| s.clone())
            .collect())
    }

    fn recent_scars(&self, limit: usize) -> BackendResult<Vec<Scar>> {
        Ok(self
            .entries
            .iter()
            .rev()
            .take(limit)
            .map(|(s, _)| s.clone())
            .collect())
    }

    fn pair_count(&self, geoid_a: &str, geoid_b: &str) -> BackendResult<usize> {
        Ok(self
            .entries
            .iter()
            .filter(|(s, _)| s.joins(geoid_a, geoid_b))
            .count())
    }

    fn reassign(&mut self, moves: &[(Uuid, VaultId)]) -> BackendResult<()> {
        // Validate every id first so a bad move leaves membership untouched.
        let mut positions = Vec::with_capacity(moves.len());
        for (id, vault) in moves {
            let pos = self
                .entries
                .iter()
                .position(|(s, _)| s.id == *id)
                .ok_or_else(|| PersistenceFailure::new(format!("scar not found: {id}")))?;
            positions.push((pos, *vault));
        }
        for (pos, vault) in positions {
            self.entries[pos].1 = vault;
        }
        Ok(())
    }
}

pub struct VaultStore<B: VaultBackend> {
    backend: B,
}

impl<B: VaultBackend> VaultStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Place a scar in the vault with the lower total weight (ties → A).
    pub fn insert_scar(&mut self, scar: &Scar) -> Result<VaultId> {
        let weight_a = self.backend.total_weight(VaultId::A)?;
        let weight_b = self.backend.total_weight(VaultId::B)?;
        let vault = if weight_b < weight_a { VaultId::B } else { VaultId::A };
        self.backend.insert(scar, vault)?;
        tracing::debug!(scar = %scar.id, vault = %vault, "scar inserted");
        Ok(vault)
    }

    /// Place a batch of scars as one unit. Each scar goes to the vault that
    /// is lighter once the earlier scars of the batch are counted (ties →
    /// A); nothing is stored unless the whole batch is.
    pub fn insert_scars(&mut self, scars: Vec<Scar>) -> Result<Vec<(Scar, VaultId)>> {
        if scars.is_empty() {
            return Ok(Vec::new());
        }
        let mut weight_a = self.backend.total_weight(VaultId::A)?;
        let mut weight_b = self.backend.total_weight(VaultId::B)?;
        let placed: Vec<(Scar, VaultId)> = scars
            .into_iter()
            .map(|scar| {
                let vault = if weight_b < weight_a {
                    weight_b += scar.weight;
                    VaultId::B
                } else {
                    weight_a += scar.weight;
                    VaultId::A
                };
                (scar, vault)
            })
            .collect();
        self.backend.insert_batch(&placed)?;
        tracing::debug!(scars = placed.len(), "scar batch inserted");
        Ok(placed)
    }

    pub fn count(&self, vault: VaultId) -> Result<usize> {
        Ok(self.backend.count(vault)?)
    }

    pub fn counts(&self) -> Result<VaultCounts> {
        Ok(VaultCounts {
            vault_a: self.backend.count(VaultId::A)?,
            vault_b: self.backend.count(VaultId::B)?,
        })
    }

    pub fn total_weight(&self, vault: VaultId) -> Result<f64> {
        Ok(self.backend.total_weight(vault)?)
    }

    pub fn recent_scars(&self, limit: usize) -> Result<Vec<Scar>> {
        Ok(self.backend.recent_scars(limit)?)
    }

    pub fn pair_count(&self, geoid_a: &str, geoid_b: &str) -> Result<usize> {
        Ok(self.backend.pair_count(geoid_a, geoid_b)?)
    }

    /// Move scars between vaults to minimize the count difference
    /// (`by_weight = false`) or the total-weight difference. Returns the
    /// number of scars whose vault changed. Scar content and the total
    /// count are untouched.
    pub fn rebalance(&mut self, by_weight: bool) -> Result<usize> {
        let a = self.backend.scars(VaultId::A)?;
        let b = self.backend.scars(VaultId::B)?;

        let moves = if by_weight {
            plan_by_weight(&a, &b)
        } else {
            plan_by_count(&a, &b)
        };

        if !moves.is_empty() {
            self.backend.reassign(&moves)?;
        }
        tracing::info!(
            moved = moves.len(),
            by_weight,
            "vault rebalance complete"
        );
        Ok(moves.len())
    }
}

/// Move the newest scars of the larger vault until counts differ by ≤ 1.
fn plan_by_count(a: &[Scar], b: &[Scar]) -> Vec<(Uuid, VaultId)> {
    let (larger, target) = if a.len() > b.len() {
        (a, VaultId::B)
    } else {
        (b, VaultId::A)
    };
    let excess = a.len().abs_diff(b.len()) / 2;
    larger
        .iter()
        .rev()
        .take(excess)
        .map(|s| (s.id, target))
        .collect()
}

/// Greedy single moves from the heavier vault, each picking the scar that
/// most reduces the weight difference, until no move helps.
fn plan_by_weight(a: &[Scar], b: &[Scar]) -> Vec<(Uuid, VaultId)> {
    let original: HashMap<Uuid, VaultId> = a
        .iter()
        .map(|s| (s.id, VaultId::A))
        .chain(b.iter().map(|s| (s.id, VaultId::B)))
        .collect();
    let weights: HashMap<Uuid, f64> = a.iter().chain(b).map(|s| (s.id, s.weight)).collect();

    let mut assignment = original.clone();
    let mut weight_a: f64 = a.iter().map(|s| s.weight).sum();
    let mut weight_b: f64 = b.iter().map(|s| s.weight).sum();

    // Each accepted move strictly shrinks the difference; the cap only
    // guards against float noise.
    for _ in 0..=original.len() {
        let diff = (weight_a - weight_b).abs();
        let heavier = if weight_a >= weight_b { VaultId::A } else { VaultId::B };

        let best = assignment
            .iter()
            .filter(|(_, v)| **v == heavier)
            .map(|(id, _)| (*id, (diff - 2.0 * weights[id]).abs()))
            .min_by(|x, y| x.1.total_cmp(&y.1).then_with(|| x.0.cmp(&y.0)));

        let Some((id, new_diff)) = best else { break };
        if new_diff >= diff - EPSILON {
            break;
        }

        let w = weights[&id];
        match heavier {
            VaultId::A => {
                weight_a -= w;
                weight_b += w;
            }
            VaultId::B => {
                weight_b -= w;
                weight_a += w;
            }
        }
        assignment.insert(id, heavier.other());
    }

    let mut moves: Vec<(Uuid, VaultId)> = assignment
        .into_iter()
        .filter(|(id, v)| original[id] != *v)
        .collect();
    moves.sort_by_key(|(id, _)| *id);
    moves
}

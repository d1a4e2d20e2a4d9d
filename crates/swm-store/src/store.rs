use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use swm_core::{
    Baseline, CycleOutcome, CycleStats, EntropyMeasurement, Geoid, PersistenceFailure, Scar, VaultBackend,
    VaultId,
};

use crate::error::{Result, StoreError};
use crate::schema;

const BASELINE_KEY: &str = "entropy_baseline";

const SCAR_COLUMNS: &str = "id, geoid_a, geoid_b, reason, timestamp, pre_entropy, post_entropy,
     delta_entropy, cdp, semantic_polarity, mutation_frequency, weight";

/// SQLite persistence for one engine: the two scar vaults, the geoid
/// population and the per-cycle journal.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        set_metadata_on(&self.conn, key, value)
    }

    /// The relative-entropy baseline captured by the first cycle, if any.
    pub fn load_baseline(&self) -> Result<Option<Baseline>> {
        self.get_metadata(BASELINE_KEY)?
            .map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .transpose()
    }

    pub fn save_baseline(&self, baseline: &Baseline) -> Result<()> {
        set_metadata_on(&self.conn, BASELINE_KEY, &serde_json::to_string(baseline)?)
    }

    // --- Population ---

    /// Replace the stored population, keeping the given order.
    pub fn save_geoids(&self, geoids: &[Geoid]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        save_geoids_on(&tx, geoids)?;
        tx.commit()?;
        Ok(())
    }

    /// Merge geoids into the stored population: known ids are replaced in
    /// place, new ids are appended. Returns how many ids were new.
    pub fn upsert_geoids(&self, geoids: &[Geoid]) -> Result<usize> {
        let mut population = self.load_geoids()?;
        let mut added = 0;
        for geoid in geoids {
            match population.iter().position(|g| g.id == geoid.id) {
                Some(pos) => population[pos] = geoid.clone(),
                None => {
                    population.push(geoid.clone());
                    added += 1;
                }
            }
        }
        self.save_geoids(&population)?;
        Ok(added)
    }

    pub fn load_geoids(&self) -> Result<Vec<Geoid>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM geoids ORDER BY position")?;
        let bodies: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }

    // --- Journal ---

    /// Persist a completed cycle: population, measurement, summary and a
    /// newly captured baseline in one transaction.
    pub fn record_cycle(&self, outcome: &CycleOutcome, geoids: &[Geoid]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        save_geoids_on(&tx, geoids)?;
        if let Some(baseline) = &outcome.baseline {
            set_metadata_on(&tx, BASELINE_KEY, &serde_json::to_string(baseline)?)?;
        }
        append_measurement_on(&tx, outcome.stats.cycle_id, &outcome.measurement)?;
        append_cycle_stats_on(&tx, &outcome.stats)?;
        tx.commit()?;
        tracing::debug!(cycle_id = outcome.stats.cycle_id, "cycle journaled");
        Ok(())
    }

    pub fn append_measurement(&self, cycle_id: u64, measurement: &EntropyMeasurement) -> Result<()> {
        append_measurement_on(&self.conn, cycle_id, measurement)
    }

    pub fn append_cycle_stats(&self, stats: &CycleStats) -> Result<()> {
        append_cycle_stats_on(&self.conn, stats)
    }

    /// The last `limit` measurements, oldest first.
    pub fn load_measurements(&self, limit: usize) -> Result<Vec<EntropyMeasurement>> {
        let mut stmt = self.conn.prepare(
            "SELECT body FROM (
                SELECT id, body FROM entropy_measurements ORDER BY id DESC LIMIT ?1
             ) ORDER BY id",
        )?;
        let bodies: Vec<String> = stmt
            .query_map([limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }

    /// The last `limit` cycle summaries, oldest first.
    pub fn load_cycle_stats(&self, limit: usize) -> Result<Vec<CycleStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT body FROM (
                SELECT cycle_id, body FROM cycle_stats ORDER BY cycle_id DESC LIMIT ?1
             ) ORDER BY cycle_id",
        )?;
        let bodies: Vec<String> = stmt
            .query_map([limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }

    /// Highest journaled cycle id, 0 when no cycle has run.
    pub fn cycle_count(&self) -> Result<u64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(cycle_id) FROM cycle_stats", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0).max(0) as u64)
    }

    // --- Scars ---

    /// Every scar with its vault, in insertion order.
    pub fn all_scars(&self) -> Result<Vec<(Scar, VaultId)>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SCAR_COLUMNS}, vault FROM scars ORDER BY rowid"))?;
        let rows = stmt
            .query_map([], |row| Ok((scar_row(row)?, row.get::<_, String>(12)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(r, vault)| Ok((r.into_scar()?, parse_vault(&vault)?)))
            .collect()
    }

    fn query_scars(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Scar>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, scar_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(ScarRow::into_scar).collect()
    }

    fn insert_scar_rows(&self, placed: &[(Scar, VaultId)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for (scar, vault) in placed {
            // An error drops the transaction and rolls back the batch.
            insert_scar_on(&tx, scar, *vault)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn reassign_rows(&self, moves: &[(Uuid, VaultId)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE scars SET vault = ?1 WHERE id = ?2")?;
            for (id, vault) in moves {
                let rows = stmt.execute(params![vault.as_str(), id.to_string()])?;
                if rows == 0 {
                    // Dropping the transaction rolls back earlier moves.
                    return Err(StoreError::InvalidData(format!("scar not found: {id}")));
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl VaultBackend for Store {
    fn insert(&mut self, scar: &Scar, vault: VaultId) -> std::result::Result<(), PersistenceFailure> {
        Ok(insert_scar_on(&self.conn, scar, vault)?)
    }

    fn insert_batch(&mut self, placed: &[(Scar, VaultId)]) -> std::result::Result<(), PersistenceFailure> {
        Ok(self.insert_scar_rows(placed)?)
    }

    fn count(&self, vault: VaultId) -> std::result::Result<usize, PersistenceFailure> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM scars WHERE vault = ?1",
                [vault.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(n as usize)
    }

    fn total_weight(&self, vault: VaultId) -> std::result::Result<f64, PersistenceFailure> {
        let w: f64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(weight), 0.0) FROM scars WHERE vault = ?1",
                [vault.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(w)
    }

    fn scars(&self, vault: VaultId) -> std::result::Result<Vec<Scar>, PersistenceFailure> {
        Ok(self.query_scars(
            &format!("SELECT {SCAR_COLUMNS} FROM scars WHERE vault = ?1 ORDER BY rowid"),
            [vault.as_str()],
        )?)
    }

    fn recent_scars(&self, limit: usize) -> std::result::Result<Vec<Scar>, PersistenceFailure> {
        Ok(self.query_scars(
            &format!("SELECT {SCAR_COLUMNS} FROM scars ORDER BY rowid DESC LIMIT ?1"),
            [limit as i64],
        )?)
    }

    fn pair_count(&self, geoid_a: &str, geoid_b: &str) -> std::result::Result<usize, PersistenceFailure> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM scars
                 WHERE (geoid_a = ?1 AND geoid_b = ?2) OR (geoid_a = ?2 AND geoid_b = ?1)",
                params![geoid_a, geoid_b],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(n as usize)
    }

    fn reassign(&mut self, moves: &[(Uuid, VaultId)]) -> std::result::Result<(), PersistenceFailure> {
        Ok(self.reassign_rows(moves)?)
    }
}

fn set_metadata_on(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn insert_scar_on(conn: &Connection, scar: &Scar, vault: VaultId) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO scars ({SCAR_COLUMNS}, vault)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            scar.id.to_string(),
            scar.geoid_a,
            scar.geoid_b,
            scar.reason,
            scar.timestamp,
            scar.pre_entropy,
            scar.post_entropy,
            scar.delta_entropy,
            scar.cdp,
            scar.semantic_polarity,
            scar.mutation_frequency,
            scar.weight,
            vault.as_str(),
        ],
    )?;
    Ok(())
}

fn save_geoids_on(conn: &Connection, geoids: &[Geoid]) -> Result<()> {
    conn.execute("DELETE FROM geoids", [])?;
    let mut stmt = conn.prepare("INSERT INTO geoids (id, position, body) VALUES (?1, ?2, ?3)")?;
    for (position, geoid) in geoids.iter().enumerate() {
        stmt.execute(params![
            geoid.id,
            position as i64,
            serde_json::to_string(geoid)?
        ])?;
    }
    Ok(())
}

fn append_measurement_on(
    conn: &Connection,
    cycle_id: u64,
    measurement: &EntropyMeasurement,
) -> Result<()> {
    conn.execute(
        "INSERT INTO entropy_measurements (cycle_id, timestamp, body) VALUES (?1, ?2, ?3)",
        params![
            cycle_id as i64,
            measurement.timestamp,
            serde_json::to_string(measurement)?
        ],
    )?;
    Ok(())
}

fn append_cycle_stats_on(conn: &Connection, stats: &CycleStats) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO cycle_stats (cycle_id, timestamp, body) VALUES (?1, ?2, ?3)",
        params![
            stats.cycle_id as i64,
            stats.timestamp,
            serde_json::to_string(stats)?
        ],
    )?;
    Ok(())
}

/// Raw scar columns; the id is parsed outside the row callback.
struct ScarRow {
    id: String,
    geoid_a: String,
    geoid_b: String,
    reason: String,
    timestamp: String,
    pre_entropy: f64,
    post_entropy: f64,
    delta_entropy: f64,
    cdp: f64,
    semantic_polarity: f64,
    mutation_frequency: u32,
    weight: f64,
}

impl ScarRow {
    fn into_scar(self) -> Result<Scar> {
        Ok(Scar {
            id: parse_uuid(&self.id)?,
            geoid_a: self.geoid_a,
            geoid_b: self.geoid_b,
            reason: self.reason,
            timestamp: self.timestamp,
            pre_entropy: self.pre_entropy,
            post_entropy: self.post_entropy,
            delta_entropy: self.delta_entropy,
            cdp: self.cdp,
            semantic_polarity: self.semantic_polarity,
            mutation_frequency: self.mutation_frequency,
            weight: self.weight,
        })
    }
}

fn scar_row(row: &Row<'_>) -> rusqlite::Result<ScarRow> {
    Ok(ScarRow {
        id: row.get(0)?,
        geoid_a: row.get(1)?,
        geoid_b: row.get(2)?,
        reason: row.get(3)?,
        timestamp: row.get(4)?,
        pre_entropy: row.get(5)?,
        post_entropy: row.get(6)?,
        delta_entropy: row.get(7)?,
        cdp: row.get(8)?,
        semantic_polarity: row.get(9)?,
        mutation_frequency: row.get(10)?,
        weight: row.get(11)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}

fn parse_vault(s: &str) -> Result<VaultId> {
    s.parse()
        .map_err(|_| StoreError::InvalidData(format!("invalid vault '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use swm_core::{
        CognitiveCycle, EngineConfig, GradientKind, TensionGradient, VaultStore,
    };

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn scar(weight: f64) -> Scar {
        let gradient = TensionGradient {
            geoid_a: "a".into(),
            geoid_b: "b".into(),
            score: weight,
            kind: GradientKind::Composite,
        };
        Scar::resolve(
            &gradient,
            &Geoid::new("a").with_embedding(vec![1.0, 0.0]),
            &Geoid::new("b").with_embedding(vec![0.0, 1.0]),
            weight,
            1.0,
            0.8,
            0,
        )
        .unwrap()
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.embedding.dimension = 3;
        config
    }

    fn opposed_pair() -> Vec<Geoid> {
        vec![
            Geoid::new("a")
                .with_semantic([("a", 1.0)])
                .with_symbolic([("status", json!("on"))])
                .with_embedding(vec![0.9, 0.8, 0.1]),
            Geoid::new("b")
                .with_semantic([("b", 1.0)])
                .with_symbolic([("status", json!("off"))])
                .with_embedding(vec![-0.9, -0.8, 0.9]),
        ]
    }

    #[test]
    fn test_scar_roundtrip() {
        let mut store = Store::open_in_memory().unwrap();
        let original = scar(0.75);
        store.insert(&original, VaultId::B).unwrap();

        let loaded = store.scars(VaultId::B).unwrap();
        assert_eq!(loaded, vec![original.clone()]);
        assert!(store.scars(VaultId::A).unwrap().is_empty());

        let all = store.all_scars().unwrap();
        assert_eq!(all, vec![(original, VaultId::B)]);
    }

    #[test]
    fn test_duplicate_scar_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        let s = scar(0.6);
        store.insert(&s, VaultId::A).unwrap();
        let err = store.insert(&s, VaultId::B).unwrap_err();
        assert!(err.message.contains("SQLite"));
    }

    #[test]
    fn test_counts_and_weights() {
        let mut store = Store::open_in_memory().unwrap();
        assert_eq!(store.total_weight(VaultId::A).unwrap(), 0.0);
        store.insert(&scar(0.6), VaultId::A).unwrap();
        store.insert(&scar(0.9), VaultId::A).unwrap();
        store.insert(&scar(0.7), VaultId::B).unwrap();

        assert_eq!(store.count(VaultId::A).unwrap(), 2);
        assert_eq!(store.count(VaultId::B).unwrap(), 1);
        assert!((store.total_weight(VaultId::A).unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(store.pair_count("b", "a").unwrap(), 3);
    }

    #[test]
    fn test_recent_scars_newest_first() {
        let mut store = Store::open_in_memory().unwrap();
        let scars: Vec<Scar> = (0..5).map(|i| scar(0.5 + 0.1 * i as f64)).collect();
        for s in &scars {
            store.insert(s, VaultId::A).unwrap();
        }
        let recent = store.recent_scars(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, scars[4].id);
        assert_eq!(recent[1].id, scars[3].id);
    }

    #[test]
    fn test_reassign_is_atomic() {
        let mut store = Store::open_in_memory().unwrap();
        let s = scar(0.6);
        store.insert(&s, VaultId::A).unwrap();

        let result = store.reassign(&[(s.id, VaultId::B), (Uuid::new_v4(), VaultId::B)]);
        assert!(result.is_err());
        assert_eq!(store.count(VaultId::A).unwrap(), 1);
        assert_eq!(store.count(VaultId::B).unwrap(), 0);
    }

    #[test]
    fn test_vault_store_over_sqlite() {
        let mut rng = rng();
        let mut backend = Store::open_in_memory().unwrap();
        for _ in 0..11 {
            backend.insert(&scar(rng.random_range(0.5..1.0)), VaultId::A).unwrap();
        }
        let mut vaults = VaultStore::new(backend);

        let moved = vaults.rebalance(false).unwrap();
        assert_eq!(moved, 5);
        let counts = vaults.counts().unwrap();
        assert_eq!(counts.total(), 11);
        assert!(counts.vault_a.abs_diff(counts.vault_b) <= 1);

        let weight_a = vaults.total_weight(VaultId::A).unwrap();
        let weight_b = vaults.total_weight(VaultId::B).unwrap();
        let lighter = if weight_b < weight_a { VaultId::B } else { VaultId::A };
        assert_eq!(vaults.insert_scar(&scar(0.8)).unwrap(), lighter);
    }

    #[test]
    fn test_geoids_roundtrip_keeps_order() {
        let store = Store::open_in_memory().unwrap();
        let geoids = vec![
            Geoid::new("z").with_semantic([("b", 2.0), ("a", 1.0)]),
            Geoid::new("a").with_symbolic([("status", json!({"nested": [1, 2]}))]),
        ];
        store.save_geoids(&geoids).unwrap();
        let loaded = store.load_geoids().unwrap();
        assert_eq!(loaded, geoids);
        let keys: Vec<&str> = loaded[0].semantic_state.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);

        store.save_geoids(&geoids[..1]).unwrap();
        assert_eq!(store.load_geoids().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_geoids() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_geoids(&[Geoid::new("a"), Geoid::new("b")])
            .unwrap();

        let replacement = Geoid::new("a").with_semantic([("x", 1.0)]);
        let added = store
            .upsert_geoids(&[replacement.clone(), Geoid::new("c")])
            .unwrap();
        assert_eq!(added, 1);

        let loaded = store.load_geoids().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(loaded[0], replacement);
    }

    #[test]
    fn test_cycle_journal_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let cycle = CognitiveCycle::from_config(&config(), store).unwrap();
        cycle.ingest_many(opposed_pair()).unwrap();

        for _ in 0..3 {
            let outcome = cycle.run_cycle().unwrap();
            cycle
                .with_backend(|store, geoids| store.record_cycle(&outcome, geoids))
                .unwrap();
        }

        let store = cycle.into_backend();
        assert_eq!(store.cycle_count().unwrap(), 3);
        assert_eq!(store.load_geoids().unwrap().len(), 2);
        assert_eq!(store.all_scars().unwrap().len(), 3);

        let stats = store.load_cycle_stats(2).unwrap();
        assert_eq!(stats.iter().map(|s| s.cycle_id).collect::<Vec<_>>(), vec![2, 3]);
        let history = store.load_measurements(10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].vault_counts.total(), 3);
    }

    #[test]
    fn test_resume_from_store() {
        let store = Store::open_in_memory().unwrap();
        let cycle = CognitiveCycle::from_config(&config(), store).unwrap();
        cycle.ingest_many(opposed_pair()).unwrap();
        let outcome = cycle.run_cycle().unwrap();
        cycle
            .with_backend(|store, geoids| store.record_cycle(&outcome, geoids))
            .unwrap();
        let store = cycle.into_backend();

        let geoids = store.load_geoids().unwrap();
        let count = store.cycle_count().unwrap();
        let stats = store.load_cycle_stats(100).unwrap();
        let history = store.load_measurements(100).unwrap();
        let resumed = CognitiveCycle::from_config(&config(), store).unwrap();
        resumed.load_population(geoids).unwrap();
        resumed.restore(count, stats, history);

        let next = resumed.run_cycle().unwrap();
        assert_eq!(next.stats.cycle_id, 2);
        assert_eq!(next.scars[0].0.mutation_frequency, 2);
        assert_eq!(resumed.entropy_history().len(), 2);
    }

    #[test]
    fn test_baseline_journaled_with_first_cycle() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_baseline().unwrap().is_none());

        let cycle = CognitiveCycle::from_config(&config(), store).unwrap();
        cycle.ingest_many(opposed_pair()).unwrap();
        for _ in 0..2 {
            let outcome = cycle.run_cycle().unwrap();
            cycle
                .with_backend(|store, geoids| store.record_cycle(&outcome, geoids))
                .unwrap();
        }
        let captured = cycle.baseline().unwrap();
        let store = cycle.into_backend();
        assert_eq!(store.load_baseline().unwrap(), Some(captured.clone()));

        let mut replaced = captured.clone();
        replaced.insert("z".into(), 0.0);
        store.save_baseline(&replaced).unwrap();
        assert_eq!(store.load_baseline().unwrap(), Some(replaced));
    }

    #[test]
    fn test_insert_batch_is_atomic() {
        let mut store = Store::open_in_memory().unwrap();
        let existing = scar(0.6);
        store.insert(&existing, VaultId::A).unwrap();

        let fresh = scar(0.7);
        let result = store.insert_batch(&[(fresh.clone(), VaultId::B), (existing, VaultId::B)]);
        assert!(result.is_err());
        assert_eq!(store.count(VaultId::A).unwrap(), 1);
        assert_eq!(store.count(VaultId::B).unwrap(), 0);

        store.insert_batch(&[(fresh, VaultId::B), (scar(0.8), VaultId::A)]).unwrap();
        assert_eq!(store.count(VaultId::A).unwrap(), 2);
        assert_eq!(store.count(VaultId::B).unwrap(), 1);
    }

    #[test]
    fn test_metadata() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_metadata("foo").unwrap().is_none());
        store.set_metadata("foo", "bar").unwrap();
        assert_eq!(store.get_metadata("foo").unwrap(), Some("bar".to_string()));
        store.set_metadata("foo", "baz").unwrap();
        assert_eq!(store.get_metadata("foo").unwrap(), Some("baz".to_string()));
    }

    #[test]
    fn test_empty_store() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.cycle_count().unwrap(), 0);
        assert!(store.load_geoids().unwrap().is_empty());
        assert!(store.load_measurements(10).unwrap().is_empty());
        assert!(store.all_scars().unwrap().is_empty());
    }
}

mod config;
mod runner;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use swm_core::{
    CognitiveCycle, CycleStats, EmbeddingBackend, EngineConfig, Geoid, VaultId,
    embed_with_fallback, tokenize,
};
use swm_store::Store;

pub type Engine = CognitiveCycle<Store>;

#[derive(Parser)]
#[command(name = "swm", about = "Semantic working memory: diffusion, contradiction and entropy cycles")]
struct Cli {
    /// Engine configuration file (default: $SWM_DATA_DIR/swm.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add geoids from JSON files, or one geoid from text
    Ingest {
        /// JSON files holding a geoid object or an array of geoids
        files: Vec<PathBuf>,

        /// Build a geoid from this text instead
        #[arg(long, conflicts_with = "files", requires = "id")]
        text: Option<String>,

        /// Identifier for the text geoid
        #[arg(long)]
        id: Option<String>,

        /// JSON object mapping text to precomputed embedding vectors
        #[arg(long)]
        embeddings: Option<PathBuf>,
    },

    /// Run cognitive cycles now
    Cycle {
        #[arg(long, default_value_t = 1)]
        count: u64,
    },

    /// Run cycles on a fixed interval until Ctrl-C
    Run {
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Show engine statistics
    Stats,

    /// Show the stability snapshot
    Stability,

    /// Rebalance scars between the two vaults
    Rebalance {
        /// Balance total weight instead of scar count
        #[arg(long)]
        by_weight: bool,
    },

    /// Export state to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Ingest {
            files,
            text,
            id,
            embeddings,
        } => cmd_ingest(&cli, files, text.as_deref(), id.as_deref(), embeddings.as_deref()),
        Commands::Cycle { count } => cmd_cycle(&cli, *count),
        Commands::Run {
            interval_ms,
            cycles,
        } => {
            let engine = Arc::new(open_engine(&cli)?);
            runner::run(engine, *interval_ms, *cycles).await
        }
        Commands::Stats => cmd_stats(&cli),
        Commands::Stability => cmd_stability(&cli),
        Commands::Rebalance { by_weight } => cmd_rebalance(&cli, *by_weight),
        Commands::Export { path } => cmd_export(&cli, path),
    }
}

// ---------------------------------------------------------------------------
// Engine setup
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    config::load(cli.config.as_deref(), &config::data_dir())
}

fn open_store() -> Result<Store> {
    let dir = config::data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Store::open(&dir.join(config::DB_FILE)).context("failed to open store")
}

/// Build the engine over the on-disk store and restore its journal.
fn open_engine(cli: &Cli) -> Result<Engine> {
    let config = load_config(cli)?;
    let store = open_store()?;

    let geoids = store.load_geoids().context("failed to load geoids")?;
    let baseline = store
        .load_baseline()
        .context("failed to load entropy baseline")?;
    let cycle_count = store.cycle_count().context("failed to read cycle count")?;
    let stats = store
        .load_cycle_stats(config.cycle.stats_capacity)
        .context("failed to load cycle stats")?;
    let history = store
        .load_measurements(config.entropy.history_capacity)
        .context("failed to load entropy history")?;

    let engine = CognitiveCycle::from_config(&config, store).context("invalid engine config")?;
    engine
        .load_population(geoids)
        .context("stored population does not match embedding.dimension")?;
    engine.restore(cycle_count, stats, history);
    if let Some(baseline) = baseline {
        engine.restore_baseline(baseline);
    }
    tracing::debug!(cycle_count, geoids = engine.geoid_count(), "engine restored");
    Ok(engine)
}

/// Run one cycle and journal it. A failed cycle journals nothing.
pub fn run_and_record(engine: &Engine) -> Result<CycleStats> {
    let outcome = engine.run_cycle()?;
    engine
        .with_backend(|store, geoids| store.record_cycle(&outcome, geoids))
        .context("failed to journal cycle")?;
    Ok(outcome.stats)
}

pub fn print_cycle(stats: &CycleStats) {
    println!(
        "cycle {}: geoids={} contradictions={} scars={} entropy {:.4} -> {:.4} (delta {:+.4}){}",
        stats.cycle_id,
        stats.geoid_count,
        stats.contradictions_detected,
        stats.scars_created,
        stats.entropy_before,
        stats.entropy_after,
        stats.entropy_delta,
        if stats.truncated { " [truncated]" } else { "" },
    );
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_ingest(
    cli: &Cli,
    files: &[PathBuf],
    text: Option<&str>,
    id: Option<&str>,
    embeddings: Option<&Path>,
) -> Result<()> {
    let config = load_config(cli)?;
    let store = open_store()?;

    let mut geoids = Vec::new();
    if let Some(text) = text {
        let id = id.context("--id is required with --text")?;
        let table = embeddings.map(load_embedding_table).transpose()?;
        geoids.push(geoid_from_text(&config, id, text, table.as_ref())?);
    }
    for path in files {
        let parsed = read_geoids(path)?;
        println!("read {} → {} geoids", path.display(), parsed.len());
        geoids.extend(parsed);
    }
    if geoids.is_empty() {
        anyhow::bail!("nothing to ingest: pass JSON files or --text");
    }
    for geoid in &geoids {
        geoid
            .check_dimension(config.embedding.dimension)
            .with_context(|| format!("geoid '{}' rejected", geoid.id))?;
    }

    let added = store
        .upsert_geoids(&geoids)
        .context("failed to save geoids")?;
    let total = store.load_geoids().context("failed to load geoids")?.len();
    println!(
        "done. ingested={}, new={}, replaced={}, total={}",
        geoids.len(),
        added,
        geoids.len() - added,
        total
    );
    Ok(())
}

fn read_geoids(path: &Path) -> Result<Vec<Geoid>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let geoids = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|g: Geoid| vec![g])
    };
    geoids.with_context(|| format!("invalid geoid in {}", path.display()))
}

fn load_embedding_table(path: &Path) -> Result<HashMap<String, Vec<f64>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid embedding table {}", path.display()))
}

/// Token counts become the semantic state; the embedding comes from the
/// configured backend chain.
fn geoid_from_text(
    config: &EngineConfig,
    id: &str,
    text: &str,
    table: Option<&HashMap<String, Vec<f64>>>,
) -> Result<Geoid> {
    let chain = EmbeddingBackend::chain(
        &config.embedding.backends,
        config.embedding.dimension,
        table,
    );
    let embedding = embed_with_fallback(&chain, text).context("no embedding backend succeeded")?;

    let mut geoid = Geoid::new(id).with_embedding(embedding);
    for token in tokenize(text) {
        let w = geoid.semantic_state.get(&token).unwrap_or(0.0);
        geoid.semantic_state.insert(token, w + 1.0);
    }
    geoid.metadata.insert("source".into(), json!("text"));
    Ok(geoid)
}

fn cmd_cycle(cli: &Cli, count: u64) -> Result<()> {
    let engine = open_engine(cli)?;
    for _ in 0..count {
        let stats = run_and_record(&engine)?;
        print_cycle(&stats);
    }
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    let counts = engine.vault_counts().context("failed to count scars")?;

    println!("cycles:     {}", engine.cycle_count());
    println!("geoids:     {}", engine.geoid_count());
    println!(
        "scars:      {} (A={}, B={})",
        counts.total(),
        counts.vault_a,
        counts.vault_b
    );
    println!(
        "weight:     A={:.3}, B={:.3}",
        engine.vault_weight(VaultId::A)?,
        engine.vault_weight(VaultId::B)?
    );
    match engine.latest_measurement() {
        Some(m) => {
            println!(
                "entropy:    shannon={:.4} thermodynamic={:.4} relative={:.4} ({})",
                m.shannon_entropy,
                m.thermodynamic_entropy,
                m.relative_entropy,
                m.estimator
            );
            println!(
                "info:       conditional={:.4} mutual={:.4}",
                m.conditional_entropy, m.mutual_information
            );
            println!(
                "complexity: {:.3} ({})",
                m.system_complexity,
                m.phase.as_str()
            );
        }
        None => println!("entropy:    (no measurements)"),
    }
    if let Some(last) = engine.latest_cycle_stats() {
        print!("last:       ");
        print_cycle(&last);
    }
    Ok(())
}

fn cmd_stability(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    let s = engine
        .stability_snapshot()
        .context("failed to compute stability")?;

    println!("vault_pressure:                  {:.4}", s.vault_pressure);
    println!("semantic_cohesion:               {:.4}", s.semantic_cohesion);
    println!("entropic_stability:              {:.4}", s.entropic_stability);
    println!("axis_convergence:                {:.4}", s.axis_convergence());
    println!("vault_resonance:                 {:.4}", s.vault_resonance());
    println!(
        "contradiction_lineage_ambiguity: {:.4}",
        s.contradiction_lineage_ambiguity()
    );
    Ok(())
}

fn cmd_rebalance(cli: &Cli, by_weight: bool) -> Result<()> {
    let engine = open_engine(cli)?;
    let moved = engine
        .rebalance(by_weight)
        .context("failed to rebalance vaults")?;
    let counts = engine.vault_counts()?;
    println!(
        "moved {} scars (A={}, B={})",
        moved, counts.vault_a, counts.vault_b
    );
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let engine = open_engine(cli)?;
    let scars = engine
        .with_backend(|store, _| store.all_scars())
        .context("failed to load scars")?;

    let export = json!({
        "cycle_count": engine.cycle_count(),
        "geoids": engine.geoids(),
        "scars": scars
            .iter()
            .map(|(scar, vault)| json!({ "vault": vault, "scar": scar }))
            .collect::<Vec<_>>(),
        "cycle_stats": engine.cycle_stats(),
        "entropy_history": engine.entropy_history(),
    });
    let text = serde_json::to_string_pretty(&export).context("failed to serialize state")?;
    std::fs::write(path, &text).with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

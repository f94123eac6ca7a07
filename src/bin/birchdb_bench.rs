use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::time::{Duration, Instant};

use BirchDB::{BTree, MemStore};

/// Простой детерминированный PRNG (SplitMix64).
/// Достаточен для бенчей; не криптостойкий.
#[derive(Clone)]
struct Rng64 {
    state: u64,
}
impl Rng64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Простой прогресс‑репорт на ~10 шагов.
struct Progress<'a> {
    name: &'a str,
    total: usize,
    step: usize,
    next: usize,
    start: Instant,
    enabled: bool,
}
impl<'a> Progress<'a> {
    fn new(name: &'a str, total: usize, enabled: bool) -> Self {
        let step = std::cmp::max(1, total / 10);
        Self {
            name,
            total,
            step,
            next: step,
            start: Instant::now(),
            enabled,
        }
    }
    fn bump(&mut self, cur: usize) {
        if !self.enabled {
            return;
        }
        if cur >= self.next || cur == self.total {
            let pct = (cur as f64 / self.total.max(1) as f64) * 100.0;
            let elapsed = self.start.elapsed().as_secs_f64();
            let tput = if elapsed > 0.0 { cur as f64 / elapsed } else { 0.0 };
            println!(
                "[{:>10}] {:>7} / {:<7} ({:>5.1}%) elapsed={:.2}s, tput={:.0} ops/s",
                self.name, cur, self.total, pct, elapsed, tput
            );
            self.next = cur.saturating_add(self.step);
        }
    }
}

/// BirchDB micro-benchmark CLI
///
/// Примеры:
///   birchdb_bench --n 200000 --value-size 64 --json
///   birchdb_bench --n 50000 --value-size 512 --seed 7
#[derive(Parser, Debug)]
#[command(name = "birchdb_bench", version, about = "BirchDB micro-bench CLI")]
struct Opt {
    /// Total keys for point tests (fill, gets, delete)
    #[arg(long, default_value_t = 100_000)]
    n: u64,

    /// Value size (bytes)
    #[arg(long, default_value_t = 128)]
    value_size: usize,

    /// Number of miss probes (read-miss)
    #[arg(long, default_value_t = 50_000)]
    n_miss: u64,

    /// Random seed
    #[arg(long, default_value_t = 0xA1B2_C3D4_E5F6_7788)]
    seed: u64,

    /// JSON output
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Show progress for each phase
    #[arg(long, default_value_t = true)]
    progress: bool,
}

#[derive(Debug, Clone, Serialize)]
struct PhaseStats {
    name: String,
    ops: u64,
    elapsed_sec: f64,
    p50_ms: f64,
    p90_ms: f64,
    p99_ms: f64,
    tput_ops: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BenchReport {
    phases: Vec<PhaseStats>,
    // дерево по завершении fill
    height: usize,
    pages_after_fill: usize,
    pages_after_delete: usize,
    // metrics snapshot
    metrics: BirchDB::metrics::MetricsSnapshot,
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("bench error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::parse();

    // Сброс метрик перед запуском — чтобы отчёт был только про текущий прогон.
    BirchDB::metrics::reset();

    // Build keysets
    let mut rng = Rng64::new(opt.seed);
    let n = opt.n as usize;
    let mut keys: Vec<Vec<u8>> = Vec::with_capacity(n);
    for i in 0..n {
        let k = format!("k-{:016x}-{:08x}", rng.next_u64(), i as u32);
        keys.push(k.into_bytes());
    }

    // Miss keys
    let n_miss = opt.n_miss as usize;
    let mut miss_keys: Vec<Vec<u8>> = Vec::with_capacity(n_miss);
    for i in 0..n_miss {
        let k = format!("m-{:016x}-{:08x}", rng.next_u64(), i as u32);
        miss_keys.push(k.into_bytes());
    }

    // Values
    let val = vec![0xAB; opt.value_size];

    let mut tree = BTree::new(MemStore::new())?;
    let mut phases: Vec<PhaseStats> = Vec::new();

    // Phase A: fill (insert)
    println!("==> Phase: fill ({} keys)", keys.len());
    phases.push(phase_fill(&opt, &mut tree, &keys, &val)?);

    let height = tree.height()?;
    let pages_after_fill = tree.store.allocated();

    // Phase B: read hits (get), random order
    println!("==> Phase: get_hits ({} keys, random order)", keys.len());
    phases.push(phase_get_hits(&opt, &tree, &keys)?);

    // Phase C: read miss
    println!("==> Phase: get_miss ({} keys)", miss_keys.len());
    phases.push(phase_get_miss(&opt, &tree, &miss_keys)?);

    // Phase D: overwrite (last-write-wins по тем же ключам)
    println!("==> Phase: overwrite ({} keys)", keys.len());
    phases.push(phase_overwrite(&opt, &mut tree, &keys, &val)?);

    // Phase E: delete all
    println!("==> Phase: delete ({} keys)", keys.len());
    phases.push(phase_delete(&opt, &mut tree, &keys)?);

    let pages_after_delete = tree.store.allocated();
    let snap = BirchDB::metrics::snapshot();

    let report = BenchReport {
        phases,
        height,
        pages_after_fill,
        pages_after_delete,
        metrics: snap,
    };

    if opt.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report_human(&report);
    }

    Ok(())
}

// ---------- phases ----------

fn phase_fill(
    opt: &Opt,
    tree: &mut BTree<MemStore>,
    keys: &[Vec<u8>],
    val: &[u8],
) -> Result<PhaseStats> {
    let mut lat = Vec::with_capacity(keys.len());
    let mut prog = Progress::new("fill", keys.len(), opt.progress);
    let start = Instant::now();
    for (i, k) in keys.iter().enumerate() {
        let t0 = Instant::now();
        tree.insert(k, val)?;
        lat.push(t0.elapsed());
        prog.bump(i + 1);
    }
    let elapsed = start.elapsed();
    let stats = stats("fill", keys.len() as u64, elapsed, &mut lat);
    print_phase_summary(&stats);
    Ok(stats)
}

fn phase_get_hits(opt: &Opt, tree: &BTree<MemStore>, keys: &[Vec<u8>]) -> Result<PhaseStats> {
    // случайный порядок (Fisher–Yates)
    let mut order: Vec<usize> = (0..keys.len()).collect();
    let mut rng = Rng64::new(opt.seed ^ 0xDEAD_BEEF_CAFE_BABE);
    for i in (1..order.len()).rev() {
        let j = (rng.next_u64() as usize) % (i + 1);
        order.swap(i, j);
    }

    let mut lat = Vec::with_capacity(keys.len());
    let mut prog = Progress::new("get_hits", keys.len(), opt.progress);
    let start = Instant::now();
    for (n, idx) in order.into_iter().enumerate() {
        let t0 = Instant::now();
        let got = tree.get(&keys[idx])?;
        if got.is_none() {
            return Err(anyhow!("get_hits: missing key at idx {}", idx));
        }
        lat.push(t0.elapsed());
        prog.bump(n + 1);
    }
    let elapsed = start.elapsed();
    let stats = stats("get_hits", keys.len() as u64, elapsed, &mut lat);
    print_phase_summary(&stats);
    Ok(stats)
}

fn phase_get_miss(opt: &Opt, tree: &BTree<MemStore>, miss_keys: &[Vec<u8>]) -> Result<PhaseStats> {
    let mut lat = Vec::with_capacity(miss_keys.len());
    let mut prog = Progress::new("get_miss", miss_keys.len(), opt.progress);
    let start = Instant::now();
    for (i, k) in miss_keys.iter().enumerate() {
        let t0 = Instant::now();
        if tree.get(k)?.is_some() {
            return Err(anyhow!("get_miss: unexpected hit at {}", i));
        }
        lat.push(t0.elapsed());
        prog.bump(i + 1);
    }
    let elapsed = start.elapsed();
    let stats = stats("get_miss", miss_keys.len() as u64, elapsed, &mut lat);
    print_phase_summary(&stats);
    Ok(stats)
}

fn phase_overwrite(
    opt: &Opt,
    tree: &mut BTree<MemStore>,
    keys: &[Vec<u8>],
    val: &[u8],
) -> Result<PhaseStats> {
    let mut lat = Vec::with_capacity(keys.len());
    let mut prog = Progress::new("overwrite", keys.len(), opt.progress);
    let start = Instant::now();
    for (i, k) in keys.iter().enumerate() {
        let t0 = Instant::now();
        tree.update(k, val)?;
        lat.push(t0.elapsed());
        prog.bump(i + 1);
    }
    let elapsed = start.elapsed();
    let stats = stats("overwrite", keys.len() as u64, elapsed, &mut lat);
    print_phase_summary(&stats);
    Ok(stats)
}

fn phase_delete(opt: &Opt, tree: &mut BTree<MemStore>, keys: &[Vec<u8>]) -> Result<PhaseStats> {
    let mut lat = Vec::with_capacity(keys.len());
    let mut prog = Progress::new("delete", keys.len(), opt.progress);
    let start = Instant::now();
    for (i, k) in keys.iter().enumerate() {
        let t0 = Instant::now();
        let existed = tree.delete(k)?;
        if !existed {
            return Err(anyhow!("delete: key at {} was already absent", i));
        }
        lat.push(t0.elapsed());
        prog.bump(i + 1);
    }
    let elapsed = start.elapsed();
    let stats = stats("delete", keys.len() as u64, elapsed, &mut lat);
    print_phase_summary(&stats);
    Ok(stats)
}

// ---------- helpers ----------

fn print_phase_summary(p: &PhaseStats) {
    println!(
        "    {:>10} done: ops={} elapsed={:.3}s, tput={:.0} ops/s, p50={:.3}ms p90={:.3}ms p99={:.3}ms",
        p.name, p.ops, p.elapsed_sec, p.tput_ops, p.p50_ms, p.p90_ms, p.p99_ms
    );
}

fn stats(name: &str, ops: u64, elapsed: Duration, lat: &mut [Duration]) -> PhaseStats {
    lat.sort_unstable();
    let to_ms = |d: Duration| d.as_secs_f64() * 1000.0;
    let p = |q: f64| -> f64 {
        if lat.is_empty() {
            return 0.0;
        }
        let idx = ((lat.len() as f64 - 1.0) * q).round() as usize;
        to_ms(lat[idx])
    };
    let p50 = p(0.50);
    let p90 = p(0.90);
    let p99 = p(0.99);
    let tput = if elapsed.as_secs_f64() > 0.0 {
        ops as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    PhaseStats {
        name: name.to_string(),
        ops,
        elapsed_sec: elapsed.as_secs_f64(),
        p50_ms: p50,
        p90_ms: p90,
        p99_ms: p99,
        tput_ops: tput,
    }
}

fn print_report_human(r: &BenchReport) {
    println!("BirchDB bench report:");
    println!("  height (after fill) = {}", r.height);
    println!("  pages after fill    = {}", r.pages_after_fill);
    println!("  pages after delete  = {}", r.pages_after_delete);
    println!("Phases:");
    for p in &r.phases {
        println!(
            "  {:>12}: ops={} elapsed={:.3}s tput={:.0} ops/s p50={:.3}ms p90={:.3}ms p99={:.3}ms",
            p.name, p.ops, p.elapsed_sec, p.tput_ops, p.p50_ms, p.p90_ms, p.p99_ms
        );
    }
    let m = &r.metrics;
    println!("Metrics snapshot:");
    println!("  tree_splits     = {}", m.tree_splits);
    println!("  tree_merges     = {}", m.tree_merges);
    println!("  root_grows      = {}", m.root_grows);
    println!("  root_shrinks    = {}", m.root_shrinks);
    println!("  pages_published = {}", m.pages_published);
    println!("  pages_freed     = {}", m.pages_freed);
    println!("  pages_live      = {}", m.pages_live());
}

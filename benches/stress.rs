use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveTime;
use ulid::Ulid;

use courtbook::engine::{Engine, EngineError, EngineSettings};
use courtbook::model::*;
use courtbook::registry::InMemoryRegistry;
use courtbook::store::WalStore;

const HOUR: Ms = 3_600_000;
/// 2024-03-11T00:00:00Z
const BASE: Ms = 1_710_115_200_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn rfc3339(ms: Ms) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .unwrap()
        .to_rfc3339()
}

/// One facility with `courts` courts, alternating indoor/outdoor. Returns its token.
fn add_facility(registry: &InMemoryRegistry, courts: u32) -> Identity {
    let token = format!("bench-{}", Ulid::new());
    let facility = Facility {
        id: FacilityId(Ulid::new()),
        name: "Bench Club".into(),
        email: "bench@example.com".into(),
        address: None,
        slot_duration_minutes: 60,
        schedule: WeeklySchedule::uniform(
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
        ),
        courts: (1..=courts)
            .map(|id| Court {
                id: CourtId(id),
                category: if id % 2 == 0 {
                    CourtCategory::Outdoor
                } else {
                    CourtCategory::Indoor
                },
            })
            .collect(),
    };
    registry.register(facility, vec![token.clone()]).unwrap();
    Identity::new(token)
}

async fn phase1_sequential(engine: &Engine, registry: &InMemoryRegistry) {
    let identity = add_facility(registry, 1);
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = rfc3339(BASE + (i as i64) * HOUR);
        let t = Instant::now();
        engine
            .commit_reservation(&identity, CourtId(1), &s)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("commit latency", &mut latencies);
}

async fn phase2_concurrent(engine: Arc<Engine>, registry: &InMemoryRegistry) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        // Each task books its own facility
        let identity = add_facility(registry, 4);
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let court = CourtId(1 + (j % 4) as u32);
                let s = rfc3339(BASE + (j as i64 / 4) * HOUR);
                engine.commit_reservation(&identity, court, &s).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} reservations = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contention(engine: Arc<Engine>, registry: &InMemoryRegistry) {
    let identity = add_facility(registry, 1);
    let slots = 100;
    let contenders = 20;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    for slot in 0..slots {
        let s = rfc3339(BASE + slot * HOUR);
        let mut handles = Vec::new();
        for _ in 0..contenders {
            let engine = engine.clone();
            let identity = identity.clone();
            let s = s.clone();
            let (won, lost) = (won.clone(), lost.clone());
            handles.push(tokio::spawn(async move {
                match engine.commit_reservation(&identity, CourtId(1), &s).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::SlotAlreadyBooked { .. }) => lost.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    let won = won.load(Ordering::Relaxed);
    let lost = lost.load(Ordering::Relaxed);
    println!(
        "  {slots} slots x {contenders} contenders: {won} won, {lost} rejected in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, slots as usize, "double booking detected");
}

async fn phase4_read_under_load(engine: Arc<Engine>, registry: &InMemoryRegistry) {
    let identity = add_facility(registry, 8);
    // Pre-fill the scanned day
    for court in 1..=8 {
        for hour in 0..24 {
            let s = rfc3339(BASE + hour * HOUR);
            engine
                .commit_reservation(&identity, CourtId(court), &s)
                .await
                .unwrap();
        }
    }

    // Writers keep booking later days of the same facility
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..4u32 {
        let engine = engine.clone();
        let identity = identity.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = rfc3339(BASE + (48 + i) * HOUR);
                let _ = engine
                    .commit_reservation(&identity, CourtId(1 + w * 2), &s)
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let engine = engine.clone();
        let identity = identity.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let report = engine
                    .get_occupancy(&identity, Some("2024-03-10"))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
                assert_eq!(report.indoor.len() + report.outdoor.len(), 8);
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("occupancy query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join(format!("courtbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();

    let registry = Arc::new(InMemoryRegistry::new());
    let store = Arc::new(WalStore::open(&dir.join("reservations.wal")).unwrap());
    let engine = Arc::new(Engine::new(
        registry.clone(),
        registry.clone(),
        store,
        EngineSettings::default(),
    ));

    println!("=== courtbook stress benchmark ===");
    println!("data: {}\n", dir.display());

    println!("[phase 1] sequential commit throughput");
    phase1_sequential(&engine, &registry).await;

    println!("\n[phase 2] concurrent commit throughput");
    phase2_concurrent(engine.clone(), &registry).await;

    println!("\n[phase 3] same-slot contention");
    phase3_contention(engine.clone(), &registry).await;

    println!("\n[phase 4] occupancy latency under write load");
    phase4_read_under_load(engine.clone(), &registry).await;

    let _ = std::fs::remove_dir_all(&dir);
    println!("\n=== done ===");
}

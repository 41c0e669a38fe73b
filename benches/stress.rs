use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

/// Where and as whom to connect. The user must be an admin of the
/// organization in the server's roster.
#[derive(Clone)]
struct Target {
    host: String,
    port: u16,
    user: String,
    password: String,
    organization: String,
}

async fn connect(target: &Target) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .dbname(&target.organization)
        .user(&target.user)
        .password(&target.password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
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
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
}

fn day(offset: u64) -> NaiveDate {
    base_date().checked_add_days(Days::new(offset)).unwrap()
}

fn day_edit_sql(guide: Ulid, date: NaiveDate, i: usize) -> String {
    let (morning, afternoon) = if i % 2 == 0 {
        ("available", "blocked")
    } else {
        ("blocked", "available")
    };
    format!(
        "INSERT INTO day_slots (guide_id, slot_date, time_slot, status) VALUES \
         ('{guide}', '{date}', 'morning', '{morning}'), \
         ('{guide}', '{date}', 'afternoon', '{afternoon}')"
    )
}

fn bulk_sql(guide: Ulid, start: NaiveDate, end: NaiveDate, slots: &str, status: &str) -> String {
    format!(
        "INSERT INTO bulk_availability (guide_id, from_date, to_date, weekdays, time_slots, status) \
         VALUES ('{guide}', '{start}', '{end}', '1,2,3,4,5', '{slots}', '{status}')"
    )
}

fn list_sql(guide: Ulid, from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "SELECT * FROM slots WHERE guide_id = '{guide}' AND slot_date >= '{from}' AND slot_date <= '{to}'"
    )
}

async fn phase1_sequential(target: &Target) {
    let client = connect(target).await;
    let guide = Ulid::new();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let sql = day_edit_sql(guide, day((i % 365) as u64), i);
        let t = Instant::now();
        client.batch_execute(&sql).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} day edits in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_bulk(target: &Target) {
    let n_tasks = 10;
    let n_per_task = 50;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&target).await;
            let guide = Ulid::new();
            for j in 0..n_per_task {
                let status = if j % 2 == 0 { "available" } else { "blocked" };
                let slots = if j % 3 == 0 { "full_day" } else { "morning,afternoon" };
                client
                    .batch_execute(&bulk_sql(guide, day(0), day(89), slots, status))
                    .await
                    .unwrap();
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
        "  {n_tasks} tasks x {n_per_task} bulk edits = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Writers hammer the same guide the readers list, so list latency includes
/// time spent waiting behind the per-guide lock.
async fn phase3_read_under_load(target: &Target) {
    let guide = Ulid::new();
    let setup_client = connect(target).await;
    setup_client
        .batch_execute(&bulk_sql(guide, day(0), day(89), "full_day", "available"))
        .await
        .unwrap();
    drop(setup_client);

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let target = target.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&target).await;
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let _ = client
                    .batch_execute(&day_edit_sql(guide, day(((w * 17 + i) % 90) as u64), i))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for _ in 0..n_readers {
        let target = target.clone();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&target).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .simple_query(&list_sql(guide, day(0), day(89)))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
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

    print_latency("list query", &mut all_latencies);
}

async fn phase4_connection_storm(target: &Target) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let target = target.clone();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&target).await;
            let guide = Ulid::new();
            for i in 0..ops_per_conn {
                client
                    .batch_execute(&day_edit_sql(guide, day(i as u64), i))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let env = |var: &str, default: &str| std::env::var(var).unwrap_or_else(|_| default.into());
    let target = Target {
        host: env("DAYBOOK_HOST", "127.0.0.1"),
        port: env("DAYBOOK_PORT", "5433").parse().expect("invalid DAYBOOK_PORT"),
        user: env("DAYBOOK_USER", "admin"),
        password: env("DAYBOOK_PASSWORD", "daybook"),
        organization: env("DAYBOOK_ORG", "bench"),
    };

    println!("=== daybook stress benchmark ===");
    println!("target: {}:{} org={}\n", target.host, target.port, target.organization);

    // Each phase works on fresh guides so phases never contend with each other.

    println!("[phase 1] sequential day edits");
    phase1_sequential(&target).await;

    println!("\n[phase 2] concurrent bulk edits");
    phase2_concurrent_bulk(&target).await;

    println!("\n[phase 3] list latency under write load");
    phase3_read_under_load(&target).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&target).await;

    println!("\n=== benchmark complete ===");
}

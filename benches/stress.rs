use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(host: &str, port: u16) -> Self {
        let stream = TcpStream::connect((host, port)).await.expect("connect failed");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn request(&mut self, req: &Value) -> Value {
        let mut line = req.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        let reply = self.lines.next_line().await.unwrap().expect("server closed connection");
        serde_json::from_str(&reply).unwrap()
    }

    async fn create(&mut self, space: &str, start: NaiveDate, end: NaiveDate) -> bool {
        let reply = self
            .request(&json!({
                "op": "create_reservation",
                "space_type": space,
                "start_date": start,
                "end_date": end,
            }))
            .await;
        reply["ok"] == true
    }
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

/// Each run books far in the future at a random offset so repeated runs against
/// one server mostly land on empty days.
fn base_date() -> NaiveDate {
    let jitter = (ulid::Ulid::new().random() % 20_000) as u64;
    NaiveDate::from_ymd_opt(2200, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(jitter * 40))
        .unwrap()
}

fn day(base: NaiveDate, offset: u64) -> NaiveDate {
    base.checked_add_days(Days::new(offset)).unwrap()
}

async fn phase1_sequential(host: &str, port: u16, base: NaiveDate) {
    let mut client = Client::connect(host, port).await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let mut accepted = 0;
    let start = Instant::now();

    for i in 0..n {
        // Four per day fills coworking exactly.
        let d = day(base, (i / 4) as u64);
        let t = Instant::now();
        if client.create("coworking", d, d).await {
            accepted += 1;
        }
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} bookings ({accepted} accepted) in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("write latency", &mut latencies);
}

async fn phase2_contention(host: &str, port: u16, base: NaiveDate) {
    let n_tasks = 32;
    let d = day(base, 1000);
    let accepted = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let host = host.to_string();
        let accepted = accepted.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(&host, port).await;
            if client.create("private-office", d, day(d, 2)).await {
                accepted.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let accepted = accepted.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} racing bookings for one range: {accepted} accepted in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert!(accepted <= 3, "capacity exceeded: {accepted} > 3");
}

async fn phase3_read_under_load(host: &str, port: u16, base: NaiveDate) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5u64 {
        let host = host.to_string();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut client = Client::connect(&host, port).await;
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let d = day(base, 2000 + w * 5000 + i);
                client.create("meeting-room", d, d).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let mut client = Client::connect(&host, port).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let start = day(base, (i % 400) as u64);
                let t = Instant::now();
                client
                    .request(&json!({
                        "op": "check_availability",
                        "space_type": "coworking",
                        "start_date": start,
                        "end_date": day(start, 6),
                    }))
                    .await;
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

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16, base: NaiveDate) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for c in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(&host, port).await;
            for i in 0..ops_per_conn {
                let d = day(base, 40_000 + (c * ops_per_conn + i) as u64);
                client.create("coworking", d, d).await;
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

async fn phase5_lifecycle_scan(host: &str, port: u16) {
    let mut client = Client::connect(host, port).await;
    let t = Instant::now();
    let reply = client.request(&json!({ "op": "run_now" })).await;
    println!(
        "  run_now in {:.2}ms: {}",
        t.elapsed().as_secs_f64() * 1000.0,
        reply.get("data").unwrap_or(&reply)
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("SPACEBOOK_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("SPACEBOOK_PORT")
        .unwrap_or_else(|_| "7878".into())
        .parse()
        .expect("invalid SPACEBOOK_PORT");

    println!("=== spacebook stress benchmark ===");
    println!("target: {host}:{port}\n");

    let base = base_date();
    println!("[setup] booking from {base}");

    println!("\n[phase 1] sequential write throughput");
    phase1_sequential(&host, port, base).await;

    println!("\n[phase 2] racing writes on one range");
    phase2_contention(&host, port, base).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&host, port, base).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port, base).await;

    println!("\n[phase 5] lifecycle scan");
    phase5_lifecycle_scan(&host, port).await;

    println!("\n=== benchmark complete ===");
}

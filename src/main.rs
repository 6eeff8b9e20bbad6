use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strata::buffer::BufferPool;
use strata::catalog::Catalog;
use strata::common::{BufferPoolConfig, LockWait, TableId};
use strata::concurrency::Transaction;
use strata::recovery::MemoryLog;
use strata::storage::disk::HeapFile;
use strata::tuple::{FieldType, TupleBuilder, TupleDesc};

const WORKERS: usize = 4;
const ROWS_PER_TXN: usize = 25;
const TXNS_PER_WORKER: usize = 5;
const MAX_ATTEMPTS: usize = 10;

enum Outcome {
    Committed { worker: usize, attempts: usize },
    GaveUp { worker: usize, error: String },
}

/// Inserts one batch of rows in a single transaction.
fn insert_batch(
    pool: &BufferPool,
    table_id: TableId,
    desc: &Arc<TupleDesc>,
    base: i32,
) -> strata::Result<()> {
    let txn = Transaction::begin(pool);
    for i in 0..ROWS_PER_TXN as i32 {
        let id = base + i;
        let mut row = TupleBuilder::new(desc.clone())
            .value(id)
            .value(format!("row-{id}"))
            .build();
        pool.insert_tuple(txn.id(), table_id, &mut row)?;
    }
    txn.commit()
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("Strata - heap storage with a NO-STEAL/FORCE buffer pool");
    println!("=======================================================\n");

    let db_path = "demo.dat";
    let desc = TupleDesc::builder()
        .field("id", FieldType::Integer)
        .field("label", FieldType::Text(24))
        .build_arc();
    let file = Arc::new(HeapFile::open(db_path, desc.clone()).expect("Failed to open heap file"));
    println!("Opened heap file: {}", file.path().display());

    let catalog = Arc::new(Catalog::new());
    let table_id = catalog.add_table(file.clone(), "demo", "id");

    let config = BufferPoolConfig::default()
        .with_max_pages(16)
        .with_lock_wait(LockWait::between(
            Duration::from_millis(20),
            Duration::from_millis(80),
        ));
    let log = Arc::new(MemoryLog::new());
    let pool = Arc::new(BufferPool::new(config, catalog, log.clone()));
    println!("Created buffer pool with {} pages\n", pool.max_pages());

    let (tx, rx) = unbounded();
    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let pool = pool.clone();
            let desc = desc.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                for batch in 0..TXNS_PER_WORKER {
                    let base = ((worker * TXNS_PER_WORKER + batch) * ROWS_PER_TXN) as i32;
                    let mut attempts = 0;
                    let outcome = loop {
                        attempts += 1;
                        match insert_batch(&pool, table_id, &desc, base) {
                            Ok(()) => break Outcome::Committed { worker, attempts },
                            Err(e) if e.is_abort() && attempts < MAX_ATTEMPTS => {
                                warn!(worker, attempts, "transaction aborted, retrying");
                            }
                            Err(e) => {
                                break Outcome::GaveUp {
                                    worker,
                                    error: e.to_string(),
                                }
                            }
                        }
                    };
                    let _ = tx.send(outcome);
                }
            })
        })
        .collect();
    drop(tx);

    let mut committed = 0;
    let mut retries = 0;
    for outcome in rx {
        match outcome {
            Outcome::Committed { worker, attempts } => {
                committed += 1;
                retries += attempts - 1;
                info!(worker, attempts, "batch committed");
            }
            Outcome::GaveUp { worker, error } => {
                println!("Worker {} gave up on a batch: {}", worker, error);
            }
        }
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    println!("Committed {} transactions ({} retries)", committed, retries);
    println!("Log records: {} ({} forces)", log.records().len(), log.force_count());

    // Scan the table back
    let reader = Transaction::begin(&pool);
    let mut scan = file.iter(&pool, reader.id());
    scan.open();
    let mut rows = 0;
    for tuple in scan.by_ref() {
        match tuple {
            Ok(_) => rows += 1,
            Err(e) => {
                println!("Scan failed: {}", e);
                break;
            }
        }
    }
    scan.close();
    drop(scan);
    reader.commit().expect("Failed to commit reader");

    let pages = file.num_pages().expect("Failed to read heap file size");
    println!("\nTable 'demo' spans {} pages and holds {} rows", pages, rows);

    // Clean up
    drop(pool);
    drop(file);
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}

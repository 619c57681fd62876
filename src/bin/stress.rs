use std::sync::Arc;
use std::thread;

use clap::Parser;

use pagepool::buffer_pool::BufferPoolManager;
use pagepool::disk_manager::FileDiskManager;
use pagepool::logger::init_logger;
use pagepool::random::{gen_random_bool, gen_random_int};

/// Hammer a file-backed pool from multiple threads and report what happened.
#[derive(Parser)]
struct Opts {
    /// Number of frames in the pool
    #[arg(long, default_value_t = 16)]
    frames: usize,

    /// LRU-K history depth
    #[arg(long, default_value_t = 2)]
    k: usize,

    /// Number of pages the workload touches
    #[arg(long, default_value_t = 64)]
    pages: usize,

    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Operations per thread
    #[arg(long, default_value_t = 10_000)]
    ops: usize,

    /// Fraction of operations that write
    #[arg(long, default_value_t = 0.3)]
    write_ratio: f64,
}

fn main() {
    init_logger();
    let opts = Opts::parse();

    let temp_dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(FileDiskManager::new(temp_dir.path().join("stress.db")).unwrap());
    let pool = BufferPoolManager::new(opts.frames, opts.k, disk);

    let page_ids: Vec<_> = (0..opts.pages)
        .map(|_| {
            let guard = pool.new_page_guarded().unwrap();
            guard.page_id()
        })
        .collect();

    thread::scope(|s| {
        for _ in 0..opts.threads {
            s.spawn(|| {
                for _ in 0..opts.ops {
                    let page_id = page_ids[gen_random_int(0, page_ids.len() - 1)];
                    if gen_random_bool(opts.write_ratio) {
                        let mut guard = pool.fetch_page_write(page_id).unwrap();
                        guard[0] = guard[0].wrapping_add(1);
                    } else {
                        let guard = pool.fetch_page_read(page_id).unwrap();
                        std::hint::black_box(guard[0]);
                    }
                }
            });
        }
    });

    pool.flush_all_pages().unwrap();

    println!(
        "{} pages over {} frames, {} threads x {} ops",
        opts.pages, opts.frames, opts.threads, opts.ops
    );
    println!(
        "resident: {}, free: {}, evictable: {}",
        pool.resident_page_count(),
        pool.free_frame_count(),
        pool.replacer_size()
    );
    assert_eq!(
        pool.resident_page_count() + pool.free_frame_count(),
        pool.pool_size()
    );
    println!("{}", pool.stats_string());
}

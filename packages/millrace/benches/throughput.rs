//! Throughput harness for the channel.
//!
//! Run: cargo bench --bench throughput

use std::{
    thread,
    time::Instant,
};

use millrace::Channel;

const COUNT: u64 = 1_000_000;
const EXPECTED_SUM: u64 = COUNT * (COUNT - 1) / 2;

fn run(label: &str, producers: u64, consumers: u64) {
    assert_eq!(COUNT % producers, 0);
    assert_eq!(COUNT % consumers, 0);

    let ch = Channel::<u64>::new();
    let start = Instant::now();

    let sending: Vec<_> = (0..producers)
        .map(|p| {
            let ch = ch.clone();
            thread::spawn(move || {
                let per = COUNT / producers;
                for i in 0..per {
                    ch.send(p * per + i).unwrap();
                }
            })
        })
        .collect();
    let receiving: Vec<_> = (0..consumers)
        .map(|_| {
            let ch = ch.clone();
            thread::spawn(move || {
                let mut sum = 0u64;
                for _ in 0..COUNT / consumers {
                    sum = sum.wrapping_add(ch.recv().unwrap());
                }
                sum
            })
        })
        .collect();

    for handle in sending {
        handle.join().unwrap();
    }
    let sum: u64 = receiving.into_iter().map(|handle| handle.join().unwrap()).sum();
    let elapsed = start.elapsed();

    assert_eq!(sum, EXPECTED_SUM);
    println!(
        "{label}: {COUNT} msgs in {elapsed:?} ({:.0} msgs/sec)",
        COUNT as f64 / elapsed.as_secs_f64(),
    );
}

fn main() {
    run("spsc    ", 1, 1);
    run("mpmc 4x4", 4, 4);
    run("mpmc 8x8", 8, 8);
}

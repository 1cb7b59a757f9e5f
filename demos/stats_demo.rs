use std::hash::RandomState;

use clap::Parser;
use zset_core::Dict;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "entries", default_value_t = 1000)]
    entries: usize,

    /// Disable voluntary resizing so chains grow until the forced ratio kicks in
    #[arg(long = "no_resize", default_value_t = false)]
    no_resize: bool,
}

fn print_histogram(hist: &[usize]) {
    println!("=== Chain Length Histogram ===");
    let buckets: usize = hist.iter().sum();
    for (len, count) in hist.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        println!(
            "{:>3}: {:>8} ({:.2}%)",
            len,
            count,
            *count as f64 / buckets as f64 * 100.0
        );
    }
}

fn main() {
    let args = Args::parse();

    println!("Filling Dict with {} u64 keys", args.entries);
    let mut dict: Dict<u64, u64, RandomState> = Dict::new();
    dict.set_resize_enabled(!args.no_resize);

    let mut shown_mid_rehash = false;
    for i in 0..args.entries as u64 {
        if let Err(err) = dict.add(i, i) {
            eprintln!("Failed to add {}: {}", i, err);
            return;
        }
        if dict.is_rehashing() && !shown_mid_rehash {
            shown_mid_rehash = true;
            println!("Mid-rehash at {} entries:", dict.len());
            for stats in dict.debug_stats() {
                stats.print();
            }
        }
    }

    println!("Inserted {} entries", dict.len());
    if dict.is_rehashing() {
        println!("Rehash in progress at bucket {:?}", dict.rehash_index());
    }

    print_histogram(&dict.chain_histogram());
    let [primary, target] = dict.debug_stats();
    primary.print();
    if target.size > 0 {
        target.print();
    }

    if let Err(err) = dict.rehash_to_completion() {
        eprintln!("Rehash failed: {}", err);
        return;
    }
    println!("After completing the rehash:");
    dict.debug_stats()[0].print();
}

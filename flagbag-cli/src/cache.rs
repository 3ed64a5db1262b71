use std::process;
use std::sync::Arc;

use flagbag_lib::{FlagCache, Storage};

pub fn run_show(storage: Arc<dyn Storage>) {
    match FlagCache::new(storage).entry() {
        Ok(Some(entry)) => match serde_json::to_string_pretty(&entry) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize cache entry: {}", e);
                process::exit(1);
            }
        },
        Ok(None) => println!("No cached flags"),
        Err(e) => {
            eprintln!("Failed to read cache: {}", e);
            process::exit(1);
        }
    }
}

pub fn run_clear(storage: Arc<dyn Storage>) {
    if let Err(e) = FlagCache::new(storage).clear() {
        eprintln!("Failed to clear cache: {}", e);
        process::exit(1);
    }
    println!("✓ Cache cleared");
}

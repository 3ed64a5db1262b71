use std::process;

use flagbag_lib::{FlagEngine, Identity};

pub async fn run_fetch(engine: &FlagEngine, identity: Option<Identity>) {
    let flags = match engine.fetch_once(identity.as_ref()).await {
        Ok(flags) => flags,
        Err(e) => {
            eprintln!("Failed to fetch flags: {}", e);
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&flags) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize flags: {}", e);
            process::exit(1);
        }
    }
}

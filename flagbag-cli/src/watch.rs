use std::time::Duration;

use flagbag_lib::{FlagEngine, FlagSession, Identity, ResolveOptions};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval_at, Instant, Interval};

/// Watch flags for one identity, printing every resolution as a JSON line.
///
/// Each line read on stdin and every `interval` tick counts as regained
/// focus. Runs until Ctrl+C.
pub async fn run_watch(
    engine: &FlagEngine,
    identity: Option<Identity>,
    interval: Option<u64>,
    revalidate_on_focus: bool,
) {
    let session = engine.resolve(ResolveOptions {
        identity,
        initial_flags: None,
        revalidate_on_focus: Some(revalidate_on_focus),
    });

    let mut updates = Box::pin(session.updates());
    let printer = tokio::spawn(async move {
        while let Some(resolution) = updates.next().await {
            match serde_json::to_string(&resolution) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "failed to serialize resolution"),
            }
        }
    });

    let mounting = session.clone();
    tokio::spawn(async move { mounting.mount().await });

    let mut ticker = interval
        .filter(|secs| *secs > 0)
        .map(|secs| {
            let period = Duration::from_secs(secs);
            interval_at(Instant::now() + period, period)
        });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => revalidate(&session),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            _ = tick(&mut ticker) => revalidate(&session),
            _ = &mut ctrl_c => break,
        }
    }

    session.close();
    drop(session);
    printer.abort();
    eprintln!("Stopped watching");
}

fn revalidate(session: &FlagSession) {
    let session = session.clone();
    tokio::spawn(async move {
        if !session.focus().await {
            tracing::debug!("focus revalidation disabled");
        }
    });
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

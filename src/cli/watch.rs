use super::{preview, ui};
use crate::core::FeedConfiguration;
use crate::refresh::RefreshScheduler;
use anyhow::Result;
use tracing::info;

/// Prints the preview after every applied cycle until interrupted, or until
/// `max_cycles` cycles have been shown.
pub async fn run(
    mut scheduler: RefreshScheduler,
    config: FeedConfiguration,
    max_cycles: Option<usize>,
) -> Result<()> {
    let mut rx = scheduler.subscribe();
    info!(
        symbol = %config.symbol,
        cadence_secs = scheduler.cadence().as_secs(),
        "Watching feed"
    );
    scheduler.set_configuration(config.clone()).await;

    let mut shown = 0;
    let mut last_cycle = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if snapshot.cycle == last_cycle || snapshot.loading {
                    continue;
                }
                last_cycle = snapshot.cycle;

                ui::print_separator();
                println!("{}", preview::render(&config, &snapshot));
                shown += 1;
                if max_cycles.is_some_and(|max| shown >= max) {
                    break;
                }
            }
        }
    }

    scheduler.shutdown();
    Ok(())
}

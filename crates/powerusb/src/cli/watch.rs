//! `watch` subcommand: sample current draw until Ctrl+C.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use super::{
    Config, RUNNING, Result, StripSelector, Transport, WATCH_TICK, WatchSample, json_error,
    with_strip,
};

/// Sleep for `total`, waking early if Ctrl+C clears `RUNNING`.
fn sleep_while_running(total: Duration) {
    let deadline = Instant::now() + total;
    while RUNNING.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(WATCH_TICK));
    }
}

/// Sample until Ctrl+C or until `count` samples are taken. Each sample is
/// handed to `emit`. Returns the number of samples.
pub(super) fn sample_loop<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    interval: Duration,
    count: Option<u64>,
    json: bool,
    mut emit: impl FnMut(&WatchSample) -> Result<()>,
) -> Result<u64> {
    let taken = with_strip(transport, config, selector, json, |strip| {
        if !json {
            println!(
                "Watching {strip} every {:.1}s (Ctrl+C to stop)",
                interval.as_secs_f64()
            );
        }
        let start = Instant::now();
        let mut taken = 0u64;
        while RUNNING.load(Ordering::SeqCst) {
            let current_ma = strip.current_ma()?;
            emit(&WatchSample {
                elapsed_s: start.elapsed().as_secs_f64(),
                current_ma,
            })?;
            taken += 1;
            if count.is_some_and(|n| taken >= n) {
                break;
            }
            sleep_while_running(interval);
        }
        log::debug!("{strip}: watch stopped after {taken} samples");
        Ok(taken)
    })?;
    Ok(taken.unwrap_or(0))
}

pub(super) fn cmd_watch<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    interval: Duration,
    count: Option<u64>,
    json: bool,
) -> Result<()> {
    sample_loop(transport, config, selector, interval, count, json, |sample| {
        if json {
            // One object per line so the stream can be piped
            let line = serde_json::to_string(sample).map_err(json_error)?;
            println!("{line}");
        } else {
            println!("{:>9.1}s  {:>6} mA", sample.elapsed_s, sample.current_ma);
        }
        Ok(())
    })?;
    Ok(())
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use emberfall_shared::TICK_RATE;

use crate::server::GameServer;

/// Drives the whole simulation from one thread at a fixed 20 Hz.
///
/// `dt` passed to the server is the real elapsed interval, not the nominal
/// period. Overruns shift the deadline forward by whole periods, so slow
/// ticks are followed by immediate catch-up ticks rather than dropped ones.
/// Stopping is cooperative through the shared `running` flag; the final
/// act is a full save flush.
pub fn run(mut server: GameServer, running: Arc<AtomicBool>) {
    let period = Duration::from_millis(1000 / TICK_RATE as u64);
    let start = Instant::now();
    let mut last = start;
    let mut deadline = start + period;
    let mut tick: u64 = 0;

    info!("simulation running at {} Hz", TICK_RATE);
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;
        tick += 1;

        server.tick(dt, now.duration_since(start).as_secs_f64(), tick);

        deadline += period;
        let after = Instant::now();
        if deadline > after {
            std::thread::sleep(deadline - after);
        } else if after.duration_since(deadline) > period * 10 {
            warn!(
                "simulation running {} ms behind",
                after.duration_since(deadline).as_millis()
            );
        }
    }
    server.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminList;
    use crate::game_data::GameData;
    use tokio::sync::mpsc;

    #[test]
    fn test_loop_stops_on_flag_and_flushes() {
        let data = Arc::new(GameData::default());
        let admins = AdminList::load("/nonexistent/admins.txt");
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (save_tx, mut save_rx) = mpsc::unbounded_channel();
        let server = GameServer::new(data, admins, cmd_rx, save_tx);

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || run(server, flag));

        std::thread::sleep(Duration::from_millis(200));
        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();

        // With no residents the flush queues nothing, and the channel closes.
        assert!(save_rx.try_recv().is_err());
    }
}

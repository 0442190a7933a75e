//! Run drivers for the two profiles.

use std::thread;
use std::time::Duration;

use panorama_common::clock::RunClock;
use panorama_common::error::{PanoramaError, PanoramaResult};

use crate::framework::OutputStats;
use crate::session::{PipelineSession, StopReport};
use crate::streaming::{run_control_loop, KeySource, QuitSignal, StreamController};

/// What a finished recording looked like.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Statistics read just before the stop request.
    pub stats: OutputStats,
    pub stop: StopReport,
    pub elapsed: Duration,
}

/// Record for `duration`, then stop and tear down.
///
/// Any setup failure tears the session down and is returned.
pub fn run_recording(
    session: &mut PipelineSession,
    duration: Duration,
) -> PanoramaResult<RunSummary> {
    let clock = RunClock::start();
    session.init()?;
    session.setup_sources()?;
    session.setup_encoding()?;
    session.start()?;

    tracing::info!(secs = duration.as_secs_f64(), "Recording");
    thread::sleep(duration);

    let stats = session.stats().unwrap_or_default();
    let stop = session.stop()?;
    session.teardown();

    let elapsed = clock.elapsed();
    tracing::info!(
        elapsed_secs = elapsed.as_secs_f64(),
        started_at = clock.epoch_wall(),
        forced_stop = stop.forced,
        "Recording finished"
    );
    Ok(RunSummary {
        stats,
        stop,
        elapsed,
    })
}

/// Prepare the stream, then hand control to the operator until they quit.
///
/// The control loop runs on a scoped thread; the calling thread blocks on
/// `quit`. The session is torn down on every exit path.
pub fn run_streaming(
    controller: &StreamController,
    keys: &mut dyn KeySource,
    quit: &QuitSignal,
    poll_interval: Duration,
) -> PanoramaResult<()> {
    if let Err(e) = controller.prepare() {
        controller.shutdown();
        return Err(e);
    }

    let result = thread::scope(|scope| {
        let control = thread::Builder::new()
            .name("stream-control".to_string())
            .spawn_scoped(scope, move || {
                let _raise = RaiseOnDrop(quit);
                run_control_loop(controller, keys, quit, poll_interval)
            })?;

        quit.wait();
        control
            .join()
            .map_err(|_| PanoramaError::platform("control thread panicked"))?
    });

    controller.shutdown();
    result
}

/// Raises the signal when dropped, including during a panic unwind.
struct RaiseOnDrop<'a>(&'a QuitSignal);

impl Drop for RaiseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.raise();
    }
}

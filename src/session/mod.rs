//! Simulation session - emulator and GUI threads driving a render manager

mod pattern;

pub use pattern::fill_pattern;

use crate::error::{FramePoolError, Result};
use crate::format::PixelFormat;
use crate::pool::PoolStats;
use crate::render::{FrameSource, RenderManager, RenderState, RenderStats, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Emulator ticks to run, `None` runs until stopped
    pub frames: Option<u64>,
    /// Emulator frame rate
    pub fps: u32,
    /// GUI refresh rate
    pub display_rate: u32,
    /// Pause playback at this tick
    pub pause_at: Option<u64>,
    /// Alternate copied frames with frames written into video buffers
    pub zero_copy: bool,
    /// Size of the window the GUI thread draws into
    pub view_width: u32,
    pub view_height: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 240,
            format: PixelFormat::Xrgb8888,
            frames: None,
            fps: 60,
            display_rate: 60,
            pause_at: None,
            zero_copy: true,
            view_width: 640,
            view_height: 480,
        }
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
    ShuttingDown,
}

/// Command sent to the producer thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProducerCommand {
    Flush,
    Stop,
}

/// Statistics of a pool after a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSummary {
    pub id: u64,
    pub backend: String,
    pub stats: PoolStats,
}

/// Statistics reported by a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames handed to the render manager
    pub frames_produced: u64,
    /// GUI ticks run
    pub ticks: u64,
    pub render: RenderStats,
    pub pools: Vec<PoolSummary>,
}

/// Emulator and GUI threads sharing one render manager
pub struct Session {
    config: SessionConfig,
    manager: Arc<RenderManager>,
    state: Arc<Mutex<SessionState>>,
    stop_flag: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    frames_produced: Arc<AtomicU64>,
    ticks: Arc<AtomicU64>,
    command_tx: Option<Sender<ProducerCommand>>,
    producer_handle: Option<JoinHandle<()>>,
    render_handle: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(manager: Arc<RenderManager>, config: SessionConfig) -> Self {
        Self {
            config,
            manager,
            state: Arc::new(Mutex::new(SessionState::Stopped)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            frames_produced: Arc::new(AtomicU64::new(0)),
            ticks: Arc::new(AtomicU64::new(0)),
            command_tx: None,
            producer_handle: None,
            render_handle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn manager(&self) -> &Arc<RenderManager> {
        &self.manager
    }

    /// Configure the render manager and start both threads
    pub fn start(&mut self) -> Result<()> {
        {
            let state = self.state.lock();
            if *state == SessionState::Running {
                return Err(FramePoolError::AlreadyRunning);
            }
        }

        if self.config.fps == 0 || self.config.display_rate == 0 {
            return Err(FramePoolError::InvalidConfig(
                "frame rates must be positive".to_string(),
            ));
        }

        info!(
            "Starting session: {}x{} {} at {} fps, display at {} Hz",
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.fps,
            self.config.display_rate
        );

        self.manager.configure(StreamConfig::new(
            self.config.format,
            self.config.width,
            self.config.height,
        ))?;

        self.stop_flag.store(false, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);

        let (command_tx, command_rx) = bounded(16);
        self.command_tx = Some(command_tx);

        let manager = self.manager.clone();
        let config = self.config.clone();
        let stop_flag = self.stop_flag.clone();
        let ticks = self.ticks.clone();
        self.render_handle = Some(thread::spawn(move || {
            render_thread(manager, config, stop_flag, ticks);
        }));

        let manager = self.manager.clone();
        let config = self.config.clone();
        let stop_flag = self.stop_flag.clone();
        let finished = self.finished.clone();
        let frames_produced = self.frames_produced.clone();
        self.producer_handle = Some(thread::spawn(move || {
            producer_thread(manager, config, command_rx, stop_flag, frames_produced);
            finished.store(true, Ordering::SeqCst);
        }));

        *self.state.lock() = SessionState::Running;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Check if the producer ran all its ticks
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Flush the pipeline, as on a seek
    ///
    /// The producer reconfigures the stream and carries on once the GUI
    /// thread has applied it.
    pub fn flush(&self) -> Result<()> {
        self.send(ProducerCommand::Flush)
    }

    fn send(&self, command: ProducerCommand) -> Result<()> {
        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| FramePoolError::ChannelError("session not running".to_string()))?;
        tx.send(command)
            .map_err(|e| FramePoolError::ChannelError(e.to_string()))
    }

    /// Stop both threads and report statistics
    pub fn stop(&mut self) -> SessionStats {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Running {
                *state = SessionState::ShuttingDown;
                info!("Stopping session...");
            }
        }

        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(ProducerCommand::Stop);
        }

        if let Some(handle) = self.producer_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.render_handle.take() {
            let _ = handle.join();
        }

        *self.state.lock() = SessionState::Stopped;
        let stats = self.stats();
        info!(
            "Session stopped: {} frames produced, {} presented",
            stats.frames_produced, stats.render.frames_rendered
        );
        stats
    }

    pub fn stats(&self) -> SessionStats {
        let pools = self
            .manager
            .buffer_manager()
            .buffer_pools()
            .iter()
            .map(|pool| PoolSummary {
                id: pool.id(),
                backend: pool.name().to_string(),
                stats: pool.stats(),
            })
            .collect();

        SessionStats {
            frames_produced: self.frames_produced.load(Ordering::SeqCst),
            ticks: self.ticks.load(Ordering::SeqCst),
            render: self.manager.stats(),
            pools,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.producer_handle.is_some() || self.render_handle.is_some() {
            self.stop();
        }
    }
}

fn interval(rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / rate.max(1) as f64)
}

/// Producer thread - emulates a game core producing frames
fn producer_thread(
    manager: Arc<RenderManager>,
    config: SessionConfig,
    command_rx: Receiver<ProducerCommand>,
    stop_flag: Arc<AtomicBool>,
    frames_produced: Arc<AtomicU64>,
) {
    let frame_interval = interval(config.fps);
    let stream = StreamConfig::new(config.format, config.width, config.height);
    let stream_size = config.format.frame_size(config.width, config.height);
    let stride = config.format.row_size(config.width);
    let mut frame = vec![0u8; stream_size];
    let mut paused = false;
    let mut tick: u64 = 0;

    debug!("Producer thread started");

    while !stop_flag.load(Ordering::Relaxed) {
        if config.frames.is_some_and(|frames| tick >= frames) {
            debug!("Producer finished after {} ticks", tick);
            break;
        }

        match command_rx.recv_timeout(frame_interval) {
            Ok(ProducerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(ProducerCommand::Flush) => {
                info!("Flushing pipeline at tick {}", tick);
                manager.flush();
                if let Err(e) = manager.configure(stream) {
                    warn!("Failed to reconfigure stream after flush: {}", e);
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if !wait_until_configured(&manager, stream, &stop_flag) {
            break;
        }

        if config.pause_at == Some(tick) {
            info!("Pausing playback at tick {}", tick);
            manager.set_speed(0.0);
        }

        let index = tick;
        tick += 1;
        if paused {
            continue;
        }

        let zero_copy = config.zero_copy && index % 2 == 1;
        let delivered = zero_copy && produce_into_video_buffer(&manager, &config, index);
        if !delivered {
            fill_pattern(
                &mut frame,
                config.format,
                config.width,
                config.height,
                stride,
                index,
            );
            manager.add_frame(FrameSource::Memory(&frame), config.width, config.height, 0);
        }
        frames_produced.fetch_add(1, Ordering::Relaxed);

        if manager.speed() == 0.0 {
            paused = true;
        }
    }

    debug!("Producer thread stopped");
}

/// Block until the GUI thread has applied the stream configuration
///
/// A flush that lands after the configuration leaves the manager
/// unconfigured, so the stream is configured again in that case.
fn wait_until_configured(
    manager: &RenderManager,
    stream: StreamConfig,
    stop_flag: &AtomicBool,
) -> bool {
    loop {
        match manager.render_state() {
            RenderState::Configured => return true,
            RenderState::Unconfigured => {
                if let Err(e) = manager.configure(stream) {
                    warn!("Failed to configure stream: {}", e);
                    return false;
                }
            }
            RenderState::Configuring => {}
        }
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn produce_into_video_buffer(manager: &RenderManager, config: &SessionConfig, index: u64) -> bool {
    let Some(video) = manager.get_video_buffer(config.width, config.height) else {
        trace!("No video buffer for frame {}, copying", index);
        return false;
    };

    let format = video.format();
    let stride = video.stride();
    video.write(|memory| {
        fill_pattern(memory, format, config.width, config.height, stride, index);
    });
    manager.add_frame(FrameSource::VideoBuffer(&video), config.width, config.height, 0);
    true
}

/// Render thread - emulates the GUI refresh loop
fn render_thread(
    manager: Arc<RenderManager>,
    config: SessionConfig,
    stop_flag: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
) {
    let tick_interval = interval(config.display_rate);
    debug!("Render thread started");

    while !stop_flag.load(Ordering::Relaxed) {
        manager.frame_move();
        if !manager.render_window(true, config.view_width, config.view_height) {
            trace!("Nothing rendered this tick");
        }
        ticks.fetch_add(1, Ordering::Relaxed);
        thread::sleep(tick_interval);
    }

    debug!("Render thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareFactory;
    use crate::render::{RenderManagerConfig, RendererRegistry};
    use std::time::Instant;

    fn manager() -> Arc<RenderManager> {
        let mut registry = RendererRegistry::new();
        registry.register(Arc::new(SoftwareFactory::new(64, 64)));
        Arc::new(RenderManager::new(&registry, RenderManagerConfig::default()))
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_session_runs_to_completion() {
        let mut session = Session::new(
            manager(),
            SessionConfig {
                width: 32,
                height: 24,
                frames: Some(30),
                fps: 500,
                display_rate: 500,
                view_width: 64,
                view_height: 64,
                ..Default::default()
            },
        );
        session.start().unwrap();
        assert!(session.start().is_err());

        wait_until(|| session.is_finished());
        let stats = session.stop();

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(stats.frames_produced > 0);
        assert!(stats.frames_produced <= 30);
        assert!(stats.ticks > 0);
        assert_eq!(stats.pools.len(), 1);
    }

    #[test]
    fn test_pause_keeps_cached_frame() {
        let manager = manager();
        let mut session = Session::new(
            manager.clone(),
            SessionConfig {
                width: 16,
                height: 16,
                frames: Some(20),
                fps: 500,
                display_rate: 500,
                pause_at: Some(5),
                zero_copy: false,
                ..Default::default()
            },
        );
        session.start().unwrap();
        wait_until(|| session.is_finished());
        let stats = session.stop();

        assert_eq!(manager.speed(), 0.0);
        assert!(stats.frames_produced <= 6);
        assert!(manager.has_cached_frame());
    }

    #[test]
    fn test_commands_require_running_session() {
        let session = Session::new(manager(), SessionConfig::default());
        assert!(session.flush().is_err());
    }

    #[test]
    fn test_frames_flow_again_after_flush() {
        let manager = manager();
        let mut session = Session::new(
            manager.clone(),
            SessionConfig {
                width: 16,
                height: 16,
                frames: None,
                fps: 500,
                display_rate: 500,
                view_width: 32,
                view_height: 32,
                ..Default::default()
            },
        );
        session.start().unwrap();
        wait_until(|| manager.stats().frames_added > 10);

        session.flush().unwrap();
        let before = manager.stats().frames_added;
        wait_until(|| manager.stats().frames_added > before + 10);
        let after = manager.stats().frames_added;
        let state = manager.render_state();
        session.stop();

        assert!(after > before + 10, "frames_added stuck at {}", after);
        assert_eq!(state, RenderState::Configured);
    }
}

//! Frame-by-frame supervision of a running process.
//!
//! [`execute_watch`] spawns a process and starts one watcher task per
//! attached stream. Each watcher reads frames and hands them to its callback;
//! a callback returning `true` stops both watchers and kills the process.
//! The returned [`Completion`] resolves once every watcher has exited.

use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::AsyncRead;
use tokio::sync::Notify;
use tokio::time::sleep;

use super::command::{Command, ProcessHandle};
use super::frame::{Frame, FrameReader, MIN_FRAME_SIZE, StreamKind};
use super::{ProcessError, ProcessResult};

/// Callback invoked for every frame read from a stream; returning `true`
/// requests that the process be stopped
pub type FrameCallback = Box<dyn FnMut(&Frame<'_>) -> bool + Send + 'static>;

/// Handler for a kill request that failed
pub type KillErrorHandler = Arc<dyn Fn(&ProcessError, &ProcessHandle) + Send + Sync + 'static>;

/// Configuration for [`execute_watch`]
pub struct WatchConfig {
    /// Callback for standard output frames
    callback: Option<FrameCallback>,

    /// Callback for standard error frames
    errorback: Option<FrameCallback>,

    /// Requested bytes per read
    frame_size: usize,

    /// Called when killing the process fails
    kill_error: Option<KillErrorHandler>,

    /// Pause before each read
    delay: Option<Duration>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            callback: None,
            errorback: None,
            frame_size: MIN_FRAME_SIZE,
            kill_error: None,
            delay: None,
        }
    }
}

impl fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchConfig")
            .field("callback", &self.callback.is_some())
            .field("errorback", &self.errorback.is_some())
            .field("frame_size", &self.frame_size)
            .field("kill_error", &self.kill_error.is_some())
            .field("delay", &self.delay)
            .finish()
    }
}

impl WatchConfig {
    /// Create a configuration with the given standard output callback
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&Frame<'_>) -> bool + Send + 'static,
    {
        Self::default().on_stdout(callback)
    }

    /// Set the standard output callback
    pub fn on_stdout<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Frame<'_>) -> bool + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Set the standard error callback; without one stderr is discarded
    pub fn on_stderr<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Frame<'_>) -> bool + Send + 'static,
    {
        self.errorback = Some(Box::new(callback));
        self
    }

    /// Set the frame size
    pub fn frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self
    }

    /// Set the handler for failed kill requests
    pub fn on_kill_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ProcessError, &ProcessHandle) + Send + Sync + 'static,
    {
        self.kill_error = Some(Arc::new(handler));
        self
    }

    /// Set a delay before each read
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Frame size actually used, never below [`MIN_FRAME_SIZE`]
    pub fn effective_frame_size(&self) -> usize {
        self.frame_size.max(MIN_FRAME_SIZE)
    }
}

enum Dispatch {
    Continue,
    Stop,
    Halted,
}

/// Termination flag shared by the watchers of one process.
///
/// Each watcher checks the flag before invoking its callback, and callbacks
/// run without any shared lock. Only the dispatch that flips the flag from
/// unset to set reports [`Dispatch::Stop`], so the process is killed once.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn dispatch(&self, callback: impl FnOnce() -> bool) -> Dispatch {
        if self.is_stopped() {
            return Dispatch::Halted;
        }
        if !callback() {
            return Dispatch::Continue;
        }
        match self.stopped.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                self.notify.notify_waiters();
                Dispatch::Stop
            }
            // The other watcher stopped first and has already killed the process.
            Err(_) => Dispatch::Halted,
        }
    }

    /// Resolves once the flag is set
    async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

#[derive(Debug, Default)]
struct CompletionInner {
    remaining: AtomicUsize,
    notify: Notify,
}

/// Counting barrier that resolves once every started watcher has exited
#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

impl Completion {
    /// Create a tracker with no registered watchers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher; the returned guard marks it done when dropped
    pub(crate) fn register(&self) -> CompletionGuard {
        self.inner.remaining.fetch_add(1, Ordering::AcqRel);
        CompletionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of watchers still running
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// Whether every watcher has exited
    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Wait until every watcher has exited
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    /// Wait with a timeout; returns whether every watcher exited in time
    pub async fn wait_timeout(&self, duration: Duration) -> bool {
        tokio::time::timeout(duration, self.wait()).await.is_ok()
    }
}

/// Marks one watcher as done exactly once, when dropped
pub(crate) struct CompletionGuard {
    inner: Arc<CompletionInner>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.inner.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

/// State shared by the watchers of one process
struct Supervision {
    stop: StopSignal,
    process: ProcessHandle,
    kill_error: Option<KillErrorHandler>,
}

impl Supervision {
    fn kill(&self, stream: StreamKind) {
        debug!(
            "Stop requested by {} callback, killing {} ({:?})",
            stream,
            self.process.program(),
            self.process.id()
        );
        if let Err(e) = self.process.kill() {
            warn!("{}", e);
            if let Some(handler) = &self.kill_error {
                handler(&e, &self.process);
            }
        }
    }
}

/// Drives one stream: read a frame, hand it to the callback, repeat
struct StreamWatcher<R> {
    stream: StreamKind,
    reader: FrameReader<R>,
    callback: FrameCallback,
    delay: Option<Duration>,
}

impl<R: AsyncRead + Unpin + Send + 'static> StreamWatcher<R> {
    fn spawn(self, supervision: Arc<Supervision>, guard: CompletionGuard) {
        tokio::spawn(self.run(supervision, guard));
    }

    async fn run(mut self, supervision: Arc<Supervision>, _guard: CompletionGuard) {
        let stop = &supervision.stop;
        let mut times = 0;

        debug!("Watching {} of {}", self.stream, supervision.process.program());

        while !stop.is_stopped() {
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop.stopped() => break,
                }
            }

            let read = tokio::select! {
                read = self.reader.read_frame() => read,
                _ = stop.stopped() => break,
            };
            times += 1;

            let dispatch = match read {
                Ok(0) => {
                    debug!("End of {} after {} reads", self.stream, times);
                    break;
                }
                Ok(n) => {
                    trace!("{} frame {}: {} bytes", self.stream, times, n);
                    let frame = Frame::data(self.stream, times, self.reader.frame(n));
                    stop.dispatch(|| (self.callback)(&frame))
                }
                Err(e) => {
                    warn!("Error reading {}: {}", self.stream, e);
                    let frame = Frame::failed(self.stream, times, &e);
                    stop.dispatch(|| (self.callback)(&frame))
                }
            };

            match dispatch {
                Dispatch::Continue => {}
                Dispatch::Stop => {
                    supervision.kill(self.stream);
                    break;
                }
                Dispatch::Halted => break,
            }
        }

        debug!("Stopped watching {}", self.stream);
    }
}

/// A supervised process and the watchers reading its output
#[derive(Debug)]
pub struct Watch {
    completion: Completion,
    process: Option<ProcessHandle>,
    supervision: Option<Arc<Supervision>>,
}

impl fmt::Debug for Supervision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervision")
            .field("stopped", &self.stop.is_stopped())
            .field("process", &self.process)
            .finish()
    }
}

impl Watch {
    /// Completion tracker for the watchers
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// The running process, `None` when nothing was started
    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// Whether a callback has requested a stop
    pub fn is_stopped(&self) -> bool {
        self.supervision
            .as_ref()
            .is_some_and(|supervision| supervision.stop.is_stopped())
    }

    /// Wait until every watcher has exited
    pub async fn wait(&self) {
        self.completion.wait().await;
    }

    /// Split into the completion tracker and the process handle
    pub fn into_parts(self) -> (Completion, Option<ProcessHandle>) {
        (self.completion, self.process)
    }
}

/// Spawn `command` and stream its output to the callbacks in `config`.
///
/// Returns immediately; wait on [`Watch::completion`] for the watchers to
/// finish. Without a standard output callback nothing is spawned.
pub fn execute_watch(config: WatchConfig, command: &Command) -> ProcessResult<Watch> {
    let frame_size = config.effective_frame_size();
    let WatchConfig {
        callback,
        errorback,
        kill_error,
        delay,
        ..
    } = config;

    let completion = Completion::new();
    let Some(callback) = callback else {
        debug!("No output callback for {}, nothing to watch", command.program());
        return Ok(Watch {
            completion,
            process: None,
            supervision: None,
        });
    };

    debug!("Spawning command: {} {:?}", command.program(), command.get_args());

    let stderr_mode = if errorback.is_some() { Stdio::piped() } else { Stdio::null() };
    let mut child = command
        .to_tokio(Stdio::piped(), stderr_mode)
        .spawn()
        .map_err(ProcessError::SpawnError)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let attached = match (stdout, errorback) {
        (Some(stdout), Some(errorback)) => match stderr {
            Some(stderr) => Ok((stdout, Some((stderr, errorback)))),
            None => Err(ProcessError::MissingStream(StreamKind::Stderr)),
        },
        (Some(stdout), None) => Ok((stdout, None)),
        (None, _) => Err(ProcessError::MissingStream(StreamKind::Stdout)),
    };
    let (stdout, stderr) = match attached {
        Ok(streams) => streams,
        Err(e) => {
            let _ = child.start_kill();
            return Err(e);
        }
    };

    let process = ProcessHandle::new(child, command);
    let supervision = Arc::new(Supervision {
        stop: StopSignal::default(),
        process: process.clone(),
        kill_error,
    });

    // Register every watcher before any of them can finish.
    let stdout_guard = completion.register();
    let stderr_guard = stderr.as_ref().map(|_| completion.register());

    StreamWatcher {
        stream: StreamKind::Stdout,
        reader: FrameReader::new(stdout, frame_size),
        callback,
        delay,
    }
    .spawn(Arc::clone(&supervision), stdout_guard);

    if let (Some((stderr, errorback)), Some(guard)) = (stderr, stderr_guard) {
        StreamWatcher {
            stream: StreamKind::Stderr,
            reader: FrameReader::new(stderr, frame_size),
            callback: errorback,
            delay,
        }
        .spawn(Arc::clone(&supervision), guard);
    }

    Ok(Watch {
        completion,
        process: Some(process),
        supervision: Some(supervision),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use std::time::Instant;
    use tokio::io::ReadBuf;

    const DEADLINE: Duration = Duration::from_secs(10);

    fn sh(script: &str) -> Command {
        Command::new("sh").args(["-c", script])
    }

    #[test]
    fn test_effective_frame_size() {
        assert_eq!(WatchConfig::default().frame_size(10).effective_frame_size(), 1024);
        assert_eq!(WatchConfig::default().frame_size(0).effective_frame_size(), 1024);
        assert_eq!(WatchConfig::default().frame_size(1024).effective_frame_size(), 1024);
        assert_eq!(WatchConfig::default().frame_size(65536).effective_frame_size(), 65536);
    }

    #[tokio::test]
    async fn test_completion_without_watchers_is_done() {
        let completion = Completion::new();
        assert!(completion.is_done());
        assert!(completion.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_completion_guard_decrements_once() {
        let completion = Completion::new();
        let first = completion.register();
        let second = completion.register();
        assert_eq!(completion.remaining(), 2);

        drop(first);
        assert_eq!(completion.remaining(), 1);
        assert!(!completion.wait_timeout(Duration::from_millis(20)).await);

        let waiter = {
            let completion = completion.clone();
            tokio::spawn(async move { completion.wait().await })
        };
        drop(second);
        tokio::time::timeout(DEADLINE, waiter).await.unwrap().unwrap();
        assert_eq!(completion.remaining(), 0);
    }

    #[test]
    fn test_stop_signal_blocks_later_callbacks() {
        let signal = StopSignal::default();
        assert!(matches!(signal.dispatch(|| false), Dispatch::Continue));
        assert!(matches!(signal.dispatch(|| true), Dispatch::Stop));
        assert!(signal.is_stopped());

        let mut called = false;
        assert!(matches!(
            signal.dispatch(|| {
                called = true;
                true
            }),
            Dispatch::Halted
        ));
        assert!(!called);
    }

    #[test]
    fn test_stop_signal_transition_won_once() {
        let signal = StopSignal::default();
        // A callback already running when the other stream stops may finish,
        // but its stop request does not trigger a second kill.
        let outer = signal.dispatch(|| {
            assert!(matches!(signal.dispatch(|| true), Dispatch::Stop));
            true
        });
        assert!(matches!(outer, Dispatch::Halted));
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_no_callback_spawns_nothing() {
        let watch = sh("echo never").watch(WatchConfig::default()).unwrap();
        assert!(watch.process().is_none());
        assert!(watch.completion().is_done());
        watch.wait().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let result = Command::new("procwatch-no-such-binary").watch(WatchConfig::new(|_| false));
        assert!(matches!(result, Err(ProcessError::SpawnError(_))));
    }

    #[tokio::test]
    async fn test_frames_delivered_in_order_until_eof() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let indices = Arc::new(Mutex::new(Vec::new()));

        let config = {
            let collected = Arc::clone(&collected);
            let indices = Arc::clone(&indices);
            WatchConfig::new(move |frame| {
                assert_eq!(frame.stream(), StreamKind::Stdout);
                indices.lock().unwrap().push(frame.times());
                collected.lock().unwrap().extend_from_slice(frame.bytes().unwrap());
                false
            })
        };

        let watch = sh("for i in 1 2 3; do echo line$i; sleep 0.1; done")
            .watch(config)
            .unwrap();
        assert!(watch.completion().wait_timeout(DEADLINE).await);
        assert!(!watch.is_stopped());

        let status = watch.process().unwrap().wait_with_timeout(DEADLINE).await.unwrap();
        assert!(status.success());

        assert_eq!(&*collected.lock().unwrap(), b"line1\nline2\nline3\n");
        let indices = indices.lock().unwrap();
        let expected: Vec<usize> = (1..=indices.len()).collect();
        assert_eq!(*indices, expected);
    }

    #[tokio::test]
    async fn test_stop_on_second_frame_kills_process() {
        use std::os::unix::process::ExitStatusExt;

        let calls = Arc::new(AtomicUsize::new(0));
        let config = {
            let calls = Arc::clone(&calls);
            WatchConfig::new(move |frame| {
                calls.fetch_add(1, Ordering::SeqCst);
                frame.times() == 2
            })
        };

        let watch = sh("for i in 1 2 3 4 5; do echo $i; sleep 0.3; done")
            .watch(config)
            .unwrap();
        assert!(watch.completion().wait_timeout(DEADLINE).await);
        assert!(watch.is_stopped());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let status = watch.process().unwrap().wait_with_timeout(DEADLINE).await.unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[tokio::test]
    async fn test_stderr_stop_halts_both_watchers() {
        let stdout_calls = Arc::new(AtomicUsize::new(0));
        let stderr_calls = Arc::new(AtomicUsize::new(0));

        let config = {
            let stdout_calls = Arc::clone(&stdout_calls);
            let stderr_calls = Arc::clone(&stderr_calls);
            WatchConfig::new(move |_| {
                stdout_calls.fetch_add(1, Ordering::SeqCst);
                false
            })
            .on_stderr(move |frame| {
                assert_eq!(frame.stream(), StreamKind::Stderr);
                stderr_calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };

        let watch = sh("echo out; sleep 0.2; echo boom >&2; for i in 1 2 3 4 5; do echo $i; sleep 0.3; done")
            .watch(config)
            .unwrap();
        assert!(watch.completion().wait_timeout(DEADLINE).await);
        assert!(watch.is_stopped());
        assert_eq!(stderr_calls.load(Ordering::SeqCst), 1);

        // Nothing is dispatched once the stop has been requested.
        let seen = stdout_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(stdout_calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_blocked_watcher_exits_on_stop() {
        // The background sleep inherits both pipes, so killing sh leaves the
        // stderr watcher blocked in a read until the stop signal wakes it.
        let config = WatchConfig::new(|_| true).on_stderr(|_| false);
        let watch = sh("echo first; sleep 5 & wait").watch(config).unwrap();
        assert!(watch.completion().wait_timeout(Duration::from_secs(3)).await);
        assert!(watch.is_stopped());
    }

    /// Supervision over a process that has already been reaped, so every
    /// kill request fails and is counted by `failures`
    async fn exited_supervision(failures: &Arc<AtomicUsize>) -> Arc<Supervision> {
        let process = sh("exit 0").to_tokio(Stdio::null(), Stdio::null()).spawn().unwrap();
        let handle = ProcessHandle::new(process, &sh("exit 0"));
        handle.wait_with_timeout(DEADLINE).await.unwrap();

        let failures = Arc::clone(failures);
        Arc::new(Supervision {
            stop: StopSignal::default(),
            process: handle,
            kill_error: Some(Arc::new(move |err: &ProcessError, _: &ProcessHandle| {
                assert!(matches!(err, ProcessError::ProcessKilled(_)));
                failures.fetch_add(1, Ordering::SeqCst);
            })),
        })
    }

    #[tokio::test]
    async fn test_kill_error_handler_receives_failure() {
        let failures = Arc::new(AtomicUsize::new(0));
        let supervision = exited_supervision(&failures).await;
        supervision.kill(StreamKind::Stdout);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    /// Fails a fixed number of reads, then reports end-of-stream
    struct FailingReader {
        failures: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(mut self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if self.failures == 0 {
                return Poll::Ready(Ok(()));
            }
            self.failures -= 1;
            Poll::Ready(Err(io::Error::other("device went away")))
        }
    }

    fn failing_watcher(stream: StreamKind, failures: usize, callback: FrameCallback) -> StreamWatcher<FailingReader> {
        StreamWatcher {
            stream,
            reader: FrameReader::new(FailingReader { failures }, MIN_FRAME_SIZE),
            callback,
            delay: None,
        }
    }

    #[tokio::test]
    async fn test_read_errors_are_delivered_and_reading_continues() {
        let kills = Arc::new(AtomicUsize::new(0));
        let supervision = exited_supervision(&kills).await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let callback: FrameCallback = {
            let seen = Arc::clone(&seen);
            Box::new(move |frame: &Frame<'_>| {
                assert!(frame.bytes().is_none());
                assert_eq!(frame.size(), 0);
                let kind = frame.error().map(io::Error::kind);
                seen.lock().unwrap().push((frame.times(), kind));
                false
            })
        };

        let completion = Completion::new();
        let watcher = failing_watcher(StreamKind::Stdout, 3, callback);
        watcher.run(Arc::clone(&supervision), completion.register()).await;

        assert!(completion.is_done());
        assert!(!supervision.stop.is_stopped());
        assert_eq!(kills.load(Ordering::SeqCst), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, Some(io::ErrorKind::Other)),
                (2, Some(io::ErrorKind::Other)),
                (3, Some(io::ErrorKind::Other)),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_error_callback_can_stop() {
        let kills = Arc::new(AtomicUsize::new(0));
        let supervision = exited_supervision(&kills).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let stopping = |calls: &Arc<AtomicUsize>| -> FrameCallback {
            let calls = Arc::clone(calls);
            Box::new(move |frame: &Frame<'_>| {
                assert!(frame.error().is_some());
                assert_eq!(frame.times(), 1);
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };

        let completion = Completion::new();
        let stdout = failing_watcher(StreamKind::Stdout, 100, stopping(&calls));
        let stderr = failing_watcher(StreamKind::Stderr, 100, stopping(&calls));
        tokio::join!(
            stdout.run(Arc::clone(&supervision), completion.register()),
            stderr.run(Arc::clone(&supervision), completion.register()),
        );

        assert!(completion.is_done());
        assert!(supervision.stop.is_stopped());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_callback_does_not_block_other_stream() {
        let stderr_at = Arc::new(Mutex::new(None));
        let started = Instant::now();

        let config = {
            let stderr_at = Arc::clone(&stderr_at);
            WatchConfig::new(|_| {
                std::thread::sleep(Duration::from_millis(1500));
                false
            })
            .on_stderr(move |_| {
                stderr_at.lock().unwrap().get_or_insert(started.elapsed());
                false
            })
        };

        let watch = sh("echo out; sleep 0.1; echo err >&2").watch(config).unwrap();
        assert!(watch.completion().wait_timeout(DEADLINE).await);

        let stderr_at = stderr_at.lock().unwrap().unwrap();
        assert!(stderr_at < Duration::from_millis(1000), "stderr callback ran at {:?}", stderr_at);
    }

    #[tokio::test]
    async fn test_delay_between_reads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = {
            let calls = Arc::clone(&calls);
            WatchConfig::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            })
            .delay(Duration::from_millis(50))
        };

        let started = Instant::now();
        let watch = sh("echo hi").watch(config).unwrap();
        assert!(watch.completion().wait_timeout(DEADLINE).await);
        // One data read and one end-of-stream read, each preceded by the delay.
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Recording session state machine.
//!
//! A session:
//! 1. Installs the compile, abort and (optionally) profile hooks
//! 2. Tees the program's stdout/stderr
//! 3. Collects raw traces, aborts and binary call/return events while the program runs
//! 4. On stop, removes the hooks, restores the streams and rebuilds the call tree

use super::call_tree::{CallNode, CallTreeBuilder};
use super::event_log::{EventLog, LogEvent};
use super::hooks::{Frame, Hook, HookEvent, HookSlot, HostRuntime, OptionCategory, OutputStream};
use super::stream::{RecordingStream, SharedSink};
use crate::trace::{CompiledTrace, Greenkey, Operation, RawTrace, TraceCell, TraceSegmenter};
use crate::utils::config::{RecordOptions, LOOP_KIND};
use crate::utils::error::{SegmentError, SessionError};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Finalizing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An abandoned compilation, located in user code
///
/// The location is copied out of the calling frame when the hook fires, so the
/// host's code object is never held past the hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortEvent {
    pub reason: String,
    pub filename: String,
    pub function: String,
    pub lineno: u32,
}

impl AbortEvent {
    fn from_frame(reason: &str, frame: &Frame) -> Self {
        Self {
            reason: reason.to_string(),
            filename: frame.code.filename().to_string(),
            function: frame.code.name().to_string(),
            lineno: frame.lineno,
        }
    }
}

/// Runtime options snapshotted at session start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub build: BTreeMap<String, String>,
    pub gc: BTreeMap<String, String>,
    pub jit: BTreeMap<String, String>,
}

impl RuntimeOptions {
    fn snapshot<R: HostRuntime + ?Sized>(host: &R) -> Self {
        Self {
            build: host.options(OptionCategory::Build),
            gc: host.options(OptionCategory::Gc),
            jit: host.options(OptionCategory::Jit),
        }
    }

    pub fn category(&self, category: OptionCategory) -> &BTreeMap<String, String> {
        match category {
            OptionCategory::Build => &self.build,
            OptionCategory::Gc => &self.gc,
            OptionCategory::Jit => &self.jit,
        }
    }
}

/// Everything the hooks write to while the session is active
#[derive(Debug)]
struct Capture {
    driver: String,
    traces: Vec<TraceCell>,
    aborts: Vec<AbortEvent>,
    events: Option<EventLog>,
}

impl Capture {
    fn dispatch(&mut self, event: HookEvent<'_>) {
        match event {
            HookEvent::CompileCompleted {
                driver,
                kind,
                greenkey,
                operations,
                native_code,
            } => self.on_compile(driver, kind, greenkey, operations, native_code),
            HookEvent::CompileAborted {
                driver,
                reason,
                caller,
                ..
            } => self.on_abort(driver, reason, &caller),
            HookEvent::Call { timestamp, target } => self.on_profile(LogEvent::call(timestamp, target)),
            HookEvent::Return { timestamp } => self.on_profile(LogEvent::ret(timestamp)),
        }
    }

    fn on_compile(
        &mut self,
        driver: &str,
        kind: &str,
        greenkey: Greenkey,
        operations: Vec<Operation>,
        native_code: &[u8],
    ) {
        if kind != LOOP_KIND {
            warn!("[compile] Unhandled compiled kind: {}", kind);
            return;
        }

        if driver != self.driver {
            warn!("[compile] Unhandled jitdriver: {}", driver);
            return;
        }

        self.traces.push(TraceCell::Pending(RawTrace {
            greenkey,
            operations,
            native_code: native_code.to_vec(),
        }));
    }

    fn on_abort(&mut self, driver: &str, reason: &str, caller: &Frame) {
        if driver != self.driver {
            warn!("[abort] Unhandled jitdriver: {}", driver);
            return;
        }

        self.aborts.push(AbortEvent::from_frame(reason, caller));
    }

    fn on_profile(&mut self, event: LogEvent<'_>) {
        match self.events.as_mut() {
            Some(log) => log.append(&event),
            None => warn!("[profile] Event received without profiling enabled"),
        }
    }
}

/// A finished recording
///
/// **Public** - returned by `RecordingSession::stop`; immutable apart from lazy trace materialization
#[derive(Debug)]
pub struct Recording {
    pub start_time: f64,
    pub end_time: f64,
    pub runtime: f64,
    pub stdout: String,
    pub stderr: String,
    pub options: RuntimeOptions,
    pub aborts: Vec<AbortEvent>,

    /// `None` when call profiling was not requested
    pub calls: Option<Vec<CallNode>>,

    traces: Vec<TraceCell>,
}

impl Recording {
    /// Compiled traces, segmenting any that have not been read yet
    ///
    /// **Public** - first call does the segmentation work, later calls reuse it
    ///
    /// # Errors
    /// * `SegmentError` - a trace could not be segmented; it stays pending
    pub fn traces(&mut self) -> Result<Vec<&CompiledTrace>, SegmentError> {
        if self.traces.iter().any(TraceCell::is_pending) {
            let mut segmenter = TraceSegmenter::new();
            for cell in &mut self.traces {
                segmenter.materialize(cell)?;
            }
            debug!(
                "Materialized traces, decoded {} code objects",
                segmenter.decoded_code_count()
            );
        }

        Ok(self.traces.iter().filter_map(TraceCell::materialized).collect())
    }

    /// Number of captured compilations, segmented or not
    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    pub fn pending_trace_count(&self) -> usize {
        self.traces.iter().filter(|cell| cell.is_pending()).count()
    }
}

/// Original sinks and the captured-text handles of both streams
struct StreamCapture {
    stdout: SharedSink,
    stderr: SharedSink,
    stdout_content: Rc<RefCell<Vec<u8>>>,
    stderr_content: Rc<RefCell<Vec<u8>>>,
}

impl StreamCapture {
    fn install<R: HostRuntime + ?Sized>(host: &mut R) -> Self {
        let (stdout, stdout_content) = tee(host, OutputStream::Stdout);
        let (stderr, stderr_content) = tee(host, OutputStream::Stderr);

        Self {
            stdout,
            stderr,
            stdout_content,
            stderr_content,
        }
    }

    /// Put the original sinks back and return the captured stdout/stderr text
    fn restore<R: HostRuntime + ?Sized>(self, host: &mut R) -> (String, String) {
        host.set_output(OutputStream::Stdout, self.stdout);
        host.set_output(OutputStream::Stderr, self.stderr);

        let text = |content: &RefCell<Vec<u8>>| String::from_utf8_lossy(&content.borrow()).into_owned();
        (text(&self.stdout_content), text(&self.stderr_content))
    }
}

fn tee<R: HostRuntime + ?Sized>(host: &mut R, stream: OutputStream) -> (SharedSink, Rc<RefCell<Vec<u8>>>) {
    let original = host.output(stream);
    let recording = RecordingStream::new(Rc::clone(&original));
    let content = recording.content();
    host.set_output(stream, Rc::new(RefCell::new(recording)));
    (original, content)
}

/// Recording session driving one `HostRuntime`
///
/// **Public** - `start`, run the program, `stop`; or use `record` for the scoped form
pub struct RecordingSession {
    options: RecordOptions,
    state: SessionState,
    capture: Rc<RefCell<Capture>>,
    streams: Option<StreamCapture>,
    runtime_options: RuntimeOptions,
    start_time: f64,
}

impl RecordingSession {
    pub fn new(options: RecordOptions) -> Self {
        let capture = Capture {
            driver: options.driver.clone(),
            traces: Vec::new(),
            aborts: Vec::new(),
            events: None,
        };

        Self {
            options,
            state: SessionState::Idle,
            capture: Rc::new(RefCell::new(capture)),
            streams: None,
            runtime_options: RuntimeOptions::default(),
            start_time: 0.0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    /// Begin recording (Idle -> Active)
    ///
    /// **Public** - installs hooks and stream capture on `host`
    ///
    /// # Errors
    /// * `SessionError::InvalidTransition` - the session is not idle
    /// * `SessionError::InvalidOptions` - options failed validation
    pub fn start<R: HostRuntime + ?Sized>(&mut self, host: &mut R) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                action: "start",
                state: self.state,
            });
        }
        self.options.validate()?;

        let hook = self.hook();
        host.set_hook(HookSlot::Compile, Some(Rc::clone(&hook)));
        host.set_hook(HookSlot::Abort, Some(Rc::clone(&hook)));

        self.streams = Some(StreamCapture::install(host));
        self.runtime_options = RuntimeOptions::snapshot(host);

        if self.options.profile {
            self.capture.borrow_mut().events = Some(EventLog::with_capacity(self.options.buffer_capacity));
            host.set_hook(HookSlot::Profile, Some(hook));
        }

        self.start_time = host.high_res_time();
        self.state = SessionState::Active;

        info!(
            "Recording started (profile: {}, driver: {})",
            self.options.profile, self.options.driver
        );
        Ok(())
    }

    /// Finish recording (Active -> Finalizing -> Closed)
    ///
    /// **Public** - removes hooks, restores streams and rebuilds the call tree
    ///
    /// # Errors
    /// * `SessionError::InvalidTransition` - the session is not active (never started, or stopped twice)
    /// * `SessionError::EventLog` - the call/return log is corrupt
    pub fn stop<R: HostRuntime + ?Sized>(&mut self, host: &mut R) -> Result<Recording, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidTransition {
                action: "stop",
                state: self.state,
            });
        }

        let end_time = host.high_res_time();
        self.state = SessionState::Finalizing;

        // Hooks go first so nothing is recorded while the streams are put back
        let (stdout, stderr) = self.teardown(host);
        let runtime = end_time - self.start_time;

        let capture = std::mem::replace(
            &mut *self.capture.borrow_mut(),
            Capture {
                driver: self.options.driver.clone(),
                traces: Vec::new(),
                aborts: Vec::new(),
                events: None,
            },
        );
        self.state = SessionState::Closed;

        let calls = match capture.events {
            Some(log) => {
                debug!(
                    "Replaying {} bytes of call events from {} buffers",
                    log.bytes_written(),
                    log.buffer_count()
                );
                Some(CallTreeBuilder::replay(log, end_time)?)
            }
            None => None,
        };

        info!(
            "Recording stopped after {:.3}s: {} traces, {} aborts",
            runtime,
            capture.traces.len(),
            capture.aborts.len()
        );

        Ok(Recording {
            start_time: self.start_time,
            end_time,
            runtime,
            stdout,
            stderr,
            options: std::mem::take(&mut self.runtime_options),
            aborts: capture.aborts,
            calls,
            traces: capture.traces,
        })
    }

    /// Empty every hook slot, then restore the original streams
    fn teardown<R: HostRuntime + ?Sized>(&mut self, host: &mut R) -> (String, String) {
        if self.options.profile {
            host.set_hook(HookSlot::Profile, None);
        }
        host.set_hook(HookSlot::Compile, None);
        host.set_hook(HookSlot::Abort, None);

        match self.streams.take() {
            Some(streams) => streams.restore(host),
            None => (String::new(), String::new()),
        }
    }

    /// Tear down without producing a recording; used when the profiled code unwinds
    fn abandon<R: HostRuntime + ?Sized>(&mut self, host: &mut R) {
        warn!("Recording abandoned, removing hooks");
        self.teardown(host);
        self.state = SessionState::Closed;
    }

    fn hook(&self) -> Hook {
        let capture = Rc::clone(&self.capture);

        Rc::new(move |event: HookEvent<'_>| match capture.try_borrow_mut() {
            Ok(mut capture) => capture.dispatch(event),
            Err(_) => warn!("Re-entrant hook call dropped: {:?}", event),
        })
    }
}

/// Tears the session down if the body unwinds before `stop` runs
struct ActiveGuard<'a, R: HostRuntime + ?Sized> {
    session: &'a mut RecordingSession,
    host: &'a mut R,
}

impl<R: HostRuntime + ?Sized> Drop for ActiveGuard<'_, R> {
    fn drop(&mut self) {
        if self.session.state == SessionState::Active {
            self.session.abandon(&mut *self.host);
        }
    }
}

/// Record everything `body` does on `host`
///
/// **Public** - scoped form of start/stop
///
/// Hooks are removed and streams restored on every exit path, including a
/// panic inside `body`.
///
/// # Example
/// ```ignore
/// let (mut recording, ()) = record(&mut host, RecordOptions::default().with_profile(true), |host| {
///     host.run_program();
/// })?;
/// let traces = recording.traces()?;
/// ```
pub fn record<R, T, F>(host: &mut R, options: RecordOptions, body: F) -> Result<(Recording, T), SessionError>
where
    R: HostRuntime + ?Sized,
    F: FnOnce(&mut R) -> T,
{
    let mut session = RecordingSession::new(options);
    session.start(host)?;

    let guard = ActiveGuard {
        session: &mut session,
        host,
    };
    let value = body(&mut *guard.host);
    let recording = guard.session.stop(&mut *guard.host)?;

    Ok((recording, value))
}

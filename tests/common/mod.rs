//! Fake host runtime and code objects shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracebin::recorder::{Hook, HookEvent, HookSlot, HostRuntime, OptionCategory, OutputStream, SharedSink};
use tracebin::trace::{CodeId, CodeObject, CodeRef, Greenkey, Operation, RawTrace, SourceListing};
use tracebin::utils::SourceError;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory host: hook slots, a settable clock, Vec-backed streams
pub struct FakeRuntime {
    hooks: HashMap<HookSlot, Hook>,
    clock: Cell<f64>,
    stdout: SharedSink,
    stderr: SharedSink,
    pub real_stdout: Rc<RefCell<Vec<u8>>>,
    pub real_stderr: Rc<RefCell<Vec<u8>>>,
    options: HashMap<OptionCategory, BTreeMap<String, String>>,
    calls: Vec<HostCall>,
}

/// Hook and stream changes, in the order the session made them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    SetHook { slot: HookSlot, installed: bool },
    SetOutput(OutputStream),
}

impl FakeRuntime {
    pub fn new() -> Self {
        let real_stdout = Rc::new(RefCell::new(Vec::new()));
        let real_stderr = Rc::new(RefCell::new(Vec::new()));

        Self {
            hooks: HashMap::new(),
            clock: Cell::new(0.0),
            stdout: real_stdout.clone(),
            stderr: real_stderr.clone(),
            real_stdout,
            real_stderr,
            options: HashMap::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_option(mut self, category: OptionCategory, key: &str, value: &str) -> Self {
        self.options
            .entry(category)
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_time(&self, now: f64) {
        self.clock.set(now);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn host_calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn clear_host_calls(&mut self) {
        self.calls.clear();
    }

    pub fn has_hook(&self, slot: HookSlot) -> bool {
        self.hooks.contains_key(&slot)
    }

    /// Deliver `event` to whatever hook currently fills its slot
    pub fn fire(&self, event: HookEvent<'_>) {
        if let Some(hook) = self.hooks.get(&event.slot()).cloned() {
            hook(event);
        }
    }

    pub fn call(&self, timestamp: f64, target: &str) {
        self.fire(HookEvent::Call { timestamp, target });
    }

    pub fn ret(&self, timestamp: f64) {
        self.fire(HookEvent::Return { timestamp });
    }

    /// Write through the current sink, as the program's `print` would
    pub fn print(&self, stream: OutputStream, text: &str) {
        let sink = self.output(stream);
        sink.borrow_mut().write_all(text.as_bytes()).unwrap();
    }

    pub fn is_original_stdout(&self) -> bool {
        let real: SharedSink = self.real_stdout.clone();
        Rc::ptr_eq(&self.stdout, &real)
    }

    pub fn is_original_stderr(&self) -> bool {
        let real: SharedSink = self.real_stderr.clone();
        Rc::ptr_eq(&self.stderr, &real)
    }
}

impl HostRuntime for FakeRuntime {
    fn set_hook(&mut self, slot: HookSlot, hook: Option<Hook>) {
        self.calls.push(HostCall::SetHook {
            slot,
            installed: hook.is_some(),
        });
        match hook {
            Some(hook) => {
                self.hooks.insert(slot, hook);
            }
            None => {
                self.hooks.remove(&slot);
            }
        }
    }

    fn high_res_time(&self) -> f64 {
        self.clock.get()
    }

    fn output(&self, stream: OutputStream) -> SharedSink {
        match stream {
            OutputStream::Stdout => self.stdout.clone(),
            OutputStream::Stderr => self.stderr.clone(),
        }
    }

    fn set_output(&mut self, stream: OutputStream, sink: SharedSink) {
        self.calls.push(HostCall::SetOutput(stream));
        match stream {
            OutputStream::Stdout => self.stdout = sink,
            OutputStream::Stderr => self.stderr = sink,
        }
    }

    fn options(&self, category: OptionCategory) -> BTreeMap<String, String> {
        self.options.get(&category).cloned().unwrap_or_default()
    }
}

/// A function with a source listing and an offset -> line table
pub struct FakeCode {
    id: u64,
    filename: String,
    name: String,
    first_line: u32,
    lines: Vec<String>,
    offsets: HashMap<usize, u32>,
    source_available: bool,
    pub decodes: Cell<usize>,
}

impl FakeCode {
    /// `lines` are given without newlines; each gets one appended
    pub fn new(id: u64, name: &str, first_line: u32, lines: &[&str]) -> Self {
        Self {
            id,
            filename: "/app/loops.py".to_string(),
            name: name.to_string(),
            first_line,
            lines: lines.iter().map(|line| format!("{}\n", line)).collect(),
            offsets: HashMap::new(),
            source_available: true,
            decodes: Cell::new(0),
        }
    }

    /// Map consecutive bytecode offsets (step 2) starting at `start` to `lineno`
    pub fn with_offsets(mut self, start: usize, count: usize, lineno: u32) -> Self {
        for k in 0..count {
            self.offsets.insert(start + 2 * k, lineno);
        }
        self
    }

    pub fn without_source(mut self) -> Self {
        self.source_available = false;
        self
    }

    pub fn into_ref(self) -> Rc<FakeCode> {
        Rc::new(self)
    }
}

impl CodeObject for FakeCode {
    fn id(&self) -> CodeId {
        CodeId(self.id)
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn line_table(&self) -> Result<HashMap<usize, u32>, SourceError> {
        self.decodes.set(self.decodes.get() + 1);
        Ok(self.offsets.clone())
    }

    fn source(&self) -> Result<SourceListing, SourceError> {
        if !self.source_available {
            return Err(SourceError::Unavailable(self.name.clone()));
        }

        Ok(SourceListing {
            first_line: self.first_line,
            lines: self.lines.clone(),
        })
    }
}

pub fn code_ref(code: &Rc<FakeCode>) -> CodeRef {
    code.clone()
}

/// A compiled loop as the JIT would hand it to the compile hook
pub struct LoopFixture {
    pub codes: Vec<Rc<FakeCode>>,
    pub greenkey: Greenkey,
    pub operations: Vec<Operation>,
}

impl LoopFixture {
    pub fn raw(&self) -> RawTrace {
        RawTrace {
            greenkey: self.greenkey.clone(),
            operations: self.operations.clone(),
            native_code: vec![0x48, 0x89, 0xe5],
        }
    }

    pub fn fire_compiled(&self, host: &FakeRuntime) {
        host.fire(HookEvent::CompileCompleted {
            driver: "pypyjit",
            kind: "loop",
            greenkey: self.greenkey.clone(),
            operations: self.operations.clone(),
            native_code: &[0x48, 0x89, 0xe5],
        });
    }
}

fn dmp(depth: u32, code: &Rc<FakeCode>, offset: usize) -> Operation {
    Operation::merge_point("debug_merge_point", depth, 0, code_ref(code), offset)
}

fn op(name: &str) -> Operation {
    Operation::new(name)
}

/// Entry, preamble and loop body built from the same `body`
fn three_sections(body: Vec<Operation>) -> Vec<Operation> {
    let mut ops = vec![op("increment_debug_counter")];
    ops.push(op("label").with_args("i0"));
    ops.extend(body.iter().cloned());
    ops.push(op("label").with_args("i0"));
    ops.extend(body);
    ops
}

/// `while i > 0: i -= 1; i` inside a single function starting at line 87
pub fn single_function_loop() -> LoopFixture {
    let f = FakeCode::new(1, "f", 87, &["def f():", "    i = 1500", "    while i > 0:", "        i -= 1", "        i"])
        .with_offsets(0, 4, 89)
        .with_offsets(8, 4, 90)
        .with_offsets(16, 3, 91)
        .with_offsets(22, 1, 89)
        .into_ref();

    let body = vec![
        dmp(0, &f, 0),
        dmp(0, &f, 2),
        dmp(0, &f, 4),
        op("int_gt").with_args("i0, 0"),
        op("guard_true").with_args("i1"),
        dmp(0, &f, 6),
        dmp(0, &f, 8),
        dmp(0, &f, 10),
        dmp(0, &f, 12),
        op("int_sub").with_args("i0, 1"),
        dmp(0, &f, 14),
        dmp(0, &f, 16),
        dmp(0, &f, 18),
        dmp(0, &f, 20),
        op("guard_not_invalidated"),
        op("getfield_raw").with_args("p0"),
        op("int_lt").with_args("i3, 0"),
        op("guard_false").with_args("i4"),
        dmp(0, &f, 22),
        op("jump").with_args("i2"),
    ];

    LoopFixture {
        greenkey: Greenkey {
            code: code_ref(&f),
            bytecode_no: 6,
        },
        operations: three_sections(body),
        codes: vec![f],
    }
}

/// `while i > 0: i = f(i); i` in `main` (line 124) with `f` (line 122) inlined
pub fn inlined_call_loop() -> LoopFixture {
    let f = FakeCode::new(3, "f", 122, &["def f(i):", "    return i - 1"])
        .with_offsets(0, 4, 123)
        .into_ref();
    let main = FakeCode::new(2, "main", 124, &["def main():", "    i = 1500", "    while i > 0:", "        i = f(i)", "        i"])
        .with_offsets(0, 4, 126)
        .with_offsets(8, 4, 127)
        .with_offsets(16, 3, 128)
        .with_offsets(22, 1, 126)
        .into_ref();

    let body = vec![
        dmp(0, &main, 0),
        dmp(0, &main, 2),
        dmp(0, &main, 4),
        op("int_gt").with_args("i0, 0"),
        op("guard_true").with_args("i1"),
        dmp(0, &main, 6),
        dmp(0, &main, 8),
        dmp(0, &main, 10),
        dmp(0, &main, 12),
        op("force_token"),
        dmp(1, &f, 0),
        dmp(1, &f, 2),
        dmp(1, &f, 4),
        op("int_sub").with_args("i0, 1"),
        dmp(1, &f, 6),
        dmp(0, &main, 14),
        dmp(0, &main, 16),
        dmp(0, &main, 18),
        dmp(0, &main, 20),
        op("guard_not_invalidated"),
        op("getfield_raw").with_args("p0"),
        op("int_lt").with_args("i3, 0"),
        op("guard_false").with_args("i4"),
        dmp(0, &main, 22),
        op("jump").with_args("i2"),
    ];

    LoopFixture {
        greenkey: Greenkey {
            code: code_ref(&main),
            bytecode_no: 6,
        },
        operations: three_sections(body),
        codes: vec![main, f],
    }
}

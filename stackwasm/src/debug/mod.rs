//! Optional breakpoint instrumentation.
//!
//! A [`DebugHook`] is attached to one [`crate::Vm`] and consulted before every instruction.
//! Without a hook the dispatch loop behaves identically, minus the check. [`Debugger`] is the
//! stock hook: a breakpoint set plus a line-based command channel that blocks the interpreter
//! while stopped.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::mpsc::{self, Receiver, RecvError, SendError, Sender};

use tracing::debug;

use crate::model::FuncIdx;

/// How many operand slots `stack` shows, counted from the top.
const STACK_DEPTH: usize = 8;

/// Snapshot of the current frame handed to a hook at a breakpoint. Slots are raw 64-bit
/// words; 32-bit values are zero-extended and floats appear as their bit patterns.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionView<'a> {
    pub func: FuncIdx,
    /// Offset into the function's instruction bytes.
    pub pc: usize,
    /// Parameters followed by declared locals.
    pub locals: &'a [u64],
    /// Operand stack of the current frame, bottom first.
    pub stack: &'a [u64],
}

pub trait DebugHook: Send {
    fn is_breakpoint(&self, pc: usize) -> bool;

    /// Called with execution paused before the instruction at `view.pc`. Returning resumes it.
    fn on_break(&mut self, view: &ExecutionView<'_>);
}

/// Breakpoints keyed by instruction offset, driven over a pair of channels.
///
/// Each stop sends a `stopped at ...` message, then the debugger answers every command with
/// exactly one message until it receives `continue`, which gets no answer. A dropped
/// [`DebuggerHandle`] resumes execution.
pub struct Debugger {
    breakpoints: BTreeSet<usize>,
    commands: Receiver<String>,
    replies: Sender<String>,
}

/// Client end of a [`Debugger`].
pub struct DebuggerHandle {
    commands: Sender<String>,
    replies: Receiver<String>,
}

impl DebuggerHandle {
    pub fn send(&self, command: impl Into<String>) -> Result<(), SendError<String>> {
        self.commands.send(command.into())
    }

    /// Block until the debugger writes its next message.
    pub fn recv(&self) -> Result<String, RecvError> {
        self.replies.recv()
    }

    /// Messages already written, without blocking.
    pub fn drain(&self) -> Vec<String> {
        self.replies.try_iter().collect()
    }
}

enum Command {
    Continue,
    Break(Option<usize>),
    Locals,
    Stack,
    Help,
}

fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let cmd = match words.next() {
        Some("c" | "continue") => Command::Continue,
        Some("b" | "break") => match words.next() {
            None => Command::Break(None),
            Some(addr) => Command::Break(Some(
                parse_addr(addr).ok_or_else(|| format!("invalid address {addr:?}"))?,
            )),
        },
        Some("l" | "locals") => Command::Locals,
        Some("s" | "stack") => Command::Stack,
        Some("h" | "help") => Command::Help,
        Some(other) => return Err(format!("unknown command {other:?}, try `help`")),
        None => return Err(String::new()),
    };
    match words.next() {
        None => Ok(cmd),
        Some(extra) => Err(format!("unexpected argument {extra:?}")),
    }
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_addr(s: &str) -> Option<usize> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

const USAGE: &str = "commands:\n\
    \x20 c, continue      resume execution\n\
    \x20 b, break [addr]  set a breakpoint (current offset if omitted)\n\
    \x20 l, locals        show locals of the current frame\n\
    \x20 s, stack         show the top of the operand stack\n\
    \x20 h, help          show this message";

impl Debugger {
    pub fn new() -> (Self, DebuggerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        (
            Self {
                breakpoints: BTreeSet::new(),
                commands: cmd_rx,
                replies: reply_tx,
            },
            DebuggerHandle {
                commands: cmd_tx,
                replies: reply_rx,
            },
        )
    }

    pub fn with_breakpoint(mut self, pc: usize) -> Self {
        self.breakpoints.insert(pc);
        self
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = usize> + '_ {
        self.breakpoints.iter().copied()
    }

    fn reply(&self, msg: String) {
        // a closed channel only means nobody is listening
        let _ = self.replies.send(msg);
    }
}

impl DebugHook for Debugger {
    fn is_breakpoint(&self, pc: usize) -> bool {
        self.breakpoints.contains(&pc)
    }

    fn on_break(&mut self, view: &ExecutionView<'_>) {
        debug!(func = view.func, pc = view.pc, "breakpoint hit");
        let stopped = format!("stopped at {:#x} in function {}", view.pc, view.func);
        self.reply(stopped.clone());
        while let Ok(line) = self.commands.recv() {
            match parse(&line) {
                Ok(Command::Continue) => return,
                Ok(Command::Break(addr)) => {
                    let pc = addr.unwrap_or(view.pc);
                    self.breakpoints.insert(pc);
                    self.reply(format!("breakpoint at {pc:#x}"));
                }
                Ok(Command::Locals) => {
                    let mut out = String::new();
                    for (i, v) in view.locals.iter().enumerate() {
                        let _ = writeln!(out, "local[{i}] = {v:#x}");
                    }
                    self.reply(out.trim_end().to_string());
                }
                Ok(Command::Stack) => {
                    let mut out = String::new();
                    let len = view.stack.len();
                    for (i, v) in view.stack.iter().enumerate().rev().take(STACK_DEPTH) {
                        let _ = writeln!(out, "{}: {v:#x}", len - 1 - i);
                    }
                    self.reply(out.trim_end().to_string());
                }
                Ok(Command::Help) => self.reply(USAGE.to_string()),
                Err(msg) if msg.is_empty() => self.reply(stopped.clone()),
                Err(msg) => self.reply(msg),
            }
        }
    }
}

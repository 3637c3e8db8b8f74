//! Proc states: one activation record per call, held on a thread's frame
//! stack and resumed by the thread until it returns.

use std::rc::Rc;

use crate::lang::arguments::ArgumentBundle;
use crate::lang::value::{ObjectRef, ProcId, Value};
use crate::runtime::completion::Completion;
use crate::runtime::interp::InterpState;
use crate::runtime::procs::NativeFn;
use crate::runtime::runtime_error::{RuntimeError, internal};
use crate::runtime::thread::ThreadId;
use crate::runtime::vm::Runtime;

/// What a frame reports back to its thread after a resume.
#[derive(Debug)]
pub enum ProcStatus {
    /// The frame is done; its result is ready to be taken.
    Returned,
    /// The frame is waiting on something outside the thread.
    Deferred,
    /// The frame issued a call; push the new frame and run it.
    Called(Box<ProcState>),
}

#[derive(Debug)]
pub enum ProcState {
    Native(NativeState),
    Bytecode(Box<InterpState>),
    Async(AsyncState),
}

impl ProcState {
    pub fn resume(&mut self, thread: ThreadId, rt: &mut Runtime) -> Result<ProcStatus, RuntimeError> {
        match self {
            ProcState::Native(state) => state.resume(rt),
            ProcState::Bytecode(state) => state.resume(thread, rt),
            ProcState::Async(state) => state.resume(thread, rt),
        }
    }

    /// Hand the result of a nested call to the frame that issued it.
    pub fn returned_into(&mut self, value: Value) -> Result<(), RuntimeError> {
        match self {
            ProcState::Bytecode(state) => state.returned_into(value),
            ProcState::Async(state) => state.returned_into(value),
            ProcState::Native(state) => Err(internal(format!(
                "native proc {} cannot receive a return value",
                state.name
            ))),
        }
    }

    /// Consume a returned frame, yielding its result. Rented slots go back
    /// to the pool here.
    pub fn into_result(self) -> Value {
        match self {
            ProcState::Native(state) => state.result,
            ProcState::Bytecode(state) => state.result,
            ProcState::Async(mut state) => std::mem::replace(&mut state.result, Value::Null),
        }
    }

    /// Whether this frame has a catch region open.
    pub fn can_catch(&self) -> bool {
        matches!(self, ProcState::Bytecode(state) if state.has_catch())
    }

    /// Enter the innermost catch region with `error`. Returns false when
    /// there is none.
    pub fn catch(&mut self, error: &RuntimeError) -> bool {
        match self {
            ProcState::Bytecode(state) => state.catch(error),
            _ => false,
        }
    }

    pub fn proc(&self) -> Option<ProcId> {
        match self {
            ProcState::Native(state) => Some(state.proc),
            ProcState::Bytecode(state) => Some(state.proc),
            ProcState::Async(state) => state.proc,
        }
    }

    /// `owner/name`, with `@pc` for bytecode frames.
    pub fn describe(&self) -> String {
        match self {
            ProcState::Native(state) => state.name.to_string(),
            ProcState::Bytecode(state) => {
                format!("{}@{}", state.def.qualified_name(), state.pc)
            }
            ProcState::Async(state) => state.name.to_string(),
        }
    }
}

// ─────────────────────────── Native ───────────────────────────

/// What a synchronous built-in sees of its call.
pub struct NativeContext<'a> {
    pub runtime: &'a mut Runtime,
    pub src: Option<ObjectRef>,
    pub usr: Option<ObjectRef>,
    pub args: &'a [Value],
}

impl NativeContext<'_> {
    /// Argument `i`, `Null` when not passed.
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).cloned().unwrap_or(Value::Null)
    }
}

pub struct NativeState {
    pub proc: ProcId,
    pub name: Rc<str>,
    func: NativeFn,
    src: Option<ObjectRef>,
    usr: Option<ObjectRef>,
    args: Vec<Value>,
    result: Value,
    done: bool,
}

impl std::fmt::Debug for NativeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeState")
            .field("name", &self.name)
            .field("done", &self.done)
            .finish()
    }
}

impl NativeState {
    pub fn new(
        proc: ProcId,
        name: Rc<str>,
        func: NativeFn,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Self {
        NativeState {
            proc,
            name,
            func,
            src,
            usr,
            args,
            result: Value::Null,
            done: false,
        }
    }

    fn resume(&mut self, rt: &mut Runtime) -> Result<ProcStatus, RuntimeError> {
        if self.done {
            return Err(internal(format!("native proc {} resumed after returning", self.name)));
        }
        let mut cx = NativeContext {
            runtime: &mut *rt,
            src: self.src,
            usr: self.usr,
            args: &self.args,
        };
        self.result = (self.func)(&mut cx)?;
        self.done = true;
        Ok(ProcStatus::Returned)
    }
}

// ─────────────────────────── Native async ───────────────────────────

/// A nested call an async built-in wants made on its behalf.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub proc: ProcId,
    pub src: Option<ObjectRef>,
    pub args: ArgumentBundle,
}

/// One step of an async built-in.
#[derive(Debug)]
pub enum AsyncPoll {
    /// Wait for the completion; poll again with its value.
    Await(Completion),
    /// Run a proc; poll again with its return value.
    Call(CallRequest),
    /// Finished with a value.
    Ready(Value),
}

pub struct AsyncContext<'a> {
    pub runtime: &'a mut Runtime,
    pub thread: ThreadId,
    pub src: Option<ObjectRef>,
    pub usr: Option<ObjectRef>,
    pub args: &'a [Value],
    /// The awaited value or nested return value this poll resumes with;
    /// `None` on the first poll.
    pub resumed: Option<Value>,
}

/// A built-in that suspends.
///
/// The state machine is driven by polls: each poll either finishes, waits on
/// a completion, or asks for a nested call. Polls never block.
pub trait AsyncNative {
    fn poll(&mut self, cx: &mut AsyncContext<'_>) -> Result<AsyncPoll, RuntimeError>;
}

#[derive(Debug)]
enum AsyncPhase {
    Start,
    Awaiting(Completion),
    /// A nested call is on the thread above this frame.
    Calling,
    /// The nested call returned this value.
    CallReturned(Value),
    Done,
}

pub struct AsyncState {
    /// `None` for states the interpreter creates for its own opcodes.
    pub proc: Option<ProcId>,
    pub name: Rc<str>,
    task: Box<dyn AsyncNative>,
    src: Option<ObjectRef>,
    usr: Option<ObjectRef>,
    args: Vec<Value>,
    phase: AsyncPhase,
    result: Value,
}

impl std::fmt::Debug for AsyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncState")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish()
    }
}

impl AsyncState {
    pub fn new(
        proc: Option<ProcId>,
        name: Rc<str>,
        task: Box<dyn AsyncNative>,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Self {
        AsyncState {
            proc,
            name,
            task,
            src,
            usr,
            args,
            phase: AsyncPhase::Start,
            result: Value::Null,
        }
    }

    /// Wait on a single completion and return its value.
    pub fn awaiting(name: &str, completion: Completion) -> Self {
        AsyncState::new(
            None,
            Rc::from(name),
            Box::new(AwaitTask {
                completion: Some(completion),
            }),
            None,
            None,
            Vec::new(),
        )
    }

    fn resume(&mut self, thread: ThreadId, rt: &mut Runtime) -> Result<ProcStatus, RuntimeError> {
        loop {
            let resumed = match std::mem::replace(&mut self.phase, AsyncPhase::Done) {
                AsyncPhase::Start => None,
                AsyncPhase::Awaiting(completion) => match completion.take() {
                    Some(result) => Some(result?),
                    None if completion.is_cancelled() => {
                        return Err(internal(format!("{} resumed after cancellation", self.name)));
                    }
                    None => {
                        completion.set_waker(rt.wake.waker_for(thread));
                        self.phase = AsyncPhase::Awaiting(completion);
                        return Ok(ProcStatus::Deferred);
                    }
                },
                AsyncPhase::CallReturned(value) => Some(value),
                AsyncPhase::Calling => {
                    return Err(internal(format!(
                        "{} resumed while its nested call is running",
                        self.name
                    )));
                }
                AsyncPhase::Done => {
                    return Err(internal(format!("{} resumed after returning", self.name)));
                }
            };

            let mut cx = AsyncContext {
                runtime: &mut *rt,
                thread,
                src: self.src,
                usr: self.usr,
                args: &self.args,
                resumed,
            };
            match self.task.poll(&mut cx)? {
                AsyncPoll::Await(completion) => {
                    self.phase = AsyncPhase::Awaiting(completion);
                }
                AsyncPoll::Call(request) => {
                    let usr = self.usr;
                    let state = rt.instantiate(request.proc, request.src, usr, &request.args)?;
                    self.phase = AsyncPhase::Calling;
                    return Ok(ProcStatus::Called(Box::new(state)));
                }
                AsyncPoll::Ready(value) => {
                    self.result = value;
                    return Ok(ProcStatus::Returned);
                }
            }
        }
    }

    fn returned_into(&mut self, value: Value) -> Result<(), RuntimeError> {
        match self.phase {
            AsyncPhase::Calling => {
                self.phase = AsyncPhase::CallReturned(value);
                Ok(())
            }
            _ => Err(internal(format!(
                "{} received a return value it did not ask for",
                self.name
            ))),
        }
    }
}

impl Drop for AsyncState {
    fn drop(&mut self) {
        if let AsyncPhase::Awaiting(completion) = &self.phase {
            completion.cancel();
        }
    }
}

// ─────────────────────────── Built-in tasks ───────────────────────────

/// Wait for one completion.
pub struct AwaitTask {
    completion: Option<Completion>,
}

impl AsyncNative for AwaitTask {
    fn poll(&mut self, cx: &mut AsyncContext<'_>) -> Result<AsyncPoll, RuntimeError> {
        match self.completion.take() {
            Some(completion) => Ok(AsyncPoll::Await(completion)),
            None => Ok(AsyncPoll::Ready(cx.resumed.take().unwrap_or(Value::Null))),
        }
    }
}

/// `sleep(delay)`: wait the given number of scheduler ticks.
pub struct SleepTask {
    pub ticks: u64,
    started: bool,
}

impl SleepTask {
    pub fn new(ticks: u64) -> Self {
        SleepTask {
            ticks,
            started: false,
        }
    }
}

impl AsyncNative for SleepTask {
    fn poll(&mut self, cx: &mut AsyncContext<'_>) -> Result<AsyncPoll, RuntimeError> {
        if self.started {
            return Ok(AsyncPoll::Ready(Value::Null));
        }
        self.started = true;
        Ok(AsyncPoll::Await(cx.runtime.delays.schedule(self.ticks)))
    }
}

//! A thread: one logical call chain, held as an explicit stack of proc
//! states and driven by repeated `resume` calls.

use std::fmt;

use tracing::{debug, error, trace};

use crate::lang::value::Value;
use crate::runtime::runtime_error::{ErrorKind, RuntimeError, internal};
use crate::runtime::state::{ProcState, ProcStatus};
use crate::runtime::vm::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadStatus {
    /// The bottom frame returned this value; the thread is empty.
    Finished(Value),
    /// Parked until a waker re-queues it.
    Deferred,
}

#[derive(Debug)]
pub struct Thread {
    pub id: ThreadId,
    name: String,
    /// Bottom is the entry call, top is the running frame.
    frames: Vec<ProcState>,
}

impl Thread {
    pub fn new(id: ThreadId, entry: ProcState) -> Self {
        Thread {
            id,
            name: entry.describe(),
            frames: vec![entry],
        }
    }

    /// The entry proc, as it was described when the thread started.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_finished(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame descriptions, innermost first.
    pub fn stack_trace(&self) -> Vec<String> {
        self.frames.iter().rev().map(ProcState::describe).collect()
    }

    /// Run until the entry frame returns or a frame defers.
    ///
    /// An error no frame catches empties the thread and comes back with the
    /// frames it unwound through.
    pub fn resume(&mut self, rt: &mut Runtime) -> Result<ThreadStatus, RuntimeError> {
        if self.frames.is_empty() {
            return Err(internal(format!("thread {} resumed after finishing", self.id)));
        }
        rt.begin_resume();

        loop {
            let Some(top) = self.frames.last_mut() else {
                return Err(internal(format!("thread {} lost its frames", self.id)));
            };

            let outcome = match top.resume(self.id, rt) {
                Ok(status) => self.apply(status, rt),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(err) => self.unwind(err)?,
            }
        }
    }

    /// Act on what the top frame reported. `Ok(None)` keeps running.
    fn apply(
        &mut self,
        status: ProcStatus,
        rt: &mut Runtime,
    ) -> Result<Option<ThreadStatus>, RuntimeError> {
        match status {
            ProcStatus::Returned => {
                let Some(done) = self.frames.pop() else {
                    return Err(internal("returned from an empty thread"));
                };
                trace!(thread = %self.id, frame = %done.describe(), "frame returned");
                let value = done.into_result();

                match self.frames.last_mut() {
                    Some(caller) => {
                        caller.returned_into(value)?;
                        Ok(None)
                    }
                    None => {
                        debug!(thread = %self.id, "thread finished");
                        Ok(Some(ThreadStatus::Finished(value)))
                    }
                }
            }
            ProcStatus::Deferred => {
                debug!(thread = %self.id, depth = self.frames.len(), "thread deferred");
                Ok(Some(ThreadStatus::Deferred))
            }
            ProcStatus::Called(callee) => {
                let limit = rt.config.max_call_depth;
                if self.frames.len() >= limit {
                    return Err(RuntimeError::new(ErrorKind::StackDepth(limit)));
                }
                trace!(thread = %self.id, frame = %callee.describe(), "frame pushed");
                self.frames.push(*callee);
                Ok(None)
            }
        }
    }

    /// Hand `err` to the innermost frame that can catch it, dropping every
    /// frame above. Frames dropped here never run again and their slots go
    /// back to the pool.
    fn unwind(&mut self, err: RuntimeError) -> Result<(), RuntimeError> {
        if err.is_catchable()
            && let Some(handler) = self.frames.iter().rposition(ProcState::can_catch)
        {
            let unwound = self.frames.len() - handler - 1;
            self.frames.truncate(handler + 1);
            if let Some(frame) = self.frames.last_mut()
                && frame.catch(&err)
            {
                trace!(thread = %self.id, unwound, error = %err.kind, "error caught");
                return Ok(());
            }
        }

        let mut err = err;
        for frame in self.frames.iter().rev() {
            err = err.with_context(frame.describe());
        }
        self.frames.clear();
        error!(thread = %self.id, name = %self.name, "{}", err);
        Err(err)
    }

    /// Drop every frame without running it. Pending completions are
    /// cancelled and rented slots returned.
    pub fn cancel(&mut self) {
        debug!(thread = %self.id, depth = self.frames.len(), "thread cancelled");
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::emit::ProgramBuilder;
    use crate::bytecode::ir::{CompiledProgram, Constant, Parameter};
    use crate::bytecode::op::Opcode;
    use crate::lang::arguments::ArgumentBundle;
    use crate::lang::objects::MemoryObjects;
    use crate::runtime::config::VmConfig;
    use crate::runtime::host::{NullHost, RecordingHost};

    fn runtime(program: CompiledProgram) -> Runtime {
        Runtime::new(
            program,
            Box::new(MemoryObjects::new()),
            Box::new(NullHost),
            VmConfig::default(),
        )
        .unwrap()
    }

    fn start(rt: &mut Runtime, name: &str, args: ArgumentBundle) -> Thread {
        let proc = rt.find_proc("", name).unwrap();
        rt.create_thread(proc, None, None, args).unwrap()
    }

    #[test]
    fn test_straight_line_finishes_in_one_resume() {
        let mut b = ProgramBuilder::new();
        b.proc("", "main", vec![], |e| {
            e.push_int(2).push_int(3).op(Opcode::Add).op(Opcode::Return);
        })
        .unwrap();
        let mut rt = runtime(b.finish());

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        assert_eq!(thread.resume(&mut rt).unwrap(), ThreadStatus::Finished(Value::Integer(5)));
        assert!(thread.is_finished());
        assert_eq!(rt.pool.outstanding(), 0);
    }

    #[test]
    fn test_running_off_the_end_returns_dot() {
        let mut b = ProgramBuilder::new();
        b.proc("", "main", vec![], |e| {
            e.op(Opcode::PushResultRef).push_int(9).op(Opcode::Assign).op(Opcode::Pop);
        })
        .unwrap();
        let mut rt = runtime(b.finish());

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        assert_eq!(thread.resume(&mut rt).unwrap(), ThreadStatus::Finished(Value::Integer(9)));
    }

    #[test]
    fn test_nested_call_with_defaults() {
        let mut b = ProgramBuilder::new();
        let f = b.declare(
            "",
            "f",
            vec![
                Parameter::new("a"),
                Parameter::with_default("b", Constant::Integer(10)),
            ],
        );
        b.define(f, |e| {
            e.push_local(0).push_local(1).op(Opcode::Add).op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "main", vec![], |e| {
            e.op(Opcode::GetProc).str("f");
            e.push_int(1).push_positional(1);
            e.op(Opcode::Call);
            e.op(Opcode::GetProc).str("f");
            e.push_int(1).push_int(2).push_args(&[None, Some("b")]);
            e.op(Opcode::Call);
            e.op(Opcode::Multiply).op(Opcode::Return);
        })
        .unwrap();
        let mut rt = runtime(b.finish());

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        // f(1) = 11, f(1, b = 2) = 3
        assert_eq!(thread.resume(&mut rt).unwrap(), ThreadStatus::Finished(Value::Integer(33)));
    }

    #[test]
    fn test_prompt_defers_through_nested_call() {
        let mut b = ProgramBuilder::new();
        b.proc("", "ask", vec![], |e| {
            e.op(Opcode::PushUsr)
                .push_string("name?")
                .push_string("")
                .op(Opcode::PushNull);
            e.op(Opcode::Prompt).int(0);
            e.op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "main", vec![], |e| {
            e.op(Opcode::GetProc).str("ask");
            e.push_positional(0);
            e.op(Opcode::Call);
            e.push_string("!").op(Opcode::Add).op(Opcode::Return);
        })
        .unwrap();

        let host = RecordingHost::new();
        let log = host.log();
        let mut rt = Runtime::new(
            b.finish(),
            Box::new(MemoryObjects::new()),
            Box::new(host),
            VmConfig::default(),
        )
        .unwrap();

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        assert_eq!(thread.resume(&mut rt).unwrap(), ThreadStatus::Deferred);
        assert_eq!(thread.depth(), 3);
        assert!(rt.wake.is_empty());

        let (request, reply) = log.borrow_mut().prompts.remove(0);
        assert_eq!(request.message, "name?");
        reply.complete(Value::string("ann"));
        assert_eq!(rt.wake.pop(), Some(thread.id));

        assert_eq!(
            thread.resume(&mut rt).unwrap(),
            ThreadStatus::Finished(Value::string("ann!"))
        );
        assert_eq!(rt.pool.outstanding(), 0);
    }

    #[test]
    fn test_catch_three_frames_deep() {
        let mut b = ProgramBuilder::new();
        b.proc("", "inner", vec![], |e| {
            e.push_string("boom").op(Opcode::Throw);
            e.push_int(-1).op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "middle", vec![], |e| {
            e.op(Opcode::GetProc).str("inner");
            e.push_positional(0).op(Opcode::Call);
            e.push_int(-2).op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "outer", vec![], |e| {
            let caught = e.label();
            e.op(Opcode::Try).jump(caught).slot(0);
            e.op(Opcode::GetProc).str("middle");
            e.push_positional(0).op(Opcode::Call);
            e.op(Opcode::EndTry);
            e.push_int(-3).op(Opcode::Return);
            e.mark(caught);
            e.push_local(0).op(Opcode::Return);
        })
        .unwrap();
        let mut rt = runtime(b.finish());

        let mut thread = start(&mut rt, "outer", ArgumentBundle::new());
        assert_eq!(
            thread.resume(&mut rt).unwrap(),
            ThreadStatus::Finished(Value::string("boom"))
        );
        assert_eq!(rt.pool.outstanding(), 0);
    }

    #[test]
    fn test_uncaught_error_reports_unwound_frames() {
        let mut b = ProgramBuilder::new();
        b.proc("", "inner", vec![], |e| {
            e.push_int(1).push_int(0).op(Opcode::Divide).op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "main", vec![], |e| {
            e.op(Opcode::GetProc).str("inner");
            e.push_positional(0).op(Opcode::Call).op(Opcode::Return);
        })
        .unwrap();
        let mut rt = runtime(b.finish());

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        let err = thread.resume(&mut rt).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivisionByZero));
        assert_eq!(err.call_stack.len(), 2);
        assert!(err.call_stack[0].starts_with("inner@"));
        assert!(err.call_stack[1].starts_with("main@"));
        assert!(thread.is_finished());
        assert_eq!(rt.pool.outstanding(), 0);
    }

    #[test]
    fn test_call_depth_limit_is_catchable() {
        let mut b = ProgramBuilder::new();
        b.proc("", "recurse", vec![], |e| {
            e.push_positional(0).op(Opcode::CallSelf).op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "main", vec![], |e| {
            let caught = e.label();
            e.op(Opcode::TryNoValue).jump(caught);
            e.op(Opcode::GetProc).str("recurse");
            e.push_positional(0).op(Opcode::Call).op(Opcode::Return);
            e.mark(caught);
            e.push_string("too deep").op(Opcode::Return);
        })
        .unwrap();
        let mut rt = runtime(b.finish());
        rt.config.max_call_depth = 16;

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        assert_eq!(
            thread.resume(&mut rt).unwrap(),
            ThreadStatus::Finished(Value::string("too deep"))
        );
        assert_eq!(rt.pool.outstanding(), 0);
    }

    #[test]
    fn test_step_budget_defers_and_rearms() {
        let mut b = ProgramBuilder::new();
        b.proc("", "main", vec![], |e| {
            for _ in 0..10 {
                e.op(Opcode::PushNull).op(Opcode::Pop);
            }
            e.push_int(1).op(Opcode::Return);
        })
        .unwrap();
        let mut rt = runtime(b.finish());
        rt.config.max_steps_per_resume = Some(8);

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        let mut resumes = 0;
        let result = loop {
            resumes += 1;
            match thread.resume(&mut rt).unwrap() {
                ThreadStatus::Deferred => assert_eq!(rt.wake.pop(), Some(thread.id)),
                ThreadStatus::Finished(value) => break value,
            }
        };
        assert_eq!(result, Value::Integer(1));
        assert_eq!(resumes, 3);
    }

    #[test]
    fn test_cancel_releases_slots() {
        let mut b = ProgramBuilder::new();
        b.proc("", "ask", vec![Parameter::new("who")], |e| {
            e.push_local(0)
                .push_string("?")
                .push_string("")
                .op(Opcode::PushNull);
            e.op(Opcode::Prompt).int(0).op(Opcode::Return);
        })
        .unwrap();
        let mut rt = Runtime::new(
            b.finish(),
            Box::new(MemoryObjects::new()),
            Box::new(RecordingHost::new()),
            VmConfig::default(),
        )
        .unwrap();

        let mut threads: Vec<Thread> = (0..50)
            .map(|i| start(&mut rt, "ask", ArgumentBundle::positional([Value::Integer(i)])))
            .collect();
        for thread in &mut threads {
            assert_eq!(thread.resume(&mut rt).unwrap(), ThreadStatus::Deferred);
        }
        assert_eq!(rt.pool.outstanding(), 50);

        for thread in &mut threads {
            thread.cancel();
        }
        assert_eq!(rt.pool.outstanding(), 0);
        assert!(rt.wake.is_empty());
    }

    #[test]
    fn test_resume_after_finish_is_internal() {
        let mut b = ProgramBuilder::new();
        b.proc("", "main", vec![], |_| {}).unwrap();
        let mut rt = runtime(b.finish());

        let mut thread = start(&mut rt, "main", ArgumentBundle::new());
        assert_eq!(thread.resume(&mut rt).unwrap(), ThreadStatus::Finished(Value::Null));
        let err = thread.resume(&mut rt).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Internal(_)));
    }
}

//! Cooperative owner of threads.
//!
//! Nothing here runs in parallel. A thread makes progress only inside
//! [`ProcScheduler::run_until_idle`], which resumes ready threads one at a
//! time until none is runnable.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::lang::arguments::ArgumentBundle;
use crate::lang::value::{ObjectRef, ProcId, Value};
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::thread::{Thread, ThreadId, ThreadStatus};
use crate::runtime::vm::{Runtime, SpawnedThread};

pub type Completed = (ThreadId, Result<Value, RuntimeError>);

pub struct ProcScheduler {
    runtime: Runtime,
    /// Live threads that are not currently being resumed.
    threads: HashMap<ThreadId, Thread>,
    completed: Vec<Completed>,
}

impl ProcScheduler {
    pub fn new(runtime: Runtime) -> Self {
        ProcScheduler {
            runtime,
            threads: HashMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Create a thread for `proc` and queue it to run.
    pub fn start(
        &mut self,
        proc: ProcId,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        args: ArgumentBundle,
    ) -> Result<ThreadId, RuntimeError> {
        let thread = self.runtime.create_thread(proc, src, usr, args)?;
        let id = thread.id;
        self.threads.insert(id, thread);
        self.runtime.wake.push(id);
        Ok(id)
    }

    /// Resume ready threads until none is runnable. Zero-tick sleeps fire
    /// once the ready queue first drains. Returns how many resumes ran.
    pub fn run_until_idle(&mut self) -> usize {
        let mut resumed = self.drain_ready();
        if self.runtime.delays.fire_immediate() > 0 {
            resumed += self.drain_ready();
        }
        resumed
    }

    /// Advance time one tick, then run whatever woke.
    pub fn tick(&mut self) -> usize {
        self.runtime.delays.advance();
        self.run_until_idle()
    }

    fn drain_ready(&mut self) -> usize {
        let mut resumed = 0;
        loop {
            self.adopt_spawned();
            let Some(id) = self.runtime.wake.pop() else {
                return resumed;
            };
            // Wakeups for cancelled threads are stale.
            let Some(mut thread) = self.threads.remove(&id) else {
                continue;
            };

            trace!(thread = %id, "resuming");
            resumed += 1;
            match thread.resume(&mut self.runtime) {
                Ok(ThreadStatus::Deferred) => {
                    self.threads.insert(id, thread);
                }
                Ok(ThreadStatus::Finished(value)) => self.completed.push((id, Ok(value))),
                Err(err) => self.completed.push((id, Err(err))),
            }
        }
    }

    /// Take over threads spawned since the last look. Each one waits out
    /// its delay before its first resume.
    fn adopt_spawned(&mut self) {
        for SpawnedThread { thread, ticks } in self.runtime.take_spawned() {
            let id = thread.id;
            let timer = self.runtime.delays.schedule(ticks);
            timer.set_waker(self.runtime.wake.waker_for(id));
            self.threads.insert(id, thread);
        }
    }

    /// Stop a thread wherever it is. Returns false when it is not live.
    pub fn cancel(&mut self, id: ThreadId) -> bool {
        let Some(mut thread) = self.threads.remove(&id) else {
            return false;
        };
        thread.cancel();
        self.runtime.wake.remove(id);
        true
    }

    pub fn cancel_all(&mut self) {
        let ids: Vec<ThreadId> = self.threads.keys().copied().collect();
        debug!(threads = ids.len(), "cancelling all threads");
        for id in ids {
            self.cancel(id);
        }
    }

    /// Results of threads that finished or aborted since the last call, in
    /// the order they ended.
    pub fn take_completed(&mut self) -> Vec<Completed> {
        std::mem::take(&mut self.completed)
    }

    pub fn is_live(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Nothing can run until time advances or the host answers something.
    pub fn is_idle(&self) -> bool {
        self.runtime.wake.is_empty() && !self.runtime.delays.has_immediate()
    }

    /// Whether some live thread is waiting on a timer rather than the host.
    pub fn has_timers(&self) -> bool {
        self.runtime.delays.pending() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::emit::ProgramBuilder;
    use crate::bytecode::ir::{CompiledProgram, Constant};
    use crate::bytecode::op::Opcode;
    use crate::lang::objects::MemoryObjects;
    use crate::runtime::config::VmConfig;
    use crate::runtime::host::NullHost;

    fn scheduler(program: CompiledProgram) -> ProcScheduler {
        let rt = Runtime::new(
            program,
            Box::new(MemoryObjects::new()),
            Box::new(NullHost),
            VmConfig::default(),
        )
        .unwrap();
        ProcScheduler::new(rt)
    }

    fn start(sched: &mut ProcScheduler, name: &str) -> ThreadId {
        let proc = sched.runtime().find_proc("", name).unwrap();
        sched.start(proc, None, None, ArgumentBundle::new()).unwrap()
    }

    #[test]
    fn test_sleep_waits_for_ticks() {
        let mut b = ProgramBuilder::new();
        // sleep(1) is two ticks at 20 ticks per second
        b.proc("", "main", vec![], |e| {
            e.push_int(1).op(Opcode::Sleep);
            e.push_int(7).op(Opcode::Return);
        })
        .unwrap();
        let mut sched = scheduler(b.finish());
        let id = start(&mut sched, "main");

        sched.run_until_idle();
        assert!(sched.take_completed().is_empty());
        assert!(sched.is_idle());

        sched.tick();
        assert!(sched.take_completed().is_empty());

        sched.tick();
        let done = sched.take_completed();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, id);
        assert_eq!(done[0].1.as_ref().unwrap(), &Value::Integer(7));
        assert_eq!(sched.runtime().pool.outstanding(), 0);
    }

    #[test]
    fn test_zero_sleep_yields_to_ready_threads() {
        let mut b = ProgramBuilder::new();
        b.global(Constant::Integer(0));
        // first: global = 1; sleep(0); return global
        b.proc("", "first", vec![], |e| {
            e.op(Opcode::PushGlobalRef).int(0);
            e.push_int(1).op(Opcode::Assign).op(Opcode::Pop);
            e.push_int(0).op(Opcode::Sleep);
            e.op(Opcode::PushGlobal).int(0).op(Opcode::Return);
        })
        .unwrap();
        // second: global = 2
        b.proc("", "second", vec![], |e| {
            e.op(Opcode::PushGlobalRef).int(0);
            e.push_int(2).op(Opcode::Assign).op(Opcode::Return);
        })
        .unwrap();
        let mut sched = scheduler(b.finish());
        let first = start(&mut sched, "first");
        let second = start(&mut sched, "second");

        sched.run_until_idle();
        let done = sched.take_completed();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].0, second);
        assert_eq!(done[1].0, first);
        assert_eq!(done[1].1.as_ref().unwrap(), &Value::Integer(2));
    }

    #[test]
    fn test_spawn_runs_copy_after_delay() {
        let mut b = ProgramBuilder::new();
        b.global(Constant::Null);
        // spawn(1) { global = local0 + 1 } ; local0 = 5 at fork time
        b.proc("", "main", vec![], |e| {
            let after = e.label();
            e.push_int(5).set_local(0);
            e.push_int(1);
            e.jump_to(Opcode::Spawn, after);
            e.op(Opcode::PushGlobalRef).int(0);
            e.push_local(0).push_int(1).op(Opcode::Add);
            e.op(Opcode::Assign).op(Opcode::Return);
            e.mark(after);
            e.push_int(100).set_local(0);
            e.push_string("parent").op(Opcode::Return);
        })
        .unwrap();
        let mut sched = scheduler(b.finish());
        let parent = start(&mut sched, "main");

        sched.run_until_idle();
        let done = sched.take_completed();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, parent);
        assert_eq!(sched.thread_count(), 1);

        sched.tick();
        sched.tick();
        let done = sched.take_completed();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].1.as_ref().unwrap(), &Value::Integer(6));
        assert_eq!(sched.runtime().objects.get_global(0).unwrap(), Value::Integer(6));
        assert_eq!(sched.runtime().pool.outstanding(), 0);
    }

    #[test]
    fn test_uncaught_error_isolated_to_one_thread() {
        let mut b = ProgramBuilder::new();
        b.proc("", "bad", vec![], |e| {
            e.push_string("x").push_int(1).op(Opcode::Subtract).op(Opcode::Return);
        })
        .unwrap();
        b.proc("", "good", vec![], |e| {
            e.push_int(1).op(Opcode::Return);
        })
        .unwrap();
        let mut sched = scheduler(b.finish());
        let bad = start(&mut sched, "bad");
        let good = start(&mut sched, "good");

        sched.run_until_idle();
        let done = sched.take_completed();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].0, bad);
        assert!(done[0].1.is_err());
        assert_eq!(done[1].0, good);
        assert_eq!(done[1].1.as_ref().unwrap(), &Value::Integer(1));
    }

    #[test]
    fn test_cancel_many_sleepers() {
        let mut b = ProgramBuilder::new();
        b.proc("", "nap", vec![], |e| {
            e.push_int(100).op(Opcode::Sleep).op(Opcode::PushNull).op(Opcode::Return);
        })
        .unwrap();
        let mut sched = scheduler(b.finish());
        let ids: Vec<ThreadId> = (0..100).map(|_| start(&mut sched, "nap")).collect();
        sched.run_until_idle();
        assert_eq!(sched.thread_count(), 100);
        assert!(sched.runtime().pool.outstanding() > 0);

        sched.cancel_all();
        assert_eq!(sched.thread_count(), 0);
        assert_eq!(sched.runtime().pool.outstanding(), 0);
        assert!(!sched.cancel(ids[0]));

        // Timers fire into cancelled completions and wake nothing.
        for _ in 0..250 {
            sched.tick();
        }
        assert!(sched.take_completed().is_empty());
    }
}

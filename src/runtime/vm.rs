use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::bytecode::ir::{CompiledProgram, Parameter};
use crate::bytecode::verify::{VerifyError, verify_program};
use crate::lang::arguments::ArgumentBundle;
use crate::lang::objects::ObjectModel;
use crate::lang::value::{ObjectRef, ProcId, Value};
use crate::runtime::completion::WakeQueue;
use crate::runtime::config::VmConfig;
use crate::runtime::delay::DelayQueue;
use crate::runtime::host::HostIo;
use crate::runtime::interp::InterpState;
use crate::runtime::pool::SlotPool;
use crate::runtime::procs::{NativeFn, ProcEntry, ProcKind, ProcRegistry};
use crate::runtime::runtime_error::{RuntimeError, internal};
use crate::runtime::state::{AsyncNative, AsyncState, NativeState, ProcState};
use crate::runtime::thread::{Thread, ThreadId};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bytecode rejected: {0}")]
    Verify(#[from] VerifyError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

/// A thread created by `spawn`, waiting to be scheduled.
#[derive(Debug)]
pub struct SpawnedThread {
    pub thread: Thread,
    /// Scheduler ticks before its first resume.
    pub ticks: u64,
}

/// Everything threads share: procs, strings, collaborators and pools.
pub struct Runtime {
    pub config: VmConfig,
    strings: Vec<Rc<str>>,
    pub procs: ProcRegistry,
    pub objects: Box<dyn ObjectModel>,
    pub host: Box<dyn HostIo>,
    pub pool: SlotPool,
    pub wake: WakeQueue,
    pub delays: DelayQueue,
    steps_left: Option<usize>,
    spawned: Vec<SpawnedThread>,
    next_thread_id: u64,
}

impl Runtime {
    /// Verify a program and load it against the given collaborators.
    ///
    /// Typed procs are registered on the object model and globals seeded
    /// with their initial values.
    pub fn new(
        program: CompiledProgram,
        mut objects: Box<dyn ObjectModel>,
        host: Box<dyn HostIo>,
        config: VmConfig,
    ) -> Result<Self, LoadError> {
        verify_program(&program)?;

        for (i, def) in program.procs.iter().enumerate() {
            if !def.owner.is_empty() {
                objects.register_proc(&def.owner, &def.name, ProcId(i as u32));
            }
        }
        for (i, initial) in program.globals.iter().enumerate() {
            objects.set_global(i as u32, initial.to_value())?;
        }

        let procs = ProcRegistry::from_program(&program);
        debug!(
            procs = procs.len(),
            strings = program.strings.len(),
            globals = program.globals.len(),
            "program loaded"
        );

        Ok(Runtime {
            config,
            strings: program.strings.iter().map(|s| Rc::from(s.as_str())).collect(),
            procs,
            objects,
            host,
            pool: SlotPool::new(),
            wake: WakeQueue::new(),
            delays: DelayQueue::new(),
            steps_left: None,
            spawned: Vec::new(),
            next_thread_id: 1,
        })
    }

    pub fn string(&self, id: u32) -> Result<Rc<str>, RuntimeError> {
        self.strings
            .get(id as usize)
            .cloned()
            .ok_or_else(|| internal(format!("string id {} out of range", id)))
    }

    pub fn find_proc(&self, owner: &str, name: &str) -> Option<ProcId> {
        self.procs.find(owner, name)
    }

    fn register(&mut self, owner: &str, name: &str, parameters: Vec<Parameter>, kind: ProcKind) -> ProcId {
        let id = self.procs.register(ProcEntry {
            name: Rc::from(name),
            owner: Rc::from(owner),
            parameters,
            kind,
        });
        if !owner.is_empty() {
            self.objects.register_proc(owner, name, id);
        }
        id
    }

    pub fn register_native(
        &mut self,
        owner: &str,
        name: &str,
        parameters: Vec<Parameter>,
        func: NativeFn,
    ) -> ProcId {
        self.register(owner, name, parameters, ProcKind::Native(func))
    }

    pub fn register_async(
        &mut self,
        owner: &str,
        name: &str,
        parameters: Vec<Parameter>,
        factory: impl Fn(&[Value]) -> Box<dyn AsyncNative> + 'static,
    ) -> ProcId {
        self.register(owner, name, parameters, ProcKind::AsyncNative(Rc::new(factory)))
    }

    /// Start a call chain: a new thread whose only frame is `proc`.
    pub fn create_thread(
        &mut self,
        proc: ProcId,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        args: ArgumentBundle,
    ) -> Result<Thread, RuntimeError> {
        let state = self.instantiate(proc, src, usr, &args)?;
        let id = self.allocate_thread_id();
        let thread = Thread::new(id, state);
        debug!(thread = %id, name = %thread.name(), "thread created");
        Ok(thread)
    }

    /// Build the state for one call of `proc`. Arguments are merged against
    /// the proc's parameters; bytecode procs get a rented slot buffer.
    pub fn instantiate(
        &mut self,
        proc: ProcId,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        args: &ArgumentBundle,
    ) -> Result<ProcState, RuntimeError> {
        let entry = self.procs.get(proc)?;
        let values = args.resolve(&entry.parameters)?;
        let name = entry.name.clone();
        let declared = entry.parameters.len();

        match entry.kind.clone() {
            ProcKind::Bytecode(def) => {
                // Surplus positionals are for natives; bytecode locals past
                // the parameters start out Null.
                let mut locals = self.pool.rent(def.max_locals as usize);
                for (slot, value) in locals.iter_mut().zip(values.into_iter().take(declared)) {
                    *slot = value;
                }
                trace!(proc = %def.qualified_name(), slots = locals.len(), "frame instantiated");
                Ok(ProcState::Bytecode(Box::new(InterpState::new(
                    proc,
                    def,
                    src,
                    usr,
                    locals,
                    self.config.max_operand_stack,
                ))))
            }
            ProcKind::Native(func) => Ok(ProcState::Native(NativeState::new(
                proc, name, func, src, usr, values,
            ))),
            ProcKind::AsyncNative(factory) => {
                let task = factory(&values);
                Ok(ProcState::Async(AsyncState::new(
                    Some(proc),
                    name,
                    task,
                    src,
                    usr,
                    values,
                )))
            }
        }
    }

    fn allocate_thread_id(&mut self) -> ThreadId {
        let id = ThreadId(self.next_thread_id);
        self.next_thread_id += 1;
        id
    }

    /// Hand a forked state to the owner as a new thread.
    pub(crate) fn spawn(&mut self, state: InterpState, ticks: u64) -> ThreadId {
        let id = self.allocate_thread_id();
        let thread = Thread::new(id, ProcState::Bytecode(Box::new(state)));
        debug!(thread = %id, name = %thread.name(), ticks, "thread spawned");
        self.spawned.push(SpawnedThread { thread, ticks });
        id
    }

    /// Threads spawned since the last call.
    pub fn take_spawned(&mut self) -> Vec<SpawnedThread> {
        std::mem::take(&mut self.spawned)
    }

    pub(crate) fn begin_resume(&mut self) {
        self.steps_left = self.config.max_steps_per_resume;
    }

    /// Spend one instruction of the current resume's budget.
    pub(crate) fn take_step(&mut self) -> bool {
        match &mut self.steps_left {
            None => true,
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
        }
    }
}

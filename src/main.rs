use std::{env, fs, process};

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use dmproc::bytecode::CompiledProgram;
use dmproc::bytecode::disasm::{opcode_counts, print_program};
use dmproc::bytecode::emit::{EmitError, ProgramBuilder};
use dmproc::bytecode::op::{FORMAT_MARKER, FORMAT_STRINGIFY, Opcode};
use dmproc::lang::arguments::ArgumentBundle;
use dmproc::lang::objects::MemoryObjects;
use dmproc::lang::value::{ObjectRef, Value};
use dmproc::runtime::completion::Completion;
use dmproc::runtime::config::VmConfig;
use dmproc::runtime::host::{HostIo, PromptRequest};
use dmproc::runtime::runtime_error::RuntimeError;
use dmproc::runtime::scheduler::ProcScheduler;
use dmproc::runtime::vm::Runtime;

struct Options {
    program: String,
    entry: String,
    disasm: bool,
    stats: bool,
    config: Option<String>,
    max_depth: Option<usize>,
    step_budget: Option<usize>,
    max_ticks: u64,
}

fn main() {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    if let Some(i) = args.iter().position(|a| a == "--write-demo") {
        let Some(path) = args.get(i + 1) else {
            eprintln!("--write-demo needs an output path");
            process::exit(1);
        };
        write_demo(path);
        return;
    }

    let options = parse_options(&args);
    let program = load_program(&options.program);

    if options.disasm {
        print_program(&program);
        return;
    }
    if options.stats {
        print_stats(&program);
        return;
    }

    let config = load_config(&options);
    process::exit(run(program, config, &options));
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn print_usage() {
    println!("dmproc - run compiled DM procs");
    println!();
    println!("Usage:");
    println!("  dmproc <program>                  Run the 'main' proc");
    println!("  dmproc <program> --entry <name>   Run another proc ('name' or '/type/name')");
    println!("  dmproc <program> --disasm         Print the bytecode listing");
    println!("  dmproc <program> --stats          Print opcode counts per proc");
    println!("  dmproc --write-demo <file>        Write a small demo program");
    println!();
    println!("Options:");
    println!("  --config <file>       Load VM limits (postcard-encoded)");
    println!("  --max-depth <n>       Frames per thread");
    println!("  --step-budget <n>     Instructions per resume");
    println!("  --max-ticks <n>       Give up after this many ticks (default 10000)");
    println!("  --help, -h            Show this help");
    println!();
    println!("Logging follows RUST_LOG (default 'info').");
}

fn parse_options(args: &[String]) -> Options {
    let mut options = Options {
        program: String::new(),
        entry: "main".to_string(),
        disasm: false,
        stats: false,
        config: None,
        max_depth: None,
        step_budget: None,
        max_ticks: 10_000,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--disasm" => options.disasm = true,
            "--stats" => options.stats = true,
            "--entry" => options.entry = flag_value(arg, iter.next()),
            "--config" => options.config = Some(flag_value(arg, iter.next())),
            "--max-depth" => options.max_depth = Some(number(arg, iter.next())),
            "--step-budget" => options.step_budget = Some(number(arg, iter.next())),
            "--max-ticks" => options.max_ticks = number(arg, iter.next()),
            flag if flag.starts_with('-') => {
                eprintln!("Unknown option '{}'", flag);
                print_usage();
                process::exit(1);
            }
            path if options.program.is_empty() => options.program = path.to_string(),
            extra => {
                eprintln!("Unexpected argument '{}'", extra);
                process::exit(1);
            }
        }
    }

    if options.program.is_empty() {
        eprintln!("No program file given");
        process::exit(1);
    }
    options
}

fn flag_value(flag: &str, value: Option<&String>) -> String {
    match value {
        Some(v) => v.clone(),
        None => {
            eprintln!("{} needs a value", flag);
            process::exit(1);
        }
    }
}

fn number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> T {
    let text = flag_value(flag, value);
    match text.parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("{} expects a number, got '{}'", flag, text);
            process::exit(1);
        }
    }
}

fn load_program(path: &str) -> CompiledProgram {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path, e);
            process::exit(1);
        }
    };
    match CompiledProgram::from_bytes(&bytes) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("'{}' is not a compiled program: {}", path, e);
            process::exit(1);
        }
    }
}

fn load_config(options: &Options) -> VmConfig {
    let mut config = match &options.config {
        None => VmConfig::default(),
        Some(path) => {
            let parsed = fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| postcard::from_bytes(&bytes).map_err(|e| e.to_string()));
            match parsed {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Failed to load config '{}': {}", path, e);
                    process::exit(1);
                }
            }
        }
    };
    if let Some(depth) = options.max_depth {
        config.max_call_depth = depth;
    }
    if options.step_budget.is_some() {
        config.max_steps_per_resume = options.step_budget;
    }
    config
}

fn print_stats(program: &CompiledProgram) {
    for def in &program.procs {
        println!("{} ({} bytes)", def.qualified_name(), def.bytecode.len());
        for (opcode, count) in opcode_counts(def) {
            println!("  {:<16} {}", opcode.mnemonic(), count);
        }
    }
}

/// Run the entry proc and every thread it spawns. Returns the exit code.
fn run(program: CompiledProgram, config: VmConfig, options: &Options) -> i32 {
    let runtime = match Runtime::new(
        program,
        Box::new(MemoryObjects::new()),
        Box::new(ConsoleHost),
        config,
    ) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Load error: {}", e);
            return 1;
        }
    };
    let mut sched = ProcScheduler::new(runtime);

    let (owner, name) = match options.entry.rsplit_once('/') {
        Some((owner, name)) => (owner, name),
        None => ("", options.entry.as_str()),
    };
    let Some(proc) = sched.runtime().find_proc(owner, name) else {
        eprintln!("No proc named '{}'", options.entry);
        return 1;
    };
    let src = if owner.is_empty() {
        None
    } else {
        match sched.runtime_mut().objects.create_object(owner) {
            Ok(obj) => Some(obj),
            Err(e) => {
                eprintln!("{}", e);
                return 1;
            }
        }
    };

    let entry = match sched.start(proc, src, None, ArgumentBundle::new()) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    info!(entry = %options.entry, "running");

    let mut code = 0;
    let mut ticks = 0;
    sched.run_until_idle();
    loop {
        for (id, result) in sched.take_completed() {
            match result {
                Ok(value) if id == entry => {
                    if !value.is_null() {
                        println!("{}", value);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}", e);
                    if id == entry {
                        code = 1;
                    }
                }
            }
        }

        if sched.thread_count() == 0 {
            break;
        }
        if sched.is_idle() && !sched.has_timers() {
            warn!(threads = sched.thread_count(), "threads are waiting with nothing left to wake them");
            sched.cancel_all();
            code = 1;
            break;
        }
        if ticks >= options.max_ticks {
            warn!(ticks, threads = sched.thread_count(), "tick limit reached");
            sched.cancel_all();
            code = 1;
            break;
        }
        sched.tick();
        ticks += 1;
    }

    info!(ticks = sched.runtime().delays.now(), "done");
    code
}

/// Host for the command line: output goes to stdout and prompts take their
/// default answer.
struct ConsoleHost;

impl HostIo for ConsoleHost {
    fn browse(&mut self, _: &Value, body: &Value, options: &str) -> Result<(), RuntimeError> {
        println!("[browse {}] {}", options, body);
        Ok(())
    }

    fn browse_resource(
        &mut self,
        _: &Value,
        resource: &Value,
        filename: &str,
    ) -> Result<(), RuntimeError> {
        println!("[browse_rsc] {} as {}", resource, filename);
        Ok(())
    }

    fn output_control(&mut self, _: &Value, message: &str, control: &str) -> Result<(), RuntimeError> {
        if control.is_empty() {
            println!("{}", message);
        } else {
            println!("[{}] {}", control, message);
        }
        Ok(())
    }

    fn prompt(&mut self, request: PromptRequest) -> Result<Completion, RuntimeError> {
        println!("[input] {} -> {}", request.message, request.default);
        Ok(Completion::ready(request.default))
    }

    fn locate_coord(&mut self, _: i32, _: i32, _: i32) -> Result<Option<ObjectRef>, RuntimeError> {
        Ok(None)
    }
}

// ─── Demo program ───

fn write_demo(path: &str) {
    let bytes = demo_program()
        .map_err(|e| e.to_string())
        .and_then(|program| program.to_bytes().map_err(|e| e.to_string()));
    let written = bytes.and_then(|bytes| fs::write(path, bytes).map_err(|e| e.to_string()));
    match written {
        Ok(()) => println!("Wrote demo program to {}", path),
        Err(e) => {
            eprintln!("Failed to write '{}': {}", path, e);
            process::exit(1);
        }
    }
}

/// Sums a list, spawns a greeting, sleeps, then reports the total.
fn demo_program() -> Result<CompiledProgram, EmitError> {
    let total_format = format!("total is {}{}", FORMAT_MARKER, FORMAT_STRINGIFY);
    let mut b = ProgramBuilder::new();

    b.proc("", "main", vec![], |e| {
        let top = e.label();
        let done = e.label();
        let resume = e.label();

        // total = 0; for (item in list(1, 2, 3)) total += item
        e.push_int(0).set_local(0);
        e.push_int(1).push_int(2).push_int(3);
        e.op(Opcode::CreateList).int(3);
        e.op(Opcode::CreateListEnumerator);
        e.mark(top);
        e.op(Opcode::Enumerate).slot(1).jump(done);
        e.op(Opcode::PushLocalRef).slot(0);
        e.push_local(1).op(Opcode::Append).op(Opcode::Pop);
        e.jump_to(Opcode::Jump, top);
        e.mark(done);
        e.op(Opcode::DestroyEnumerator);

        // spawn(5) world << "hello from a spawned thread"
        e.push_int(5);
        e.jump_to(Opcode::Spawn, resume);
        e.op(Opcode::PushNull)
            .push_string("hello from a spawned thread")
            .push_string("");
        e.op(Opcode::OutputControl);
        e.op(Opcode::PushNull).op(Opcode::Return);
        e.mark(resume);

        // sleep(10); world << "total is [total]"
        e.push_int(10).op(Opcode::Sleep);
        e.op(Opcode::PushNull).push_local(0);
        e.op(Opcode::FormatString).str(&total_format).int(1);
        e.push_string("").op(Opcode::OutputControl);
        e.push_local(0).op(Opcode::Return);
    })?;

    Ok(b.finish())
}

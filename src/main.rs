mod catalogue;
mod constants;
mod device;
mod error;
mod hotkey;
mod input;
mod lang;
mod mapmanager;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use hotkey::binding::{self, Callback, HotkeyBinding};
use hotkey::condition::ConditionEngine;
use hotkey::conditional::ConditionalLayer;
use hotkey::registry::Registry;
use input::Engine;
use lang::builtins::BuiltinContext;
use lang::vm::Interpreter;
use mapmanager::MapManager;

/// Havel: a scripted desktop input-automation daemon. Binds hotkeys,
/// remaps and synthesizes input events, and evaluates `.hv` scripts
/// against a stack bytecode VM.
#[derive(Parser)]
#[command(name = "havel")]
#[command(version)]
#[command(about = "Havel input-automation daemon", long_about = None)]
struct Cli {
    /// Path to a Havel (`.hv`) script to load
    script: PathBuf,

    /// Enable debug-level logging
    #[arg(long)]
    verbose: bool,

    /// Run the interpreter directly instead of compiling to bytecode first
    #[arg(long, conflicts_with = "bytecode")]
    interpret: bool,

    /// Compile to bytecode before running (the default)
    #[arg(long)]
    bytecode: bool,

    /// Don't grab any evdev device exclusively; observe events only
    #[arg(long)]
    no_grab: bool,

    /// Parse and compile the script, then exit without starting the daemon
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    // `--interpret` vs `--bytecode` select the *execution engine's* source
    // of truth for documentation purposes only (spec.md §6 "CLI surface")
    // — the language has one compiled representation; both run the same
    // chunk through the VM. The flags are kept distinct from each other so
    // scripts and operators can record their intent either way.
    let _ = cli.interpret;

    match run(&cli) {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("{err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.downcast_ref::<error::ScriptLoadError>().is_some()) {
        1
    } else {
        2
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!(script = %cli.script.display(), "loading script");
    let chunk = lang::load_script(&cli.script).context("failed to load script")?;

    if cli.dry_run {
        info!(
            functions = chunk.functions.len(),
            hotkeys = chunk.hotkey_bindings.len(),
            "dry run: script parsed and compiled successfully"
        );
        return Ok(());
    }

    let devices = device::enumerate().context("failed to enumerate input devices")?;
    if devices.is_empty() {
        anyhow::bail!("no input devices found");
    }

    let registry = Arc::new(Registry::new());
    let conditions = Arc::new(ConditionEngine::new());
    let engine = Engine::new(Arc::clone(&registry));

    let mut device_paths = device::paths_for_kind(&devices, device::DeviceKind::Keyboard);
    device_paths.extend(device::paths_for_kind(&devices, device::DeviceKind::Mouse));
    device_paths.extend(device::paths_for_kind(&devices, device::DeviceKind::Gamepad));
    device_paths.extend(device::paths_for_kind(&devices, device::DeviceKind::Joystick));

    engine.start(device_paths, !cli.no_grab).context("failed to start input engine")?;

    let conditional = ConditionalLayer::new(Arc::clone(&registry), Arc::clone(&conditions));
    conditional.start();

    let profile_path = dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("havel")
        .join("profiles.json");
    let map_manager = MapManager::new(Arc::clone(&engine), Arc::clone(&registry), Arc::clone(&conditions), Arc::clone(&conditional), profile_path);
    map_manager.load().context("failed to load persisted profiles")?;

    let ctx = Arc::new(BuiltinContext::new(Arc::clone(&engine)));
    let interpreter = Interpreter::new(chunk, ctx.clone());
    ctx.bind_interpreter(&interpreter);

    conditions.register_string_property("mode", {
        let interpreter = Arc::clone(&interpreter);
        move || interpreter.current_mode()
    });

    register_hotkey_bindings(&interpreter, &registry)?;

    interpreter.run_main().context("script's top-level code faulted")?;

    info!("havel running, press the emergency key or send SIGINT to stop");
    wait_for_shutdown_signal()?;

    info!("shutting down");
    conditional.stop();
    map_manager.shutdown();
    engine.stop();

    Ok(())
}

/// Translate each compiled `(hotkey string, body function)` pair from the
/// chunk into a registered `HotkeyBinding`, whose callback re-enters the
/// interpreter on the registry's dispatch thread (spec.md §3 "Hotkey
/// Binding", §5 "Concurrency model").
fn register_hotkey_bindings(interpreter: &Arc<Interpreter>, registry: &Arc<Registry>) -> Result<()> {
    for (hotkey_str, function_name) in interpreter.chunk().hotkey_bindings.clone() {
        let parsed = hotkey::parser::parse(&hotkey_str).with_context(|| format!("invalid hotkey `{hotkey_str}`"))?;

        let callback: Callback = {
            let interpreter = Arc::clone(interpreter);
            let function_name = function_name.clone();
            Box::new(move || {
                if let Err(fault) = interpreter.call_function(&function_name, Vec::new()) {
                    warn!(hotkey = %function_name, error = %fault, "hotkey callback faulted");
                }
            })
        };

        let binding = HotkeyBinding {
            id: binding::next_user_id(),
            source: hotkey_str.clone(),
            trigger: parsed.trigger,
            modifiers: parsed.modifiers,
            event_filter: parsed.event_filter,
            flags: parsed.flags,
            repeat_interval_ms: parsed.repeat_interval_ms,
            callback,
            condition: None,
            enabled: true,
            grabbed: false,
            last_trigger: None,
            last_condition_result: None,
        };

        registry.register(binding);
    }
    Ok(())
}

fn wait_for_shutdown_signal() -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("failed to build tokio runtime")?;
    rt.block_on(async {
        tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
        Ok(())
    })
}

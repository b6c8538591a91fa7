use std::process;

use clap::{Parser, Subcommand};
use xpcscope_core::config::ScopeConfig;
use xpcscope_core::hooks::HookPlan;
use xpcscope_core::message::TypeRegistry;
use xpcscope_core::platform;
use xpcscope_core::symbols::NamingPolicy;
use xpcscope_core::{ScopeError, ScopeResult};
use xpcscope_utils::{LogFormat, LogLevel, info, init_logging, init_logging_with_level};

/// Inspect the XPC hook surface of the running system.
#[derive(Parser, Debug)]
#[command(name = "xpcscope")]
#[command(version)]
#[command(about = "Resolve private XPC symbols, plan capture hooks and dump message value types", long_about = None)]
struct Cli
{
    /// Symbol naming policy (`underscore` or `verbatim`); overrides XPCSCOPE_SYMBOL_NAMING
    #[arg(long, global = true)]
    naming: Option<NamingPolicy>,

    /// Log level; overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (`pretty` or `json`)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Resolve one symbol exactly
    Resolve
    {
        /// Module install-name leaf (e.g. libxpc.dylib)
        module: String,
        /// C-level symbol name
        symbol: String,
    },
    /// Resolve every symbol matching a shell glob
    Glob
    {
        /// Module install-name leaf (e.g. Foundation)
        module: String,
        /// Glob over C-level names (`*`, `?`, `[...]`)
        pattern: String,
    },
    /// Resolve the capture hook points and report failures
    Hooks
    {
        /// Exit with an error if any hook fails to resolve
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Dump the message value type table of the loaded runtime
    Types,
    /// Show the effective configuration
    Config,
}

fn main()
{
    let cli = Cli::parse();

    let logging = match cli.log_level {
        Some(level) => init_logging_with_level(level, cli.log_format),
        None => init_logging(),
    };
    let _guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let mut config = ScopeConfig::from_env();
    if let Some(naming) = cli.naming {
        config.naming = naming;
    }

    if let Err(e) = run_command(cli.command, &config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(command: Commands, config: &ScopeConfig) -> ScopeResult<()>
{
    match command {
        Commands::Resolve { module, symbol } => {
            let resolver = platform::default_resolver(config);
            let resolved = resolver.find_exact(&module, &symbol)?;
            println!("{resolved}");
            Ok(())
        }
        Commands::Glob { module, pattern } => {
            let resolver = platform::default_resolver(config);
            let matches = resolver.find_glob(&module, &pattern)?;
            if matches.is_empty() {
                eprintln!("No symbols in {module} match {pattern}");
            }
            for symbol in matches {
                println!("{symbol}");
            }
            Ok(())
        }
        Commands::Hooks { strict } => {
            let resolver = platform::default_resolver(config);
            let plan = HookPlan::resolve(&resolver, config);
            print!("{plan}");
            info!(points = plan.points().len(), failures = plan.failures().len(), "hook plan");
            if strict && !plan.is_complete() {
                return Err(ScopeError::Setup(format!(
                    "{} hook(s) could not be resolved",
                    plan.failures().len()
                )));
            }
            Ok(())
        }
        Commands::Types => {
            let registry = load_types(config)?;
            println!("{} registered types (prefix {})", registry.len(), config.type_prefix);
            print!("{registry}");
            Ok(())
        }
        Commands::Config => {
            println!("Configuration:");
            println!("  Symbol naming: {}", config.naming);
            println!("  Backtraces: {}", config.capture_backtraces);
            println!("  Type prefix: {}", config.type_prefix);
            println!("  Messaging module: {}", config.messaging_module);
            println!("  Proxy module: {}", config.proxy_module);
            Ok(())
        }
    }
}

#[cfg(target_os = "macos")]
fn load_types(config: &ScopeConfig) -> ScopeResult<TypeRegistry>
{
    let runtime = xpcscope_core::platform::macos::XpcRuntime::new()?;
    TypeRegistry::from_runtime(&runtime, &config.type_prefix)
}

#[cfg(not(target_os = "macos"))]
fn load_types(_config: &ScopeConfig) -> ScopeResult<TypeRegistry>
{
    Err(ScopeError::Setup("no XPC runtime on this platform".to_string()))
}

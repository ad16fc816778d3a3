//! Mica compiler CLI
//!
//! Compiles `.mica` sources through the front-end pipeline, with switches
//! to stop after any stage and dump its output. With no input files an
//! interactive prompt reads one expression per line.

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use micac::ast::{expr_tree_string, program_tree_string};
use micac::config::CompilerConfig;
use micac::diag::Diagnostics;
use micac::{c_emitter, dot, ir, lexer, Parser, Resolver, TypeChecker};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;

#[derive(ClapParser)]
#[command(name = "micac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mica compiler - front-end pipeline and bytecode VM", long_about = None)]
struct Cli {
    /// Input .mica source files. With none, an expression prompt starts.
    files: Vec<PathBuf>,

    /// Output file name (used by --c-output)
    #[arg(short, long, value_name = "NAME")]
    output: Option<PathBuf>,

    /// Write output to stdout instead of a file
    #[arg(long)]
    stdout: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// TOML configuration file (output name, VM sizing)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the token stream
    #[arg(long)]
    dump_lexer_output: bool,

    /// Interpret the input as a single expression
    #[arg(long)]
    parse_expr: bool,

    /// Stop after lexing
    #[arg(long)]
    lexer_only: bool,

    /// Stop after parsing
    #[arg(long)]
    parse_only: bool,

    /// Print the AST
    #[arg(long)]
    ast: bool,

    /// Run the partial C transpiler
    #[arg(long)]
    c_output: bool,

    /// Write a Graphviz file for the prompt expression tree, then exit
    #[arg(long, value_name = "NAME")]
    generate_dot_file: Option<PathBuf>,

    /// Run the bytecode self-tests
    #[arg(long)]
    test_bytecode: bool,

    /// Run the type-checker self-tests
    #[arg(long)]
    test_typecheck: bool,

    /// Resolve names, then dump the environments
    #[arg(long)]
    test_name_resolution: bool,

    /// Generate shell completion scripts
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "micac", &mut io::stdout());
        return;
    }

    let config = match &cli.config {
        Some(path) => match CompilerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };

    if cli.test_bytecode {
        if let Err(e) =
            mica_vm::run_self_tests_with_limits(config.vm.stack_size, config.vm.memory_size)
        {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        return;
    }

    if cli.test_typecheck {
        if let Err(e) = micac::run_typecheck_self_tests() {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        return;
    }

    if cli.files.is_empty() {
        run_prompt(&cli);
        return;
    }

    let mut open_failure = false;
    for path in &cli.files {
        debug!(file = %path.display(), "processing file");
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Couldn't open file {}: {}", path.display(), e);
                open_failure = true;
                continue;
            }
        };
        compile(&source, &cli, &config);
    }

    if open_failure {
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Run the pipeline on one source, honoring the stage-stopping switches.
/// Compilation diagnostics are reported but do not change the exit code.
fn compile(source: &str, cli: &Cli, config: &CompilerConfig) {
    let mut diags = Diagnostics::new();

    let (tokens, lex_error) = lexer::lex(source, &mut diags);

    if cli.dump_lexer_output {
        println!("Collected {} tokens", tokens.len());
        for token in &tokens {
            println!("{}", token);
        }
    }

    if lex_error || cli.lexer_only {
        return;
    }

    if cli.parse_expr {
        let mut parser = Parser::new(tokens);
        if let Some(expr) = parser.parse_expression(&mut diags) {
            print!("{}", expr_tree_string(&expr));
            if let Some(path) = &cli.generate_dot_file {
                if let Err(e) = dot::expression_tree_to_dot(&expr, path) {
                    eprintln!("Failed to generate dot file: {}", e);
                }
            }
        }
        return;
    }

    let mut parser = Parser::new(tokens);
    let (mut program, parse_error) = parser.parse(&mut diags);
    if parse_error {
        return;
    }

    if cli.ast {
        print!("{}", program_tree_string(&program, "program"));
    }
    if cli.parse_only {
        return;
    }

    let (environments, resolve_ok) = Resolver::new().resolve(&mut program, &mut diags);

    if cli.test_name_resolution {
        print!("{}", environments.dump_string());
        return;
    }
    if !resolve_ok {
        return;
    }

    let mut checker = TypeChecker::new(&environments);
    if !checker.check_program(&program, &mut diags) {
        return;
    }

    if cli.c_output {
        emit_c(&program, cli, config);
        return;
    }

    // Lower to IR; the bytecode emitter will consume this.
    let instructions = ir::translate(&program);
    debug!(instructions = instructions.len(), "translated to IR");
    debug!("\n{}", ir::ir_string(&instructions));
}

fn emit_c(program: &[micac::Stmt], cli: &Cli, config: &CompilerConfig) {
    if cli.stdout {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = c_emitter::output_c_code(program, &mut handle) {
            eprintln!("Couldn't write C output: {}", e);
        }
        return;
    }

    let output_name: PathBuf = cli
        .output
        .clone()
        .or_else(|| config.output.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("output"));

    let mut file = match std::fs::File::create(&output_name) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Couldn't open file {} for writing: {}",
                output_name.display(),
                e
            );
            process::exit(1);
        }
    };

    if let Err(e) = c_emitter::output_c_code(program, &mut file) {
        eprintln!("Couldn't write C output: {}", e);
    }
    let _ = file.flush();
}

/// Interactive mode: one expression per line; `q` or `quit` exits.
fn run_prompt(cli: &Cli) {
    println!("No input files provided");

    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Couldn't start the prompt: {}", e);
            process::exit(1);
        }
    };

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(
                rustyline::error::ReadlineError::Interrupted
                | rustyline::error::ReadlineError::Eof,
            ) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        };

        let input = line.trim();
        if input == "q" || input == "quit" {
            break;
        }
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        prompt_iteration(input, cli.generate_dot_file.as_deref(), cli.dump_lexer_output);

        // Dot file mode produces one file then exits.
        if cli.generate_dot_file.is_some() {
            return;
        }
    }

    println!("\nBye");
}

fn prompt_iteration(input: &str, dot_file: Option<&Path>, dump_tokens: bool) {
    let mut diags = Diagnostics::new();

    let (tokens, lex_error) = lexer::lex(input, &mut diags);
    if dump_tokens {
        for token in &tokens {
            println!("{}", token);
        }
    }
    if lex_error {
        return;
    }

    let mut parser = Parser::new(tokens);
    let Some(expr) = parser.parse_expression(&mut diags) else {
        return;
    };

    print!("{}", expr_tree_string(&expr));

    if let Some(path) = dot_file {
        if let Err(e) = dot::expression_tree_to_dot(&expr, path) {
            eprintln!("Failed to generate dot file: {}", e);
        }
    }
}

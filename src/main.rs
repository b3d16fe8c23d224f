use minishell::Interpreter;
use tracing_subscriber::EnvFilter;

fn main() {
    // Trace output goes to stderr so it never mixes with command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut shell = Interpreter::default();
    if let Err(err) = shell.repl() {
        eprintln!("minishell: {err}");
        std::process::exit(1);
    }
}

use crate::command::{CommandFactory, ExitCode};
use crate::external::ExternalCommand;
use crate::parser::{self, Stage};
use crate::session::Session;
use anyhow::{Context, Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Cursor, Write};

/// Factory allows creating instances of a concrete builtin by name.
///
/// The generic parameter selects which [`crate::builtin`] command the factory
/// recognizes; see the `CommandFactory` impl in that module.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The interactive command interpreter.
///
/// Owns the [`Session`] state and an ordered list of [`CommandFactory`]
/// objects consulted for every pipeline stage; a stage no factory recognizes
/// is launched as an external process. One line is fully processed, including
/// any external process run to completion, before the next line is read.
pub struct Interpreter {
    session: Session,
    builtins: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create an interpreter with a custom session and set of factories.
    pub fn new(session: Session, builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { session, builtins }
    }

    /// The interactive read-eval loop.
    ///
    /// Prints a `minishell:<cwd>$` prompt, reads one line, executes it and
    /// prints the result, until the literal line `quit` (clean exit) or the
    /// input stream closes (error, surfaced to the caller). Ctrl-C at the
    /// prompt just redraws it.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            let prompt = format!("minishell:{}$", self.session.current_dir.display());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    if line == "quit" {
                        self.session.should_exit = true;
                        return Ok(());
                    }

                    let mut stdout = io::stdout();
                    self.execute_line(&line, &mut stdout)?;
                    stdout.flush().ok();

                    if self.session.should_exit {
                        return Ok(());
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Err(anyhow!("input stream closed")),
                Err(err) => return Err(err).context("reading input"),
            }
        }
    }

    /// Execute one raw input line, writing the final stage's output (or the
    /// error text substituted for it) to `out`.
    ///
    /// Stages run strictly left to right, one at a time; each stage's
    /// captured output is fed to the next stage's standard input. The first
    /// failing stage aborts the pipeline and its error line becomes the
    /// line's only output, so nothing a prior stage produced leaks through.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<ExitCode> {
        let pipeline = parser::parse_line(line);
        tracing::debug!(stages = pipeline.len(), "parsed line");

        let last = pipeline.len() - 1;
        let mut carried: Option<Vec<u8>> = None;
        let mut code = 0;

        for (i, stage) in pipeline.stages.iter().enumerate() {
            match self.run_stage(stage, carried.take(), i == last) {
                Ok((output, stage_code)) => {
                    carried = output;
                    code = stage_code;
                    // A failing builtin already captured its message; stop
                    // here so it is the line's only output.
                    if stage_code != 0 {
                        break;
                    }
                }
                Err(e) => {
                    carried = Some(format!("{e}\n").into_bytes());
                    code = 1;
                    break;
                }
            }
        }

        if let Some(buf) = carried {
            out.write_all(&buf).context("writing command output")?;
        }
        Ok(code)
    }

    /// Run one stage: builtins first, then the external fallback.
    ///
    /// Returns the stage's captured output, or `None` when a final external
    /// stage wrote straight to the inherited streams.
    fn run_stage(
        &mut self,
        stage: &Stage,
        input: Option<Vec<u8>>,
        is_final: bool,
    ) -> Result<(Option<Vec<u8>>, ExitCode)> {
        if stage.is_empty() {
            return Ok((Some(Vec::new()), 0));
        }
        tracing::debug!(name = %stage.name, is_final, "dispatching stage");

        let args: Vec<&str> = stage.args.iter().map(String::as_str).collect();
        for factory in &self.builtins {
            if let Some(cmd) = factory.try_create(&self.session, &stage.name, &args) {
                let mut captured = Vec::new();
                let code = match input {
                    Some(buf) => {
                        cmd.execute(&mut Cursor::new(buf), &mut captured, &mut self.session)?
                    }
                    None => cmd.execute(&mut io::stdin(), &mut captured, &mut self.session)?,
                };
                return Ok((Some(captured), code));
            }
        }

        match ExternalCommand::resolve(&self.session, &stage.name, &stage.args) {
            Some(cmd) => {
                let output = cmd.run(&self.session, input, !is_final)?;
                Ok((output, 0))
            }
            None => Err(anyhow!("command not found: {}", stage.name)),
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the full builtin set: `cd`, `pwd`, `echo`,
    /// `kill`, `ps` and `netcat`. External commands are the fallback.
    fn default() -> Self {
        Self::new(Session::new(), default_builtins())
    }
}

fn default_builtins() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::*;
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Kill>::default()),
        Box::new(Factory::<Ps>::default()),
        Box::new(Factory::<Netcat>::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FakeWorkdir;
    use std::path::PathBuf;

    fn interpreter_at(dir: &str) -> Interpreter {
        let session = Session::with_workdir(Box::new(FakeWorkdir {
            dir: PathBuf::from(dir),
        }));
        Interpreter::new(session, default_builtins())
    }

    fn run_line(interp: &mut Interpreter, line: &str) -> (String, ExitCode) {
        let mut out = Vec::new();
        let code = interp.execute_line(line, &mut out).unwrap();
        (String::from_utf8(out).unwrap(), code)
    }

    #[test]
    fn echo_concatenates_arguments() {
        let mut interp = interpreter_at("/work");
        let (out, code) = run_line(&mut interp, "echo a b c");
        assert_eq!(out, "abc\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn pwd_after_cd_reports_new_directory() {
        let mut interp = interpreter_at("/work");
        let (_, code) = run_line(&mut interp, "cd /elsewhere");
        assert_eq!(code, 0);
        let (out, _) = run_line(&mut interp, "pwd");
        assert_eq!(out, "/elsewhere\n");
    }

    #[test]
    fn blank_line_produces_no_output() {
        let mut interp = interpreter_at("/work");
        let (out, code) = run_line(&mut interp, "");
        assert_eq!(out, "");
        assert_eq!(code, 0);
    }

    #[test]
    fn trailing_pipe_discards_earlier_output() {
        // The final (empty) stage is the one whose output is emitted.
        let mut interp = interpreter_at("/work");
        let (out, code) = run_line(&mut interp, "echo hi |");
        assert_eq!(out, "");
        assert_eq!(code, 0);
    }

    #[test]
    fn unknown_final_stage_error_is_the_only_output() {
        let mut interp = interpreter_at("/work");
        let (out, code) = run_line(&mut interp, "echo hi | definitely_not_a_command_xyz");
        assert_eq!(out, "command not found: definitely_not_a_command_xyz\n");
        assert_eq!(code, 1);
    }

    #[test]
    fn unknown_single_command_is_reported() {
        let mut interp = interpreter_at("/work");
        let (out, code) = run_line(&mut interp, "definitely_not_a_command_xyz");
        assert_eq!(out, "command not found: definitely_not_a_command_xyz\n");
        assert_eq!(code, 1);
    }

    #[test]
    #[cfg(unix)]
    fn builtin_output_is_piped_into_external_stage() {
        // External stages spawn with the session cwd, so it must exist.
        let mut interp = interpreter_at("/");
        let (out, code) = run_line(&mut interp, "echo hello | cat");
        assert_eq!(out, "hello\n");
        assert_eq!(code, 0);
    }

    #[test]
    #[cfg(unix)]
    fn external_output_is_piped_into_external_stage() {
        let mut interp = interpreter_at("/");
        let (out, code) = run_line(&mut interp, "printf a-b-c | tr - .");
        assert_eq!(out, "a.b.c");
        assert_eq!(code, 0);
    }

    #[test]
    fn failing_builtin_stage_aborts_the_pipeline() {
        let mut interp = interpreter_at("/work");
        let (out, code) = run_line(&mut interp, "cd a b | echo ok");
        assert_eq!(out, "cd: too mane arguments\n");
        assert_eq!(code, 1);
    }

    #[test]
    #[cfg(unix)]
    fn failing_middle_stage_aborts_the_pipeline() {
        let mut interp = interpreter_at("/");
        let (out, code) = run_line(&mut interp, "echo hi | false | cat");
        assert_eq!(out, "exit status 1\n");
        assert_eq!(code, 1);
    }
}

mod meta_cmd;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rustyline::{
    error::ReadlineError,
    history::DefaultHistory,
    validate::{MatchingBracketValidator, ValidationContext, ValidationResult, Validator},
    Config, Editor,
};
use rustyline_derive::{Completer, Helper, Highlighter, Hinter};
use std::{collections::HashMap, fs::read_to_string};
use tracing::info;

use crate::{
    config::Settings,
    console::Console,
    error::ApplError,
    eval::Interpreter,
};

use super::{config::CliSettings, paths::repl_history};

use meta_cmd::MetaCmd;

#[derive(Completer, Helper, Highlighter, Hinter)]
struct InputValidator {
    brackets: MatchingBracketValidator,
}

impl Validator for InputValidator {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        self.brackets.validate(ctx)
    }
}

pub(crate) struct Repl {
    interp: Interpreter,
    pwd_path: Utf8PathBuf,
    meta: HashMap<&'static str, MetaCmd>,
    /// Lines of a ∇ definition being entered
    defn: Option<Vec<String>>,
    running: bool,
}

impl Repl {
    pub(crate) fn new(settings: Settings, console: Box<dyn Console>) -> Result<Repl> {
        info!(
            "Launching REPL with ⎕IO {} and SI depth {}",
            settings.index_origin, settings.max_depth
        );
        let current_dir = std::env::current_dir().context("capturing current directory")?;
        let pwd_path = Utf8PathBuf::from_path_buf(current_dir)
            .map_err(|p| anyhow::anyhow!("path contains invalid Unicode: {}", p.display()))?;
        Ok(Repl {
            interp: Interpreter::new(settings, console),
            pwd_path,
            meta: MetaCmd::cmds(),
            defn: None,
            running: true,
        })
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    /// Prints an APL error with its diagnostic lines.
    fn report(&mut self, e: &ApplError) {
        for line in e.to_string().lines() {
            self.interp.print(line);
        }
    }

    fn handle_meta(&mut self, line: &str) -> Result<()> {
        let mut words = line.trim_start_matches(')').split_whitespace();
        let Some(name) = words.next() else {
            anyhow::bail!("missing command name")
        };
        let name = name.to_uppercase();
        let args: Vec<&str> = words.collect();
        match self.meta.get(name.as_str()) {
            Some(cmd) => {
                let run = cmd.run;
                run(self, &args).with_context(|| format!("){name} failed"))
            }
            None => anyhow::bail!("Unsupported command: ){name}"),
        }
    }

    fn handle_defn_line(&mut self, line: &str) {
        let Some(lines) = self.defn.as_mut() else {
            return;
        };
        lines.push(line.to_string());
        // A lone `∇` opens a definition on its first line and closes it later
        let closing = line.trim_end().ends_with('∇') && !(lines.len() == 1 && line.trim() == "∇");
        if closing {
            let text = self.defn.take().unwrap_or_default().join("\n");
            if let Err(e) = self.interp.define_function(&text) {
                self.report(&e);
            }
        }
    }

    /// Handles one input line: a `)` command, a line of a ∇ definition or
    /// statements for immediate execution.
    pub(crate) fn handle_line(&mut self, line: &str) -> Result<()> {
        if self.defn.is_some() {
            self.handle_defn_line(line);
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.starts_with(')') {
            return self.handle_meta(trimmed);
        }
        if trimmed.starts_with('∇') {
            self.defn = Some(vec![]);
            self.handle_defn_line(trimmed);
            return Ok(());
        }
        if let Err(e) = self.interp.execute_line(line) {
            self.report(&e);
        }
        Ok(())
    }

    pub(crate) fn load_file(&mut self, file_path: &Utf8Path) -> Result<()> {
        let input = read_to_string(file_path).with_context(|| format!("reading {file_path}"))?;
        info!("Loading {file_path}");
        for line in input.lines() {
            if !self.running {
                break;
            }
            self.handle_line(line)?;
        }
        if let Some(lines) = self.defn.take() {
            anyhow::bail!("{file_path}: unterminated definition of {} lines", lines.len());
        }
        Ok(())
    }

    pub(crate) fn start(&mut self, cli: &CliSettings) -> Result<()> {
        println!("APL engine, )HELP for commands, )OFF to leave.");

        let mut editor: Editor<InputValidator, DefaultHistory> = Editor::with_config(
            Config::builder()
                .color_mode(rustyline::ColorMode::Enabled)
                .auto_add_history(true)
                .build(),
        )?;

        editor.set_helper(Some(InputValidator {
            brackets: MatchingBracketValidator::new(),
        }));

        let history_path = &repl_history();

        if cli.history && history_path.exists() {
            editor.load_history(history_path)?;
        }

        while self.running {
            let prompt = if self.defn.is_some() { "∇ " } else { cli.prompt.as_str() };
            match editor.readline(prompt) {
                Ok(line) => {
                    if cli.history {
                        editor.save_history(history_path)?;
                    }
                    if let Err(e) = self.handle_line(&line) {
                        eprintln!("Error: {e:#}");
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    println!("Exiting...");
                    break;
                }
                Err(e) => {
                    eprintln!("Read line error: {e}");
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::console::ScriptedConsole;

    fn repl() -> (Repl, Rc<RefCell<Vec<String>>>) {
        let (console, output) = ScriptedConsole::new(Vec::<String>::new());
        let repl = Repl::new(Settings::default(), Box::new(console)).unwrap();
        (repl, output)
    }

    fn run(repl: &mut Repl, lines: &[&str]) {
        for line in lines {
            repl.handle_line(line).unwrap();
        }
    }

    #[test]
    fn definitions_span_lines() {
        let (mut repl, output) = repl();
        run(&mut repl, &["∇Z←DOUBLE X", "Z←X+X", "∇", "DOUBLE 21"]);
        assert_eq!(output.borrow().as_slice(), ["42"]);
        run(&mut repl, &[")FNS"]);
        assert_eq!(output.borrow().last().map(String::as_str), Some("DOUBLE"));
    }

    #[test]
    fn commands() {
        let (mut repl, output) = repl();
        run(&mut repl, &["A←1 2 3", "B←'x'", ")VARS", ")ERASE A Q", ")VARS"]);
        assert_eq!(
            output.borrow().as_slice(),
            ["A B", "not found: Q", "B"]
        );
        assert!(repl.handle_line(")NOPE").is_err());
        run(&mut repl, &[")off"]);
        assert!(!repl.is_running());
    }

    #[test]
    fn errors_then_si_and_retry() {
        let (mut repl, output) = repl();
        run(&mut repl, &["∇Z←F X", "Z←X+Y", "∇", "F 1"]);
        assert_eq!(output.borrow()[0], "VALUE ERROR+");
        output.borrow_mut().clear();
        run(&mut repl, &[")SI"]);
        assert_eq!(output.borrow().as_slice(), ["VALUE ERROR", "F[1]", "⋆"]);
        output.borrow_mut().clear();
        run(&mut repl, &["Y←10", ")RETRY"]);
        assert_eq!(output.borrow().as_slice(), ["11"]);
    }
}

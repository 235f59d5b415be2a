//! Line-oriented terminal I/O used by printing and by `⎕`/`⍞` input.
use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, BufRead, Write},
    rc::Rc,
};

pub trait Console {
    /// Prints one output line.
    fn print(&mut self, line: &str);

    /// Reads one input line after showing `prompt`; `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Standard output and standard input.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn print(&mut self, line: &str) {
        println!("{line}");
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        }
    }
}

/// Canned input and captured output.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<String>,
    output: Rc<RefCell<Vec<String>>>,
}

impl ScriptedConsole {
    /// A console fed with `input`, and a handle on everything it prints.
    pub fn new<I, S>(input: I) -> (Self, Rc<RefCell<Vec<String>>>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let console = Self {
            input: input.into_iter().map(Into::into).collect(),
            output: Rc::default(),
        };
        let output = console.output.clone();
        (console, output)
    }
}

impl Console for ScriptedConsole {
    fn print(&mut self, line: &str) {
        self.output.borrow_mut().push(line.to_string());
    }

    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.input.pop_front()
    }
}

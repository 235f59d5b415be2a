use anyhow::{bail, Result};
use camino::Utf8Path;
use itertools::Itertools;

use super::Repl;

pub(super) struct MetaCmd {
    name: &'static str,
    summary: &'static str,
    format: &'static str,
    description: &'static [&'static str],
    example: &'static [&'static str],
    pub(super) run: fn(repl: &mut Repl, args: &[&str]) -> Result<()>,
}

impl MetaCmd {
    const LOAD: MetaCmd = MetaCmd {
        name: "LOAD",
        summary: "Load statements and ∇ definitions from a file path.",
        format: ")LOAD <path>",
        description: &["Relative paths are resolved from the current directory."],
        example: &[")LOAD lib.apl"],
        run: |repl, args| {
            let [path] = args else {
                bail!("`LOAD` expects exactly one path")
            };
            let joined = repl.pwd_path.join(Utf8Path::new(path));
            repl.load_file(&joined)
        },
    };

    const SI: MetaCmd = MetaCmd {
        name: "SI",
        summary: "Show the state indicator.",
        format: ")SI",
        description: &[
            "Lists the active contexts, then the error and the contexts",
            "that were active when the last statement failed.",
        ],
        example: &[],
        run: |repl, _| {
            for line in repl.interp.si_report() {
                repl.interp.print(&line);
            }
            Ok(())
        },
    };

    const FNS: MetaCmd = MetaCmd {
        name: "FNS",
        summary: "List the defined functions and operators.",
        format: ")FNS",
        description: &[],
        example: &[],
        run: |repl, _| {
            let names = repl.interp.symbols().function_names().join(" ");
            repl.interp.print(&names);
            Ok(())
        },
    };

    const VARS: MetaCmd = MetaCmd {
        name: "VARS",
        summary: "List the variables.",
        format: ")VARS",
        description: &[],
        example: &[],
        run: |repl, _| {
            let names = repl.interp.symbols().variable_names().join(" ");
            repl.interp.print(&names);
            Ok(())
        },
    };

    const ERASE: MetaCmd = MetaCmd {
        name: "ERASE",
        summary: "Remove names from the workspace.",
        format: ")ERASE <name>...",
        description: &[],
        example: &[")ERASE A B FOO"],
        run: |repl, args| {
            if args.is_empty() {
                bail!("`ERASE` expects at least one name")
            }
            let missing = args
                .iter()
                .filter(|name| !repl.interp.erase(name))
                .join(" ");
            if !missing.is_empty() {
                repl.interp.print(&format!("not found: {missing}"));
            }
            Ok(())
        },
    };

    const RETRY: MetaCmd = MetaCmd {
        name: "RETRY",
        summary: "Run the last failed function call or statement again.",
        format: ")RETRY",
        description: &[
            "A failed user function is called again with the arguments it had.",
            "A failed immediate statement starts over from its beginning.",
        ],
        example: &[],
        run: |repl, _| {
            if let Err(e) = repl.interp.retry_last() {
                repl.report(&e);
            }
            Ok(())
        },
    };

    const RESET: MetaCmd = MetaCmd {
        name: "RESET",
        summary: "Forget the last failure.",
        format: ")RESET",
        description: &[],
        example: &[],
        run: |repl, _| {
            repl.interp.reset();
            Ok(())
        },
    };

    const CHECK: MetaCmd = MetaCmd {
        name: "CHECK",
        summary: "Sweep stale values and report the value registry.",
        format: ")CHECK",
        description: &[
            "Stale values are the ones nothing refers to any more.",
            "Incomplete values are finalized before they are dropped.",
        ],
        example: &[],
        run: |repl, _| {
            let report = repl.interp.sweep();
            let reachable = repl.interp.reachable_values().len();
            repl.interp.print(&format!(
                "swept {}, finalized {}, live {}, reachable {}",
                report.swept, report.finalized, report.live, reachable
            ));
            Ok(())
        },
    };

    const OFF: MetaCmd = MetaCmd {
        name: "OFF",
        summary: "Leave the interpreter.",
        format: ")OFF",
        description: &[],
        example: &[],
        run: |repl, _| {
            repl.running = false;
            Ok(())
        },
    };

    const HELP: MetaCmd = MetaCmd {
        name: "HELP",
        summary: "Print help message.",
        format: ")HELP [<command>]",
        description: &[
            "Without arguments it prints a summary of all available commands.",
            "Otherwise the full help for the command in the first argument is printed.",
        ],
        example: &[")HELP", ")HELP RETRY"],
        run: |repl, args| {
            match args {
                [] => {
                    repl.interp.print("Available commands:");
                    for (_, i) in MetaCmd::cmds().iter().sorted_by_key(|x| x.0) {
                        repl.interp.print(&format!("  {} - {}", i.name, i.summary));
                    }
                }
                [cmd] => Self::meta_help(repl, &cmd.to_uppercase()),
                _ => bail!("`HELP` takes at most one command name"),
            }
            Ok(())
        },
    };

    fn meta_help(repl: &mut Repl, cmd: &str) {
        match MetaCmd::cmds().get(cmd) {
            Some(i) => {
                repl.interp.print(&format!("{} - {}", i.name, i.summary));
                for &e in i.description.iter() {
                    repl.interp.print(&format!("  {e}"));
                }
                repl.interp.print(&format!("  Usage: {}", i.format));
                if !i.example.is_empty() {
                    repl.interp.print("  Example:");
                }
                for &e in i.example.iter() {
                    repl.interp.print(&format!("    {e}"));
                }
            }
            None => repl.interp.print(&format!("unknown command {cmd}")),
        }
    }
}

impl MetaCmd {
    const CMDS: [MetaCmd; 10] = [
        MetaCmd::LOAD,
        MetaCmd::SI,
        MetaCmd::FNS,
        MetaCmd::VARS,
        MetaCmd::ERASE,
        MetaCmd::RETRY,
        MetaCmd::RESET,
        MetaCmd::CHECK,
        MetaCmd::OFF,
        MetaCmd::HELP,
    ];

    pub(super) fn cmds() -> std::collections::HashMap<&'static str, MetaCmd> {
        std::collections::HashMap::from(Self::CMDS.map(|x| (x.name, x)))
    }
}

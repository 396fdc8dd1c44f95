//! minish: run shell command lines.
//!
//!   minish -c COMMAND       run COMMAND with this process's stdio, exit with its status
//!   minish --json           read {"command", "stdin"} from stdin, run it captured,
//!                           write {"exit_code", "stdout", "stderr"} to stdout
//!   minish --parse COMMAND  print the AST of COMMAND as JSON
//!   minish --dump-config    print the effective configuration as TOML

use minish::{Shell, ShellConfig, ShellIo};
use serde::{Deserialize, Serialize};
use std::io::Read;

const USAGE: &str = "usage: minish -c COMMAND | --json | --parse COMMAND | --dump-config";

/// Exit status for usage errors and commands that could not run at all.
const EXIT_FAILURE: i32 = 2;

#[derive(Deserialize)]
struct JsonRequest {
    command: String,
    #[serde(default)]
    stdin: String,
}

#[derive(Serialize)]
struct JsonResponse {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

fn run_command(shell: &Shell, command: &str) -> i32 {
    match shell.execute(command, None) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("{}: {e}", shell.config().settings.diagnostic_prefix);
            EXIT_FAILURE
        }
    }
}

fn run_json(shell: &Shell) -> i32 {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        eprintln!("failed to read stdin");
        return 1;
    }

    let request: JsonRequest = match serde_json::from_str(&input) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("JSON parse error: {e}");
            return 1;
        }
    };

    let mut io = ShellIo::new().with_input(&request.stdin);
    let exit_code = shell.run(&request.command, Some(&mut io));
    let response = JsonResponse {
        exit_code,
        stdout: io.stdout_lossy().into_owned(),
        stderr: io.stderr_lossy().into_owned(),
    };

    match serde_json::to_string(&response) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("JSON encode error: {e}");
            1
        }
    }
}

fn print_ast(command: &str) -> i32 {
    let node = match minish::parse::parse_command(command) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("minish: {e}");
            return EXIT_FAILURE;
        }
    };
    match serde_json::to_string_pretty(&node) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("JSON encode error: {e}");
            1
        }
    }
}

fn dump_config(config: &ShellConfig) -> i32 {
    match toml::to_string(config) {
        Ok(text) => {
            print!("{text}");
            0
        }
        Err(e) => {
            eprintln!("TOML encode error: {e}");
            1
        }
    }
}

fn main() {
    let shell = Shell::new(ShellConfig::load());
    minish::logging::init(&shell.config().logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let code = match args.as_slice() {
        ["-c", command] => run_command(&shell, command),
        ["--json"] => run_json(&shell),
        ["--parse", command] => print_ast(command),
        ["--dump-config"] => dump_config(shell.config()),
        _ => {
            eprintln!("{USAGE}");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

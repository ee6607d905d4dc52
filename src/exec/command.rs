// src/exec/command.rs

use std::process::Stdio;

use tokio::process::Command;

/// Build the command that runs `path`.
///
/// With an interpreter (e.g. `"python3"` or `"uv run"`), the interpreter's
/// words come first and the script path is the last argument. Without one,
/// the path itself is executed.
pub fn build_command(interpreter: Option<&str>, path: &str) -> Command {
    let mut words = interpreter.map(str::split_whitespace).into_iter().flatten();

    let mut cmd = match words.next() {
        Some(program) => {
            let mut c = Command::new(program);
            c.args(words).arg(path);
            c
        }
        None => Command::new(path),
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so stop signals reach everything the script spawned.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

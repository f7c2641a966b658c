use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::Command;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub fn run_aptpack(dir: &Path, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_aptpack"))
        .args(args)
        .arg("--no-color")
        .current_dir(dir)
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

pub fn read_file(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

/// A stand-in for `ssh` that answers the resolver's commands from a script.
///
/// The remote command is always the last argument; anything unknown
/// (including `-O exit`) succeeds silently.
pub const FAKE_SSH: &str = r#"#!/bin/sh
for arg; do last="$arg"; done
case "$last" in
  "apt install -s curl")
    echo "NOTE: This is only a simulation!"
    echo "Inst libssl (1.1.1 Ubuntu:20.04/focal [amd64])"
    echo "Inst curl (7.68.0-1ubuntu2 Ubuntu:20.04/focal [amd64])"
    echo "Conf curl (7.68.0-1ubuntu2 Ubuntu:20.04/focal [amd64])"
    ;;
  "apt install -s wget")
    echo "Inst libssl (1.1.1 Ubuntu:20.04/focal [amd64])"
    echo "Inst badformat"
    echo "Inst wget (1.20.3 Ubuntu:20.04/focal [amd64])"
    ;;
  "apt install -s noisy")
    echo "Inst noisy (1.0 Ubuntu:20.04/focal [amd64])"
    for i in 1 2 3 4 5; do echo "W: warning $i" >&2; done
    ;;
  "cd depends && apt download "*)
    pkg="${last#cd depends && apt download }"
    echo "Get:1 http://archive.ubuntu.com/ubuntu focal/main amd64 ${pkg%%=*} amd64 ${pkg#*=} [1 kB]"
    ;;
  "md5sum depends/"*)
    echo "d41d8cd98f00b204e9800998ecf8427e  ${last#md5sum }"
    ;;
esac
exit 0
"#;

/// An `ssh` that can never connect.
pub const UNREACHABLE_SSH: &str = r#"#!/bin/sh
echo "ssh: connect to host builder port 22: Connection refused" >&2
exit 255
"#;

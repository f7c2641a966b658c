use std::ffi::OsString;
use std::path::{Path, PathBuf};

use duct::{Expression, cmd};
use tempfile::TempDir;

use super::{ChannelError, CommandJournal, CommandOutput, RemoteChannel};
use crate::config::RemoteConfig;
use crate::ui::prelude::*;

/// How long the multiplexed master connection outlives its last client.
const CONTROL_PERSIST_SECS: u32 = 600;

/// Where and how to reach the build machine.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    pub password: Option<String>,
    pub ssh_program: String,
    pub scp_program: String,
}

impl SshTarget {
    pub fn from_config(remote: &RemoteConfig) -> Result<Self, ChannelError> {
        let host = remote.host.clone().ok_or(ChannelError::MissingHost)?;
        Ok(Self {
            host,
            user: remote.user.clone(),
            port: remote.port,
            identity_file: remote.identity_file.clone(),
            password: remote.password.clone(),
            ssh_program: remote.ssh_program.clone(),
            scp_program: remote.scp_program.clone(),
        })
    }

    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Split a configured program string like `ssh -F cfg` into program and args.
fn split_program(program: &str) -> Result<(String, Vec<String>), ChannelError> {
    let mut words = shell_words::split(program)
        .map_err(|_| ChannelError::InvalidProgram(program.to_string()))?;
    if words.is_empty() {
        return Err(ChannelError::InvalidProgram(program.to_string()));
    }
    let program = words.remove(0);
    Ok((program, words))
}

fn require_program(program: &str) -> Result<(), ChannelError> {
    which::which(program)
        .map(|_| ())
        .map_err(|_| ChannelError::ProgramNotFound(program.to_string()))
}

/// Remote channel over the system OpenSSH client.
///
/// One master connection is opened by [`SshChannel::connect`] and every
/// later command is multiplexed over its control socket, so a run of a few
/// hundred commands authenticates exactly once.
pub struct SshChannel {
    target: SshTarget,
    control_dir: TempDir,
    journal: CommandJournal,
    closed: bool,
}

impl SshChannel {
    /// Open and verify the master connection. Failure here is the only
    /// fatal error of a resolution run.
    pub fn connect(target: SshTarget, journal: CommandJournal) -> Result<Self, ChannelError> {
        let (ssh, _) = split_program(&target.ssh_program)?;
        let (scp, _) = split_program(&target.scp_program)?;
        require_program(&ssh)?;
        require_program(&scp)?;
        if target.password.is_some() {
            require_program("sshpass")?;
        }

        let control_dir = tempfile::Builder::new()
            .prefix("aptpack-ssh-")
            .tempdir()?;

        let channel = Self {
            target,
            control_dir,
            journal,
            closed: false,
        };

        let output = channel
            .ssh_expression(&[], Some("true"))?
            .stdout_capture()
            .stderr_capture()
            .stdin_null()
            .unchecked()
            .run()
            .map_err(|e| ChannelError::Connect {
                host: channel.target.host.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ChannelError::Connect {
                host: channel.target.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        emit(
            Level::Success,
            "remote.connect.ok",
            &format!("Connected to {}", channel.target.destination()),
            None,
        );
        Ok(channel)
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("master.sock")
    }

    /// Options shared by ssh and scp.
    fn common_options(&self) -> Vec<OsString> {
        let mut control_path = OsString::from("ControlPath=");
        control_path.push(self.control_path());

        let mut opts: Vec<OsString> = vec![
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            control_path,
            "-o".into(),
            format!("ControlPersist={}", CONTROL_PERSIST_SECS).into(),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
        ];
        if self.target.password.is_none() {
            opts.push("-o".into());
            opts.push("BatchMode=yes".into());
        }
        if let Some(identity) = &self.target.identity_file {
            opts.push("-i".into());
            opts.push(identity.into());
        }
        opts
    }

    /// Wrap a program invocation in `sshpass -e` when password auth is set.
    fn with_auth(&self, program: String, args: Vec<OsString>) -> Expression {
        match &self.target.password {
            Some(password) => {
                let mut full: Vec<OsString> = vec!["-e".into(), program.into()];
                full.extend(args);
                cmd("sshpass", full).env("SSHPASS", password)
            }
            None => cmd(program, args),
        }
    }

    fn ssh_expression(
        &self,
        extra: &[&str],
        remote_command: Option<&str>,
    ) -> Result<Expression, ChannelError> {
        let (program, base) = split_program(&self.target.ssh_program)?;
        let mut args: Vec<OsString> = base.into_iter().map(OsString::from).collect();
        args.extend(self.common_options());
        args.push("-p".into());
        args.push(self.target.port.to_string().into());
        args.extend(extra.iter().map(OsString::from));
        args.push(self.target.destination().into());
        if let Some(command) = remote_command {
            args.push(command.into());
        }
        Ok(self.with_auth(program, args))
    }

    fn scp_expression(&self, remote: &str, local: &Path) -> Result<Expression, ChannelError> {
        let (program, base) = split_program(&self.target.scp_program)?;
        let mut args: Vec<OsString> = base.into_iter().map(OsString::from).collect();
        args.extend(self.common_options());
        args.push("-P".into());
        args.push(self.target.port.to_string().into());
        args.push(format!("{}:{}", self.target.destination(), remote).into());
        args.push(local.into());
        Ok(self.with_auth(program, args))
    }

    /// Shut down the master connection.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let result = self.ssh_expression(&["-O", "exit"], None).and_then(|expr| {
            expr.stdout_null()
                .stderr_null()
                .stdin_null()
                .unchecked()
                .run()
                .map_err(ChannelError::from)
        });
        if let Err(e) = result {
            emit(
                Level::Debug,
                "remote.close.failed",
                &format!("Failed to close master connection: {}", e),
                None,
            );
        }
    }
}

impl Drop for SshChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RemoteChannel for SshChannel {
    fn execute(&mut self, command: &str) -> CommandOutput {
        emit(
            Level::Debug,
            "remote.exec",
            &format!("$ {}", command),
            Some(serde_json::json!({ "command": command })),
        );

        let result = self.ssh_expression(&[], Some(command)).and_then(|expr| {
            expr.stdout_capture()
                .stderr_capture()
                .stdin_null()
                .unchecked()
                .run()
                .map_err(ChannelError::from)
        });

        let (output, exit_code) = match result {
            Ok(raw) => (
                CommandOutput::from_text(
                    &String::from_utf8_lossy(&raw.stdout),
                    &String::from_utf8_lossy(&raw.stderr),
                ),
                raw.status.code(),
            ),
            Err(e) => {
                emit(
                    Level::Warn,
                    "remote.exec.failed",
                    &format!("Error executing '{}': {}", command, e),
                    None,
                );
                (CommandOutput::default(), None)
            }
        };

        if let Err(e) = self.journal.record(
            &self.target.host,
            command,
            &output.stdout,
            &output.stderr,
            exit_code,
        ) {
            emit(
                Level::Warn,
                "remote.journal.failed",
                &format!("Warning: Failed to log remote command: {e}"),
                None,
            );
        }

        output
    }

    fn fetch(&mut self, remote: &str, local: &Path) -> Result<(), ChannelError> {
        emit(
            Level::Info,
            "remote.fetch.start",
            &format!(
                "Copying {}:{} to {}",
                self.target.host,
                remote,
                local.display()
            ),
            None,
        );

        if local.exists() {
            std::fs::remove_file(local)?;
        }

        let output = self
            .scp_expression(remote, local)?
            .stdout_null()
            .stderr_capture()
            .stdin_null()
            .unchecked()
            .run()?;

        if !output.status.success() {
            return Err(ChannelError::Fetch {
                remote: remote.to_string(),
                local: local.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

/// Prefix `apt install -s` puts in front of every package it would unpack.
const INSTALL_MARKER: &str = "Inst";

lazy_static! {
    static ref INST_LINE: Regex =
        Regex::new(r"Inst (\S+).*?\(([^\s)]+)").expect("install line pattern is valid");
}

/// One package the remote package manager would install, either the
/// requested package itself or something it pulls in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstallCandidate {
    pub name: String,
    pub version: String,
}

impl InstallCandidate {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// `name=version`, the form `apt download` accepts and the ledger key.
    pub fn id(&self) -> String {
        format!("{}={}", self.name, self.version)
    }
}

impl fmt::Display for InstallCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.version)
    }
}

fn parse_install_line(line: &str) -> Option<InstallCandidate> {
    let caps = INST_LINE.captures(line)?;
    Some(InstallCandidate::new(&caps[1], &caps[2]))
}

/// Lazily turn simulated-install output into install candidates.
///
/// Lines not starting with `Inst` are skipped. An `Inst` line that does not
/// fit `Inst <name> ... (<version> ...` yields `None` so that one odd line
/// cannot hide the rest of the dependency set.
pub fn parse_simulation<I, S>(lines: I) -> impl Iterator<Item = Option<InstallCandidate>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines.into_iter().filter_map(|line| {
        let line = line.as_ref();
        if line.starts_with(INSTALL_MARKER) {
            Some(parse_install_line(line))
        } else {
            None
        }
    })
}
